//! Program header table management

use std::ops::Range;

use crate::formats::elf::types::*;
use crate::formats::elf::utils::{check_bounds, EndianRead};

/// Program headers of one image, in table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTable {
    headers: Vec<ProgramHeader>,
}

impl SegmentTable {
    /// Parse `count` program headers laid out back to back with stride `entsize`.
    pub fn parse_table(
        table: &[u8],
        count: usize,
        entsize: usize,
        class: ElfClass,
        endian: ElfData,
    ) -> Result<Self> {
        let total_size = count
            .checked_mul(entsize)
            .ok_or(ElfError::InvalidOffset { offset: 0 })?;
        if entsize < class.phdr_size() {
            return Err(ElfError::MalformedHeader(format!(
                "Program header entry size {} too small",
                entsize
            )));
        }
        check_bounds(0, total_size, table.len()).map_err(|_| ElfError::Truncated {
            offset: 0,
            needed: total_size,
        })?;

        let headers = (0..count)
            .map(|i| parse_program_header(table, i * entsize, class, endian))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { headers })
    }

    pub fn headers(&self) -> &[ProgramHeader] {
        &self.headers
    }

}

/// LOAD segments of `headers`, in table order.
pub fn load_segments(headers: &[ProgramHeader]) -> impl Iterator<Item = &ProgramHeader> + '_ {
    headers.iter().filter(|ph| ph.p_type == PT_LOAD)
}

/// Lowest link-time address of any LOAD segment in `headers`.
pub fn min_load_vaddr(headers: &[ProgramHeader]) -> Option<u64> {
    load_segments(headers).map(|ph| ph.p_vaddr).min()
}

/// Link-time address range spanned by the LOAD segments, holes included.
pub fn load_vaddr_range(headers: &[ProgramHeader]) -> Option<Range<u64>> {
    let start = min_load_vaddr(headers)?;
    let end = load_segments(headers)
        .map(|ph| ph.p_vaddr.saturating_add(ph.p_memsz))
        .max()?;
    Some(start..end)
}

/// The LOAD segment whose memory image covers link-time address `vaddr`.
pub fn load_segment_containing(headers: &[ProgramHeader], vaddr: u64) -> Option<&ProgramHeader> {
    load_segments(headers).find(|ph| vaddr >= ph.p_vaddr && vaddr - ph.p_vaddr < ph.p_memsz)
}

/// The PT_DYNAMIC segment, if the image has one.
pub fn dynamic_segment(headers: &[ProgramHeader]) -> Option<&ProgramHeader> {
    headers.iter().find(|ph| ph.p_type == PT_DYNAMIC)
}

/// Parse a single program header
fn parse_program_header(
    data: &[u8],
    offset: usize,
    class: ElfClass,
    endian: ElfData,
) -> Result<ProgramHeader> {
    match class {
        ElfClass::Elf32 => Ok(ProgramHeader {
            p_type: data.read_u32(offset, endian)?,
            p_offset: data.read_u32(offset + 4, endian)? as u64,
            p_vaddr: data.read_u32(offset + 8, endian)? as u64,
            p_filesz: data.read_u32(offset + 16, endian)? as u64,
            p_memsz: data.read_u32(offset + 20, endian)? as u64,
            p_flags: data.read_u32(offset + 24, endian)?,
        }),
        ElfClass::Elf64 => Ok(ProgramHeader {
            p_type: data.read_u32(offset, endian)?,
            p_flags: data.read_u32(offset + 4, endian)?,
            p_offset: data.read_u64(offset + 8, endian)?,
            p_vaddr: data.read_u64(offset + 16, endian)?,
            p_filesz: data.read_u64(offset + 32, endian)?,
            p_memsz: data.read_u64(offset + 40, endian)?,
        }),
    }
}
