//! Dynamic segment parsing

use crate::formats::elf::types::*;
use crate::formats::elf::utils::EndianRead;

/// Parse dynamic entries up to (not including) the DT_NULL terminator, or to
/// the end of `data` when no terminator is present.
pub fn parse_entries(data: &[u8], class: ElfClass, endian: ElfData) -> Result<Vec<DynamicEntry>> {
    let entry_size = class.dyn_size();
    let mut entries = Vec::new();
    let mut offset = 0;

    while offset + entry_size <= data.len() {
        let d_tag = match class {
            ElfClass::Elf32 => data.read_i32(offset, endian)? as i64,
            ElfClass::Elf64 => data.read_i64(offset, endian)?,
        };

        if d_tag == DT_NULL {
            break;
        }

        let d_val = match class {
            ElfClass::Elf32 => data.read_u32(offset + 4, endian)? as u64,
            ElfClass::Elf64 => data.read_u64(offset + 8, endian)?,
        };

        entries.push(DynamicEntry { d_tag, d_val });
        offset += entry_size;
    }

    Ok(entries)
}

/// The dynamic-linking entries needed for exported symbol lookup.
///
/// Pointer-valued entries are stored exactly as found; whether they still
/// need the load bias added depends on the loader (see `module`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DynamicInfo {
    /// DT_SYMTAB (.dynsym)
    pub symtab: Option<u64>,
    /// DT_STRTAB (.dynstr)
    pub strtab: Option<u64>,
    /// DT_STRSZ
    pub strsz: Option<u64>,
    /// DT_SYMENT
    pub syment: Option<u64>,
    /// DT_HASH (.hash)
    pub hash: Option<u64>,
    /// DT_GNU_HASH (.gnu.hash)
    pub gnu_hash: Option<u64>,
}

impl DynamicInfo {
    pub fn parse(data: &[u8], class: ElfClass, endian: ElfData) -> Result<Self> {
        Ok(Self::from_entries(&parse_entries(data, class, endian)?))
    }

    pub fn from_entries(entries: &[DynamicEntry]) -> Self {
        let mut info = Self::default();
        for entry in entries {
            let slot = match entry.d_tag {
                DT_SYMTAB => &mut info.symtab,
                DT_STRTAB => &mut info.strtab,
                DT_STRSZ => &mut info.strsz,
                DT_SYMENT => &mut info.syment,
                DT_HASH => &mut info.hash,
                DT_GNU_HASH => &mut info.gnu_hash,
                _ => continue,
            };
            *slot = Some(entry.d_val);
        }
        info
    }

    /// True when neither hash table is present.
    pub fn has_no_hash_table(&self) -> bool {
        self.hash.is_none() && self.gnu_hash.is_none()
    }
}
