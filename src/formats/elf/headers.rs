//! ELF header parsing

use crate::formats::elf::types::*;
use crate::formats::elf::utils::EndianRead;

/// Parse ELF identification bytes
pub fn parse_ident(data: &[u8]) -> Result<ElfIdent> {
    if data.len() < 16 {
        return Err(ElfError::Truncated {
            offset: 0,
            needed: 16,
        });
    }

    // Check magic
    if &data[0..4] != ELF_MAGIC {
        return Err(ElfError::InvalidMagic);
    }

    let class = ElfClass::from_u8(data[4])?;
    let data_encoding = ElfData::from_u8(data[5])?;

    Ok(ElfIdent {
        class,
        data: data_encoding,
        version: data[6],
    })
}

/// Parse ELF header
pub fn parse_header(data: &[u8]) -> Result<ElfHeader> {
    let ident = parse_ident(data)?;
    let header_size = ident.class.header_size();

    if data.len() < header_size {
        return Err(ElfError::Truncated {
            offset: 0,
            needed: header_size,
        });
    }

    let endian = ident.data;
    let e_type = data.read_u16(16, endian)?;

    let (e_phoff, e_shoff, tail) = match ident.class {
        ElfClass::Elf32 => (
            data.read_u32(28, endian)? as u64,
            data.read_u32(32, endian)? as u64,
            42,
        ),
        ElfClass::Elf64 => (data.read_u64(32, endian)?, data.read_u64(40, endian)?, 54),
    };

    let e_phentsize = data.read_u16(tail, endian)?;
    let e_phnum = data.read_u16(tail + 2, endian)?;
    let e_shentsize = data.read_u16(tail + 4, endian)?;
    let e_shnum = data.read_u16(tail + 6, endian)?;
    let e_shstrndx = data.read_u16(tail + 8, endian)?;

    if e_phnum > 0 && (e_phentsize as usize) < ident.class.phdr_size() {
        return Err(ElfError::MalformedHeader(format!(
            "Invalid e_phentsize: expected at least {}, got {}",
            ident.class.phdr_size(),
            e_phentsize
        )));
    }

    if e_shnum > 0 && (e_shentsize as usize) < ident.class.shdr_size() {
        return Err(ElfError::MalformedHeader(format!(
            "Invalid e_shentsize: expected at least {}, got {}",
            ident.class.shdr_size(),
            e_shentsize
        )));
    }

    Ok(ElfHeader {
        ident,
        e_type,
        e_phoff,
        e_shoff,
        e_phentsize,
        e_phnum,
        e_shentsize,
        e_shnum,
        e_shstrndx,
    })
}

/// Parse the header of an image that must match this process's class and
/// byte order, as every loaded image does.
pub fn parse_native_header(data: &[u8]) -> Result<ElfHeader> {
    let header = parse_header(data)?;
    if header.ident.class != ElfClass::NATIVE {
        return Err(ElfError::UnsupportedClass(header.ident.class as u8));
    }
    if header.ident.data != ElfData::NATIVE {
        return Err(ElfError::UnsupportedData(header.ident.data as u8));
    }
    Ok(header)
}
