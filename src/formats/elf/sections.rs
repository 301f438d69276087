//! Section table management

use crate::config::{DEBUGDATA_SECTION, SYMTAB_SECTION};
use crate::formats::elf::types::*;
use crate::formats::elf::utils::{read_cstr, sub_slice, EndianRead};

/// Section table of an on-disk (or decompressed) image
pub struct SectionTable<'a> {
    headers: Vec<SectionHeader>,
    strings: &'a [u8],
    data: &'a [u8],
}

/// Where the full symbol table of an image lives.
#[derive(Debug, Clone, Copy)]
pub enum FullTableSource {
    /// A `.symtab` section and its linked string table.
    Symtab {
        symtab: SectionHeader,
        strtab: SectionHeader,
    },
    /// A `.gnu_debugdata` section holding a compressed image that carries
    /// the table instead.
    DebugData(SectionHeader),
}

impl<'a> SectionTable<'a> {
    /// Parse section table from ELF data
    pub fn parse(data: &'a [u8], header: &ElfHeader) -> Result<Self> {
        let sh_offset = header.e_shoff as usize;
        let sh_entsize = header.e_shentsize as usize;
        let sh_num = header.e_shnum as usize;

        if sh_num == 0 {
            return Err(ElfError::MalformedHeader("no section headers".to_string()));
        }

        // Check bounds
        let total_size = sh_num * sh_entsize;
        if sh_offset
            .checked_add(total_size)
            .map_or(true, |end| end > data.len())
        {
            return Err(ElfError::Truncated {
                offset: sh_offset,
                needed: total_size,
            });
        }

        // Parse section headers
        let headers = (0..sh_num)
            .map(|i| {
                parse_section_header(
                    data,
                    sh_offset + i * sh_entsize,
                    header.ident.class,
                    header.ident.data,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        // Get string table for section names
        let shstrndx = header.e_shstrndx;
        if shstrndx == SHN_UNDEF {
            return Err(ElfError::MalformedHeader(
                "no section name string table".to_string(),
            ));
        }
        let str_header = headers
            .get(shstrndx as usize)
            .ok_or(ElfError::InvalidSectionIndex(shstrndx as u32))?;
        let strings = sub_slice(data, str_header.sh_offset, str_header.sh_size)?;

        Ok(Self {
            headers,
            strings,
            data,
        })
    }

    /// Get section header by index
    pub fn by_index(&self, index: usize) -> Option<&SectionHeader> {
        self.headers.get(index)
    }

    /// Name of a section, bounded by the section name string table
    pub fn name_of(&self, header: &SectionHeader) -> Option<&'a [u8]> {
        read_cstr(self.strings, header.sh_name as usize).ok()
    }

    /// Bytes of a section
    pub fn data_of(&self, header: &SectionHeader) -> Result<&'a [u8]> {
        sub_slice(self.data, header.sh_offset, header.sh_size)
    }

    /// Count sections
    pub fn count(&self) -> usize {
        self.headers.len()
    }

    /// The first `.symtab` with a valid string table link. Failing that,
    /// and when `allow_debugdata` is set, the first `.gnu_debugdata`.
    pub fn find_full_table(&self, allow_debugdata: bool) -> Option<FullTableSource> {
        let symtab = self.headers.iter().find_map(|sh| {
            if sh.sh_type != SHT_SYMTAB || self.name_of(sh) != Some(SYMTAB_SECTION.as_bytes()) {
                return None;
            }
            let strtab = self.by_index(sh.sh_link as usize)?;
            (strtab.sh_type == SHT_STRTAB).then_some(FullTableSource::Symtab {
                symtab: *sh,
                strtab: *strtab,
            })
        });
        if symtab.is_some() || !allow_debugdata {
            return symtab;
        }
        self.headers
            .iter()
            .find(|sh| {
                sh.sh_type == SHT_PROGBITS && self.name_of(sh) == Some(DEBUGDATA_SECTION.as_bytes())
            })
            .map(|sh| FullTableSource::DebugData(*sh))
    }
}

/// Parse a single section header
fn parse_section_header(
    data: &[u8],
    offset: usize,
    class: ElfClass,
    endian: ElfData,
) -> Result<SectionHeader> {
    match class {
        ElfClass::Elf32 => Ok(SectionHeader {
            sh_name: data.read_u32(offset, endian)?,
            sh_type: data.read_u32(offset + 4, endian)?,
            sh_flags: data.read_u32(offset + 8, endian)? as u64,
            sh_addr: data.read_u32(offset + 12, endian)? as u64,
            sh_offset: data.read_u32(offset + 16, endian)? as u64,
            sh_size: data.read_u32(offset + 20, endian)? as u64,
            sh_link: data.read_u32(offset + 24, endian)?,
            sh_info: data.read_u32(offset + 28, endian)?,
            sh_addralign: data.read_u32(offset + 32, endian)? as u64,
            sh_entsize: data.read_u32(offset + 36, endian)? as u64,
        }),
        ElfClass::Elf64 => Ok(SectionHeader {
            sh_name: data.read_u32(offset, endian)?,
            sh_type: data.read_u32(offset + 4, endian)?,
            sh_flags: data.read_u64(offset + 8, endian)?,
            sh_addr: data.read_u64(offset + 16, endian)?,
            sh_offset: data.read_u64(offset + 24, endian)?,
            sh_size: data.read_u64(offset + 32, endian)?,
            sh_link: data.read_u32(offset + 40, endian)?,
            sh_info: data.read_u32(offset + 44, endian)?,
            sh_addralign: data.read_u64(offset + 48, endian)?,
            sh_entsize: data.read_u64(offset + 56, endian)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::elf::headers::parse_header;
    use crate::formats::elf::testing::{sym64, ElfBuilder, StringTable};

    fn table_pair() -> (Vec<u8>, Vec<u8>) {
        let mut strtab = StringTable::new();
        let mut symtab = sym64(0, 0, 0, 0);
        symtab.extend(sym64(strtab.add("local_fn"), STT_FUNC, 1, 0x1230));
        (symtab, strtab.into_bytes())
    }

    #[test]
    fn test_finds_symtab_and_linked_strtab() {
        let (symtab, strtab) = table_pair();
        let mut builder = ElfBuilder::new();
        builder.section(".text", SHT_PROGBITS, vec![0x90; 16], 0, 0);
        builder.symtab(symtab.clone(), strtab.clone());
        let data = builder.build();

        let header = parse_header(&data).unwrap();
        let sections = SectionTable::parse(&data, &header).unwrap();
        assert_eq!(sections.count(), 5);

        match sections.find_full_table(true) {
            Some(FullTableSource::Symtab { symtab: s, strtab: t }) => {
                assert_eq!(sections.data_of(&s).unwrap(), &symtab[..]);
                assert_eq!(sections.data_of(&t).unwrap(), &strtab[..]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_falls_back_to_debugdata() {
        let mut builder = ElfBuilder::new();
        builder.section(".gnu_debugdata", SHT_PROGBITS, b"xz-bytes".to_vec(), 0, 0);
        let data = builder.build();

        let header = parse_header(&data).unwrap();
        let sections = SectionTable::parse(&data, &header).unwrap();

        match sections.find_full_table(true) {
            Some(FullTableSource::DebugData(sh)) => {
                assert_eq!(sections.data_of(&sh).unwrap(), b"xz-bytes");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(sections.find_full_table(false).is_none());
    }

    #[test]
    fn test_symtab_wins_over_earlier_debugdata() {
        let (symtab, strtab) = table_pair();
        let mut builder = ElfBuilder::new();
        builder.section(".gnu_debugdata", SHT_PROGBITS, b"xz-bytes".to_vec(), 0, 0);
        builder.symtab(symtab.clone(), strtab);
        let data = builder.build();

        let header = parse_header(&data).unwrap();
        let sections = SectionTable::parse(&data, &header).unwrap();

        for allow_debugdata in [true, false] {
            match sections.find_full_table(allow_debugdata) {
                Some(FullTableSource::Symtab { symtab: s, .. }) => {
                    assert_eq!(sections.data_of(&s).unwrap(), &symtab[..]);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_symtab_with_bad_link_is_skipped() {
        let (symtab, _) = table_pair();
        let mut builder = ElfBuilder::new();
        // Link points at a PROGBITS section, then out of range.
        let text = builder.section(".text", SHT_PROGBITS, vec![0; 8], 0, 0);
        builder.section(".symtab", SHT_SYMTAB, symtab.clone(), text, 24);
        builder.section(".symtab", SHT_SYMTAB, symtab, 99, 24);
        let data = builder.build();

        let header = parse_header(&data).unwrap();
        let sections = SectionTable::parse(&data, &header).unwrap();
        assert!(sections.find_full_table(true).is_none());
    }

    #[test]
    fn test_wrong_type_name_match_is_ignored() {
        let mut builder = ElfBuilder::new();
        builder.section(".gnu_debugdata", SHT_STRTAB, vec![1, 2, 3], 0, 0);
        let data = builder.build();

        let header = parse_header(&data).unwrap();
        let sections = SectionTable::parse(&data, &header).unwrap();
        assert!(sections.find_full_table(true).is_none());
    }

    #[test]
    fn test_truncated_section_headers() {
        let data = ElfBuilder::new().build();
        let header = parse_header(&data).unwrap();
        let cut = &data[..data.len() - 8];
        assert!(matches!(
            SectionTable::parse(cut, &header),
            Err(ElfError::Truncated { .. })
        ));
    }

    #[test]
    fn test_missing_shstrtab_index() {
        let mut data = ElfBuilder::new().build();
        data[62] = 0;
        data[63] = 0;
        let header = parse_header(&data).unwrap();
        assert!(matches!(
            SectionTable::parse(&data, &header),
            Err(ElfError::MalformedHeader(_))
        ));
    }
}
