//! ELF (Executable and Linkable Format) decoding
//!
//! A zero-copy decoder limited to what symbol lookup needs: headers, program
//! headers, the dynamic segment, section headers, symbol tables and the two
//! symbol hash table layouts. Every field is read through bounds-checked
//! accessors on byte slices, whether the bytes come from a file mapping, a
//! decompressed buffer or a loaded image.

pub mod dynamic;
pub mod hash;
pub mod headers;
pub mod sections;
pub mod segments;
pub mod symbols;
pub mod types;
pub mod utils;

#[cfg(test)]
pub mod testing;

use headers::parse_header;
use sections::SectionTable;
use symbols::SymbolTable;
use utils::sub_slice;
pub use sections::FullTableSource;
pub use types::*;

/// Parser over a complete on-disk (or decompressed) ELF file
pub struct ElfParser<'data> {
    data: &'data [u8],
    header: ElfHeader,
}

impl<'data> ElfParser<'data> {
    /// Parse ELF from raw data
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        let header = parse_header(data)?;

        Ok(Self { data, header })
    }

    /// Get ELF header
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// Get sections
    pub fn sections(&self) -> Result<SectionTable<'data>> {
        SectionTable::parse(self.data, &self.header)
    }

    /// Locate the full symbol table. With `allow_debugdata` unset only a
    /// plain `.symtab` is accepted, which is how a decompressed embedded image
    /// is searched.
    pub fn full_table(&self, allow_debugdata: bool) -> Result<Option<FullTableSource>> {
        Ok(self.sections()?.find_full_table(allow_debugdata))
    }

    /// Bytes of a section
    pub fn section_data(&self, section: &SectionHeader) -> Result<&'data [u8]> {
        sub_slice(self.data, section.sh_offset, section.sh_size)
    }

    /// Symbol table over a `.symtab` section and its string table
    pub fn symbol_table(
        &self,
        symtab: &SectionHeader,
        strtab: &SectionHeader,
    ) -> Result<SymbolTable<'data>> {
        symbol_table(self.data, self.header.ident, symtab, strtab)
    }
}

/// Symbol table over the `symtab`/`strtab` sections of the file in `data`.
/// An `sh_entsize` of 0 falls back to the natural entry size.
pub fn symbol_table<'data>(
    data: &'data [u8],
    ident: ElfIdent,
    symtab: &SectionHeader,
    strtab: &SectionHeader,
) -> Result<SymbolTable<'data>> {
    SymbolTable::new(
        sub_slice(data, symtab.sh_offset, symtab.sh_size)?,
        sub_slice(data, strtab.sh_offset, strtab.sh_size)?,
        symtab.sh_entsize as usize,
        ident.class,
        ident.data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::{sym64, ElfBuilder, StringTable};

    #[test]
    fn test_parser_finds_symtab() {
        let mut strtab = StringTable::new();
        let mut symtab = sym64(0, 0, 0, 0);
        symtab.extend(sym64(strtab.add("hidden_helper"), STT_FUNC, 9, 0x2040));
        let mut builder = ElfBuilder::new();
        builder.symtab(symtab, strtab.into_bytes());
        let data = builder.build();

        let parser = ElfParser::parse(&data).unwrap();
        assert_eq!(parser.header().ident.class, ElfClass::Elf64);

        match parser.full_table(false).unwrap() {
            Some(FullTableSource::Symtab { symtab, strtab }) => {
                let table = parser.symbol_table(&symtab, &strtab).unwrap();
                let sym = table.find_linear("hidden_helper", SymbolKind::Function).unwrap();
                assert_eq!(sym.st_value, 0x2040);
            }
            _ => panic!("expected .symtab"),
        }
    }

    #[test]
    fn test_parser_reports_debugdata() {
        let mut builder = ElfBuilder::new();
        builder.section(".gnu_debugdata", SHT_PROGBITS, vec![0xfd, b'7', b'z'], 0, 0);
        let data = builder.build();

        let parser = ElfParser::parse(&data).unwrap();
        match parser.full_table(true).unwrap() {
            Some(FullTableSource::DebugData(section)) => {
                assert_eq!(parser.section_data(&section).unwrap(), &[0xfd, b'7', b'z']);
            }
            _ => panic!("expected .gnu_debugdata"),
        }
        assert!(parser.full_table(false).unwrap().is_none());
    }

    #[test]
    fn test_symtab_out_of_file_is_rejected() {
        let mut builder = ElfBuilder::new();
        builder.symtab(sym64(0, 0, 0, 0), vec![0]);
        let data = builder.build();
        let parser = ElfParser::parse(&data).unwrap();

        let Some(FullTableSource::Symtab { mut symtab, strtab }) = parser.full_table(false).unwrap()
        else {
            panic!("expected .symtab");
        };
        symtab.sh_size = data.len() as u64;
        assert!(parser.symbol_table(&symtab, &strtab).is_err());
    }

    #[test]
    fn test_parser_rejects_garbage() {
        assert!(matches!(
            ElfParser::parse(b"not an elf file at all, just some bytes long enough"),
            Err(ElfError::InvalidMagic)
        ));
    }
}
