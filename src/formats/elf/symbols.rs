//! Symbol table views

use crate::formats::elf::types::*;
use crate::formats::elf::utils::{read_cstr, EndianRead};

/// A defined symbol as seen through the dynamic table: only SHN_UNDEF
/// disqualifies it.
pub fn is_exported_definition(symbol: &Symbol) -> bool {
    !symbol.is_undefined()
}

/// A defined symbol as seen through the full table: SHN_UNDEF and every
/// index in the reserved range disqualify it.
pub fn is_full_definition(symbol: &Symbol) -> bool {
    !symbol.is_undefined() && !symbol.is_reserved_index()
}

/// Symbol array plus its string table, decoded on demand.
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable<'a> {
    symbols: &'a [u8],
    strings: &'a [u8],
    entry_size: usize,
    class: ElfClass,
    endian: ElfData,
}

impl<'a> SymbolTable<'a> {
    /// Wrap raw symbol and string bytes. `entry_size` of 0 means the class's
    /// natural symbol size.
    pub fn new(
        symbols: &'a [u8],
        strings: &'a [u8],
        entry_size: usize,
        class: ElfClass,
        endian: ElfData,
    ) -> Result<Self> {
        let entry_size = if entry_size == 0 {
            class.sym_size()
        } else {
            entry_size
        };
        if entry_size < class.sym_size() {
            return Err(ElfError::MalformedHeader(format!(
                "Symbol entry size {} too small",
                entry_size
            )));
        }
        Ok(Self {
            symbols,
            strings,
            entry_size,
            class,
            endian,
        })
    }

    /// Count total symbols
    pub fn count(&self) -> usize {
        self.symbols.len() / self.entry_size
    }

    /// Get symbol by index
    pub fn by_index(&self, index: usize) -> Option<Symbol> {
        if index >= self.count() {
            return None;
        }
        parse_symbol(self.symbols, index * self.entry_size, self.class, self.endian).ok()
    }

    /// Get symbol name, bounded by the end of the string table
    pub fn symbol_name(&self, symbol: &Symbol) -> Option<&'a [u8]> {
        read_cstr(self.strings, symbol.st_name as usize).ok()
    }

    /// Compare a symbol's name against `name` without reading past the
    /// string table.
    pub fn name_is(&self, symbol: &Symbol, name: &[u8]) -> bool {
        self.symbol_name(symbol) == Some(name)
    }

    /// Linear scan used for the full symbol table, which carries no hash index.
    pub fn find_linear(&self, name: &str, kind: SymbolKind) -> Option<Symbol> {
        let name = name.as_bytes();
        (0..self.count())
            .filter_map(|i| self.by_index(i))
            .find(|sym| is_full_definition(sym) && kind.matches(sym) && self.name_is(sym, name))
    }
}

/// Parse a single symbol entry at `offset`
fn parse_symbol(data: &[u8], offset: usize, class: ElfClass, endian: ElfData) -> Result<Symbol> {
    let byte = |at: usize| {
        data.get(offset + at).copied().ok_or(ElfError::Truncated {
            offset: offset + at,
            needed: 1,
        })
    };
    match class {
        ElfClass::Elf32 => Ok(Symbol {
            st_name: data.read_u32(offset, endian)?,
            st_value: data.read_u32(offset + 4, endian)? as u64,
            st_size: data.read_u32(offset + 8, endian)? as u64,
            st_info: byte(12)?,
            st_other: byte(13)?,
            st_shndx: data.read_u16(offset + 14, endian)?,
        }),
        ElfClass::Elf64 => Ok(Symbol {
            st_name: data.read_u32(offset, endian)?,
            st_info: byte(4)?,
            st_other: byte(5)?,
            st_shndx: data.read_u16(offset + 6, endian)?,
            st_value: data.read_u64(offset + 8, endian)?,
            st_size: data.read_u64(offset + 16, endian)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::elf::testing::{sym64, StringTable};

    fn create_test_symbol_table() -> (Vec<u8>, Vec<u8>) {
        let mut strtab = StringTable::new();
        let printf = strtab.add("printf");
        let main = strtab.add("main");
        let counter = strtab.add("counter");
        let abs = strtab.add("abs_marker");

        let mut symtab = sym64(0, 0, 0, 0);
        // undefined import
        symtab.extend(sym64(printf, (STB_GLOBAL << 4) | STT_FUNC, SHN_UNDEF, 0));
        symtab.extend(sym64(main, (STB_GLOBAL << 4) | STT_FUNC, 12, 0x1000));
        symtab.extend(sym64(counter, (STB_LOCAL << 4) | STT_OBJECT, 20, 0x4010));
        symtab.extend(sym64(abs, (STB_GLOBAL << 4) | STT_FUNC, SHN_ABS, 0x77));

        (symtab, strtab.into_bytes())
    }

    #[test]
    fn test_linear_lookup() {
        let (symtab, strtab) = create_test_symbol_table();
        let table =
            SymbolTable::new(&symtab, &strtab, 24, ElfClass::Elf64, ElfData::Little).unwrap();

        assert_eq!(table.count(), 5);
        assert_eq!(
            table.find_linear("main", SymbolKind::Function).unwrap().st_value,
            0x1000
        );
        assert_eq!(
            table.find_linear("counter", SymbolKind::Object).unwrap().st_value,
            0x4010
        );
    }

    #[test]
    fn test_kind_must_match() {
        let (symtab, strtab) = create_test_symbol_table();
        let table = SymbolTable::new(&symtab, &strtab, 0, ElfClass::Elf64, ElfData::Little).unwrap();

        assert!(table.find_linear("main", SymbolKind::Object).is_none());
        assert!(table.find_linear("counter", SymbolKind::Function).is_none());
    }

    #[test]
    fn test_undefined_and_reserved_rejected() {
        let (symtab, strtab) = create_test_symbol_table();
        let table = SymbolTable::new(&symtab, &strtab, 0, ElfClass::Elf64, ElfData::Little).unwrap();

        assert!(table.find_linear("printf", SymbolKind::Function).is_none());
        assert!(table.find_linear("abs_marker", SymbolKind::Function).is_none());

        // The exported-table rule only rejects SHN_UNDEF.
        let abs = table.by_index(4).unwrap();
        assert!(is_exported_definition(&abs));
        assert!(!is_full_definition(&abs));
    }

    #[test]
    fn test_name_bounded_by_string_table() {
        let (symtab, strtab) = create_test_symbol_table();
        // Cut the string table in the middle of "abs_marker".
        let cut = strtab.len() - 5;
        let table =
            SymbolTable::new(&symtab, &strtab[..cut], 0, ElfClass::Elf64, ElfData::Little).unwrap();

        let abs = table.by_index(4).unwrap();
        assert_eq!(table.symbol_name(&abs), Some(&b"abs_ma"[..]));
        assert!(!table.name_is(&abs, b"abs_marker"));
        assert!(table.by_index(5).is_none());
    }

    #[test]
    fn test_short_entry_size_rejected() {
        assert!(SymbolTable::new(&[], &[], 8, ElfClass::Elf64, ElfData::Little).is_err());
    }
}
