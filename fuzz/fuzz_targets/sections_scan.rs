#![no_main]
use libfuzzer_sys::fuzz_target;
use procsym::formats::elf::{ElfParser, FullTableSource};

fuzz_target!(|data: &[u8]| {
    let Ok(parser) = ElfParser::parse(data) else {
        return;
    };
    match parser.full_table(true) {
        Ok(Some(FullTableSource::Symtab { symtab, strtab })) => {
            if let Ok(table) = parser.symbol_table(&symtab, &strtab) {
                for i in 0..table.count().min(4096) {
                    if let Some(sym) = table.by_index(i) {
                        let _ = table.symbol_name(&sym);
                    }
                }
                let _ = table.find_linear("main", procsym::SymbolKind::Function);
            }
        }
        Ok(Some(FullTableSource::DebugData(section))) => {
            let _ = parser.section_data(&section);
        }
        _ => {}
    }
});
