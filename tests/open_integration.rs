//! Opening the C runtime of the test process and resolving its symbols.

mod common;

use common::{loaded_path, loader_address, LIBC};
use procsym::{Module, ModuleFlags, SymbolKind};

const FUNCTIONS: &[&str] = &["getpid", "getenv", "qsort", "abort", "malloc"];

fn open_libc() -> Option<Module> {
    // Not a glibc system.
    loaded_path(LIBC)?;
    Some(procsym::open(LIBC, ModuleFlags::EXPORTED).expect("libc is loaded"))
}

#[test]
fn basename_and_path_open_the_same_image() {
    let Some(path) = loaded_path(LIBC) else { return };

    let by_name = procsym::open(LIBC, ModuleFlags::EXPORTED).unwrap();
    let by_path = procsym::open(&path, ModuleFlags::EXPORTED).unwrap();

    assert_eq!(by_name.name(), Some(path.as_str()));
    assert_eq!(by_path.name(), Some(path.as_str()));
    assert_eq!(by_name.load_bias(), by_path.load_bias());
    assert_eq!(by_name.base(), by_path.base());
    assert_eq!(by_name.flags(), ModuleFlags::EXPORTED);
}

#[test]
fn exported_functions_match_the_loader() {
    let Some(libc) = open_libc() else { return };

    for name in FUNCTIONS {
        let expected = loader_address(LIBC, name);
        assert!(expected.is_some(), "loader does not know {}", name);
        assert_eq!(libc.exported_function(name), expected, "{}", name);
        assert_eq!(libc.resolve_exported(name, SymbolKind::Function), expected);
    }
}

#[test]
fn exported_objects_match_the_loader() {
    let Some(libc) = open_libc() else { return };

    for name in ["program_invocation_name", "environ"] {
        let expected = loader_address(LIBC, name);
        assert_eq!(libc.exported_object(name), expected, "{}", name);
    }
}

#[test]
fn symbol_kinds_are_not_interchangeable() {
    let Some(libc) = open_libc() else { return };

    assert!(libc.exported_function("getpid").is_some());
    assert_eq!(libc.exported_object("getpid"), None);
    assert!(libc.exported_object("program_invocation_name").is_some());
    assert_eq!(libc.exported_function("program_invocation_name"), None);
}

#[test]
fn unknown_symbols_are_absent() {
    let Some(libc) = open_libc() else { return };

    assert_eq!(libc.exported_function("procsym_no_such_function"), None);
    assert_eq!(libc.exported_function(""), None);
    // Exported flags only: the full table was never loaded.
    assert_eq!(libc.full_function("getpid"), None);
}

#[test]
fn close_is_idempotent() {
    let Some(mut libc) = open_libc() else { return };

    libc.close();
    assert!(libc.is_closed());
    libc.close();
    assert!(libc.is_closed());
    assert_eq!(libc.exported_function("getpid"), None);
    assert_eq!(libc.name(), None);
    assert_eq!(libc.load_bias(), None);
}

#[test]
fn absent_modules_do_not_open() {
    assert!(procsym::open("libprocsym_not_loaded.so", ModuleFlags::EXPORTED).is_none());
    assert!(procsym::open("/nonexistent/libc.so.6", ModuleFlags::ALL).is_none());
    assert!(procsym::open("", ModuleFlags::EXPORTED).is_none());
    assert!(procsym::open(LIBC, ModuleFlags::empty()).is_none());

    if loaded_path(LIBC).is_some() {
        // A basename must start after a path separator.
        assert!(procsym::open("ibc.so.6", ModuleFlags::EXPORTED).is_none());
    }
}

#[test]
fn full_table_is_all_or_nothing() {
    let Some(path) = loaded_path(LIBC) else { return };

    // Distribution builds may strip .symtab entirely, in which case the
    // handle is not created at all.
    let Some(libc) = procsym::open(&path, ModuleFlags::ALL) else {
        assert!(procsym::open(&path, ModuleFlags::FULL_TABLE).is_none());
        return;
    };
    assert_eq!(libc.flags(), ModuleFlags::ALL);

    let exported = libc.exported_function("getpid");
    assert!(exported.is_some());
    if let Some(full) = libc.full_function("getpid") {
        assert_eq!(Some(full), exported);
    }
}

#[test]
fn handles_are_independent() {
    let Some(mut first) = open_libc() else { return };
    let second = open_libc().unwrap();

    first.close();
    assert_eq!(
        second.exported_function("getpid"),
        loader_address(LIBC, "getpid")
    );
}
