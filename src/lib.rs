//! Resolve symbols of ELF images already loaded into the current process.
//!
//! ```no_run
//! use procsym::ModuleFlags;
//!
//! let libc = procsym::open("libc.so.6", ModuleFlags::EXPORTED).unwrap();
//! let getpid = libc.exported_function("getpid");
//! ```

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("procsym supports only Linux and Android");

/// Decompression of embedded debug data
pub mod codec;
/// Well-known paths and names
pub mod config;
pub mod error;
/// Binary format decoders
pub mod formats;
/// Enumeration of loaded images
pub mod iterator;
pub mod logging;
pub mod maps;
/// Module handles and symbol lookup
pub mod module;
pub mod platform;

pub use error::{DlError, Result};
pub use formats::elf::SymbolKind;
pub use iterator::{iterate, ImageInfo, IterateOptions};
pub use module::{Decompress, Module, ModuleFlags};

/// Open a loaded module by absolute path or basename.
///
/// Full symbol tables stored in `.gnu_debugdata` are decompressed with the
/// system codec. Returns `None` when no image matches or any requested table
/// cannot be loaded.
pub fn open(name: &str, flags: ModuleFlags) -> Option<Module> {
    Module::open_with(name, flags, Some(&codec::SystemCodec))
}
