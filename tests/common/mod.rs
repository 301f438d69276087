//! Shared helpers for the integration tests.
//!
//! Ground truth comes from the platform loader: `dlopen` with `RTLD_NOLOAD`
//! and `dlsym` against the handle of the image under test.

#![allow(dead_code)]

use std::ffi::CString;
use std::ops::ControlFlow;

use procsym::IterateOptions;

/// Basename of the C runtime on glibc systems.
pub const LIBC: &str = "libc.so.6";

/// Absolute path of the loaded image whose basename is `basename`.
pub fn loaded_path(basename: &str) -> Option<String> {
    let suffix = format!("/{}", basename);
    let mut found = None;
    procsym::iterate(IterateOptions::default(), |image| {
        if image.name.ends_with(&suffix) {
            found = Some(image.name.clone());
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    })
    .ok()?;
    found
}

/// Address the loader resolves `symbol` to within the already loaded `library`.
pub fn loader_address(library: &str, symbol: &str) -> Option<usize> {
    let library = CString::new(library).ok()?;
    let symbol = CString::new(symbol).ok()?;
    unsafe {
        let handle = libc::dlopen(library.as_ptr(), libc::RTLD_LAZY | libc::RTLD_NOLOAD);
        if handle.is_null() {
            return None;
        }
        let addr = libc::dlsym(handle, symbol.as_ptr());
        libc::dlclose(handle);
        (!addr.is_null()).then_some(addr as usize)
    }
}
