//! Dynamic linker helpers: its global mutex and its mapping.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use tracing::debug;

use crate::codec::SystemCodec;
use crate::config::{LINKER_MUTEX_SYMBOL, LINKER_PATHNAME};
use crate::maps::MapsReader;
use crate::module::{find_image, Decompress, Module, ModuleFlags};
use super::ImageInfo;

const UNINIT: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

static MUTEX_STATE: AtomicU8 = AtomicU8::new(UNINIT);
static MUTEX: AtomicPtr<libc::pthread_mutex_t> = AtomicPtr::new(ptr::null_mut());

/// The linker's global mutex, resolved once per process from the linker's
/// full symbol table.
///
/// Resolution itself enumerates images. Callers arriving while it is in
/// progress, including that nested enumeration, get `None` and go ahead
/// without the lock.
pub fn linker_mutex() -> Option<NonNull<libc::pthread_mutex_t>> {
    match MUTEX_STATE.compare_exchange(UNINIT, RUNNING, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            let mutex = resolve_linker_mutex();
            MUTEX.store(mutex, Ordering::Release);
            MUTEX_STATE.store(DONE, Ordering::Release);
            NonNull::new(mutex)
        }
        Err(DONE) => NonNull::new(MUTEX.load(Ordering::Acquire)),
        Err(_) => None,
    }
}

fn resolve_linker_mutex() -> *mut libc::pthread_mutex_t {
    let addr = find_image(LINKER_PATHNAME)
        .ok()
        .and_then(|linker| mutex_address(&linker, &SystemCodec));
    match addr {
        Some(addr) => {
            debug!(addr = format_args!("{:#x}", addr), "Resolved linker mutex");
            addr as *mut libc::pthread_mutex_t
        }
        None => {
            debug!("Linker mutex unavailable, enumerating without it");
            ptr::null_mut()
        }
    }
}

/// Release builds of the linker keep their local symbols only in
/// `.gnu_debugdata`.
fn mutex_address(linker: &ImageInfo, decompressor: &dyn Decompress) -> Option<usize> {
    let module = Module::load(linker, ModuleFlags::FULL_TABLE, Some(decompressor));
    if let Err(err) = &module {
        debug!(error = %err, "Linker full table not loaded");
    }
    module.ok()?.full_object(LINKER_MUTEX_SYMBOL)
}

/// Holds the linker mutex until dropped.
pub struct LinkerLockGuard {
    mutex: NonNull<libc::pthread_mutex_t>,
}

impl LinkerLockGuard {
    /// # Safety
    ///
    /// `mutex` must point at an initialized pthread mutex that outlives the
    /// guard.
    pub unsafe fn lock(mutex: NonNull<libc::pthread_mutex_t>) -> Self {
        libc::pthread_mutex_lock(mutex.as_ptr());
        Self { mutex }
    }
}

impl Drop for LinkerLockGuard {
    fn drop(&mut self) {
        // SAFETY: locked in `lock`, still valid per its contract.
        unsafe {
            libc::pthread_mutex_unlock(self.mutex.as_ptr());
        }
    }
}

/// Start of the linker's first mapping: readable, private, offset 0, and
/// beginning with an ELF header.
pub fn find_linker_base(maps: &mut MapsReader) -> Option<usize> {
    let entries = maps.entries().ok()?;
    for entry in entries {
        if entry.pathname.as_deref() != Some(LINKER_PATHNAME) {
            continue;
        }
        if !entry.is_readable() || !entry.is_private() || entry.offset != 0 {
            continue;
        }
        // SAFETY: the mapping is readable and at least one page long.
        if unsafe { super::has_elf_magic(entry.start) } {
            return Some(entry.start);
        }
    }
    None
}
