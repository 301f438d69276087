//! Enumeration of the ELF images loaded into this process
//!
//! Images are handed to a visitor one at a time; the visitor stops the walk by
//! returning [`ControlFlow::Break`]. Which primitive discovers the images
//! depends on the platform level (see [`strategy`]):
//!
//! - `dl_iterate_phdr`, with names that are neither absolute nor bracketed
//!   replaced by the path of the mapping containing the image's base,
//! - the same under the dynamic linker's global mutex on the two levels whose
//!   `dl_iterate_phdr` is not safe against concurrent loads,
//! - a plain scan of `/proc/self/maps` on old 32-bit ARM systems.
//!
//! Images that cannot be described (no name, no mapping, unreadable header)
//! are skipped silently.

pub mod linker;
pub mod strategy;

use std::any::Any;
use std::ffi::{c_void, CStr};
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace};

use crate::config::{LINKER_PATHNAME, PROC_SELF_MAPS};
use crate::error::{DlError, Result};
use crate::formats::elf::headers::parse_native_header;
use crate::formats::elf::segments::{min_load_vaddr, SegmentTable};
use crate::formats::elf::{ElfClass, ElfData, ProgramHeader, ELF_MAGIC};
use crate::maps::MapsReader;

use linker::LinkerLockGuard;
use strategy::{LockPolicy, Strategy};

/// One loaded image
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Difference between runtime and link-time addresses
    pub load_bias: usize,
    pub phdrs: Vec<ProgramHeader>,
    /// Absolute path, or a bracketed pseudo-path such as `[vdso]`
    pub name: String,
}

impl ImageInfo {
    /// Runtime address of the lowest loadable segment.
    pub fn base(&self) -> Option<usize> {
        min_load_vaddr(&self.phdrs).map(|vaddr| self.load_bias.wrapping_add(vaddr as usize))
    }
}

/// Per-call enumeration options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterateOptions {
    /// Make sure the dynamic linker itself is among the visited images.
    pub with_linker: bool,
}

/// Visit every loaded image until `visitor` breaks.
pub fn iterate<F>(options: IterateOptions, mut visitor: F) -> Result<()>
where
    F: FnMut(&ImageInfo) -> ControlFlow<()>,
{
    let strategy = Strategy::current(options.with_linker);
    trace!(?strategy, "Iterating loaded images");

    match strategy {
        Strategy::MapsScan => iterate_maps(&mut visitor),
        Strategy::Native {
            lock,
            synthesize_linker,
        } => iterate_native(&mut visitor, lock, synthesize_linker),
    }
}

type Visitor<'a> = dyn FnMut(&ImageInfo) -> ControlFlow<()> + 'a;

struct NativeContext<'a, 'v> {
    visitor: &'a mut Visitor<'v>,
    maps: MapsReader,
    panic: Option<Box<dyn Any + Send>>,
}

fn iterate_native(visitor: &mut Visitor<'_>, lock: LockPolicy, synthesize_linker: bool) -> Result<()> {
    let mut maps = MapsReader::new();

    // Older linkers do not report themselves to dl_iterate_phdr.
    if synthesize_linker {
        let linker = linker::find_linker_base(&mut maps)
            .and_then(|base| image_at(base, LINKER_PATHNAME.to_string()));
        if let Some(image) = linker {
            debug!(base = format_args!("{:#x}", image.base().unwrap_or(0)), "Synthesized linker image");
            if visitor(&image).is_break() {
                return Ok(());
            }
        }
    }

    let mutex = match lock {
        LockPolicy::LinkerMutex => linker::linker_mutex(),
        LockPolicy::None => None,
    };

    let mut ctx = NativeContext {
        visitor,
        maps,
        panic: None,
    };
    {
        // SAFETY: the mutex lives in the linker's data segment for the life of
        // the process.
        let _guard = mutex.map(|mutex| unsafe { LinkerLockGuard::lock(mutex) });
        // SAFETY: `ctx` outlives the call and is only touched by the callback.
        unsafe {
            libc::dl_iterate_phdr(
                Some(native_callback),
                &mut ctx as *mut NativeContext<'_, '_> as *mut c_void,
            );
        }
    }

    if let Some(payload) = ctx.panic {
        panic::resume_unwind(payload);
    }
    Ok(())
}

unsafe extern "C" fn native_callback(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut c_void,
) -> libc::c_int {
    let ctx = &mut *(data as *mut NativeContext<'_, '_>);
    let Some(image) = native_image(&*info, &mut ctx.maps) else {
        return 0;
    };

    // Unwinding through the C frames of dl_iterate_phdr is not allowed.
    match panic::catch_unwind(AssertUnwindSafe(|| (ctx.visitor)(&image))) {
        Ok(ControlFlow::Continue(())) => 0,
        Ok(ControlFlow::Break(())) => 1,
        Err(payload) => {
            ctx.panic = Some(payload);
            1
        }
    }
}

/// Describe one `dl_iterate_phdr` entry, resolving its path through the
/// memory map when the loader reports a bare name.
unsafe fn native_image(info: &libc::dl_phdr_info, maps: &mut MapsReader) -> Option<ImageInfo> {
    if info.dlpi_name.is_null() || *info.dlpi_name == 0 {
        return None;
    }
    let reported = CStr::from_ptr(info.dlpi_name).to_string_lossy();

    let phdrs = if info.dlpi_phdr.is_null() || info.dlpi_phnum == 0 {
        Vec::new()
    } else {
        let entsize = ElfClass::NATIVE.phdr_size();
        let count = info.dlpi_phnum as usize;
        let table = std::slice::from_raw_parts(info.dlpi_phdr as *const u8, count * entsize);
        SegmentTable::parse_table(table, count, entsize, ElfClass::NATIVE, ElfData::NATIVE)
            .ok()?
            .headers()
            .to_vec()
    };

    let mut image = ImageInfo {
        load_bias: info.dlpi_addr as usize,
        phdrs,
        name: reported.into_owned(),
    };

    if !image.name.starts_with('/') && !image.name.starts_with('[') {
        let resolved = image.base().and_then(|base| maps.pathname_for(base));
        match resolved {
            Some(path) => {
                trace!(reported = %image.name, path = %path, "Resolved image path from maps");
                image.name = path;
            }
            None => {
                trace!(reported = %image.name, "No mapping for image, skipping");
                return None;
            }
        }
    }

    Some(image)
}

fn iterate_maps(visitor: &mut Visitor<'_>) -> Result<()> {
    let mut maps = MapsReader::new();
    let entries = maps
        .entries()
        .map_err(|e| DlError::Enumeration(format!("{}: {}", PROC_SELF_MAPS, e)))?;

    for entry in entries {
        if !entry.is_private_text() || entry.offset != 0 {
            continue;
        }
        // SAFETY: the mapping is readable and at least one page long.
        if !unsafe { has_elf_magic(entry.start) } {
            continue;
        }
        let Some(path) = entry.pathname else {
            break;
        };
        let Some(image) = image_at(entry.start, path) else {
            continue;
        };
        if visitor(&image).is_break() {
            break;
        }
    }
    Ok(())
}

/// Whether the bytes at `addr` are an ELF magic number.
///
/// # Safety
///
/// `addr` must be the start of at least four readable bytes.
pub(crate) unsafe fn has_elf_magic(addr: usize) -> bool {
    std::slice::from_raw_parts(addr as *const u8, ELF_MAGIC.len()) == ELF_MAGIC
}

/// Describe the image whose ELF header is mapped at `base`, the start of a
/// readable mapping that begins with an ELF magic number.
fn image_at(base: usize, name: String) -> Option<ImageInfo> {
    let class = ElfClass::NATIVE;
    // SAFETY: a mapping starting with the magic holds a full ELF header
    // within its first page.
    let header_bytes = unsafe { std::slice::from_raw_parts(base as *const u8, class.header_size()) };
    let header = parse_native_header(header_bytes).ok()?;

    let count = header.e_phnum as usize;
    let entsize = header.e_phentsize as usize;
    if count == 0 {
        return None;
    }
    // SAFETY: loaded images keep their program headers mapped next to the
    // ELF header.
    let table = unsafe {
        std::slice::from_raw_parts(
            (base as *const u8).add(header.e_phoff as usize),
            count * entsize,
        )
    };
    let phdrs = SegmentTable::parse_table(table, count, entsize, class, ElfData::NATIVE)
        .ok()?
        .headers()
        .to_vec();

    let min_vaddr = min_load_vaddr(&phdrs)?;
    Some(ImageInfo {
        load_bias: base.wrapping_sub(min_vaddr as usize),
        phdrs,
        name,
    })
}
