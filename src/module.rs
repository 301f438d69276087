//! Handles on loaded modules and symbol resolution
//!
//! A [`Module`] is opened by path or basename against the images currently
//! loaded into the process. Depending on [`ModuleFlags`] it carries:
//!
//! - an exported view: the dynamic symbol table, its string table and the
//!   `.gnu.hash`/`.hash` tables, read in place from loader-owned memory;
//! - a full view: the `.symtab` of the file on disk (memory-mapped), or of the
//!   image embedded compressed in its `.gnu_debugdata` section.
//!
//! Opening is all or nothing: when any requested view fails to load the
//! handle is not created. Every resolved address is `load_bias + st_value`.

use std::fs::File;
use std::ops::{ControlFlow, Range};

use bitflags::bitflags;
use memmap2::Mmap;
use tracing::{debug, trace};

use crate::config::LINKER_BASENAME;
use crate::error::{DlError, Result};
use crate::formats::elf::dynamic::DynamicInfo;
use crate::formats::elf::hash::{GnuHashTable, SysvHashTable};
use crate::formats::elf::segments::{dynamic_segment, load_segment_containing, load_vaddr_range};
use crate::formats::elf::symbols::{is_exported_definition, SymbolTable};
use crate::formats::elf::{
    self, ElfClass, ElfData, ElfIdent, ElfParser, FullTableSource, SectionHeader, Symbol,
    SymbolKind,
};
use crate::iterator::{self, ImageInfo, IterateOptions};

bitflags! {
    /// Symbol sources to load when opening a module
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModuleFlags: u32 {
        /// Dynamic symbols, found through the hash tables in memory
        const EXPORTED = 0b01;
        /// The full `.symtab`, read from disk
        const FULL_TABLE = 0b10;
        const ALL = Self::EXPORTED.bits() | Self::FULL_TABLE.bits();
    }
}

/// Decompressor for `.gnu_debugdata` contents.
pub trait Decompress {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// An opened module
pub struct Module {
    inner: Option<Inner>,
}

struct Inner {
    name: String,
    flags: ModuleFlags,
    load_bias: usize,
    base: usize,
    exported: Option<ExportedView>,
    full: Option<FullView>,
}

impl Module {
    /// Open the first loaded image matching `name`, decompressing embedded
    /// debug data with `decompressor` when the full table lives there.
    pub fn open_with(
        name: &str,
        flags: ModuleFlags,
        decompressor: Option<&dyn Decompress>,
    ) -> Option<Module> {
        match Self::try_open_with(name, flags, decompressor) {
            Ok(module) => Some(module),
            Err(err) => {
                debug!(module = name, ?flags, error = %err, "Module not opened");
                None
            }
        }
    }

    /// Like [`Module::open_with`], keeping the cause of failure.
    pub fn try_open_with(
        name: &str,
        flags: ModuleFlags,
        decompressor: Option<&dyn Decompress>,
    ) -> Result<Module> {
        let _span = crate::span_trace!("open", module = name).entered();
        if flags.is_empty() {
            return Err(DlError::NotFound(name.to_string()));
        }
        let image = find_image(name)?;
        Self::load(&image, flags, decompressor)
    }

    /// Build a handle for `image`, loading every view `flags` asks for.
    pub(crate) fn load(
        image: &ImageInfo,
        flags: ModuleFlags,
        decompressor: Option<&dyn Decompress>,
    ) -> Result<Module> {
        let base = image
            .base()
            .ok_or(DlError::MissingStructure("loadable segment"))?;

        let exported = if flags.contains(ModuleFlags::EXPORTED) {
            // SAFETY: `image` describes an image currently mapped by the
            // loader.
            Some(unsafe { ExportedView::load(image)? })
        } else {
            None
        };
        let full = if flags.contains(ModuleFlags::FULL_TABLE) {
            Some(FullView::load(&image.name, decompressor)?)
        } else {
            None
        };

        debug!(
            module = %image.name,
            load_bias = format_args!("{:#x}", image.load_bias),
            ?flags,
            "Opened module"
        );
        Ok(Module {
            inner: Some(Inner {
                name: image.name.clone(),
                flags,
                load_bias: image.load_bias,
                base,
                exported,
                full,
            }),
        })
    }

    /// Release the file mapping and buffers. Later queries return `None`.
    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            trace!(module = %inner.name, "Closed module");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.as_ref().map(|inner| inner.name.as_str())
    }

    /// Flags the module was opened with; empty once closed.
    pub fn flags(&self) -> ModuleFlags {
        self.inner
            .as_ref()
            .map_or(ModuleFlags::empty(), |inner| inner.flags)
    }

    pub fn load_bias(&self) -> Option<usize> {
        self.inner.as_ref().map(|inner| inner.load_bias)
    }

    /// Runtime address of the lowest loadable segment.
    pub fn base(&self) -> Option<usize> {
        self.inner.as_ref().map(|inner| inner.base)
    }

    /// Address of a defined symbol from the dynamic symbol table.
    pub fn resolve_exported(&self, name: &str, kind: SymbolKind) -> Option<usize> {
        let inner = self.inner.as_ref()?;
        let sym = inner.exported.as_ref()?.lookup(name, kind)?;
        is_exported_definition(&sym).then(|| inner.address_of(&sym))
    }

    /// Address of a defined symbol from the full symbol table.
    pub fn resolve_full(&self, name: &str, kind: SymbolKind) -> Option<usize> {
        let inner = self.inner.as_ref()?;
        let full = inner.full.as_ref()?;
        let sym = full.table()?.find_linear(name, kind)?;
        Some(inner.address_of(&sym))
    }

    pub fn exported_function(&self, name: &str) -> Option<usize> {
        self.resolve_exported(name, SymbolKind::Function)
    }

    pub fn exported_object(&self, name: &str) -> Option<usize> {
        self.resolve_exported(name, SymbolKind::Object)
    }

    pub fn full_function(&self, name: &str) -> Option<usize> {
        self.resolve_full(name, SymbolKind::Function)
    }

    pub fn full_object(&self, name: &str) -> Option<usize> {
        self.resolve_full(name, SymbolKind::Object)
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name())
            .field("flags", &self.flags())
            .field("load_bias", &self.load_bias())
            .finish()
    }
}

impl Inner {
    fn address_of(&self, sym: &Symbol) -> usize {
        self.load_bias.wrapping_add(sym.st_value as usize)
    }
}

/// The first loaded image whose name matches `name`.
pub(crate) fn find_image(name: &str) -> Result<ImageInfo> {
    if name.is_empty() {
        return Err(DlError::NotFound(String::new()));
    }
    let options = IterateOptions {
        with_linker: name.ends_with(LINKER_BASENAME),
    };
    let mut found = None;
    iterator::iterate(options, |image| {
        if image.load_bias == 0 || !name_matches(&image.name, name) {
            return ControlFlow::Continue(());
        }
        found = Some(image.clone());
        ControlFlow::Break(())
    })?;
    found.ok_or_else(|| DlError::NotFound(name.to_string()))
}

/// Absolute paths and bracketed pseudo-paths must match exactly; anything
/// else is a basename that must follow a `/`.
pub fn name_matches(image_name: &str, wanted: &str) -> bool {
    if wanted.starts_with('/') || wanted.starts_with('[') {
        return image_name == wanted;
    }
    image_name.len() > wanted.len()
        && image_name.ends_with(wanted)
        && image_name.as_bytes()[image_name.len() - wanted.len() - 1] == b'/'
}

/// Dynamic symbol lookup over loader-owned memory
struct ExportedView {
    symbols: SymbolTable<'static>,
    gnu: Option<GnuHashTable<'static>>,
    sysv: Option<SysvHashTable<'static>>,
}

impl ExportedView {
    /// # Safety
    ///
    /// `image` must describe an image that is mapped for as long as the view
    /// exists, with a dynamic segment that is intact.
    unsafe fn load(image: &ImageInfo) -> Result<Self> {
        let class = ElfClass::NATIVE;
        let endian = ElfData::NATIVE;

        let dynamic =
            dynamic_segment(&image.phdrs).ok_or(DlError::MissingStructure("dynamic segment"))?;
        let entries = loaded_bytes(
            image.load_bias.wrapping_add(dynamic.p_vaddr as usize),
            dynamic.p_memsz as usize,
        )?;
        let info = DynamicInfo::parse(entries, class, endian)?;

        let range = runtime_range(image);
        let locate = |value: Option<u64>, what: &'static str| -> Result<usize> {
            let value = value.ok_or(DlError::MissingStructure(what))? as usize;
            Ok(relocated(value, image.load_bias, &range))
        };

        let symtab = locate(info.symtab, "DT_SYMTAB")?;
        let strtab = locate(info.strtab, "DT_STRTAB")?;
        let strsz = info.strsz.ok_or(DlError::MissingStructure("DT_STRSZ"))? as usize;
        if info.has_no_hash_table() {
            return Err(DlError::MissingStructure("hash table"));
        }

        let sysv = match info.hash {
            Some(_) => Some(sysv_view(locate(info.hash, "DT_HASH")?)?),
            None => None,
        };
        let gnu = match info.gnu_hash {
            Some(_) => Some(gnu_view(image, locate(info.gnu_hash, "DT_GNU_HASH")?)?),
            None => None,
        };

        let count = sysv
            .map(|table| table.symbol_count())
            .into_iter()
            .chain(gnu.and_then(|table| table.symbol_count()))
            .max()
            .unwrap_or(0);
        let entry_size = info.syment.map_or(class.sym_size(), |size| size as usize);

        let symbols = SymbolTable::new(
            loaded_bytes(symtab, count.saturating_mul(entry_size))?,
            loaded_bytes(strtab, strsz)?,
            entry_size,
            class,
            endian,
        )?;
        trace!(
            symbols = count,
            gnu = gnu.is_some(),
            sysv = sysv.is_some(),
            "Loaded dynamic symbol view"
        );

        Ok(Self { symbols, gnu, sysv })
    }

    /// `.gnu.hash` first, since its bloom filter rejects most misses early.
    fn lookup(&self, name: &str, kind: SymbolKind) -> Option<Symbol> {
        self.gnu
            .and_then(|table| table.lookup(&self.symbols, name, kind))
            .or_else(|| {
                self.sysv
                    .and_then(|table| table.lookup(&self.symbols, name, kind))
            })
    }
}

/// Runtime address range covered by the image's loadable segments.
fn runtime_range(image: &ImageInfo) -> Range<usize> {
    let range = load_vaddr_range(&image.phdrs).unwrap_or(0..0);
    image.load_bias.wrapping_add(range.start as usize)
        ..image.load_bias.wrapping_add(range.end as usize)
}

/// glibc rewrites pointer-valued dynamic entries to runtime addresses while
/// bionic leaves link-time addresses in place. A value already inside the
/// image's runtime range is taken as relocated.
fn relocated(value: usize, load_bias: usize, range: &Range<usize>) -> usize {
    if range.contains(&value) {
        value
    } else {
        load_bias.wrapping_add(value)
    }
}

/// Borrow `len` bytes of loaded memory at `addr`.
///
/// # Safety
///
/// The range must be mapped readable for the rest of the process's use of
/// the returned slice.
unsafe fn loaded_bytes(addr: usize, len: usize) -> Result<&'static [u8]> {
    if addr == 0 || addr.checked_add(len).is_none() {
        return Err(DlError::MalformedImage(elf::ElfError::InvalidOffset { offset: addr }));
    }
    Ok(std::slice::from_raw_parts(addr as *const u8, len))
}

unsafe fn sysv_view(addr: usize) -> Result<SysvHashTable<'static>> {
    let header = loaded_bytes(addr, SysvHashTable::HEADER_SIZE)?;
    let len = SysvHashTable::byte_len(header, ElfData::NATIVE)?;
    Ok(SysvHashTable::parse(loaded_bytes(addr, len)?, ElfData::NATIVE)?)
}

/// The chain array's length is not stored anywhere; it ends at the
/// terminator of the chain of the highest bucket. The walk stays inside the
/// loadable segment holding the table.
unsafe fn gnu_view(image: &ImageInfo, addr: usize) -> Result<GnuHashTable<'static>> {
    let class = ElfClass::NATIVE;
    let endian = ElfData::NATIVE;

    let vaddr = addr.wrapping_sub(image.load_bias) as u64;
    let segment = load_segment_containing(&image.phdrs, vaddr)
        .ok_or(DlError::MalformedImage(elf::ElfError::InvalidOffset { offset: addr }))?;
    let available = (segment.p_memsz - (vaddr - segment.p_vaddr)) as usize;

    let data = loaded_bytes(addr, available)?;
    let fixed = GnuHashTable::fixed_len(data, class, endian)?;
    let table = GnuHashTable::parse(data, class, endian)?;
    let count = table.symbol_count().ok_or_else(|| {
        DlError::MalformedImage(elf::ElfError::MalformedHeader(
            "gnu hash chain runs past its segment".to_string(),
        ))
    })?;
    let chain_len = count.saturating_sub(table.symoffset() as usize);

    Ok(GnuHashTable::parse(
        &data[..fixed + chain_len * 4],
        class,
        endian,
    )?)
}

/// Memory holding the full symbol table
enum Backing {
    Mapped {
        map: Mmap,
        _file: File,
    },
    /// Image decompressed out of `.gnu_debugdata`
    Decompressed(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped { map, .. } => &map[..],
            Backing::Decompressed(buffer) => buffer.as_slice(),
        }
    }
}

/// `.symtab` and `.strtab` inside their backing memory
struct FullView {
    backing: Backing,
    ident: ElfIdent,
    symtab: SectionHeader,
    strtab: SectionHeader,
}

impl FullView {
    fn load(path: &str, decompressor: Option<&dyn Decompress>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is private and read-only; the file is a loaded
        // library, which the loader expects to stay unmodified.
        let map = unsafe { Mmap::map(&file)? };
        let parser = ElfParser::parse(&map)?;

        match parser.full_table(true)? {
            Some(FullTableSource::Symtab { symtab, strtab }) => {
                parser.symbol_table(&symtab, &strtab)?;
                let ident = parser.header().ident;
                trace!(path, "Full symbol table from file");
                Ok(Self {
                    backing: Backing::Mapped { map, _file: file },
                    ident,
                    symtab,
                    strtab,
                })
            }
            Some(FullTableSource::DebugData(section)) => {
                let decompressor =
                    decompressor.ok_or(DlError::MissingStructure("decompressor"))?;
                let buffer = decompressor.decompress(parser.section_data(&section)?)?;
                trace!(
                    path,
                    compressed = section.sh_size,
                    decompressed = buffer.len(),
                    "Full symbol table from .gnu_debugdata"
                );
                Self::from_embedded(buffer)
            }
            None => Err(DlError::MissingStructure(".symtab")),
        }
    }

    /// View over a decompressed embedded image. Its own `.gnu_debugdata`, if
    /// any, is not followed.
    fn from_embedded(buffer: Vec<u8>) -> Result<Self> {
        let parser = ElfParser::parse(&buffer)?;
        let Some(FullTableSource::Symtab { symtab, strtab }) = parser.full_table(false)? else {
            return Err(DlError::MissingStructure(".symtab in .gnu_debugdata"));
        };
        parser.symbol_table(&symtab, &strtab)?;
        let ident = parser.header().ident;

        Ok(Self {
            backing: Backing::Decompressed(buffer),
            ident,
            symtab,
            strtab,
        })
    }

    fn table(&self) -> Option<SymbolTable<'_>> {
        elf::symbol_table(self.backing.bytes(), self.ident, &self.symtab, &self.strtab).ok()
    }
}
