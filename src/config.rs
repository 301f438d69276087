//! Well-known paths, properties, library names and symbol names.

/// Textual memory map of the current process.
pub const PROC_SELF_MAPS: &str = "/proc/self/maps";

/// Fallback source for the platform version on Android.
pub const BUILD_PROP: &str = "/system/build.prop";

/// System property holding the Android API level.
pub const SDK_PROPERTY: &str = "ro.build.version.sdk";

#[cfg(target_pointer_width = "64")]
pub const LINKER_PATHNAME: &str = "/system/bin/linker64";
#[cfg(target_pointer_width = "64")]
pub const LINKER_BASENAME: &str = "linker64";

#[cfg(target_pointer_width = "32")]
pub const LINKER_PATHNAME: &str = "/system/bin/linker";
#[cfg(target_pointer_width = "32")]
pub const LINKER_BASENAME: &str = "linker";

/// Library exporting the LZMA SDK xz decoder.
pub const LZMA_BASENAME: &str = "liblzma.so";

pub const CRC_GENERATE_TABLE: &str = "CrcGenerateTable";
pub const CRC64_GENERATE_TABLE: &str = "Crc64GenerateTable";
pub const XZ_UNPACKER_CONSTRUCT: &str = "XzUnpacker_Construct";
pub const XZ_UNPACKER_IS_STREAM_WAS_FINISHED: &str = "XzUnpacker_IsStreamWasFinished";
pub const XZ_UNPACKER_FREE: &str = "XzUnpacker_Free";
pub const XZ_UNPACKER_CODE: &str = "XzUnpacker_Code";

/// The dynamic linker's global lock, as named in its full symbol table.
pub const LINKER_MUTEX_SYMBOL: &str = "__dl__ZL10g_dl_mutex";

pub const SYMTAB_SECTION: &str = ".symtab";
pub const DEBUGDATA_SECTION: &str = ".gnu_debugdata";

/// Environment variable read for the log filter before `RUST_LOG`.
pub const LOG_ENV: &str = "PROCSYM_LOG";
