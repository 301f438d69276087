//! Choice of enumeration strategy from platform facts

use crate::platform::{api_level, ApiLevel};

/// Lock taken around native enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPolicy {
    None,
    /// The dynamic linker's own global mutex, on levels whose
    /// `dl_iterate_phdr` races with concurrent loads.
    LinkerMutex,
}

impl LockPolicy {
    pub fn for_level(level: ApiLevel) -> Self {
        if level == ApiLevel::L || level == ApiLevel::L_MR1 {
            LockPolicy::LinkerMutex
        } else {
            LockPolicy::None
        }
    }
}

/// How loaded images are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Scan the memory map for `r-xp` mappings at offset 0 that start with an
    /// ELF header.
    MapsScan,
    /// `dl_iterate_phdr`, optionally under the linker mutex, optionally
    /// preceded by a descriptor for the linker built from the memory map.
    Native {
        lock: LockPolicy,
        synthesize_linker: bool,
    },
}

impl Strategy {
    pub fn select(level: ApiLevel, is_arm32: bool, with_linker: bool) -> Self {
        if is_arm32 && level < ApiLevel::L {
            return Strategy::MapsScan;
        }
        Strategy::Native {
            lock: LockPolicy::for_level(level),
            synthesize_linker: with_linker && level < ApiLevel::O_MR1,
        }
    }

    /// Strategy for this process.
    pub fn current(with_linker: bool) -> Self {
        Self::select(api_level(), cfg!(target_arch = "arm"), with_linker)
    }
}
