//! Reader for the process memory map (`/proc/self/maps`)
//!
//! Each line reads `start-end perms offset dev inode pathname`. The reader
//! opens the file on first use and rewinds it afterwards, so one enumeration
//! pass can scan the table several times through a single descriptor.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

use crate::config::PROC_SELF_MAPS;

/// One mapping line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapsEntry {
    pub start: usize,
    pub end: usize,
    pub perms: [u8; 4],
    pub offset: u64,
    /// Text from the first `/` to the end of the line, right-trimmed.
    pub pathname: Option<String>,
}

impl MapsEntry {
    /// Parse one line, or `None` when the leading fields are malformed. The
    /// pathname may hold any bytes; invalid UTF-8 in it is replaced.
    pub fn parse(line: impl AsRef<[u8]>) -> Option<Self> {
        let line = line.as_ref();
        let mut fields = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|field| !field.is_empty());
        let (start, end) = std::str::from_utf8(fields.next()?).ok()?.split_once('-')?;
        let perms: [u8; 4] = fields.next()?.try_into().ok()?;
        let offset = u64::from_str_radix(std::str::from_utf8(fields.next()?).ok()?, 16).ok()?;

        let pathname = memchr::memchr(b'/', line).map(|at| {
            let path = &line[at..];
            let len = path
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
                .map_or(0, |last| last + 1);
            String::from_utf8_lossy(&path[..len]).into_owned()
        });

        Some(Self {
            start: usize::from_str_radix(start, 16).ok()?,
            end: usize::from_str_radix(end, 16).ok()?,
            perms,
            offset,
            pathname,
        })
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }

    pub fn is_readable(&self) -> bool {
        self.perms[0] == b'r'
    }

    pub fn is_private(&self) -> bool {
        self.perms[3] == b'p'
    }

    /// `r-xp`, the mapping of a loaded image's text
    pub fn is_private_text(&self) -> bool {
        &self.perms == b"r-xp"
    }
}

/// Lazily opened, rewindable maps file.
pub struct MapsReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl Default for MapsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MapsReader {
    /// Reader over this process's memory map.
    pub fn new() -> Self {
        Self::with_path(PROC_SELF_MAPS)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader: None,
        }
    }

    /// Entries from the start of the table. Lines are read as bytes;
    /// unparsable ones are skipped and a read error ends the iteration.
    pub fn entries(&mut self) -> io::Result<impl Iterator<Item = MapsEntry> + '_> {
        let reader = match self.reader.take() {
            Some(mut reader) => {
                reader.rewind()?;
                reader
            }
            None => BufReader::new(File::open(&self.path)?),
        };
        Ok(self
            .reader
            .insert(reader)
            .split(b'\n')
            .map_while(|line| line.ok())
            .filter_map(|line| MapsEntry::parse(&line)))
    }

    /// Path of the readable mapping that contains `base`. Mappings are in
    /// address order, so the scan gives up at the first range above `base`.
    pub fn pathname_for(&mut self, base: usize) -> Option<String> {
        for entry in self.entries().ok()? {
            if base < entry.start {
                return None;
            }
            if base >= entry.end || !entry.is_readable() {
                continue;
            }
            return entry.pathname;
        }
        None
    }
}
