//! Symbol hash tables (.hash and .gnu.hash)
//!
//! Both tables are decoded from byte views with bounds checks on every word,
//! following the on-disk layouts:
//!
//! ```text
//! .hash      nbucket nchain bucket[nbucket] chain[nchain]
//! .gnu.hash  nbuckets symoffset bloom_size bloom_shift
//!            bloom[bloom_size] (address-sized) buckets[nbuckets] chain[]
//! ```

use crate::formats::elf::symbols::SymbolTable;
use crate::formats::elf::types::*;
use crate::formats::elf::utils::{read_addr, EndianRead};

/// SysV ELF hash.
pub fn sysv_hash(name: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &c in name {
        h = (h << 4).wrapping_add(c as u32);
        let g = h & 0xf000_0000;
        h ^= g;
        h ^= g >> 24;
    }
    h
}

/// GNU hash (djb2, h * 33 + c).
pub fn gnu_hash(name: &[u8]) -> u32 {
    name.iter().fold(5381u32, |h, &c| {
        h.wrapping_add(h << 5).wrapping_add(c as u32)
    })
}

fn word(data: &[u8], index: usize, endian: ElfData) -> Option<u32> {
    data.read_u32(index.checked_mul(4)?, endian).ok()
}

/// Classic SysV hash table
#[derive(Debug, Clone, Copy)]
pub struct SysvHashTable<'a> {
    nbucket: u32,
    nchain: u32,
    buckets: &'a [u8],
    chains: &'a [u8],
    endian: ElfData,
}

impl<'a> SysvHashTable<'a> {
    pub const HEADER_SIZE: usize = 8;

    /// Total byte length of a table whose header is at the start of `data`.
    pub fn byte_len(header: &[u8], endian: ElfData) -> Result<usize> {
        let nbucket = header.read_u32(0, endian)? as usize;
        let nchain = header.read_u32(4, endian)? as usize;
        nbucket
            .checked_add(nchain)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(Self::HEADER_SIZE))
            .ok_or_else(|| ElfError::MalformedHeader("hash table size overflows".to_string()))
    }

    pub fn parse(data: &'a [u8], endian: ElfData) -> Result<Self> {
        let nbucket = data.read_u32(0, endian)?;
        let nchain = data.read_u32(4, endian)?;
        let needed = Self::byte_len(data, endian)?;
        if data.len() < needed {
            return Err(ElfError::Truncated {
                offset: 0,
                needed,
            });
        }
        if nbucket == 0 {
            return Err(ElfError::MalformedHeader("hash table has no buckets".to_string()));
        }

        let chains_at = Self::HEADER_SIZE + nbucket as usize * 4;
        Ok(Self {
            nbucket,
            nchain,
            buckets: &data[Self::HEADER_SIZE..chains_at],
            chains: &data[chains_at..needed],
            endian,
        })
    }

    /// Number of entries in the symbol table this hash covers.
    pub fn symbol_count(&self) -> usize {
        self.nchain as usize
    }

    /// First symbol of `kind` named `name`, walking the bucket's chain.
    pub fn lookup(&self, symbols: &SymbolTable<'_>, name: &str, kind: SymbolKind) -> Option<Symbol> {
        let name = name.as_bytes();
        let hash = sysv_hash(name);
        let mut index = word(self.buckets, (hash % self.nbucket) as usize, self.endian)?;

        // A well-formed chain visits each entry at most once.
        for _ in 0..self.nchain {
            if index == 0 || index >= self.nchain {
                break;
            }
            let sym = symbols.by_index(index as usize)?;
            if kind.matches(&sym) && symbols.name_is(&sym, name) {
                return Some(sym);
            }
            index = word(self.chains, index as usize, self.endian)?;
        }

        None
    }
}

/// GNU hash table with its bloom filter
#[derive(Debug, Clone, Copy)]
pub struct GnuHashTable<'a> {
    nbuckets: u32,
    symoffset: u32,
    bloom_size: u32,
    bloom_shift: u32,
    bloom: &'a [u8],
    buckets: &'a [u8],
    chains: &'a [u8],
    class: ElfClass,
    endian: ElfData,
}

impl<'a> GnuHashTable<'a> {
    pub const HEADER_SIZE: usize = 16;

    /// Byte length of the header, bloom filter and buckets; the chain array
    /// follows and its length is only known by walking it.
    pub fn fixed_len(header: &[u8], class: ElfClass, endian: ElfData) -> Result<usize> {
        let nbuckets = header.read_u32(0, endian)? as usize;
        let bloom_size = header.read_u32(8, endian)? as usize;
        bloom_size
            .checked_mul(class.word_size())
            .and_then(|bloom| nbuckets.checked_mul(4).and_then(|b| b.checked_add(bloom)))
            .and_then(|n| n.checked_add(Self::HEADER_SIZE))
            .ok_or_else(|| ElfError::MalformedHeader("gnu hash size overflows".to_string()))
    }

    /// Decode a table. `data` must cover at least the fixed part; whatever
    /// follows is taken as the chain array.
    pub fn parse(data: &'a [u8], class: ElfClass, endian: ElfData) -> Result<Self> {
        let nbuckets = data.read_u32(0, endian)?;
        let symoffset = data.read_u32(4, endian)?;
        let bloom_size = data.read_u32(8, endian)?;
        let bloom_shift = data.read_u32(12, endian)?;
        let fixed = Self::fixed_len(data, class, endian)?;
        if data.len() < fixed {
            return Err(ElfError::Truncated {
                offset: 0,
                needed: fixed,
            });
        }
        if nbuckets == 0 || bloom_size == 0 {
            return Err(ElfError::MalformedHeader(
                "gnu hash has no buckets or bloom words".to_string(),
            ));
        }

        let buckets_at = Self::HEADER_SIZE + bloom_size as usize * class.word_size();
        Ok(Self {
            nbuckets,
            symoffset,
            bloom_size,
            bloom_shift,
            bloom: &data[Self::HEADER_SIZE..buckets_at],
            buckets: &data[buckets_at..fixed],
            chains: &data[fixed..],
            class,
            endian,
        })
    }

    pub fn symoffset(&self) -> u32 {
        self.symoffset
    }

    /// Largest symbol index any bucket starts at, if any bucket is non-empty.
    pub fn max_bucket(&self) -> Option<u32> {
        (0..self.nbuckets as usize)
            .filter_map(|i| word(self.buckets, i, self.endian))
            .filter(|&start| start >= self.symoffset)
            .max()
    }

    /// Number of dynamic symbols covered, found by walking the last chain to
    /// its terminator. `None` when the chain runs past the available bytes.
    pub fn symbol_count(&self) -> Option<usize> {
        let Some(mut index) = self.max_bucket() else {
            return Some(self.symoffset as usize);
        };
        loop {
            let hash = word(self.chains, (index - self.symoffset) as usize, self.endian)?;
            if hash & 1 != 0 {
                return Some(index as usize + 1);
            }
            index = index.checked_add(1)?;
        }
    }

    /// Bloom filter test. `false` proves the name is absent.
    pub fn may_contain(&self, hash: u32) -> bool {
        let bits = self.class.bits();
        let index = ((hash / bits) % self.bloom_size) as usize;
        let Ok(word) = read_addr(
            self.bloom,
            index * self.class.word_size(),
            self.class,
            self.endian,
        ) else {
            return false;
        };
        let mask = (1u64 << (hash % bits)) | (1u64 << ((hash >> self.bloom_shift) % bits));
        word & mask == mask
    }

    /// First symbol of `kind` named `name`.
    pub fn lookup(&self, symbols: &SymbolTable<'_>, name: &str, kind: SymbolKind) -> Option<Symbol> {
        let name = name.as_bytes();
        let hash = gnu_hash(name);

        if !self.may_contain(hash) {
            return None;
        }

        // Bucket entries below symoffset (typically STN_UNDEF) mean empty.
        let mut index = word(self.buckets, (hash % self.nbuckets) as usize, self.endian)?;
        if index < self.symoffset {
            return None;
        }

        loop {
            let chain_hash = word(self.chains, (index - self.symoffset) as usize, self.endian)?;
            if (hash | 1) == (chain_hash | 1) {
                let sym = symbols.by_index(index as usize)?;
                if kind.matches(&sym) && symbols.name_is(&sym, name) {
                    return Some(sym);
                }
            }
            // The low bit marks the last entry of a chain.
            if chain_hash & 1 != 0 {
                return None;
            }
            index = index.checked_add(1)?;
        }
    }
}
