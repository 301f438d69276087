//! Byte-level builders for ELF fixtures used by unit tests.

use crate::formats::elf::hash::{gnu_hash, sysv_hash};
use crate::formats::elf::types::*;

/// String table under construction; offset 0 holds the empty string.
pub struct StringTable {
    bytes: Vec<u8>,
}

impl StringTable {
    pub fn new() -> Self {
        Self { bytes: vec![0] }
    }

    pub fn add(&mut self, s: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        offset
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// One Elf64_Sym, little endian.
pub fn sym64(name: u32, info: u8, shndx: u16, value: u64) -> Vec<u8> {
    let mut e = vec![0u8; 24];
    e[0..4].copy_from_slice(&name.to_le_bytes());
    e[4] = info;
    e[6..8].copy_from_slice(&shndx.to_le_bytes());
    e[8..16].copy_from_slice(&value.to_le_bytes());
    e[16..24].copy_from_slice(&8u64.to_le_bytes());
    e
}

/// A .hash table over `names`, indexed like the symbol table (index 0 is the
/// null symbol and is never chained).
pub fn sysv_hash_table(nbucket: u32, names: &[&str]) -> Vec<u8> {
    let nchain = names.len();
    let mut buckets = vec![0u32; nbucket as usize];
    let mut chains = vec![0u32; nchain];
    for (i, name) in names.iter().enumerate().skip(1) {
        let b = (sysv_hash(name.as_bytes()) % nbucket) as usize;
        chains[i] = buckets[b];
        buckets[b] = i as u32;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&nbucket.to_le_bytes());
    out.extend_from_slice(&(nchain as u32).to_le_bytes());
    for w in buckets.iter().chain(chains.iter()) {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

/// Order names the way .gnu.hash requires: grouped by bucket.
pub fn order_for_gnu_hash(names: &[&'static str], nbuckets: u32) -> Vec<&'static str> {
    let mut ordered = names.to_vec();
    ordered.sort_by_key(|n| gnu_hash(n.as_bytes()) % nbuckets);
    ordered
}

/// A 64-bit .gnu.hash table for `hashed`, the symbols from `symoffset` on,
/// already in bucket order.
pub fn gnu_hash_table(
    symoffset: u32,
    nbuckets: u32,
    bloom_size: u32,
    bloom_shift: u32,
    hashed: &[&str],
) -> Vec<u8> {
    let hashes: Vec<u32> = hashed.iter().map(|n| gnu_hash(n.as_bytes())).collect();

    let mut bloom = vec![0u64; bloom_size as usize];
    for &h in &hashes {
        let w = ((h / 64) % bloom_size) as usize;
        bloom[w] |= (1u64 << (h % 64)) | (1u64 << ((h >> bloom_shift) % 64));
    }

    let mut buckets = vec![0u32; nbuckets as usize];
    let mut chains = vec![0u32; hashes.len()];
    for (pos, &h) in hashes.iter().enumerate() {
        let b = (h % nbuckets) as usize;
        if buckets[b] == 0 {
            buckets[b] = symoffset + pos as u32;
        }
        let last_in_bucket = hashes
            .get(pos + 1)
            .map_or(true, |&next| next % nbuckets != h % nbuckets);
        chains[pos] = if last_in_bucket { h | 1 } else { h & !1 };
    }

    let mut out = Vec::new();
    for w in [nbuckets, symoffset, bloom_size, bloom_shift] {
        out.extend_from_slice(&w.to_le_bytes());
    }
    for w in &bloom {
        out.extend_from_slice(&w.to_le_bytes());
    }
    for w in buckets.iter().chain(chains.iter()) {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

struct PendingSection {
    name: String,
    sh_type: u32,
    data: Vec<u8>,
    link: u32,
    entsize: u64,
}

/// Assembles a 64-bit little-endian ELF file out of sections only.
pub struct ElfBuilder {
    sections: Vec<PendingSection>,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Add a section and return its index in the final header table.
    pub fn section(&mut self, name: &str, sh_type: u32, data: Vec<u8>, link: u32, entsize: u64) -> u32 {
        self.sections.push(PendingSection {
            name: name.to_string(),
            sh_type,
            data,
            link,
            entsize,
        });
        self.sections.len() as u32
    }

    /// Convenience: a .symtab/.strtab pair.
    pub fn symtab(&mut self, symtab: Vec<u8>, strtab: Vec<u8>) -> &mut Self {
        let strndx = self.sections.len() as u32 + 2;
        self.section(".symtab", SHT_SYMTAB, symtab, strndx, 24);
        self.section(".strtab", SHT_STRTAB, strtab, 0, 0);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut shstrtab = StringTable::new();
        let names: Vec<u32> = self.sections.iter().map(|s| shstrtab.add(&s.name)).collect();
        let shstrtab_name = shstrtab.add(".shstrtab");
        let shstrtab = shstrtab.into_bytes();

        let mut out = vec![0u8; 64];
        let mut placed = Vec::new();
        for s in &self.sections {
            while out.len() % 8 != 0 {
                out.push(0);
            }
            placed.push((out.len() as u64, s.data.len() as u64));
            out.extend_from_slice(&s.data);
        }
        let shstrtab_at = out.len() as u64;
        out.extend_from_slice(&shstrtab);
        while out.len() % 8 != 0 {
            out.push(0);
        }

        let shoff = out.len() as u64;
        let shnum = self.sections.len() as u16 + 2;
        out.extend_from_slice(&[0u8; 64]);
        for (i, s) in self.sections.iter().enumerate() {
            let (offset, size) = placed[i];
            out.extend(shdr64(names[i], s.sh_type, offset, size, s.link, s.entsize));
        }
        out.extend(shdr64(
            shstrtab_name,
            SHT_STRTAB,
            shstrtab_at,
            shstrtab.len() as u64,
            0,
            0,
        ));

        out[0..4].copy_from_slice(ELF_MAGIC);
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1;
        out[16] = 3; // ET_DYN
        out[40..48].copy_from_slice(&shoff.to_le_bytes());
        out[52] = 64;
        out[54] = 56;
        out[58] = 64;
        out[60..62].copy_from_slice(&shnum.to_le_bytes());
        out[62..64].copy_from_slice(&(shnum - 1).to_le_bytes());
        out
    }
}

fn shdr64(name: u32, sh_type: u32, offset: u64, size: u64, link: u32, entsize: u64) -> Vec<u8> {
    let mut e = vec![0u8; 64];
    e[0..4].copy_from_slice(&name.to_le_bytes());
    e[4..8].copy_from_slice(&sh_type.to_le_bytes());
    e[24..32].copy_from_slice(&offset.to_le_bytes());
    e[32..40].copy_from_slice(&size.to_le_bytes());
    e[40..44].copy_from_slice(&link.to_le_bytes());
    e[56..64].copy_from_slice(&entsize.to_le_bytes());
    e
}
