use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use anyhow::{Context, Result};

use crate::maps::MemoryRegion;

pub const ENTRY_SIZE: usize = 8;

// Flag bits (present, swapped, file/shm, uffd, exclusive, soft-dirty)
// occupy the top nine bits of an entry; the rest encodes the PFN.
// See Documentation/vm/pagemap.txt.
const PFN_MASK: u64 = !(0x1ff << 55);

/// Physical frame number encoded in a raw translation entry. Unmapped
/// pages return a null PFN.
pub fn entry_pfn(entry: u64) -> u64 {
    entry & PFN_MASK
}

/// Handle on a process's virtual-to-physical translation table, opened
/// once per run and seeked per region.
pub struct Pagemap {
    file: File,
}

impl Pagemap {
    pub fn open(pid: i32) -> io::Result<Pagemap> {
        File::open(format!("/proc/{pid}/pagemap")).map(Pagemap::from_file)
    }

    pub fn from_file(file: File) -> Pagemap {
        Pagemap { file }
    }

    /// Bulk-reads the translation entries covering `region`: one seek and
    /// one read for the whole range. Fetching entries page by page is what
    /// makes the naive approach take minutes on a large process.
    ///
    /// A short read yields only the entries actually returned; callers
    /// walk what they got.
    pub fn read_region(&mut self, region: &MemoryRegion, page_size: u64) -> Result<Vec<u64>> {
        let pages = region.page_count(page_size) as usize;
        let offset = region.start / page_size * ENTRY_SIZE as u64;

        self.file
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek pagemap to {offset:#x}"))?;

        let mut buf = vec![0u8; pages * ENTRY_SIZE];
        let len = self.file.read(&mut buf).context("read pagemap")?;
        buf.truncate(len - len % ENTRY_SIZE);

        Ok(buf
            .chunks_exact(ENTRY_SIZE)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect())
    }
}
