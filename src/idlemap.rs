use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use log::debug;

use crate::error::Error;

pub const IDLEMAP_PATH: &str = "/sys/kernel/mm/page_idle/bitmap";

// Large writes are accepted when setting the bitmap, but reads larger
// than one word are not, hence the asymmetric buffer sizes.
const SET_BUF_SIZE: usize = 4096;
const READ_CHUNK_SIZE: usize = 8;

/// Default snapshot bound, enough to span roughly 640 GiB of physical
/// memory at one bit per 4 KiB frame.
pub const DEFAULT_SNAPSHOT_BYTES: usize = 20 * 1024 * 1024;

/// Marks every physical page in the system idle by streaming all-ones
/// into the kernel bitmap. Only user memory bits are set; kernel pages
/// are silently ignored.
pub fn set_idlemap() -> Result<(), Error> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(IDLEMAP_PATH)
        .map_err(|source| Error::KernelInterface {
            path: IDLEMAP_PATH.into(),
            source,
        })?;

    let buf = [0xffu8; SET_BUF_SIZE];
    // The kernel accepts writes until the offset passes the last frame,
    // then reports an error. Either return ends the stream.
    loop {
        match file.write(&buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    Ok(())
}

/// In-memory snapshot of the system idle bitmap: one bit per PFN, packed
/// into native-endian 64-bit words as the kernel exposes them. Immutable
/// once read; bit queries are just loads against the captured buffer.
pub struct IdleMap {
    words: Vec<u64>,
    len: usize,
}

impl IdleMap {
    /// Snapshots the kernel bitmap. Operating on idle bits one syscall at
    /// a time can take minutes on a large process, so the whole bitmap is
    /// captured up front and queried from memory.
    pub fn snapshot(max_bytes: usize) -> Result<IdleMap, Error> {
        let file = File::open(IDLEMAP_PATH).map_err(|source| Error::KernelInterface {
            path: IDLEMAP_PATH.into(),
            source,
        })?;
        let map = IdleMap::read_from(file, max_bytes)?;
        debug!("idle map snapshot: {} bytes", map.len());
        Ok(map)
    }

    /// Reads packed idle words until EOF, tracking bytes actually read as
    /// the snapshot's valid size. A system whose bitmap exceeds
    /// `max_bytes` is an explicit error rather than a silent truncation.
    pub fn read_from<R: Read>(mut src: R, max_bytes: usize) -> Result<IdleMap, Error> {
        let mut words = Vec::with_capacity(max_bytes / READ_CHUNK_SIZE);
        let mut len = 0usize;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = src.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if len + n > max_bytes {
                return Err(Error::SnapshotOverflow { limit: max_bytes });
            }
            // a short final read leaves the tail of the word zeroed
            chunk[n..].fill(0);
            words.push(u64::from_ne_bytes(chunk));
            len += n;
        }
        Ok(IdleMap { words, len })
    }

    /// Bytes of bitmap actually captured.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tests the idle bit for a physical frame: set means untouched since
    /// the last mark, clear means referenced. A PFN past the end of the
    /// snapshot means the page map and the snapshot disagree about
    /// physical memory, which poisons the whole run.
    pub fn is_idle(&self, pfn: u64) -> Result<bool, Error> {
        if (pfn / 8) as usize + 1 > self.len {
            return Err(Error::BadPfn {
                pfn,
                snapshot_len: self.len,
            });
        }
        let word = self.words[(pfn / 64) as usize];
        Ok(word & (1 << (pfn % 64)) != 0)
    }
}
