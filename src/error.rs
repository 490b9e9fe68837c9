use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole sampling run.
///
/// Per-region trouble (a failed translation read, an unwritable log file)
/// is not represented here; those are reported and the region skipped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("interval too short (minimum 0.01s)")]
    IntervalTooShort,

    #[error("can't open {path}: {source}")]
    KernelInterface {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("idle bitmap exceeds the {limit} byte snapshot bound; raise --snapshot-bytes")]
    SnapshotOverflow { limit: usize },

    /// The page map handed back a PFN the idle snapshot does not cover.
    /// The two views of physical memory no longer agree, so every count
    /// taken so far is suspect.
    #[error("bad PFN {pfn:#x} read from page map (snapshot covers {snapshot_len} bytes)")]
    BadPfn { pfn: u64, snapshot_len: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Exit status taxonomy: 2 when a kernel or process interface can't be
    /// opened (missing privilege or kernel support), 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::KernelInterface { .. } => 2,
            _ => 1,
        }
    }
}
