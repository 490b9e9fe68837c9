use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use log::{debug, info, warn};

use crate::classify::{self, Counters};
use crate::error::Error;
use crate::idlemap::{self, IdleMap};
use crate::logger::RunDir;
use crate::maps::{self, MemoryRegion};
use crate::pagemap::Pagemap;

/// Start of the kernel direct mapping on x86_64. Idle tracking covers
/// user memory only, so regions at or above this are not walked.
pub const PAGE_OFFSET: u64 = 0xffff_8800_0000_0000;

pub const MIN_DURATION_SECS: f64 = 0.01;

/// One measurement run: configuration plus everything the run mutates.
/// Building a second `Sampler` in the same process is fine; nothing here
/// is process-global. The system-wide idle bitmap is still shared with
/// any other instance of the tool, and concurrent marks corrupt both
/// measurements.
pub struct Sampler {
    pid: i32,
    duration: Duration,
    page_size: u64,
    log_base: PathBuf,
    snapshot_bytes: usize,
}

/// Figures reported once a run completes.
#[derive(Debug)]
pub struct Report {
    /// Estimated measurement window in seconds, overhead-adjusted.
    pub estimate_secs: f64,
    /// Megabytes referenced during the window.
    pub referenced_mb: f64,
    pub counters: Counters,
    pub log_dir: PathBuf,
}

/// Half of each bookkeeping overhead (marking idle, reading back) lands
/// inside the intended window and half outside; charging half of each
/// against the elapsed total centers the estimate on the true window.
/// The split is a modeling heuristic kept as-is.
fn adjust_estimate(total: Duration, set: Duration, read: Duration) -> Duration {
    total.saturating_sub(set / 2).saturating_sub(read / 2)
}

impl Sampler {
    pub fn new(
        pid: i32,
        duration_secs: f64,
        page_size: u64,
        log_base: PathBuf,
        snapshot_bytes: usize,
    ) -> Result<Sampler, Error> {
        if !duration_secs.is_finite() || duration_secs < MIN_DURATION_SECS {
            return Err(Error::IntervalTooShort);
        }
        Ok(Sampler {
            pid,
            duration: Duration::from_secs_f64(duration_secs),
            page_size,
            log_base,
            snapshot_bytes,
        })
    }

    /// Runs one full sample: mark idle, sleep, snapshot, walk, report.
    /// The sleep is a real wall-clock wait with no early-wake path.
    pub fn run(&self) -> Result<Report> {
        let epoch_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let run_dir = RunDir::create(&self.log_base, self.pid, epoch_secs)?;
        info!("logging dir: {}", run_dir.path().display());

        let t1 = Instant::now();
        idlemap::set_idlemap()?;
        let t2 = Instant::now();

        thread::sleep(self.duration);
        let t3 = Instant::now();

        let idlemap = IdleMap::snapshot(self.snapshot_bytes)?;
        let mut counters = Counters::default();
        self.walk(&run_dir, &idlemap, &mut counters)?;
        let t4 = Instant::now();

        let set = t2 - t1;
        let sleep = t3 - t2;
        let read = t4 - t3;
        let total = t4 - t1;
        let estimate = adjust_estimate(total, set, read);

        debug!("set time  : {:.3} s", set.as_secs_f64());
        debug!("sleep time: {:.3} s", sleep.as_secs_f64());
        debug!("read time : {:.3} s", read.as_secs_f64());
        debug!("dur time  : {:.3} s", total.as_secs_f64());
        debug!(
            "referenced: {} pages, {} Kbytes",
            counters.active_pages,
            counters.active_pages * self.page_size / 1024
        );
        debug!(
            "walked    : {} pages, {} Kbytes",
            counters.walked_pages,
            counters.walked_pages * self.page_size / 1024
        );

        Ok(Report {
            estimate_secs: estimate.as_secs_f64(),
            referenced_mb: (counters.active_pages * self.page_size) as f64 / (1024.0 * 1024.0),
            counters,
            log_dir: run_dir.path().to_path_buf(),
        })
    }

    /// Walks every user-space region, classifying and logging each page.
    /// A region that fails to read or log is skipped and the walk goes
    /// on; a consistency failure against the idle snapshot aborts the
    /// run, since every further count would be suspect.
    fn walk(&self, run_dir: &RunDir, idlemap: &IdleMap, counters: &mut Counters) -> Result<()> {
        let regions = maps::regions(self.pid).map_err(|source| Error::KernelInterface {
            path: format!("/proc/{}/maps", self.pid).into(),
            source,
        })?;
        let mut pagemap = Pagemap::open(self.pid).map_err(|source| Error::KernelInterface {
            path: format!("/proc/{}/pagemap", self.pid).into(),
            source,
        })?;

        for region in regions {
            let region = match region {
                Ok(region) => region,
                Err(err) => {
                    warn!("stopping region walk: {err}");
                    break;
                }
            };
            debug!("MAP {:x}-{:x}", region.start, region.end);
            if region.start > PAGE_OFFSET {
                continue;
            }
            if let Err(err) = self.walk_region(&region, run_dir, &mut pagemap, idlemap, counters) {
                if err.downcast_ref::<Error>().is_some() {
                    return Err(err);
                }
                warn!(
                    "skipping region {:x}-{:x}: {err:#}",
                    region.start, region.end
                );
            }
        }
        Ok(())
    }

    fn walk_region(
        &self,
        region: &MemoryRegion,
        run_dir: &RunDir,
        pagemap: &mut Pagemap,
        idlemap: &IdleMap,
        counters: &mut Counters,
    ) -> Result<()> {
        let entries = pagemap.read_region(region, self.page_size)?;
        let mut log = run_dir.region_log(region, region.page_count(self.page_size))?;
        for (index, &entry) in entries.iter().enumerate() {
            let status = classify::classify(entry, idlemap, counters)?;
            log.set(index as u64, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short_interval_is_rejected() {
        let err = Sampler::new(1, 0.001, 4096, "/tmp/wss".into(), 1024).err().unwrap();
        assert!(matches!(err, Error::IntervalTooShort));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn non_finite_interval_is_rejected() {
        assert!(Sampler::new(1, f64::NAN, 4096, "/tmp/wss".into(), 1024).is_err());
        assert!(Sampler::new(1, f64::INFINITY, 4096, "/tmp/wss".into(), 1024).is_err());
    }

    #[test]
    fn minimum_interval_is_accepted() {
        assert!(Sampler::new(1, 0.01, 4096, "/tmp/wss".into(), 1024).is_ok());
    }

    #[test]
    fn estimate_splits_overheads_in_half() {
        let estimate = adjust_estimate(
            Duration::from_millis(1200),
            Duration::from_millis(100),
            Duration::from_millis(300),
        );
        assert_eq!(estimate, Duration::from_millis(1000));
    }

    #[test]
    fn estimate_never_exceeds_elapsed_or_goes_negative() {
        let total = Duration::from_millis(500);
        let estimate = adjust_estimate(total, Duration::from_millis(100), Duration::from_millis(400));
        assert!(estimate <= total);

        // degenerate overheads still clamp at zero
        let clamped = adjust_estimate(
            Duration::from_millis(10),
            Duration::from_millis(40),
            Duration::from_millis(40),
        );
        assert_eq!(clamped, Duration::ZERO);
    }
}
