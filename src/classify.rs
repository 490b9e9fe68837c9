use log::trace;

use crate::error::Error;
use crate::idlemap::IdleMap;
use crate::pagemap;

/// Classification of one virtual page against the idle snapshot, two
/// bits of information per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageStatus {
    Unmapped = 0,
    Swapped = 1,
    Idle = 2,
    Accessed = 3,
}

impl PageStatus {
    pub const BITS: u32 = 2;

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> PageStatus {
        match bits & 0b11 {
            0 => PageStatus::Unmapped,
            1 => PageStatus::Swapped,
            2 => PageStatus::Idle,
            _ => PageStatus::Accessed,
        }
    }
}

/// Pages accounted over one run, owned by the run rather than the
/// process so runs are repeatable in-process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub active_pages: u64,
    pub walked_pages: u64,
}

/// Reconciles one translation entry with the idle snapshot.
///
/// A swapped-out page presents a null PFN by the time it reaches this
/// point, so it is reported Unmapped; the tool does not tell the two
/// apart, and `PageStatus::Swapped` is never produced here.
pub fn classify(
    entry: u64,
    idlemap: &IdleMap,
    counters: &mut Counters,
) -> Result<PageStatus, Error> {
    counters.walked_pages += 1;

    let pfn = pagemap::entry_pfn(entry);
    if pfn == 0 {
        return Ok(PageStatus::Unmapped);
    }

    let status = if idlemap.is_idle(pfn)? {
        PageStatus::Idle
    } else {
        counters.active_pages += 1;
        PageStatus::Accessed
    };
    trace!("R: p {entry:x} pfn {pfn:x} {status:?}");
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // Snapshot with the idle bits for `idle_pfns` set, one word long.
    fn idlemap_with(idle_pfns: &[u64]) -> IdleMap {
        let word: u64 = idle_pfns.iter().fold(0, |acc, pfn| acc | 1 << pfn);
        IdleMap::read_from(Cursor::new(word.to_ne_bytes().to_vec()), 1024).unwrap()
    }

    #[test]
    fn null_pfn_is_unmapped_regardless_of_bitmap() {
        let idlemap = idlemap_with(&[0, 1, 2, 3]);
        let mut counters = Counters::default();
        assert_eq!(
            classify(0, &idlemap, &mut counters).unwrap(),
            PageStatus::Unmapped
        );
        assert_eq!(counters.active_pages, 0);
        assert_eq!(counters.walked_pages, 1);
    }

    #[test]
    fn clear_bit_is_accessed_and_counted() {
        let idlemap = idlemap_with(&[]);
        let mut counters = Counters::default();
        assert_eq!(
            classify(5, &idlemap, &mut counters).unwrap(),
            PageStatus::Accessed
        );
        assert_eq!(counters.active_pages, 1);
        assert_eq!(counters.walked_pages, 1);
    }

    #[test]
    fn set_bit_is_idle_and_not_counted() {
        let idlemap = idlemap_with(&[5]);
        let mut counters = Counters::default();
        assert_eq!(
            classify(5, &idlemap, &mut counters).unwrap(),
            PageStatus::Idle
        );
        assert_eq!(counters.active_pages, 0);
        assert_eq!(counters.walked_pages, 1);
    }

    #[test]
    fn flag_bits_do_not_leak_into_the_pfn() {
        // entry with every flag bit set on top of PFN 5
        let entry = 5 | (0x1ffu64 << 55);
        let idlemap = idlemap_with(&[5]);
        let mut counters = Counters::default();
        assert_eq!(
            classify(entry, &idlemap, &mut counters).unwrap(),
            PageStatus::Idle
        );
    }

    #[test]
    fn pfn_outside_snapshot_aborts() {
        let idlemap = idlemap_with(&[]);
        let mut counters = Counters::default();
        assert!(classify(1 << 20, &idlemap, &mut counters).is_err());
    }

    #[test]
    fn status_bits_round_trip() {
        for status in [
            PageStatus::Unmapped,
            PageStatus::Swapped,
            PageStatus::Idle,
            PageStatus::Accessed,
        ] {
            assert_eq!(PageStatus::from_bits(status.bits()), status);
        }
    }

    #[test]
    fn three_page_region_scenario() {
        // pages: PFN 5 (referenced), unmapped, PFN 5 again
        let idlemap = idlemap_with(&[]);
        let mut counters = Counters::default();
        let statuses: Vec<PageStatus> = [5u64, 0, 5]
            .iter()
            .map(|&entry| classify(entry, &idlemap, &mut counters).unwrap())
            .collect();
        assert_eq!(
            statuses,
            [
                PageStatus::Accessed,
                PageStatus::Unmapped,
                PageStatus::Accessed
            ]
        );
        assert_eq!(counters.active_pages, 2);
        assert_eq!(counters.walked_pages, 3);
    }
}
