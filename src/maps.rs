use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};

/// One `start-end` mapping parsed from the process's maps table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,
}

impl MemoryRegion {
    /// Pages spanned by the region, assuming uniform `page_size` pages.
    pub fn page_count(&self, page_size: u64) -> u64 {
        (self.end - self.start) / page_size
    }
}

/// Lazy, one-shot reader over `/proc/<pid>/maps`. Regions come out in
/// file order; lines that don't lead with a hex `start-end` pair are
/// skipped. The handle closes when the iterator is dropped.
pub struct Regions {
    lines: Lines<BufReader<File>>,
}

pub fn regions(pid: i32) -> io::Result<Regions> {
    let file = File::open(format!("/proc/{pid}/maps"))?;
    Ok(Regions {
        lines: BufReader::new(file).lines(),
    })
}

impl Iterator for Regions {
    type Item = io::Result<MemoryRegion>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if let Some(region) = parse_line(&line) {
                        return Some(Ok(region));
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

// Format: 00400000-0040b000 r-xp 00000000 08:01 123456 /path/to/file
// Only the address pair matters here.
fn parse_line(line: &str) -> Option<MemoryRegion> {
    let range = line.split_whitespace().next()?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    (end >= start).then_some(MemoryRegion { start, end })
}
