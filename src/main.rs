use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use wss_sampler::error::Error;
use wss_sampler::idlemap::DEFAULT_SNAPSHOT_BYTES;
use wss_sampler::sampler::Sampler;

/// Estimate the working set size of a process via idle page tracking.
///
/// Requires Linux 4.3+ with CONFIG_IDLE_PAGE_TRACKING and enough
/// privilege to write the system idle bitmap.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Process ID to watch
    pid: i32,

    /// Measurement duration in seconds (minimum 0.01)
    duration: f64,

    /// Base directory for per-region access logs
    #[arg(long, default_value = "/tmp/wss")]
    log_dir: PathBuf,

    /// Upper bound on the idle bitmap snapshot, in bytes
    #[arg(long, default_value_t = DEFAULT_SNAPSHOT_BYTES)]
    snapshot_bytes: usize,

    /// Diagnostics (-v timing and page counts, -vv per-page trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn page_size() -> u64 {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        -1 => 4096,
        sz => sz as u64,
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            // help and version are not argument errors
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let sampler = match Sampler::new(
        args.pid,
        args.duration,
        page_size(),
        args.log_dir,
        args.snapshot_bytes,
    ) {
        Ok(sampler) => sampler,
        Err(err) => {
            eprintln!("{err}");
            process::exit(err.exit_code());
        }
    };

    println!(
        "Watching PID {} page references during {:.2} seconds...",
        args.pid, args.duration
    );

    match sampler.run() {
        Ok(report) => {
            println!("{:<7} {:>10}", "Est(s)", "Ref(MB)");
            println!("{:<7.3} {:>10.2}", report.estimate_secs, report.referenced_mb);
        }
        Err(err) => {
            eprintln!("{err:#}");
            let code = err.downcast_ref::<Error>().map_or(1, Error::exit_code);
            process::exit(code);
        }
    }
}
