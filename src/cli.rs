//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains number
//! parsing, config resolution, and the execution logic for each subcommand.
//!
//! ## Number Syntax
//!
//! Range bounds accept plain integers and the usual prime-counting
//! shorthand: `1e10`, `2^32`, and sums or differences of those
//! (`1e12+1e9`, `2^64-1`). Arithmetic is carried out in 128 bits and the
//! result must fit in `u64`, otherwise `SieveError::StopOutOfRange`.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use segsieve::parallel::RangePartitioner;
use segsieve::progress::Progress;
use segsieve::{PrimeKind, PrimeStream, SegmentedSieve, SieveConfig, SieveError, Sink};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::Cli;

// ── Number Parsing ──────────────────────────────────────────────

fn parse_term(term: &str, input: &str) -> Result<u128> {
    let term = term.trim();
    let number = |s: &str| -> Result<u128> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            bail!("invalid number '{}'", input);
        }
        // More digits than u128 can hold are out of range anyway
        s.parse::<u128>().or_else(|_| Ok(u128::MAX))
    };
    let too_big = || SieveError::StopOutOfRange {
        value: input.to_string(),
    };
    if let Some((base, exp)) = term.split_once('^') {
        let exp = u32::try_from(number(exp)?).map_err(|_| too_big())?;
        return Ok(number(base)?.checked_pow(exp).ok_or_else(too_big)?);
    }
    if let Some((mantissa, exp)) = term.split_once(['e', 'E']) {
        let exp = u32::try_from(number(exp)?).map_err(|_| too_big())?;
        let scale = 10u128.checked_pow(exp).ok_or_else(too_big)?;
        return Ok(number(mantissa)?.checked_mul(scale).ok_or_else(too_big)?);
    }
    number(term)
}

/// Parse a non-negative range bound such as `1e10`, `2^32` or `1e12+1e9`.
pub fn parse_number(input: &str) -> Result<u64> {
    let mut total: i128 = 0;
    let mut sign = 1i128;
    let mut rest = input.trim();
    if rest.is_empty() {
        bail!("empty number");
    }
    loop {
        let end = rest.find(['+', '-']).unwrap_or(rest.len());
        let value = i128::try_from(parse_term(&rest[..end], input)?).map_err(|_| SieveError::StopOutOfRange {
            value: input.to_string(),
        })?;
        total = total
            .checked_add(sign * value)
            .ok_or_else(|| SieveError::StopOutOfRange {
                value: input.to_string(),
            })?;
        if end == rest.len() {
            break;
        }
        sign = if rest.as_bytes()[end] == b'-' { -1 } else { 1 };
        rest = &rest[end + 1..];
    }
    if total < 0 {
        bail!("negative number '{}'", input);
    }
    u64::try_from(total).map_err(|_| {
        SieveError::StopOutOfRange {
            value: input.to_string(),
        }
        .into()
    })
}

/// Parse a signed count such as `-100` or `1e6`.
pub fn parse_signed(input: &str) -> Result<i64> {
    let (negative, digits) = match input.trim().strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    let value = parse_number(digits)?;
    let value = i64::try_from(value).with_context(|| format!("'{}' is out of range", input))?;
    Ok(if negative { -value } else { value })
}

/// Resolve `[START] STOP` and an optional `--dist` into a closed range.
pub fn range(numbers: &[u64], dist: Option<u64>) -> Result<(u64, u64)> {
    let start = if numbers.len() == 2 || dist.is_some() {
        numbers[0]
    } else {
        0
    };
    let stop = match dist {
        Some(d) => start.checked_add(d).ok_or_else(|| SieveError::StopOutOfRange {
            value: format!("{}+{}", start, d),
        })?,
        None => numbers[numbers.len() - 1],
    };
    Ok((start, stop))
}

// ── Configuration ───────────────────────────────────────────────

/// Defaults < `--config` file < environment < command-line flags. The last
/// two are merged by clap.
pub fn resolve_config(cli: &Cli) -> Result<SieveConfig> {
    let mut config = match &cli.config {
        Some(path) => SieveConfig::load(path)?,
        None => SieveConfig::default(),
    };
    if let Some(kib) = cli.sieve_size {
        config = config.with_sieve_size_kib(kib)?;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    config.validate()?;
    Ok(config)
}

fn print_settings(cli: &Cli, config: &SieveConfig, threads: usize) {
    if cli.quiet || cli.json {
        return;
    }
    println!("Sieve size = {} KiB", config.sieve_size / 1024);
    println!("Threads = {}", threads);
}

/// Shared setup for sieving subcommands: partitioner, optional progress
/// reporter, and the start time.
struct Run {
    partitioner: RangePartitioner,
    progress: Option<(Arc<Progress>, JoinHandle<()>)>,
    started: Instant,
}

impl Run {
    fn new(cli: &Cli, total: u64) -> Result<Self> {
        let config = resolve_config(cli)?;
        let mut partitioner = RangePartitioner::new(config)?;
        let progress = if cli.status {
            let progress = Progress::new(total);
            partitioner = partitioner.with_progress(Arc::clone(&progress));
            let handle = progress.start_reporter(Duration::from_secs(1));
            Some((progress, handle))
        } else {
            None
        };
        Ok(Run {
            partitioner,
            progress,
            started: Instant::now(),
        })
    }

    fn finish(self) -> f64 {
        let seconds = self.started.elapsed().as_secs_f64();
        if let Some((progress, handle)) = self.progress {
            progress.stop();
            progress.print_status();
            join_reporter(handle);
        }
        seconds
    }
}

/// Wait for the progress reporter. A panicked reporter only loses status
/// lines, so it is logged rather than failing the run. Returns whether the
/// reporter exited cleanly.
fn join_reporter(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown".to_string());
            warn!(reason = %reason, "progress reporter panicked");
            false
        }
    }
}

// ── Subcommands ─────────────────────────────────────────────────

#[derive(Serialize)]
struct CountReport {
    start: u64,
    stop: u64,
    sieve_size: usize,
    threads: usize,
    counts: Vec<KindCount>,
    seconds: f64,
}

#[derive(Serialize)]
struct KindCount {
    kind: PrimeKind,
    count: u64,
}

pub fn run_count(cli: &Cli, start: u64, stop: u64, kinds: &[PrimeKind]) -> Result<()> {
    let width = stop.saturating_sub(start).saturating_add(1);
    let run = Run::new(cli, width.saturating_mul(kinds.len() as u64))?;
    let config = run.partitioner.config().clone();
    let threads = config.num_threads();
    print_settings(cli, &config, threads);
    info!(start, stop, sieve_size = config.sieve_size, threads, "counting");

    let mut counts = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let count = run.partitioner.count(start, stop, kind)?;
        counts.push(KindCount { kind, count });
    }
    let seconds = run.finish();

    if cli.json {
        let report = CountReport {
            start,
            stop,
            sieve_size: config.sieve_size,
            threads,
            counts,
            seconds,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if cli.time {
        println!("Seconds: {:.3}", seconds);
    }
    for c in &counts {
        if cli.quiet && counts.len() == 1 {
            println!("{}", c.count);
        } else {
            println!("{}: {}", c.kind.label(), c.count);
        }
    }
    Ok(())
}

pub fn run_print(cli: &Cli, start: u64, stop: u64, kind: PrimeKind) -> Result<()> {
    let run = Run::new(cli, stop.saturating_sub(start).saturating_add(1))?;
    let out = Box::new(std::io::stdout());
    let lines = run.partitioner.print(start, stop, kind, out)?;
    let seconds = run.finish();
    info!(lines, kind = kind.name(), "printed");
    if cli.time {
        eprintln!("Seconds: {:.3}", seconds);
    }
    Ok(())
}

#[derive(Serialize)]
struct NthReport {
    n: i64,
    start: u64,
    nth_prime: u64,
    seconds: f64,
}

pub fn run_nth(cli: &Cli, n: i64, start: u64) -> Result<()> {
    let run = Run::new(cli, n.unsigned_abs().saturating_mul(20))?;
    let config = run.partitioner.config().clone();
    print_settings(cli, &config, config.num_threads());

    let nth_prime = run.partitioner.nth_prime(n, start)?;
    let seconds = run.finish();

    if cli.json {
        let report = NthReport {
            n,
            start,
            nth_prime,
            seconds,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if cli.time {
        println!("Seconds: {:.3}", seconds);
    }
    if cli.quiet {
        println!("{}", nth_prime);
    } else {
        println!("Nth prime: {}", nth_prime);
    }
    Ok(())
}

// ── Stress Test ─────────────────────────────────────────────────

/// Width of each stress-test window.
const STRESS_WINDOW: u64 = 10_000_000;

/// Primes in `[i · 10^7, (i + 1) · 10^7]`; together they make π(10^8).
const STRESS_COUNTS: [u64; 10] = [
    664_579, 606_028, 587_252, 575_795, 567_480, 560_981, 555_949, 551_318, 547_572, 544_501,
];

/// Count the primes in `[start, stop]` with one sieve session, or by
/// walking a prime stream when `stream` is set.
fn stress_count(start: u64, stop: u64, sieve_size: usize, stream: bool) -> Result<u64, SieveError> {
    if stream {
        let mut primes = PrimeStream::with_sieve_size(start, sieve_size)?;
        let mut count = 0;
        while let Some(p) = primes.next_prime()? {
            if p > stop {
                break;
            }
            count += 1;
        }
        return Ok(count);
    }
    let mut sink = Sink::counter(PrimeKind::Primes);
    SegmentedSieve::new(start, stop, sieve_size)?.run(&mut sink)?;
    Ok(sink.count())
}

/// Recount the windows in `table` until the deadline passes. Workers
/// alternate between the two counting paths so both stay under load.
/// Returns the number of windows checked.
fn stress_worker(
    id: usize,
    table: &[u64],
    sieve_size: usize,
    deadline: Option<Instant>,
    quiet: bool,
) -> Result<u64> {
    let mut checked = 0;
    loop {
        for (i, &expect) in table.iter().enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(checked);
            }
            let start = i as u64 * STRESS_WINDOW;
            let stop = start + STRESS_WINDOW;
            let began = Instant::now();
            let count = stress_count(start, stop, sieve_size, (id + i) % 2 == 1)?;
            let secs = began.elapsed().as_secs_f64();
            if count != expect {
                error!(thread = id, start, stop, count, expect, "miscalculation");
                bail!(
                    "thread {}: PrimeCount({}e7, {}e7) = {}, expected {}",
                    id,
                    i,
                    i + 1,
                    count,
                    expect
                );
            }
            checked += 1;
            if !quiet {
                println!(
                    "Thread: {}, secs: {:.3}, PrimeCount({}e7, {}e7) = {}   OK",
                    id,
                    secs,
                    i,
                    i + 1,
                    count
                );
            }
        }
    }
}

#[derive(Serialize)]
struct StressReport {
    threads: usize,
    windows: u64,
    seconds: f64,
}

/// Count known windows below 10^8 on every worker until `timeout` seconds
/// pass, or forever without a timeout. Fails on the first wrong count.
pub fn run_stress_test(cli: &Cli, timeout: Option<u64>) -> Result<()> {
    let config = resolve_config(cli)?;
    let threads = config.num_threads();
    print_settings(cli, &config, threads);
    info!(threads, timeout, "stress testing");
    if !cli.quiet && !cli.json {
        println!("Started stress testing using {} threads.", threads);
        if timeout.is_none() {
            println!("Stress testing keeps on running until a miscalculation occurs or you cancel it.");
        }
    }

    let started = Instant::now();
    let deadline = timeout.map(|secs| started + Duration::from_secs(secs));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("building stress test pool")?;
    let quiet = cli.quiet || cli.json;
    let checked = pool.install(|| {
        (1..=threads)
            .into_par_iter()
            .map(|id| stress_worker(id, &STRESS_COUNTS, config.sieve_size, deadline, quiet))
            .collect::<Result<Vec<u64>>>()
    })?;
    let windows: u64 = checked.iter().sum();
    let seconds = started.elapsed().as_secs_f64();
    info!(windows, seconds, "stress test passed");

    if cli.json {
        let report = StressReport {
            threads,
            windows,
            seconds,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if cli.quiet {
        println!("{}", windows);
    } else {
        println!("Checked {} windows without errors.", windows);
        if cli.time {
            println!("Seconds: {:.3}", seconds);
        }
    }
    Ok(())
}

/// Ten decimals with trailing zeros (and a bare point) removed.
pub fn format_real(x: f64) -> String {
    let s = format!("{:.10}", x);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
