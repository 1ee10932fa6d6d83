//! # Main — CLI Entry Point
//!
//! Parses the command line and routes subcommands to the sieve library.
//! Handles shared concerns: `.env` loading, structured logging, config
//! resolution and the global allocator.
//!
//! ## Subcommands
//!
//! - `count [START] STOP`: count primes and/or prime k-tuplets.
//! - `print [START] STOP`: print primes or k-tuplets, one per line.
//! - `nth N [START]`: find the nth prime relative to START.
//! - `riemann-r X` / `riemann-r-inverse X`: evaluate the prime counting
//!   estimates.
//! - `stress-test [--timeout SECS]`: recount known windows on every
//!   thread until a miscalculation or the timeout.
//!
//! ## Global Options
//!
//! - `--sieve-size` / `SEGSIEVE_SIEVE_SIZE`: segment size in KiB.
//! - `--threads` / `SEGSIEVE_THREADS`: worker count (0 = all cores).
//! - `--config`: TOML file with `sieve_size` (bytes) and `threads`.
//! - `--status`, `--time`, `--json`, `--quiet`: output control.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use segsieve::PrimeKind;
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "segsieve",
    version,
    about = "Count, print and find primes and prime k-tuplets below 2^64"
)]
struct Cli {
    /// Segment size in KiB (power of two, 1 to 4096)
    #[arg(long, short = 's', env = "SEGSIEVE_SIEVE_SIZE", global = true)]
    sieve_size: Option<usize>,

    /// Number of worker threads (0 = all logical cores)
    #[arg(long, short = 't', env = "SEGSIEVE_THREADS", global = true)]
    threads: Option<usize>,

    /// TOML config file (sieve_size in bytes, threads)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log sieving progress while running
    #[arg(long, global = true)]
    status: bool,

    /// Print the elapsed time in seconds
    #[arg(long, global = true)]
    time: bool,

    /// Print a JSON report instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Print only the result
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count primes and prime k-tuplets in [START, STOP]
    Count {
        /// [START] STOP, e.g. `1e10`, `2^32`, `1e12+1e9`
        #[arg(required = true, num_args = 1..=2, value_parser = cli::parse_number)]
        numbers: Vec<u64>,
        /// Sieve [START, START + DIST]
        #[arg(long, short = 'd', value_parser = cli::parse_number)]
        dist: Option<u64>,
        /// What to count (repeatable)
        #[arg(long, short = 'k', value_enum, default_values_t = [PrimeKind::Primes])]
        kind: Vec<PrimeKind>,
    },
    /// Print primes or prime k-tuplets in [START, STOP]
    Print {
        /// [START] STOP
        #[arg(required = true, num_args = 1..=2, value_parser = cli::parse_number)]
        numbers: Vec<u64>,
        /// Sieve [START, START + DIST]
        #[arg(long, short = 'd', value_parser = cli::parse_number)]
        dist: Option<u64>,
        /// What to print
        #[arg(long, short = 'k', value_enum, default_value_t = PrimeKind::Primes)]
        kind: PrimeKind,
    },
    /// Find the nth prime: N > 0 counts up from START, N < 0 down
    Nth {
        /// N (may be negative)
        #[arg(allow_hyphen_values = true, value_parser = cli::parse_signed)]
        n: i64,
        /// START (default 0)
        #[arg(value_parser = cli::parse_number)]
        start: Option<u64>,
    },
    /// Evaluate the Riemann R function at X
    RiemannR {
        #[arg(value_parser = cli::parse_number)]
        x: u64,
    },
    /// Evaluate the inverse Riemann R function at X
    RiemannRInverse {
        #[arg(value_parser = cli::parse_number)]
        x: u64,
    },
    /// Recount known prime windows on every thread to detect hardware errors
    StressTest {
        /// Stop after SECS seconds (default: run until an error or Ctrl+C)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log collectors, human-readable otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Count {
            numbers,
            dist,
            kind,
        } => {
            let (start, stop) = cli::range(numbers, *dist)?;
            cli::run_count(&cli, start, stop, kind)
        }
        Commands::Print {
            numbers,
            dist,
            kind,
        } => {
            let (start, stop) = cli::range(numbers, *dist)?;
            cli::run_print(&cli, start, stop, *kind)
        }
        Commands::Nth { n, start } => cli::run_nth(&cli, *n, start.unwrap_or(0)),
        Commands::RiemannR { x } => {
            println!("{}", cli::format_real(segsieve::approx::riemann_r(*x as f64)));
            Ok(())
        }
        Commands::RiemannRInverse { x } => {
            println!(
                "{}",
                cli::format_real(segsieve::approx::riemann_r_inverse(*x as f64))
            );
            Ok(())
        }
        Commands::StressTest { timeout } => cli::run_stress_test(&cli, *timeout),
    }
}
