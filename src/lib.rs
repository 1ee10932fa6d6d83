//! # segsieve — Segmented Sieve of Eratosthenes for 64-bit Ranges
//!
//! Counts, collects, prints and streams primes and prime k-tuplets in any
//! range `[start, stop] ⊆ [0, 2^64 − 1]`.
//!
//! | Module        | Role                                                   |
//! |---------------|--------------------------------------------------------|
//! | `wheel`       | mod-30 / mod-210 wheel tables (compile-time)           |
//! | `presieve`    | copy-in template for the primes 7, 11, 13              |
//! | `erat_small`  | sieving primes with many multiples per segment         |
//! | `erat_medium` | sieving primes with a few multiples per segment        |
//! | `erat_big`    | bucket sieve for primes with < 1 multiple per segment  |
//! | `sieve`       | `SegmentedSieve` session state machine                 |
//! | `sink`        | counters, tuplet counters, collector, printer          |
//! | `parallel`    | range partitioning, multi-threaded runs, nth prime     |
//! | `iterator`    | `PrimeStream`, bidirectional prime stream              |
//! | `approx`      | Riemann R estimates                                    |
//! | `config`      | `SieveConfig`, validation, TOML loading                |
//! | `progress`    | atomic progress counters and reporter thread           |
//!
//! The functions below use [`SieveConfig::default`]; build a
//! [`RangePartitioner`] to choose the segment size or the thread count.
//!
//! ```no_run
//! assert_eq!(segsieve::count_primes(0, 1_000_000).unwrap(), 78_498);
//! assert_eq!(segsieve::nth_prime(10_000, 0).unwrap(), 104_729);
//! let mut stream = segsieve::PrimeStream::new(100);
//! assert_eq!(stream.next(), Some(101));
//! ```

pub mod approx;
pub mod config;
pub mod erat_big;
pub mod erat_medium;
pub mod erat_small;
pub mod error;
pub mod iterator;
pub mod parallel;
pub mod presieve;
pub mod progress;
pub mod sieve;
pub mod sink;
pub mod wheel;

pub use config::SieveConfig;
pub use error::SieveError;
pub use iterator::PrimeStream;
pub use parallel::RangePartitioner;
pub use sieve::SegmentedSieve;
pub use sink::{PrimeKind, Sink};

use std::io::Write;

fn partitioner() -> Result<RangePartitioner, SieveError> {
    RangePartitioner::new(SieveConfig::default())
}

/// Number of primes or prime k-tuplets of `kind` in `[start, stop]`.
pub fn count(start: u64, stop: u64, kind: PrimeKind) -> Result<u64, SieveError> {
    partitioner()?.count(start, stop, kind)
}

pub fn count_primes(start: u64, stop: u64) -> Result<u64, SieveError> {
    count(start, stop, PrimeKind::Primes)
}

pub fn count_twins(start: u64, stop: u64) -> Result<u64, SieveError> {
    count(start, stop, PrimeKind::Twins)
}

pub fn count_triplets(start: u64, stop: u64) -> Result<u64, SieveError> {
    count(start, stop, PrimeKind::Triplets)
}

pub fn count_quadruplets(start: u64, stop: u64) -> Result<u64, SieveError> {
    count(start, stop, PrimeKind::Quadruplets)
}

pub fn count_quintuplets(start: u64, stop: u64) -> Result<u64, SieveError> {
    count(start, stop, PrimeKind::Quintuplets)
}

pub fn count_sextuplets(start: u64, stop: u64) -> Result<u64, SieveError> {
    count(start, stop, PrimeKind::Sextuplets)
}

/// `n = 0`: first prime ≥ `start`; `n > 0`: nth prime > `start`;
/// `n < 0`: |n|th prime < `start`.
pub fn nth_prime(n: i64, start: u64) -> Result<u64, SieveError> {
    partitioner()?.nth_prime(n, start)
}

/// All primes in `[start, stop]`, ascending.
pub fn primes(start: u64, stop: u64) -> Result<Vec<u64>, SieveError> {
    partitioner()?.collect(start, stop)
}

/// The first `n` primes ≥ `start`.
pub fn n_primes(n: usize, start: u64) -> Result<Vec<u64>, SieveError> {
    let mut primes = Vec::new();
    primes
        .try_reserve_exact(n)
        .map_err(|e| SieveError::exhausted("prime collector", e))?;
    let mut stream = PrimeStream::new(start);
    while primes.len() < n {
        match stream.next_prime()? {
            Some(p) => primes.push(p),
            None => break,
        }
    }
    Ok(primes)
}

/// Write primes or tuplets of `kind` in `[start, stop]` to `out`, one per
/// line. Returns the number of lines written.
pub fn print(start: u64, stop: u64, kind: PrimeKind, out: Box<dyn Write + Send>) -> Result<u64, SieveError> {
    partitioner()?.print(start, stop, kind, out)
}
