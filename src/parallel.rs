//! # Parallel — Range Partitioning and Partitioned Operations
//!
//! `RangePartitioner` splits `[start, stop]` into contiguous sub-ranges, runs
//! one private `SegmentedSieve` per sub-range on a rayon pool, and merges the
//! per-worker sinks in range order. Workers share nothing but the optional
//! progress counter; the merge after the join is the only synchronization.
//!
//! ## Algorithm: Balanced Partitioning
//!
//! Sieving `[a, b]` costs roughly its width plus the set-up work for all
//! sieving primes up to `√b`:
//!
//! ```text
//! cost(a, b) = (b − a + 1) + INIT_COST_WEIGHT · ⌊√b⌋
//! ```
//!
//! The plan minimises the largest sub-range cost. A binary search on the
//! budget `T` asks: can a greedy left-to-right cut, each piece extended as far
//! as `cost ≤ T` allows (itself a binary search), cover the range with at
//! most N pieces? The smallest feasible `T` gives the plan. Interior cuts are
//! moved down to a number `≡ 1 (mod 30)`, the last number of a sieve byte, so
//! no prime k-tuplet is split between workers.
//!
//! The worker count is first capped so every piece spans at least
//! `min_distance` numbers; tiny ranges run inline on the calling thread.
//!
//! ## Algorithm: nth Prime
//!
//! 1. Estimate the distance to the target with the Riemann R inverse and
//!    count primes in that chunk (partitioned).
//! 2. If the chunk falls short, subtract its count and continue past it.
//! 3. Otherwise bisect the chunk with further counts until the window holding
//!    the target is at most 2^20 numbers wide, then collect it and index.

use crate::approx::{nth_prime_approx, prime_count_upper, prime_pi_approx};
use crate::config::SieveConfig;
use crate::error::SieveError;
use crate::progress::Progress;
use crate::sieve::{isqrt, SegmentedSieve};
use crate::sink::{PrimeKind, Sink};
use rayon::prelude::*;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Smallest sub-range handed to a worker by default.
pub const DEFAULT_MIN_DISTANCE: u64 = 10_000_000;

/// Cost of one sieving prime's set-up, in units of sieved numbers.
const INIT_COST_WEIGHT: u128 = 100;

/// Widest window that nth-prime refinement collects.
const NTH_PRIME_WINDOW: u64 = 1 << 20;

/// π(2^64 − 1): no nth-prime query can ask for more primes than this.
const PRIME_PI_MAX: u64 = 425_656_284_035_217_743;

fn cost(a: u64, b: u64) -> u128 {
    (b - a) as u128 + 1 + INIT_COST_WEIGHT * isqrt(b) as u128
}

/// Largest `x ≤ n` with `x ≡ 1 (mod 30)`.
fn align_down(n: u64) -> Option<u64> {
    n.checked_sub((n % 30 + 29) % 30)
}

/// Greedy cut with per-piece budget `budget`; `None` if more than `workers`
/// pieces would be needed.
fn greedy_cut(start: u64, stop: u64, workers: usize, budget: u128) -> Option<Vec<(u64, u64)>> {
    let mut parts = Vec::with_capacity(workers);
    let mut a = start;
    loop {
        if parts.len() == workers || cost(a, a) > budget {
            return None;
        }
        if cost(a, stop) <= budget {
            parts.push((a, stop));
            return Some(parts);
        }
        // Largest b in [a, stop) with cost(a, b) ≤ budget
        let (mut lo, mut hi) = (a, stop - 1);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if cost(a, mid) <= budget {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let b = align_down(lo).filter(|&b| b >= a)?;
        parts.push((a, b));
        a = b + 1;
    }
}

/// Split `[start, stop]` into at most `workers` contiguous sub-ranges of at
/// least `min_distance` numbers each, minimising the largest estimated cost.
/// Interior boundaries end on `≡ 1 (mod 30)`. Empty ranges yield no parts.
pub fn partition(start: u64, stop: u64, workers: usize, min_distance: u64) -> Vec<(u64, u64)> {
    if start > stop {
        return Vec::new();
    }
    let dist = stop - start;
    let cap = (dist / min_distance.max(1)).max(1);
    let workers = (workers.max(1) as u64).min(cap) as usize;
    if workers == 1 {
        return vec![(start, stop)];
    }

    let total = cost(start, stop);
    let mut lo = total / workers as u128;
    let mut hi = total;
    let mut best = vec![(start, stop)];
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match greedy_cut(start, stop, workers, mid) {
            Some(parts) => {
                best = parts;
                hi = mid;
            }
            None => lo = mid + 1,
        }
    }
    if let Some(parts) = greedy_cut(start, stop, workers, hi) {
        best = parts;
    }
    debug!(start, stop, workers, parts = best.len(), budget = %hi, "range partitioned");
    best
}

/// Runs partitioned sieving operations with a fixed configuration.
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    config: SieveConfig,
    min_distance: u64,
    progress: Option<Arc<Progress>>,
}

impl RangePartitioner {
    pub fn new(config: SieveConfig) -> Result<Self, SieveError> {
        config.validate()?;
        Ok(RangePartitioner {
            config,
            min_distance: DEFAULT_MIN_DISTANCE,
            progress: None,
        })
    }

    /// Smallest sub-range per worker; lower values split small ranges too.
    pub fn with_min_distance(mut self, min_distance: u64) -> Self {
        self.min_distance = min_distance.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &SieveConfig {
        &self.config
    }

    fn session(&self, start: u64, stop: u64) -> Result<SegmentedSieve, SieveError> {
        let sieve = SegmentedSieve::new(start, stop, self.config.sieve_size)?;
        Ok(match &self.progress {
            Some(progress) => sieve.with_progress(Arc::clone(progress)),
            None => sieve,
        })
    }

    /// Sieve `[start, stop]` into sinks built by `make_sink(a, b)` for each
    /// sub-range, and merge them in range order. The first worker error is
    /// returned and the other results are dropped.
    pub fn sieve_with<F>(&self, start: u64, stop: u64, make_sink: F) -> Result<Sink, SieveError>
    where
        F: Fn(u64, u64) -> Result<Sink, SieveError> + Sync,
    {
        let parts = partition(start, stop, self.config.num_threads(), self.min_distance);
        if parts.len() <= 1 {
            let mut sink = make_sink(start, stop)?;
            self.session(start, stop)?.run(&mut sink)?;
            return Ok(sink);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parts.len())
            .build()
            .map_err(|e| SieveError::exhausted("worker pool", e))?;
        let sinks = pool.install(|| {
            parts
                .par_iter()
                .map(|&(a, b)| {
                    let mut sink = make_sink(a, b)?;
                    self.session(a, b)?.run(&mut sink)?;
                    Ok(sink)
                })
                .collect::<Result<Vec<Sink>, SieveError>>()
        })?;

        let mut sinks = sinks.into_iter();
        let mut merged = match sinks.next() {
            Some(first) => first,
            None => make_sink(start, stop)?,
        };
        for sink in sinks {
            merged.merge(sink);
        }
        Ok(merged)
    }

    /// Number of primes (or tuplets of `kind`) in `[start, stop]`.
    pub fn count(&self, start: u64, stop: u64, kind: PrimeKind) -> Result<u64, SieveError> {
        Ok(self.sieve_with(start, stop, |_, _| Ok(Sink::counter(kind)))?.count())
    }

    /// All primes in `[start, stop]` in ascending order.
    pub fn collect(&self, start: u64, stop: u64) -> Result<Vec<u64>, SieveError> {
        let sink = self.sieve_with(start, stop, |a, b| Sink::try_collector(prime_count_upper(a, b)))?;
        Ok(sink.into_primes())
    }

    /// Write primes (or tuplets) in `[start, stop]` to `out`, one per line.
    /// Always single-threaded so the output stays ordered. Returns the
    /// number of lines written.
    pub fn print(&self, start: u64, stop: u64, kind: PrimeKind, out: Box<dyn Write + Send>) -> Result<u64, SieveError> {
        let mut sink = Sink::printer(kind, out);
        self.session(start, stop)?.run(&mut sink)?;
        Ok(sink.count())
    }

    /// `n = 0`: first prime ≥ `start`; `n > 0`: nth prime > `start`;
    /// `n < 0`: |n|th prime < `start`.
    pub fn nth_prime(&self, n: i64, start: u64) -> Result<u64, SieveError> {
        let out_of_range = SieveError::NthPrimeOutOfRange { n, start };
        match n {
            0 => self.nth_prime_forward(1, start).ok_or(out_of_range),
            n if n > 0 => match start.checked_add(1) {
                Some(from) => self.nth_prime_forward(n as u64, from).ok_or(out_of_range),
                None => Err(out_of_range),
            },
            n => match start.checked_sub(1) {
                Some(upper) => self.nth_prime_backward(n.unsigned_abs(), upper).ok_or(out_of_range),
                None => Err(out_of_range),
            },
        }
        .and_then(|r| r)
    }

    /// The `n`th prime ≥ `from` (n ≥ 1), or `None` past 2^64 − 1.
    fn nth_prime_forward(&self, n: u64, from: u64) -> Option<Result<u64, SieveError>> {
        if n > PRIME_PI_MAX {
            return None;
        }
        let mut low = from;
        let mut remaining = n;
        loop {
            let target = nth_prime_approx(prime_pi_approx(low).saturating_add(remaining));
            let dist = target.saturating_sub(low).max(1 << 16);
            let high = low.saturating_add(dist.saturating_add(dist / 64));
            let count = match self.count(low, high, PrimeKind::Primes) {
                Ok(count) => count,
                Err(e) => return Some(Err(e)),
            };
            debug!(low, high, count, remaining, "nth prime chunk");
            if count >= remaining {
                return Some(self.refine_forward(low, high, remaining));
            }
            if high == u64::MAX {
                return None;
            }
            remaining -= count;
            low = high + 1;
        }
    }

    /// The `n`th largest prime ≤ `upper` (n ≥ 1), or `None` below 2.
    fn nth_prime_backward(&self, n: u64, upper: u64) -> Option<Result<u64, SieveError>> {
        if n > PRIME_PI_MAX {
            return None;
        }
        let mut high = upper;
        let mut remaining = n;
        loop {
            let pi_high = prime_pi_approx(high);
            let target = if pi_high > remaining {
                nth_prime_approx(pi_high - remaining)
            } else {
                0
            };
            let dist = high.saturating_sub(target).max(1 << 16);
            let low = high.saturating_sub(dist.saturating_add(dist / 64));
            let count = match self.count(low, high, PrimeKind::Primes) {
                Ok(count) => count,
                Err(e) => return Some(Err(e)),
            };
            debug!(low, high, count, remaining, "nth prime chunk");
            if count >= remaining {
                return Some(self.refine_backward(low, high, remaining));
            }
            if low == 0 {
                return None;
            }
            remaining -= count;
            high = low - 1;
        }
    }

    /// `[low, high]` holds at least `n` primes; return the `n`th smallest.
    fn refine_forward(&self, mut low: u64, mut high: u64, mut n: u64) -> Result<u64, SieveError> {
        while high - low >= NTH_PRIME_WINDOW {
            let mid = low + (high - low) / 2;
            let count = self.count(low, mid, PrimeKind::Primes)?;
            if count >= n {
                high = mid;
            } else {
                n -= count;
                low = mid + 1;
            }
        }
        let primes = self.collect(low, high)?;
        // n ≥ 1 primes are known to lie in [low, high]
        Ok(primes[(n - 1) as usize])
    }

    /// `[low, high]` holds at least `n` primes; return the `n`th largest.
    fn refine_backward(&self, mut low: u64, mut high: u64, mut n: u64) -> Result<u64, SieveError> {
        while high - low >= NTH_PRIME_WINDOW {
            let mid = low + (high - low) / 2;
            let count = self.count(mid + 1, high, PrimeKind::Primes)?;
            if count >= n {
                low = mid + 1;
            } else {
                n -= count;
                high = mid;
            }
        }
        let primes = self.collect(low, high)?;
        Ok(primes[primes.len() - n as usize])
    }
}
