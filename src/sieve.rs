//! # Sieve — Segmented Sieve of Eratosthenes
//!
//! `SegmentedSieve` sieves one closed range `[start, stop]` segment by
//! segment and hands each finished segment to a [`Sink`]. It owns every piece
//! of per-session state: the segment buffer, the bootstrap generator of
//! sieving primes and the three crossing-off structures.
//!
//! ## Session Phases
//!
//! ```text
//! Initializing ──(first next_segment)──▶ Sieving ──(segment_high ≥ stop)──▶ Finished
//!        └──────────(empty range, or stop < 7)──────────────────────────────────┘
//! ```
//!
//! ## Algorithm: One Segment
//!
//! 1. Add every sieving prime `p` with `p² ≤ min(segment_high, stop)` that has
//!    not been added yet, routing it by size:
//!    `p ≤ S/4` → `EratSmall`, `p ≤ 7·S` → `EratMedium`, else `EratBig`
//!    (`S` = segment size in bytes).
//! 2. Copy the pre-sieve pattern for 7, 11 and 13 into the buffer.
//! 3. Cross off with small, medium and big sieving primes.
//! 4. Clip: clear bits below `start` (first segment) and above `stop` (last).
//! 5. Pass the segment to the sink and advance `segment_low` by `30·S`.
//!
//! ## Algorithm: Bootstrap Sieving Primes
//!
//! Sieving primes up to `√stop ≤ 2^32` come from [`SievingPrimes`], a plain
//! odd-only segmented sieve seeded with the primes up to `stop^(1/4)` from
//! [`small_primes`]. It produces primes lazily, so a session that finishes
//! early never generates primes it does not need.
//!
//! ## Complexity
//!
//! O((stop − start) log log stop + √stop) time,
//! O(S + π(√stop)) memory per session.

use crate::config::{validate_sieve_size, MIN_SIEVE_SIZE};
use crate::erat_big::EratBig;
use crate::erat_medium::EratMedium;
use crate::erat_small::EratSmall;
use crate::error::SieveError;
use crate::presieve::{PreSieve, MAX_PRE_SIEVE_PRIME};
use crate::progress::Progress;
use crate::sink::{Segment, Sink};
use crate::wheel::{bits_up_to, residue_class, BIT_VALUES};
use std::sync::Arc;
use tracing::debug;

/// Integer square root: the largest `r` with `r² ≤ n`.
pub fn isqrt(n: u64) -> u64 {
    let mut r = (n as f64).sqrt() as u64;
    while r.checked_mul(r).map_or(true, |sq| sq > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).map_or(false, |sq| sq <= n) {
        r += 1;
    }
    r
}

/// Generate all primes up to `limit` using a wheel-30 sieve.
///
/// Stores only numbers coprime to {2, 3, 5}, one byte per 30 numbers, with
/// the same bit layout as the segment buffer. Meant for small limits: the
/// whole range is held in memory at once.
pub fn small_primes(limit: u64) -> Vec<u64> {
    let mut primes: Vec<u64> = [2, 3, 5].into_iter().filter(|&p| p <= limit).collect();
    if limit < 7 {
        return primes;
    }

    // Byte b covers 30b + {7, 11, 13, 17, 19, 23, 29, 31}
    let bytes = ((limit - 7) / 30 + 1) as usize;
    let mut sieve = vec![0xffu8; bytes];
    let sqrt = isqrt(limit);
    for b in 0..bytes {
        for (bit, &v) in BIT_VALUES.iter().enumerate() {
            let n = 30 * b as u64 + v;
            if n > sqrt {
                break;
            }
            if sieve[b] & (1 << bit) == 0 {
                continue; // already marked composite
            }
            // Odd multiples from n², skipping those divisible by 3 or 5
            let mut m = n * n;
            while m <= limit {
                let r = m % 30;
                if r % 3 != 0 && r % 5 != 0 {
                    sieve[((m - 7) / 30) as usize] &= !(1 << residue_class(r));
                }
                m += 2 * n;
            }
        }
    }

    for (b, &byte) in sieve.iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for (bit, &v) in BIT_VALUES.iter().enumerate() {
            let n = 30 * b as u64 + v;
            if byte & (1 << bit) != 0 && n <= limit {
                primes.push(n);
            }
        }
    }
    primes
}

/// Odd numbers per bootstrap chunk.
const BOOTSTRAP_CHUNK: usize = 1 << 15;

/// Ascending primes in `(13, limit]`, generated chunk by chunk.
#[derive(Debug)]
pub struct SievingPrimes {
    limit: u64,
    /// Odd primes up to `√limit`.
    seeds: Vec<u64>,
    /// Number represented by `composite[0]`; always odd.
    low: u64,
    composite: Vec<bool>,
    pos: usize,
}

impl SievingPrimes {
    pub fn new(limit: u64) -> Self {
        let seeds = small_primes(isqrt(limit)).into_iter().filter(|&p| p > 2).collect();
        let mut primes = SievingPrimes {
            limit,
            seeds,
            low: MAX_PRE_SIEVE_PRIME + 4,
            composite: Vec::new(),
            pos: 0,
        };
        if primes.low <= limit {
            primes.fill();
        }
        primes
    }

    fn fill(&mut self) {
        let len = BOOTSTRAP_CHUNK.min(((self.limit - self.low) / 2 + 1) as usize);
        self.composite.clear();
        self.composite.resize(len, false);
        self.pos = 0;
        let high = self.low + 2 * (len as u64 - 1);
        for &p in &self.seeds {
            if p * p > high {
                break;
            }
            let mut m = (self.low.div_ceil(p) * p).max(p * p);
            if m % 2 == 0 {
                m += p;
            }
            while m <= high {
                self.composite[((m - self.low) / 2) as usize] = true;
                m += 2 * p;
            }
        }
    }
}

impl Iterator for SievingPrimes {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            while self.pos < self.composite.len() {
                let i = self.pos;
                self.pos += 1;
                if !self.composite[i] {
                    return Some(self.low + 2 * i as u64);
                }
            }
            if self.composite.is_empty() {
                return None;
            }
            self.low += 2 * self.composite.len() as u64;
            if self.low > self.limit {
                self.composite.clear();
                return None;
            }
            self.fill();
        }
    }
}

/// Lifecycle of a sieving session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Sieving,
    Finished,
}

/// Sieving state created when the first segment is requested.
#[derive(Debug)]
struct Engine {
    sieve: Vec<u8>,
    sieving_primes: SievingPrimes,
    /// Next sieving prime whose square was beyond the previous segment.
    pending: Option<u64>,
    max_small: u64,
    max_medium: u64,
    small: EratSmall,
    medium: EratMedium,
    big: Option<EratBig>,
}

/// Segmented sieve over one closed range `[start, stop]`.
#[derive(Debug)]
pub struct SegmentedSieve {
    start: u64,
    stop: u64,
    sieve_size: usize,
    phase: Phase,
    segment_low: u64,
    first_low: u64,
    sieved_to: Option<u64>,
    engine: Option<Engine>,
    progress: Option<Arc<Progress>>,
}

impl SegmentedSieve {
    /// Create a session. `sieve_size` is the segment size in bytes; it must
    /// be a power of two within the supported range. An empty range
    /// (`start > stop` or `stop < 2`) is not an error: the session starts
    /// out finished.
    pub fn new(start: u64, stop: u64, sieve_size: usize) -> Result<Self, SieveError> {
        validate_sieve_size(sieve_size)?;
        let phase = if start > stop || stop < 2 {
            Phase::Finished
        } else {
            Phase::Initializing
        };
        Ok(SegmentedSieve {
            start,
            stop,
            sieve_size,
            phase,
            segment_low: 0,
            first_low: 0,
            sieved_to: None,
            engine: None,
            progress: None,
        })
    }

    /// Report the width of every finished segment to `progress`.
    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    /// Low bound of the segment that will be sieved next.
    pub fn segment_low(&self) -> u64 {
        self.segment_low
    }

    /// Largest number reported to a sink so far; every prime in
    /// `[start, sieved_to]` has been handed out.
    pub fn sieved_to(&self) -> Option<u64> {
        self.sieved_to
    }

    /// Sieve the next segment into `sink`. The first call also reports the
    /// primes below 7 that lie in the range. Returns `false` once the session
    /// is finished and nothing was sieved.
    pub fn next_segment(&mut self, sink: &mut Sink) -> Result<bool, SieveError> {
        if self.phase == Phase::Initializing {
            self.initialize(sink)?;
        }
        if self.phase == Phase::Finished {
            return Ok(false);
        }
        self.sieve_segment(sink)?;
        Ok(true)
    }

    /// Sieve every remaining segment into `sink` and flush it.
    pub fn run(mut self, sink: &mut Sink) -> Result<(), SieveError> {
        while self.next_segment(sink)? {}
        sink.finish()
    }

    fn initialize(&mut self, sink: &mut Sink) -> Result<(), SieveError> {
        if self.start <= 5 {
            sink.small_primes(self.start, self.stop)?;
        }
        if self.stop < 7 {
            self.sieved_to = Some(self.stop);
            self.phase = Phase::Finished;
            return Ok(());
        }

        // Byte b covers low + 30b + 7 ..= low + 30b + 31
        let first = self.start.max(7);
        let mut remainder = first % 30;
        if remainder <= 6 {
            remainder += 30;
        }
        self.segment_low = first - remainder;
        self.first_low = self.segment_low;

        // Small ranges get a smaller buffer
        let bytes_needed = (self.stop - self.segment_low - 7) / 30 + 1;
        let sieve_size = (bytes_needed.min(self.sieve_size as u64) as usize)
            .next_power_of_two()
            .max(MIN_SIEVE_SIZE);
        self.sieve_size = sieve_size;

        let mut sieve = Vec::new();
        sieve
            .try_reserve_exact(sieve_size)
            .map_err(|e| SieveError::exhausted("segment buffer", e))?;
        sieve.resize(sieve_size, 0);

        let sqrt_stop = isqrt(self.stop);
        let max_small = (sieve_size as u64 / 4).min(sqrt_stop);
        let max_medium = (sieve_size as u64 * 7).min(sqrt_stop);
        let big = if sqrt_stop > max_medium {
            Some(EratBig::new(self.stop, sieve_size, sqrt_stop)?)
        } else {
            None
        };
        debug!(
            start = self.start,
            stop = self.stop,
            sieve_size,
            sqrt_stop,
            big = big.is_some(),
            "sieve session initialized"
        );
        self.engine = Some(Engine {
            sieve,
            sieving_primes: SievingPrimes::new(sqrt_stop),
            pending: None,
            max_small,
            max_medium,
            small: EratSmall::new(self.stop, max_small),
            medium: EratMedium::new(self.stop, max_medium),
            big,
        });
        self.phase = Phase::Sieving;
        Ok(())
    }

    fn sieve_segment(&mut self, sink: &mut Sink) -> Result<(), SieveError> {
        let Some(engine) = self.engine.as_mut() else {
            self.phase = Phase::Finished;
            return Ok(());
        };
        let low = self.segment_low;
        let span = 30 * self.sieve_size as u64;
        let high = low.saturating_add(span + 1);

        engine.add_sieving_primes(high.min(self.stop), low)?;
        PreSieve::shared().apply(&mut engine.sieve, low);
        engine.small.cross_off(&mut engine.sieve);
        engine.medium.cross_off(&mut engine.sieve);
        if let Some(big) = engine.big.as_mut() {
            big.cross_off(&mut engine.sieve)?;
        }

        // Clip to [start, stop]
        if low == self.first_low && self.start > low {
            engine.sieve[0] &= !bits_up_to(self.start - low - 1);
        }
        // high ≡ 1 (mod 30): nothing in (high, high + 6) is coprime to 30
        let last = self.stop - high.min(self.stop) < 6;
        let seg_stop = if last { self.stop } else { high };
        if last {
            let last_byte = ((self.stop - low - 7) / 30) as usize;
            engine.sieve[last_byte + 1..].fill(0);
            engine.sieve[last_byte] &= bits_up_to(self.stop - low - 30 * last_byte as u64);
        }

        sink.segment(&Segment {
            bytes: &engine.sieve,
            low,
        })?;
        self.sieved_to = Some(seg_stop);
        if let Some(progress) = &self.progress {
            // Segments own (low + 1, high]; the first one owns [start, high]
            let from = if low == self.first_low { self.start } else { low + 2 };
            progress.add_sieved(seg_stop - from + 1);
        }

        if last {
            self.phase = Phase::Finished;
            self.engine = None;
        } else {
            self.segment_low = low + span;
        }
        Ok(())
    }
}

impl Engine {
    /// Add every pending sieving prime whose square is ≤ `limit`.
    fn add_sieving_primes(&mut self, limit: u64, segment_low: u64) -> Result<(), SieveError> {
        while let Some(p) = self.pending.take().or_else(|| self.sieving_primes.next()) {
            if p * p > limit {
                self.pending = Some(p);
                break;
            }
            if p <= self.max_small {
                self.small.add_sieving_prime(p, segment_low);
            } else if p <= self.max_medium {
                self.medium.add_sieving_prime(p, segment_low);
            } else if let Some(big) = self.big.as_mut() {
                big.add_sieving_prime(p, segment_low)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! # SegmentedSieve Tests
    //!
    //! Every test compares against trial division on small ranges, with the
    //! minimum segment size (256 bytes = 7680 numbers) so even short ranges
    //! span several segments and exercise all three crossing-off regimes:
    //! with `S = 256`, primes up to 64 are small, up to 1792 medium, and
    //! anything above is big.

    use super::*;
    use crate::sink::PrimeKind;

    fn is_prime(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        if n % 2 == 0 {
            return n == 2;
        }
        let mut d = 3;
        while d * d <= n {
            if n % d == 0 {
                return false;
            }
            d += 2;
        }
        true
    }

    fn sieve_collect(start: u64, stop: u64, size: usize) -> Vec<u64> {
        let mut sink = Sink::collector();
        SegmentedSieve::new(start, stop, size)
            .unwrap()
            .run(&mut sink)
            .unwrap();
        sink.into_primes()
    }

    // ── Helpers ─────────────────────────────────────────────────────

    #[test]
    fn isqrt_exact() {
        for n in [0u64, 1, 2, 3, 4, 15, 16, 17, 99, 100, 101] {
            let r = isqrt(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "isqrt({})", n);
        }
        assert_eq!(isqrt(u64::MAX), u32::MAX as u64);
        assert_eq!(isqrt((1 << 62) - 1), (1 << 31) - 1);
        assert_eq!(isqrt(1 << 62), 1 << 31);
    }

    #[test]
    fn small_primes_matches_trial_division() {
        for limit in [0u64, 1, 2, 6, 7, 30, 31, 100, 1000, 9973] {
            let expect: Vec<u64> = (0..=limit).filter(|&n| is_prime(n)).collect();
            assert_eq!(small_primes(limit), expect, "limit {}", limit);
        }
    }

    /// The bootstrap generator must produce exactly the primes in (13, limit]
    /// across several chunks.
    #[test]
    fn sieving_primes_across_chunks() {
        let limit = 200_003;
        let got: Vec<u64> = SievingPrimes::new(limit).collect();
        let expect: Vec<u64> = small_primes(limit).into_iter().filter(|&p| p > 13).collect();
        assert_eq!(got, expect);
        assert_eq!(SievingPrimes::new(13).count(), 0);
        assert_eq!(SievingPrimes::new(17).collect::<Vec<_>>(), vec![17]);
    }

    // ── Ranges ──────────────────────────────────────────────────────

    #[test]
    fn first_hundred() {
        assert_eq!(
            sieve_collect(0, 100, 256),
            (0..=100).filter(|&n| is_prime(n)).collect::<Vec<_>>()
        );
    }

    /// Range spanning many 256-byte segments with small, medium and big
    /// sieving primes (√(4·10^6) ≈ 2000 > 7·256).
    #[test]
    fn multi_segment_all_regimes() {
        let stop = 4_000_000;
        let got = sieve_collect(0, stop, 256);
        assert_eq!(got.len(), 283_146);
        assert_eq!(got, small_primes(stop));
    }

    /// Start and stop placed on every residue modulo 30.
    #[test]
    fn clipping_at_every_offset() {
        for start in 7_650u64..7_720 {
            for stop in [start, start + 1, start + 29, start + 61] {
                let expect: Vec<u64> = (start..=stop).filter(|&n| is_prime(n)).collect();
                assert_eq!(sieve_collect(start, stop, 256), expect, "[{}, {}]", start, stop);
            }
        }
    }

    /// Stops just past a segment boundary fall in the gap between `high` and
    /// the next number coprime to 30; the preceding segment must finish the
    /// session.
    #[test]
    fn stop_at_segment_edges() {
        let span = 30 * 256;
        let reference = small_primes(5 * span + 16);
        for k in 1..=5u64 {
            for delta in 0..=8 {
                let stop = k * span + delta;
                for start in [0, 7, k * span - 40] {
                    let expect: Vec<u64> =
                        reference.iter().copied().filter(|&p| start <= p && p <= stop).collect();
                    assert_eq!(sieve_collect(start, stop, 256), expect, "[{}, {}]", start, stop);
                }
            }
        }
    }

    /// The last segment reports `stop` as sieved even when it ends before it.
    #[test]
    fn sieved_to_reaches_stop() {
        let mut sieve = SegmentedSieve::new(0, 7_683, 256).unwrap();
        let mut sink = Sink::counter(PrimeKind::Primes);
        while sieve.next_segment(&mut sink).unwrap() {}
        assert_eq!(sieve.sieved_to(), Some(7_683));
        assert_eq!(sink.count(), small_primes(7_683).len() as u64);
    }

    #[test]
    fn high_window_with_big_primes() {
        let start = 10_000_000_000u64;
        let stop = start + 20_000;
        let got = sieve_collect(start, stop, 256);
        let expect: Vec<u64> = (start..=stop).filter(|&n| is_prime(n)).collect();
        assert_eq!(got, expect);
    }

    /// 18446744073709551557 is the largest prime below 2^64.
    #[test]
    #[ignore] // Generates every prime below 2^32
    fn top_of_domain() {
        let got = sieve_collect(u64::MAX - 100, u64::MAX, 1 << 10);
        assert_eq!(got, vec![18_446_744_073_709_551_557]);
    }

    // ── Edge cases ──────────────────────────────────────────────────

    #[test]
    fn empty_ranges() {
        assert!(sieve_collect(10, 5, 256).is_empty());
        assert!(sieve_collect(0, 1, 256).is_empty());
        assert!(sieve_collect(24, 28, 256).is_empty());
        assert_eq!(sieve_collect(2, 2, 256), vec![2]);
        assert_eq!(sieve_collect(0, 6, 256), vec![2, 3, 5]);
    }

    #[test]
    fn rejects_bad_sieve_size() {
        assert!(SegmentedSieve::new(0, 100, 1000).is_err());
        assert!(SegmentedSieve::new(0, 100, 128).is_err());
    }

    #[test]
    fn phases() {
        let mut sieve = SegmentedSieve::new(0, 100_000, 256).unwrap();
        assert_eq!(sieve.phase(), Phase::Initializing);
        let mut sink = Sink::counter(PrimeKind::Primes);
        assert!(sieve.next_segment(&mut sink).unwrap());
        assert_eq!(sieve.phase(), Phase::Sieving);
        while sieve.next_segment(&mut sink).unwrap() {}
        assert_eq!(sieve.phase(), Phase::Finished);
        assert_eq!(sink.count(), 9592);
        assert!(!sieve.next_segment(&mut sink).unwrap());

        let empty = SegmentedSieve::new(5, 4, 256).unwrap();
        assert_eq!(empty.phase(), Phase::Finished);
    }

    #[test]
    fn progress_covers_range() {
        let progress = Progress::new(1_000_001);
        let mut sink = Sink::counter(PrimeKind::Primes);
        SegmentedSieve::new(0, 1_000_000, 256)
            .unwrap()
            .with_progress(Arc::clone(&progress))
            .run(&mut sink)
            .unwrap();
        assert_eq!(sink.count(), 78_498);
        assert_eq!(progress.percent(), 100.0);
    }

    #[test]
    fn tuplet_counts() {
        let count = |kind| {
            let mut sink = Sink::counter(kind);
            SegmentedSieve::new(0, 1_000_000, 256).unwrap().run(&mut sink).unwrap();
            sink.count()
        };
        assert_eq!(count(PrimeKind::Twins), 8169);
        assert_eq!(count(PrimeKind::Primes), 78_498);
    }
}
