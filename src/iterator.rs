//! # Iterator — Bidirectional Prime Stream
//!
//! `PrimeStream` hands out primes one at a time in either direction from a
//! starting value. It keeps a buffer of every prime in some closed interval
//! `[lo, hi]` and two bounds:
//!
//! - `next_prime()` returns the smallest prime ≥ `next_from`,
//! - `prev_prime()` returns the largest prime < `prev_below`.
//!
//! Returning a prime `p` from either side sets `next_from = p + 1` and
//! `prev_below = p`, so the two directions can be interleaved freely.
//!
//! ## Refill Protocol
//!
//! Forward refills pull one segment at a time from a live `SegmentedSieve`
//! over `[bound, bound + dist]`; when that session finishes the next one is
//! four times wider (up to 2^40), amortizing the start-up cost of sieving
//! primes. Backward refills sieve `[bound − dist, bound − 1]` in one go with
//! `dist` growing up to 2^24, and discard the forward session because the
//! buffer no longer continues it.

use crate::config::DEFAULT_SIEVE_SIZE;
use crate::error::SieveError;
use crate::sieve::{Phase, SegmentedSieve};
use crate::sink::Sink;
use tracing::warn;

const INITIAL_DIST: u64 = 1 << 16;
const MAX_FORWARD_DIST: u64 = 1 << 40;
const MAX_BACKWARD_DIST: u64 = 1 << 24;

/// Bidirectional stream of primes.
#[derive(Debug)]
pub struct PrimeStream {
    sieve_size: usize,
    next_from: u64,
    prev_below: u64,
    buffer: Vec<u64>,
    /// Interval whose primes are exactly `buffer`.
    covered: Option<(u64, u64)>,
    session: Option<SegmentedSieve>,
    sink: Sink,
    forward_dist: u64,
    backward_dist: u64,
}

impl PrimeStream {
    pub fn new(start: u64) -> Self {
        PrimeStream {
            sieve_size: DEFAULT_SIEVE_SIZE,
            next_from: start,
            prev_below: start,
            buffer: Vec::new(),
            covered: None,
            session: None,
            sink: Sink::collector(),
            forward_dist: INITIAL_DIST,
            backward_dist: INITIAL_DIST,
        }
    }

    /// Stream whose sessions use `sieve_size`-byte segments.
    pub fn with_sieve_size(start: u64, sieve_size: usize) -> Result<Self, SieveError> {
        crate::config::validate_sieve_size(sieve_size)?;
        let mut stream = PrimeStream::new(start);
        stream.sieve_size = sieve_size;
        Ok(stream)
    }

    /// Restart at `value`: the next call to `next_prime` returns the smallest
    /// prime ≥ `value`, `prev_prime` the largest prime < `value`.
    pub fn skip_to(&mut self, value: u64) {
        self.next_from = value;
        self.prev_below = value;
        self.buffer.clear();
        self.covered = None;
        self.session = None;
        self.forward_dist = INITIAL_DIST;
        self.backward_dist = INITIAL_DIST;
    }

    /// Smallest prime ≥ the forward bound, or `None` past 2^64 − 1.
    pub fn next_prime(&mut self) -> Result<Option<u64>, SieveError> {
        loop {
            let from = match self.covered {
                Some((lo, hi)) if lo <= self.next_from && self.next_from <= hi => {
                    let i = self.buffer.partition_point(|&p| p < self.next_from);
                    if let Some(&p) = self.buffer.get(i) {
                        self.next_from = p + 1;
                        self.prev_below = p;
                        return Ok(Some(p));
                    }
                    match hi.checked_add(1) {
                        Some(from) => from,
                        None => return Ok(None),
                    }
                }
                _ => self.next_from,
            };
            self.fill_forward(from)?;
        }
    }

    /// Largest prime < the backward bound, or `None` below 2.
    pub fn prev_prime(&mut self) -> Result<Option<u64>, SieveError> {
        loop {
            let Some(target) = self.prev_below.checked_sub(1) else {
                return Ok(None);
            };
            let below = match self.covered {
                Some((lo, hi)) if lo <= target && target <= hi => {
                    let i = self.buffer.partition_point(|&p| p < self.prev_below);
                    if i > 0 {
                        let p = self.buffer[i - 1];
                        self.next_from = p + 1;
                        self.prev_below = p;
                        return Ok(Some(p));
                    }
                    if lo == 0 {
                        return Ok(None);
                    }
                    lo
                }
                _ => self.prev_below,
            };
            self.fill_backward(below)?;
        }
    }

    /// Replace the buffer with the primes of the next segment starting at
    /// `from`, continuing the live session when it ends right before `from`.
    fn fill_forward(&mut self, from: u64) -> Result<(), SieveError> {
        let continues = matches!(
            (&self.session, self.covered),
            (Some(_), Some((_, hi))) if hi.checked_add(1) == Some(from)
        );
        if !continues {
            let stop = from.saturating_add(self.forward_dist);
            self.forward_dist = (self.forward_dist * 4).min(MAX_FORWARD_DIST);
            self.session = Some(SegmentedSieve::new(from, stop, self.sieve_size)?);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.next_segment(&mut self.sink)?;
        let hi = session.sieved_to().unwrap_or(session.stop());
        if session.phase() == Phase::Finished {
            self.session = None;
        }
        self.buffer = self.sink.take_primes();
        self.covered = Some((from, hi));
        Ok(())
    }

    /// Replace the buffer with all primes in `[below − dist, below − 1]`.
    fn fill_backward(&mut self, below: u64) -> Result<(), SieveError> {
        let high = below - 1;
        let low = high.saturating_sub(self.backward_dist - 1);
        self.backward_dist = (self.backward_dist * 4).min(MAX_BACKWARD_DIST);
        self.session = None;
        SegmentedSieve::new(low, high, self.sieve_size)?.run(&mut self.sink)?;
        self.buffer = self.sink.take_primes();
        self.covered = Some((low, high));
        Ok(())
    }
}

/// Forward iteration. A sieve error ends the iteration; use
/// [`PrimeStream::next_prime`] to observe it.
impl Iterator for PrimeStream {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match self.next_prime() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "prime stream stopped");
                None
            }
        }
    }
}
