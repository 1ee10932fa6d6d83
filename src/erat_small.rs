//! EratSmall: sieving primes with many multiples per segment.
//!
//! Uses the modulo 30 wheel. Every prime is visited once per segment and
//! crosses off all of its multiples inside the segment; the leftover byte
//! offset and wheel position carry over to the next segment.

use crate::wheel::{SievingPrime, WHEEL30};

/// Sieving primes up to `sieve_size / 4`, each with its next multiple
/// offset and wheel position in the current segment.
#[derive(Debug, Default)]
pub struct EratSmall {
    stop: u64,
    max_prime: u64,
    primes: Vec<SievingPrime>,
}

impl EratSmall {
    /// `max_prime` is the largest prime this structure will accept.
    pub fn new(stop: u64, max_prime: u64) -> Self {
        EratSmall {
            stop,
            max_prime,
            primes: Vec::new(),
        }
    }

    /// Register `prime` for the segment starting at `segment_low`. Primes
    /// whose first multiple ≥ p² lies beyond `stop` are dropped.
    ///
    /// Panics if `prime` exceeds `max_prime`.
    pub fn add_sieving_prime(&mut self, prime: u64, segment_low: u64) {
        assert!(prime <= self.max_prime, "{} is not a small sieving prime", prime);
        if let Some((multiple_index, wheel_index)) =
            WHEEL30.first_multiple(prime, segment_low, self.stop)
        {
            self.primes
                .push(SievingPrime::new(prime, multiple_index, wheel_index));
        }
    }

    /// Number of primes still sieving.
    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    /// Clear the bits of every multiple inside `sieve`, then rebase the
    /// stored offsets onto the next segment.
    pub fn cross_off(&mut self, sieve: &mut [u8]) {
        let len = sieve.len();
        let wheel = WHEEL30.elements;
        for sp in &mut self.primes {
            let step = sp.sieving_prime as usize;
            let mut i = sp.multiple_index as usize;
            let mut w = sp.wheel_index as usize;
            while i < len {
                let e = wheel[w];
                sieve[i] &= e.unset_bit;
                i += step * e.next_multiple_factor as usize + e.correct as usize;
                w = e.next as usize;
            }
            sp.multiple_index = (i - len) as u32;
            sp.wheel_index = w as u32;
        }
    }
}
