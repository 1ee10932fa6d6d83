//! EratMedium: sieving primes with a few multiples per segment.
//!
//! Uses the modulo 210 wheel, which also skips multiples of 7. Primes are
//! kept in the order they were added (ascending). A prime whose next multiple
//! lies beyond the current segment costs one subtraction: the crossing loop
//! is not entered and the stored offset is moved back by one segment.

use crate::wheel::{SievingPrime, WHEEL210};

/// Sieving primes up to `7 · sieve_size`, in ascending order.
#[derive(Debug, Default)]
pub struct EratMedium {
    stop: u64,
    max_prime: u64,
    primes: Vec<SievingPrime>,
}

impl EratMedium {
    /// Empty structure for a session ending at `stop` that accepts primes
    /// up to `max_prime`.
    pub fn new(stop: u64, max_prime: u64) -> Self {
        EratMedium {
            stop,
            max_prime,
            primes: Vec::new(),
        }
    }

    /// Register `prime` for the segment starting at `segment_low`. Primes
    /// must arrive in ascending order; ones with no multiple ≤ `stop` are
    /// dropped.
    pub fn add_sieving_prime(&mut self, prime: u64, segment_low: u64) {
        assert!(prime <= self.max_prime, "{} is not a medium sieving prime", prime);
        debug_assert!(self
            .primes
            .last()
            .map_or(true, |last| last.prime(&WHEEL210) < prime));
        if let Some((multiple_index, wheel_index)) =
            WHEEL210.first_multiple(prime, segment_low, self.stop)
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

    /// Clear every multiple inside `sieve`. Offsets are left relative to
    /// the start of the next segment.
    pub fn cross_off(&mut self, sieve: &mut [u8]) {
        let len = sieve.len();
        let wheel = WHEEL210.elements;
        for sp in &mut self.primes {
            let mut i = sp.multiple_index as usize;
            if i >= len {
                sp.multiple_index -= len as u32;
                continue;
            }
            let step = sp.sieving_prime as usize;
            let mut w = sp.wheel_index as usize;
            loop {
                let e = wheel[w];
                sieve[i] &= e.unset_bit;
                i += step * e.next_multiple_factor as usize + e.correct as usize;
                w = e.next as usize;
                if i >= len {
                    break;
                }
            }
            sp.multiple_index = (i - len) as u32;
            sp.wheel_index = w as u32;
        }
    }
}
