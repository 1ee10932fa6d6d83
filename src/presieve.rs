//! Pre-sieve template for the primes 7, 11 and 13.
//!
//! Multiples of 2, 3 and 5 never appear in the sieve array (wheel-30 layout).
//! The next three primes are removed by copying a precomputed pattern instead
//! of crossing them off: 7·11·13 = 1001 bytes cover 30030 numbers, after which
//! the pattern repeats exactly. Roughly 28% of the remaining candidates are
//! eliminated this way before any wheel sieving starts.

use crate::wheel::BIT_VALUES;
use std::sync::OnceLock;

/// Primes whose multiples the template removes.
pub const PRE_SIEVE_PRIMES: [u64; 3] = [7, 11, 13];

/// Largest pre-sieved prime. Sieving primes start above this.
pub const MAX_PRE_SIEVE_PRIME: u64 = 13;

const PERIOD: usize = 7 * 11 * 13;

#[derive(Debug, Clone)]
pub struct PreSieve {
    pattern: Vec<u8>,
}

impl PreSieve {
    pub fn new() -> Self {
        let pattern = (0..PERIOD as u64)
            .map(|b| {
                BIT_VALUES.iter().enumerate().fold(0xffu8, |byte, (i, &v)| {
                    let n = 30 * b + v;
                    if PRE_SIEVE_PRIMES.iter().any(|&p| n % p == 0) {
                        byte & !(1 << i)
                    } else {
                        byte
                    }
                })
            })
            .collect();
        PreSieve { pattern }
    }

    /// Process-wide template, built on first use.
    pub fn shared() -> &'static PreSieve {
        static SHARED: OnceLock<PreSieve> = OnceLock::new();
        SHARED.get_or_init(PreSieve::new)
    }

    /// Overwrite `segment` with the pattern aligned to `segment_low`, which
    /// must be a multiple of 30.
    pub fn apply(&self, segment: &mut [u8], segment_low: u64) {
        debug_assert_eq!(segment_low % 30, 0);
        let mut offset = ((segment_low / 30) % PERIOD as u64) as usize;
        let mut pos = 0;
        while pos < segment.len() {
            let n = (PERIOD - offset).min(segment.len() - pos);
            segment[pos..pos + n].copy_from_slice(&self.pattern[offset..offset + n]);
            pos += n;
            offset = 0;
        }
        // The pattern clears 7, 11 and 13 themselves
        if segment_low == 0 && !segment.is_empty() {
            segment[0] |= 0b0000_0111;
        }
    }
}

impl Default for PreSieve {
    fn default() -> Self {
        PreSieve::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(segment: &[u8], low: u64) -> Vec<u64> {
        let mut out = Vec::new();
        for (b, &byte) in segment.iter().enumerate() {
            for (i, &v) in BIT_VALUES.iter().enumerate() {
                if byte & (1 << i) != 0 {
                    out.push(low + 30 * b as u64 + v);
                }
            }
        }
        out
    }

    #[test]
    fn pattern_length_and_density() {
        let pre = PreSieve::new();
        assert_eq!(pre.pattern.len(), 1001);
        // φ(30030) = 5760 survivors per period
        let ones: u32 = pre.pattern.iter().map(|b| b.count_ones()).sum();
        assert_eq!(ones, 5760);
    }

    /// Every surviving bit is coprime to 7·11·13 and every cleared bit is a
    /// multiple, except 7, 11 and 13 in the first segment.
    #[test]
    fn first_segment_restores_presieved_primes() {
        let mut segment = vec![0u8; 300];
        PreSieve::shared().apply(&mut segment, 0);
        let survivors = decode(&segment, 0);
        assert_eq!(&survivors[..6], &[7, 11, 13, 17, 19, 23]);
        assert!(!survivors.contains(&49));
        assert!(!survivors.contains(&77));
        assert!(!survivors.contains(&169));
        for n in survivors.iter().copied().filter(|&n| n > 13) {
            assert!(PRE_SIEVE_PRIMES.iter().all(|p| n % p != 0), "{} survived", n);
        }
    }

    /// A segment that starts mid-period, and one that wraps the period
    /// boundary, must match the pattern computed directly from the numbers.
    #[test]
    fn alignment_across_period_boundary() {
        let pre = PreSieve::new();
        for low in [30u64 * 995, 30 * 1001 * 7, 30 * 123_457] {
            let mut segment = vec![0u8; 2500];
            pre.apply(&mut segment, low);
            for (b, &byte) in segment.iter().enumerate() {
                for (i, &v) in BIT_VALUES.iter().enumerate() {
                    let n = low + 30 * b as u64 + v;
                    let expect = PRE_SIEVE_PRIMES.iter().all(|p| n % p != 0);
                    assert_eq!(byte & (1 << i) != 0, expect, "n = {}", n);
                }
            }
        }
    }
}
