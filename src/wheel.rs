//! # Wheel — Modulo 30 and Modulo 210 Wheel Tables
//!
//! The sieve stores one byte per 30 numbers. Bit `i` of byte `b` in a segment
//! starting at `low` stands for `low + 30·b + BIT_VALUES[i]`, so the eight
//! residues coprime to 30 are the only positions that exist. Numbers that are
//! `1 (mod 30)` live in bit 7 of the *preceding* byte (offset 31).
//!
//! ## Algorithm: Wheel Walk
//!
//! A sieving prime `p = 30·s + r` only needs to cross off multiples `p·q` with
//! `q` coprime to the wheel modulus M (30 or 210). For consecutive wheel
//! factors `q → q + f`, the byte index advances by
//!
//! ```text
//! Δbyte = s·f + ⌊(((r·q − 6) mod 30) + r·f) / 30⌋
//! ```
//!
//! where the second term (the *correction*) depends only on `r` and the wheel
//! position of `q`. The tables below precompute, for each of the 8 prime
//! residue classes and each wheel position, the bit to clear, `f`, the
//! correction, and the next table index. Offsets are measured from `low + 6`
//! so that `(n − low − 6) / 30` is exactly the byte index of `n`.
//!
//! Both tables are built by `const fn` at compile time.
//!
//! | Wheel | Positions | Elements | Max factor | Used by              |
//! |-------|-----------|----------|------------|----------------------|
//! | 30    | 8         | 64       | 6          | EratSmall            |
//! | 210   | 48        | 384      | 10         | EratMedium, EratBig  |

/// Offsets of the eight bits of a sieve byte from `30·b`.
pub const BIT_VALUES: [u64; 8] = [7, 11, 13, 17, 19, 23, 29, 31];

/// One step of a wheel walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelElement {
    /// Mask with the bit of the current multiple cleared.
    pub unset_bit: u8,
    /// Distance in wheel factors to the next multiple.
    pub next_multiple_factor: u8,
    /// Byte correction added on top of `sieving_prime · next_multiple_factor`.
    pub correct: u8,
    /// Table index of the next element.
    pub next: u16,
}

/// Maps `quotient mod M` to the first wheel factor `≥ quotient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelInit {
    pub next_multiple_factor: u8,
    pub wheel_index: u8,
}

/// A sieving prime as held by EratSmall and EratMedium.
///
/// `sieving_prime` is `p / 30`; the residue `p mod 30` is implied by the
/// residue class encoded in `wheel_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SievingPrime {
    pub sieving_prime: u32,
    pub multiple_index: u32,
    pub wheel_index: u32,
}

impl SievingPrime {
    pub fn new(prime: u64, multiple_index: u64, wheel_index: u32) -> Self {
        SievingPrime {
            sieving_prime: (prime / 30) as u32,
            multiple_index: multiple_index as u32,
            wheel_index,
        }
    }

    /// Recover the prime value from its compressed form.
    pub fn prime(&self, wheel: &Wheel) -> u64 {
        wheel.prime_of(self.sieving_prime, self.wheel_index)
    }
}

/// A wheel: its modulus plus init and element tables.
#[derive(Debug)]
pub struct Wheel {
    pub modulo: u64,
    pub positions: usize,
    pub init: &'static [WheelInit],
    pub elements: &'static [WheelElement],
}

pub static WHEEL30: Wheel = Wheel {
    modulo: 30,
    positions: 8,
    init: &WHEEL30_INIT,
    elements: &WHEEL30_ELEMENTS,
};

pub static WHEEL210: Wheel = Wheel {
    modulo: 210,
    positions: 48,
    init: &WHEEL210_INIT,
    elements: &WHEEL210_ELEMENTS,
};

static WHEEL30_INIT: [WheelInit; 30] = build_init::<8, 30>();
static WHEEL30_ELEMENTS: [WheelElement; 64] = build_elements::<8, 64>(30);
static WHEEL210_INIT: [WheelInit; 210] = build_init::<48, 210>();
static WHEEL210_ELEMENTS: [WheelElement; 384] = build_elements::<48, 384>(210);

impl Wheel {
    /// First multiple of `prime` to cross off in the segment whose low bound
    /// is `segment_low`: the smallest `p·q ≥ max(p², segment_low + 7)` with
    /// `q` coprime to the modulus.
    ///
    /// Returns `(multiple_index, wheel_index)` where `multiple_index` is the
    /// byte offset from `segment_low` (possibly beyond the current segment),
    /// or `None` if that multiple exceeds `stop`.
    pub fn first_multiple(&self, prime: u64, segment_low: u64, stop: u64) -> Option<(u64, u32)> {
        debug_assert_eq!(segment_low % 30, 0);
        debug_assert!(prime > 5);
        let low = segment_low + 6;
        let quotient = (low / prime + 1).max(prime);
        let multiple = prime.checked_mul(quotient)?;
        if multiple > stop {
            return None;
        }
        let init = self.init[(quotient % self.modulo) as usize];
        let distance = prime * init.next_multiple_factor as u64;
        if distance > stop - multiple {
            return None;
        }
        let multiple_index = (multiple - low + distance) / 30;
        let wheel_index = residue_class(prime % 30) * self.positions + init.wheel_index as usize;
        Some((multiple_index, wheel_index as u32))
    }

    /// Prime value from `p / 30` and a wheel index.
    pub fn prime_of(&self, sieving_prime: u32, wheel_index: u32) -> u64 {
        let class = wheel_index as usize / self.positions;
        sieving_prime as u64 * 30 + BIT_VALUES[class] % 30
    }
}

/// Bit position of a residue coprime to 30. Residue classes of sieving primes
/// use the same ordering.
pub const fn residue_class(residue: u64) -> usize {
    match residue {
        7 => 0,
        11 => 1,
        13 => 2,
        17 => 3,
        19 => 4,
        23 => 5,
        29 => 6,
        1 => 7,
        _ => panic!("residue not coprime to 30"),
    }
}

/// Mask of the bits whose offset is `≤ limit` (limit relative to `30·b`).
pub fn bits_up_to(limit: u64) -> u8 {
    BIT_VALUES
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v <= limit)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

const fn coprime_residues<const N: usize>(modulo: u64) -> [u64; N] {
    let mut out = [0u64; N];
    let mut count = 0;
    let mut i = 1;
    while i < modulo {
        if gcd(i, modulo) == 1 {
            out[count] = i;
            count += 1;
        }
        i += 1;
    }
    assert!(count == N);
    out
}

const fn build_init<const N: usize, const M: usize>() -> [WheelInit; M] {
    let modulo = M as u64;
    let residues = coprime_residues::<N>(modulo);
    let mut table = [WheelInit {
        next_multiple_factor: 0,
        wheel_index: 0,
    }; M];
    let mut q = 0;
    while q < M {
        let mut k = 0;
        while gcd((q + k) as u64, modulo) != 1 {
            k += 1;
        }
        let mut pos = 0;
        while residues[pos] != (q + k) as u64 {
            pos += 1;
        }
        table[q] = WheelInit {
            next_multiple_factor: k as u8,
            wheel_index: pos as u8,
        };
        q += 1;
    }
    table
}

const fn build_elements<const N: usize, const LEN: usize>(modulo: u64) -> [WheelElement; LEN] {
    assert!(LEN == 8 * N);
    let residues = coprime_residues::<N>(modulo);
    let mut table = [WheelElement {
        unset_bit: 0,
        next_multiple_factor: 0,
        correct: 0,
        next: 0,
    }; LEN];
    let mut class = 0;
    while class < 8 {
        let r = BIT_VALUES[class] % 30;
        let mut pos = 0;
        while pos < N {
            let q = residues[pos];
            let next_pos = (pos + 1) % N;
            let factor = if next_pos == 0 {
                residues[0] + modulo - q
            } else {
                residues[next_pos] - q
            };
            let n = (r * q) % 30;
            let offset = (n + 24) % 30;
            table[class * N + pos] = WheelElement {
                unset_bit: !(1u8 << residue_class(n)),
                next_multiple_factor: factor as u8,
                correct: ((offset + r * factor) / 30) as u8,
                next: (class * N + next_pos) as u16,
            };
            pos += 1;
        }
        class += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    //! Wheel table tests.
    //!
    //! The decisive check walks each wheel for many primes and compares every
    //! step against brute-force enumeration of `p·q` with `q` coprime to the
    //! modulus: the byte index must equal `(p·q − 6) / 30` and the cleared
    //! bit must be the one for `p·q mod 30`.

    use super::*;

    fn is_coprime(q: u64, m: u64) -> bool {
        gcd(q, m) == 1
    }

    fn walk(wheel: &Wheel, p: u64, steps: usize) -> Vec<(u64, u8)> {
        let (mut index, mut wi) = wheel.first_multiple(p, 0, u64::MAX).unwrap();
        let s = p / 30;
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let e = wheel.elements[wi as usize];
            out.push((index, !e.unset_bit));
            index += s * e.next_multiple_factor as u64 + e.correct as u64;
            wi = e.next as u32;
        }
        out
    }

    fn expected(wheel: &Wheel, p: u64, steps: usize) -> Vec<(u64, u8)> {
        (p..)
            .filter(|&q| is_coprime(q, wheel.modulo))
            .take(steps)
            .map(|q| {
                let m = p * q;
                ((m - 6) / 30, 1u8 << residue_class(m % 30))
            })
            .collect()
    }

    fn small_primes_above_13(limit: u64) -> Vec<u64> {
        (17..=limit)
            .filter(|&n| (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0))
            .collect()
    }

    // ── Table shape ─────────────────────────────────────────────────

    #[test]
    fn table_sizes() {
        assert_eq!(WHEEL30.elements.len(), 64);
        assert_eq!(WHEEL30.init.len(), 30);
        assert_eq!(WHEEL210.elements.len(), 384);
        assert_eq!(WHEEL210.init.len(), 210);
    }

    /// Each residue class is a closed cycle: following `next` from any
    /// element returns to it after exactly `positions` steps, and the factors
    /// along the cycle sum to the modulus.
    #[test]
    fn cycles_close() {
        for wheel in [&WHEEL30, &WHEEL210] {
            for start in 0..wheel.elements.len() {
                let mut i = start;
                let mut total = 0u64;
                for _ in 0..wheel.positions {
                    total += wheel.elements[i].next_multiple_factor as u64;
                    i = wheel.elements[i].next as usize;
                    assert_eq!(i / wheel.positions, start / wheel.positions);
                }
                assert_eq!(i, start);
                assert_eq!(total, wheel.modulo);
            }
        }
    }

    #[test]
    fn init_points_at_next_coprime() {
        for wheel in [&WHEEL30, &WHEEL210] {
            for q in 0..wheel.modulo {
                let init = wheel.init[q as usize];
                let target = q + init.next_multiple_factor as u64;
                assert!(is_coprime(target, wheel.modulo));
                assert!((q..target).all(|x| !is_coprime(x, wheel.modulo)));
            }
        }
        assert_eq!(WHEEL210.init.iter().map(|i| i.next_multiple_factor).max(), Some(9));
    }

    // ── Wheel walk ──────────────────────────────────────────────────

    /// Two full wheel cycles for every prime up to 3000, both wheels. Covers
    /// all eight residue classes and primes below 30 where `s = 0`.
    #[test]
    fn walk_matches_brute_force() {
        for p in small_primes_above_13(3000) {
            for wheel in [&WHEEL30, &WHEEL210] {
                let steps = 2 * wheel.positions + 3;
                assert_eq!(walk(wheel, p, steps), expected(wheel, p, steps), "p = {}", p);
            }
        }
    }

    /// When the segment starts beyond p², the first multiple is the smallest
    /// wheel multiple strictly above `segment_low + 6`.
    #[test]
    fn first_multiple_after_segment_low() {
        let p = 101u64;
        for segment_low in [30_000u64, 300_000, 123_456_780] {
            let (index, wi) = WHEEL210.first_multiple(p, segment_low, u64::MAX).unwrap();
            let q = (segment_low + 6) / p + 1;
            let q = (q..).find(|&q| is_coprime(q, 210)).unwrap();
            let m = p * q;
            assert_eq!(index, (m - segment_low - 6) / 30);
            assert_eq!(!WHEEL210.elements[wi as usize].unset_bit, 1 << residue_class(m % 30));
            assert_eq!(WHEEL210.prime_of((p / 30) as u32, wi), p);
        }
    }

    #[test]
    fn first_multiple_beyond_stop() {
        assert_eq!(WHEEL30.first_multiple(17, 0, 288), None);
        assert!(WHEEL30.first_multiple(17, 0, 289).is_some());
        // 19·21 = 399 is the first multiple above 396, the wheel moves on to 19·23 = 437
        assert!(WHEEL210.first_multiple(19, 390, 436).is_none());
        assert!(WHEEL210.first_multiple(19, 390, 437).is_some());
        assert_eq!(WHEEL210.first_multiple(101, 30_000, 30_005), None);
    }

    #[test]
    fn bits_up_to_masks() {
        assert_eq!(bits_up_to(6), 0);
        assert_eq!(bits_up_to(7), 0b0000_0001);
        assert_eq!(bits_up_to(13), 0b0000_0111);
        assert_eq!(bits_up_to(30), 0b0111_1111);
        assert_eq!(bits_up_to(31), 0xff);
    }
}
