//! # EratBig — Bucket Sieve for Big Sieving Primes
//!
//! Big sieving primes have, on average, less than one multiple per segment.
//! Visiting each of them every segment would spend most of the time on primes
//! with nothing to do, so each prime is instead filed under the segment that
//! contains its next multiple and only touched when that segment is sieved.
//!
//! ## Algorithm: Segment Ring
//!
//! `lists` is a ring of bucket-list heads whose length is a power of two
//! larger than the farthest any multiple can be scheduled ahead
//! (`sieve_size + 10·(max_prime/30 + 1) + 10` bytes, the widest mod-210 wheel
//! gap being 10). A record whose next multiple lies in absolute segment `k`
//! is filed in slot `k & (len − 1)`. `cross_off` drains only the slot of the
//! current segment: each record clears one bit, advances one wheel step and
//! is re-filed, possibly into the same slot, which is then drained again.
//!
//! ## Bucket Arena
//!
//! Records live in fixed-capacity buckets inside one arena (`BucketPool`)
//! addressed by `u32` handles. A bucket is either on the stock free-list or on
//! exactly one slot list. Emptied buckets go back to stock immediately, so
//! the arena stays proportional to the number of big primes rather than
//! primes × segments. Arena growth uses `try_reserve`; failure surfaces as
//! `SieveError::ResourceExhausted`.
//!
//! ## Record Encoding
//!
//! | Field          | Bits  | Meaning                          |
//! |----------------|-------|----------------------------------|
//! | multiple index | 0–22  | byte offset inside its segment   |
//! | wheel index    | 23–31 | position in the mod-210 wheel    |
//! | sieving prime  | 32 b  | `p / 30` (separate word)         |

use crate::error::SieveError;
use crate::wheel::WHEEL210;
use tracing::debug;

/// Records per bucket (8 KiB buckets).
pub const BUCKET_CAPACITY: usize = 1024;
const MIN_BUCKETS_PER_ALLOC: usize = 16;
const MAX_BUCKETS_PER_ALLOC: usize = 1024;
const NO_BUCKET: u32 = u32::MAX;
const WHEEL_INDEX_SHIFT: u32 = 23;
const MULTIPLE_INDEX_MASK: u32 = (1 << WHEEL_INDEX_SHIFT) - 1;

/// Packed scheduling record of one big sieving prime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketPrime {
    indexes: u32,
    sieving_prime: u32,
}

impl BucketPrime {
    fn new(sieving_prime: u32, multiple_index: u64, wheel_index: u32) -> Self {
        debug_assert!(multiple_index <= MULTIPLE_INDEX_MASK as u64);
        debug_assert!(wheel_index < 1 << (32 - WHEEL_INDEX_SHIFT));
        BucketPrime {
            indexes: (wheel_index << WHEEL_INDEX_SHIFT) | multiple_index as u32,
            sieving_prime,
        }
    }

    #[inline]
    pub fn multiple_index(&self) -> usize {
        (self.indexes & MULTIPLE_INDEX_MASK) as usize
    }

    #[inline]
    pub fn wheel_index(&self) -> usize {
        (self.indexes >> WHEEL_INDEX_SHIFT) as usize
    }

    #[inline]
    pub fn sieving_prime(&self) -> u32 {
        self.sieving_prime
    }
}

#[derive(Debug, Clone, Copy)]
struct BucketHeader {
    len: u32,
    next: u32,
}

/// Arena of fixed-capacity buckets with a stock free-list.
#[derive(Debug)]
pub struct BucketPool {
    entries: Vec<BucketPrime>,
    headers: Vec<BucketHeader>,
    stock: u32,
}

impl Default for BucketPool {
    fn default() -> Self {
        BucketPool {
            entries: Vec::new(),
            headers: Vec::new(),
            stock: NO_BUCKET,
        }
    }
}

impl BucketPool {
    /// Take an empty bucket from stock, growing the arena if stock is empty.
    /// The bucket is linked in front of `next`.
    fn acquire(&mut self, next: u32) -> Result<u32, SieveError> {
        if self.stock == NO_BUCKET {
            self.grow()?;
        }
        let id = self.stock;
        self.stock = self.headers[id as usize].next;
        self.headers[id as usize] = BucketHeader { len: 0, next };
        Ok(id)
    }

    fn recycle(&mut self, id: u32) {
        self.headers[id as usize] = BucketHeader {
            len: 0,
            next: self.stock,
        };
        self.stock = id;
    }

    fn grow(&mut self) -> Result<(), SieveError> {
        let count = (self.headers.len() / 2).clamp(MIN_BUCKETS_PER_ALLOC, MAX_BUCKETS_PER_ALLOC);
        let first = self.headers.len();
        if first + count >= NO_BUCKET as usize {
            return Err(SieveError::exhausted("bucket pool", "bucket handles exhausted"));
        }
        self.entries
            .try_reserve_exact(count * BUCKET_CAPACITY)
            .map_err(|e| SieveError::exhausted("bucket pool", e))?;
        self.headers
            .try_reserve_exact(count)
            .map_err(|e| SieveError::exhausted("bucket pool", e))?;
        self.entries
            .resize(self.entries.len() + count * BUCKET_CAPACITY, BucketPrime::default());
        self.headers
            .resize(first + count, BucketHeader { len: 0, next: NO_BUCKET });
        // Link the new buckets into stock in ascending order
        for id in (first..first + count).rev() {
            self.headers[id].next = self.stock;
            self.stock = id as u32;
        }
        debug!(
            buckets = self.headers.len(),
            bytes = self.entries.len() * std::mem::size_of::<BucketPrime>(),
            "bucket pool grown"
        );
        Ok(())
    }

    #[inline]
    fn is_full(&self, id: u32) -> bool {
        self.headers[id as usize].len as usize == BUCKET_CAPACITY
    }

    #[inline]
    fn push(&mut self, id: u32, prime: BucketPrime) {
        let header = &mut self.headers[id as usize];
        self.entries[id as usize * BUCKET_CAPACITY + header.len as usize] = prime;
        header.len += 1;
    }

    /// Total buckets ever allocated.
    pub fn allocated(&self) -> usize {
        self.headers.len()
    }

    /// Buckets currently on the stock free-list.
    pub fn in_stock(&self) -> usize {
        let mut count = 0;
        let mut id = self.stock;
        while id != NO_BUCKET {
            count += 1;
            id = self.headers[id as usize].next;
        }
        count
    }
}

/// Bucket sieve for primes with less than one multiple per segment.
#[derive(Debug)]
pub struct EratBig {
    stop: u64,
    max_prime: u64,
    log2_sieve_size: u32,
    sieve_mask: u64,
    lists: Vec<u32>,
    slot_mask: u64,
    /// Number of segments sieved so far; the slot of the current segment is
    /// `segment & slot_mask`.
    segment: u64,
    pool: BucketPool,
}

impl EratBig {
    pub fn new(stop: u64, sieve_size: usize, max_prime: u64) -> Result<Self, SieveError> {
        assert!(sieve_size.is_power_of_two());
        assert!(sieve_size <= MULTIPLE_INDEX_MASK as usize + 1);
        let log2_sieve_size = sieve_size.trailing_zeros();
        let max_index = sieve_size as u64 + (max_prime / 30 + 1) * 10 + 10;
        let max_segments = max_index >> log2_sieve_size;
        let slots = (max_segments + 1).next_power_of_two() as usize;
        let mut lists = Vec::new();
        lists
            .try_reserve_exact(slots)
            .map_err(|e| SieveError::exhausted("bucket ring", e))?;
        lists.resize(slots, NO_BUCKET);
        Ok(EratBig {
            stop,
            max_prime,
            log2_sieve_size,
            sieve_mask: sieve_size as u64 - 1,
            lists,
            slot_mask: slots as u64 - 1,
            segment: 0,
            pool: BucketPool::default(),
        })
    }

    /// Ring length (a power of two).
    pub fn slots(&self) -> usize {
        self.lists.len()
    }

    pub fn pool(&self) -> &BucketPool {
        &self.pool
    }

    /// File `prime` under the segment of its first multiple ≥ `segment_low`.
    /// `segment_low` must be the low bound of the segment about to be sieved.
    pub fn add_sieving_prime(&mut self, prime: u64, segment_low: u64) -> Result<(), SieveError> {
        assert!(prime <= self.max_prime, "{} is not a big sieving prime", prime);
        match WHEEL210.first_multiple(prime, segment_low, self.stop) {
            Some((multiple_index, wheel_index)) => {
                self.schedule((prime / 30) as u32, multiple_index, wheel_index)
            }
            None => Ok(()),
        }
    }

    /// File a record whose multiple is `multiple_index` bytes past the low
    /// bound of the current segment.
    #[inline]
    fn schedule(&mut self, sieving_prime: u32, multiple_index: u64, wheel_index: u32) -> Result<(), SieveError> {
        let ahead = multiple_index >> self.log2_sieve_size;
        assert!(ahead <= self.slot_mask, "multiple scheduled beyond the bucket ring");
        let slot = ((self.segment + ahead) & self.slot_mask) as usize;
        let record = BucketPrime::new(sieving_prime, multiple_index & self.sieve_mask, wheel_index);
        let mut head = self.lists[slot];
        if head == NO_BUCKET || self.pool.is_full(head) {
            head = self.pool.acquire(head)?;
            self.lists[slot] = head;
        }
        self.pool.push(head, record);
        Ok(())
    }

    /// Cross off the multiples that fall into the current segment, then move
    /// on to the next segment.
    pub fn cross_off(&mut self, sieve: &mut [u8]) -> Result<(), SieveError> {
        debug_assert_eq!(sieve.len() as u64, self.sieve_mask + 1);
        let slot = (self.segment & self.slot_mask) as usize;
        let wheel = WHEEL210.elements;
        while self.lists[slot] != NO_BUCKET {
            let mut bucket = std::mem::replace(&mut self.lists[slot], NO_BUCKET);
            while bucket != NO_BUCKET {
                let BucketHeader { len, next } = self.pool.headers[bucket as usize];
                let base = bucket as usize * BUCKET_CAPACITY;
                for i in base..base + len as usize {
                    let record = self.pool.entries[i];
                    let e = wheel[record.wheel_index()];
                    let index = record.multiple_index();
                    sieve[index] &= e.unset_bit;
                    let next_index = index as u64
                        + record.sieving_prime as u64 * e.next_multiple_factor as u64
                        + e.correct as u64;
                    self.schedule(record.sieving_prime, next_index, e.next as u32)?;
                }
                self.pool.recycle(bucket);
                bucket = next;
            }
        }
        self.segment += 1;
        Ok(())
    }

    /// Every scheduled record as `(slot, prime, multiple_index, wheel_index)`.
    #[cfg(test)]
    fn scheduled(&self) -> Vec<(usize, u64, usize, usize)> {
        let mut out = Vec::new();
        for (slot, &head) in self.lists.iter().enumerate() {
            let mut bucket = head;
            while bucket != NO_BUCKET {
                let header = self.pool.headers[bucket as usize];
                let base = bucket as usize * BUCKET_CAPACITY;
                for record in &self.pool.entries[base..base + header.len as usize] {
                    let prime = WHEEL210.prime_of(record.sieving_prime, record.wheel_index() as u32);
                    out.push((slot, prime, record.multiple_index(), record.wheel_index()));
                }
                bucket = header.next;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    //! # EratBig Tests
    //!
    //! The scheduling invariant is checked white-box: after every batch of
    //! `cross_off` calls, each big prime must be filed exactly once, in the
    //! slot of the segment holding its next wheel multiple, with the right
    //! in-segment byte and bit. The next multiple is recomputed by brute
    //! force as the smallest `p·q ≥ max(p², low + 7)` with `gcd(q, 210) = 1`.

    use super::*;
    use crate::wheel::{residue_class, BIT_VALUES};
    use std::collections::{BTreeSet, HashMap};

    const SIEVE_SIZE: usize = 256;
    const SEGMENT_SPAN: u64 = 30 * SIEVE_SIZE as u64;

    fn primes_between(lo: u64, hi: u64) -> Vec<u64> {
        (lo..=hi)
            .filter(|&n| n > 1 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0))
            .collect()
    }

    fn coprime_210(q: u64) -> bool {
        q % 2 != 0 && q % 3 != 0 && q % 5 != 0 && q % 7 != 0
    }

    fn next_multiple(p: u64, low: u64) -> u64 {
        let q = ((low + 6) / p + 1).max(p);
        (q..).find(|&q| coprime_210(q)).unwrap() * p
    }

    fn check_invariant(erat: &EratBig, primes: &[u64], base_low: u64, segments_done: u64) {
        let low = base_low + segments_done * SEGMENT_SPAN;
        let records = erat.scheduled();
        let mut seen: HashMap<u64, usize> = HashMap::new();
        for &(slot, prime, index, wheel_index) in &records {
            *seen.entry(prime).or_default() += 1;
            let n = next_multiple(prime, low);
            let byte = (n - base_low - 6) / 30;
            let segment = byte / SIEVE_SIZE as u64;
            assert_eq!(slot as u64, segment & (erat.slots() as u64 - 1), "slot of {}", prime);
            assert_eq!(index as u64, byte % SIEVE_SIZE as u64, "index of {}", prime);
            let bit = !WHEEL210.elements[wheel_index].unset_bit;
            assert_eq!(bit, 1 << residue_class(n % 30), "bit of {}", prime);
        }
        for &p in primes {
            assert_eq!(seen.get(&p), Some(&1), "{} filed {:?} times", p, seen.get(&p));
        }
        assert_eq!(seen.len(), primes.len());
    }

    /// Drive 600 segments of 256 bytes over a range starting at 1.2·10^9 with
    /// every prime in (2000, 34000] as a big prime, checking the slot
    /// invariant after each of several batches and the cleared bits of every
    /// segment.
    #[test]
    fn slot_invariant_holds_across_segments() {
        let base_low = 30 * 40_000_000u64;
        let stop = base_low + 600 * SEGMENT_SPAN;
        let max_prime = 34_000u64;
        assert!(max_prime * max_prime < base_low);
        let primes = primes_between(2001, max_prime);
        let mut erat = EratBig::new(stop, SIEVE_SIZE, max_prime).unwrap();
        assert!(erat.slots().is_power_of_two());
        for &p in &primes {
            erat.add_sieving_prime(p, base_low).unwrap();
        }
        check_invariant(&erat, &primes, base_low, 0);

        for segment in 0..600u64 {
            let low = base_low + segment * SEGMENT_SPAN;
            let mut sieve = vec![0xffu8; SIEVE_SIZE];
            erat.cross_off(&mut sieve).unwrap();

            let mut expect = BTreeSet::new();
            let high = low + SEGMENT_SPAN + 1;
            for &p in &primes {
                let mut q = ((low + 6) / p + 1).max(p);
                while p * q <= high {
                    if coprime_210(q) {
                        expect.insert(p * q);
                    }
                    q += 1;
                }
            }
            let mut got = BTreeSet::new();
            for (b, &byte) in sieve.iter().enumerate() {
                for (i, &v) in BIT_VALUES.iter().enumerate() {
                    if byte & (1 << i) == 0 {
                        got.insert(low + 30 * b as u64 + v);
                    }
                }
            }
            assert_eq!(got, expect, "segment {}", segment);

            if segment % 97 == 0 || segment == 599 {
                check_invariant(&erat, &primes, base_low, segment + 1);
            }
        }
    }

    /// Emptied buckets return to stock: after sieving, every allocated
    /// bucket is either in stock or holding records, and the arena did not
    /// keep growing with the number of segments.
    #[test]
    fn buckets_are_recycled() {
        let base_low = 30 * 40_000_000u64;
        let stop = u64::MAX;
        let primes = primes_between(2001, 20_000);
        let mut erat = EratBig::new(stop, SIEVE_SIZE, 20_000).unwrap();
        for &p in &primes {
            erat.add_sieving_prime(p, base_low).unwrap();
        }
        let mut sieve = vec![0xffu8; SIEVE_SIZE];
        for _ in 0..200 {
            erat.cross_off(&mut sieve).unwrap();
        }
        let allocated_early = erat.pool().allocated();
        for _ in 0..2000 {
            erat.cross_off(&mut sieve).unwrap();
        }
        assert_eq!(erat.pool().allocated(), allocated_early);
        let non_empty = erat.lists.iter().filter(|&&h| h != NO_BUCKET).count();
        // each non-empty slot holds exactly one partially filled bucket here
        assert_eq!(erat.pool().in_stock() + non_empty, erat.pool().allocated());
        assert_eq!(erat.scheduled().len(), primes.len());
    }

    #[test]
    fn record_packing() {
        let r = BucketPrime::new(123_456_789, MULTIPLE_INDEX_MASK as u64, 383);
        assert_eq!(r.multiple_index(), MULTIPLE_INDEX_MASK as usize);
        assert_eq!(r.wheel_index(), 383);
        assert_eq!(r.sieving_prime(), 123_456_789);
    }

    #[test]
    #[should_panic(expected = "not a big sieving prime")]
    fn rejects_prime_above_max() {
        let mut erat = EratBig::new(1 << 40, SIEVE_SIZE, 1000).unwrap();
        let _ = erat.add_sieving_prime(1009, 0);
    }
}
