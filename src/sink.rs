//! # Sink — Consumers of Finished Segments
//!
//! `SegmentedSieve` hands every finished, clipped segment to a [`Sink`]. The
//! set of consumers is closed, so `Sink` is an enum dispatched by `match`:
//!
//! | Variant        | Per segment                               | Merge          |
//! |----------------|-------------------------------------------|----------------|
//! | `Count`        | popcount of the segment                   | sum            |
//! | `CountTuplets` | byte-wise bitmask matching of one k-tuplet| sum            |
//! | `Collect`      | decode set bits into `Vec<u64>`           | ordered append |
//! | `Print`        | write primes / tuplets, one per line      | sum of lines   |
//!
//! ## Algorithm: k-Tuplet Detection
//!
//! Every prime k-tuplet whose first member is ≥ 7 lies within one sieve byte
//! (30 numbers, offsets 7..31), so each pattern is a fixed byte bitmask,
//! e.g. twins `{11,13} → 0x06`, `{17,19} → 0x18`, `{29,31} → 0xc0`. A byte
//! contains the tuplet iff `byte & mask == mask`. Tuplets containing 2, 3 or
//! 5 cannot be represented and come from a small table instead.

use crate::error::SieveError;
use crate::wheel::BIT_VALUES;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufWriter, Write};

/// What to count or print.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PrimeKind {
    Primes,
    Twins,
    Triplets,
    Quadruplets,
    Quintuplets,
    Sextuplets,
}

impl PrimeKind {
    pub const ALL: [PrimeKind; 6] = [
        PrimeKind::Primes,
        PrimeKind::Twins,
        PrimeKind::Triplets,
        PrimeKind::Quadruplets,
        PrimeKind::Quintuplets,
        PrimeKind::Sextuplets,
    ];

    /// Number of primes in one tuplet of this kind.
    pub fn arity(self) -> usize {
        self as usize + 1
    }

    /// Kind whose tuplets have `k` members, for `k` in `1..=6`.
    pub fn from_arity(k: usize) -> Option<PrimeKind> {
        PrimeKind::ALL.get(k.checked_sub(1)?).copied()
    }

    /// Admissible offset patterns.
    pub fn patterns(self) -> &'static [&'static [u64]] {
        match self {
            PrimeKind::Primes => &[&[0]],
            PrimeKind::Twins => &[&[0, 2]],
            PrimeKind::Triplets => &[&[0, 2, 6], &[0, 4, 6]],
            PrimeKind::Quadruplets => &[&[0, 2, 6, 8]],
            PrimeKind::Quintuplets => &[&[0, 2, 6, 8, 12], &[0, 4, 6, 10, 12]],
            PrimeKind::Sextuplets => &[&[0, 4, 6, 10, 12, 16]],
        }
    }

    /// Byte bitmasks of every placement of the patterns inside one sieve byte.
    pub fn bitmasks(self) -> &'static [u8] {
        match self {
            PrimeKind::Primes => &[0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80],
            PrimeKind::Twins => &[0x06, 0x18, 0xc0],
            PrimeKind::Triplets => &[0x07, 0x0e, 0x1c, 0x38],
            PrimeKind::Quadruplets => &[0x1e],
            PrimeKind::Quintuplets => &[0x1f, 0x3e],
            PrimeKind::Sextuplets => &[0x3f],
        }
    }

    /// Lower-case name used on the command line and in reports.
    pub fn name(self) -> &'static str {
        match self {
            PrimeKind::Primes => "primes",
            PrimeKind::Twins => "twins",
            PrimeKind::Triplets => "triplets",
            PrimeKind::Quadruplets => "quadruplets",
            PrimeKind::Quintuplets => "quintuplets",
            PrimeKind::Sextuplets => "sextuplets",
        }
    }

    /// Human-readable plural used in text output, e.g. `Twin primes`.
    pub fn label(self) -> &'static str {
        match self {
            PrimeKind::Primes => "Primes",
            PrimeKind::Twins => "Twin primes",
            PrimeKind::Triplets => "Prime triplets",
            PrimeKind::Quadruplets => "Prime quadruplets",
            PrimeKind::Quintuplets => "Prime quintuplets",
            PrimeKind::Sextuplets => "Prime sextuplets",
        }
    }
}

impl fmt::Display for PrimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Primes and tuplets that involve 2, 3 or 5.
const SMALL_TUPLETS: [(PrimeKind, &[u64]); 8] = [
    (PrimeKind::Primes, &[2]),
    (PrimeKind::Primes, &[3]),
    (PrimeKind::Primes, &[5]),
    (PrimeKind::Twins, &[3, 5]),
    (PrimeKind::Twins, &[5, 7]),
    (PrimeKind::Triplets, &[5, 7, 11]),
    (PrimeKind::Quadruplets, &[5, 7, 11, 13]),
    (PrimeKind::Quintuplets, &[5, 7, 11, 13, 17]),
];

/// Small tuplets of `kind` lying entirely inside `[start, stop]`.
pub fn small_tuplets(kind: PrimeKind, start: u64, stop: u64) -> impl Iterator<Item = &'static [u64]> {
    SMALL_TUPLETS
        .iter()
        .filter(move |(k, members)| {
            *k == kind && start <= members[0] && members[members.len() - 1] <= stop
        })
        .map(|&(_, members)| members)
}

/// A finished segment: byte `b`, bit `i` stands for `low + 30·b + BIT_VALUES[i]`.
/// Bits outside `[start, stop]` have already been cleared.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub bytes: &'a [u8],
    pub low: u64,
}

impl<'a> Segment<'a> {
    /// Number of primes in the segment.
    pub fn count_ones(&self) -> u64 {
        let chunks = self.bytes.chunks_exact(8);
        let tail: u64 = chunks.remainder().iter().map(|b| b.count_ones() as u64).sum();
        chunks
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]).count_ones() as u64)
            .sum::<u64>()
            + tail
    }

    /// Number of tuplets of `kind` whose members all fall in this segment.
    pub fn count_tuplets(&self, kind: PrimeKind) -> u64 {
        let masks = kind.bitmasks();
        self.bytes
            .iter()
            .filter(|&&byte| byte != 0)
            .map(|&byte| masks.iter().filter(|&&m| byte & m == m).count() as u64)
            .sum()
    }

    /// Decoded primes in ascending order.
    pub fn primes(&self) -> SegmentPrimes<'a> {
        SegmentPrimes {
            chunks: self.bytes.chunks(8),
            word: 0,
            base: self.low,
            next_base: self.low,
        }
    }

    /// Decoded tuplets of `kind` in ascending order of their first member.
    pub fn tuplets(&self, kind: PrimeKind) -> impl Iterator<Item = Vec<u64>> + 'a {
        let low = self.low;
        let masks = kind.bitmasks();
        self.bytes.iter().enumerate().filter(|&(_, &byte)| byte != 0).flat_map(move |(b, &byte)| {
            // set bits never exceed stop, so base cannot overflow here
            let base = low + 30 * b as u64;
            masks.iter().filter(move |&&m| byte & m == m).map(move |&m| {
                (0..8)
                    .filter(|i| m & (1 << i) != 0)
                    .map(|i| base + BIT_VALUES[i])
                    .collect()
            })
        })
    }
}

/// Iterator over set bits of a segment, 64 bits at a time.
pub struct SegmentPrimes<'a> {
    chunks: std::slice::Chunks<'a, u8>,
    word: u64,
    base: u64,
    next_base: u64,
}

impl Iterator for SegmentPrimes<'_> {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        while self.word == 0 {
            let chunk = self.chunks.next()?;
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.word = u64::from_le_bytes(buf);
            self.base = self.next_base;
            self.next_base = self.next_base.wrapping_add(240);
        }
        let bit = self.word.trailing_zeros() as u64;
        self.word &= self.word - 1; // clear lowest set bit
        Some(self.base + 30 * (bit / 8) + BIT_VALUES[(bit % 8) as usize])
    }
}

/// Running prime count.
#[derive(Debug, Clone, Default)]
pub struct PrimeCounter {
    count: u64,
}

/// Running count of one tuplet kind.
#[derive(Debug, Clone)]
pub struct TupletCounter {
    kind: PrimeKind,
    count: u64,
}

/// Primes gathered in ascending order.
#[derive(Debug, Clone, Default)]
pub struct PrimeCollector {
    primes: Vec<u64>,
}

/// Buffered writer of one prime or tuplet per line.
pub struct PrimePrinter {
    kind: PrimeKind,
    out: BufWriter<Box<dyn Write + Send>>,
    printed: u64,
}

impl fmt::Debug for PrimePrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimePrinter")
            .field("kind", &self.kind)
            .field("printed", &self.printed)
            .finish_non_exhaustive()
    }
}

impl PrimePrinter {
    fn write_tuplet(&mut self, members: &[u64]) -> std::io::Result<()> {
        if let [p] = members {
            return writeln!(self.out, "{}", p);
        }
        write!(self.out, "(")?;
        for (i, m) in members.iter().enumerate() {
            if i > 0 {
                write!(self.out, ", ")?;
            }
            write!(self.out, "{}", m)?;
        }
        writeln!(self.out, ")")
    }
}

/// Consumer of finished segments.
///
/// ```
/// use segsieve::{PrimeKind, SegmentedSieve, Sink};
///
/// let mut sink = Sink::counter(PrimeKind::Twins);
/// SegmentedSieve::new(0, 100, 1 << 12).unwrap().run(&mut sink).unwrap();
/// assert_eq!(sink.count(), 8);
///
/// let mut sink = Sink::collector();
/// SegmentedSieve::new(20, 40, 1 << 12).unwrap().run(&mut sink).unwrap();
/// assert_eq!(sink.primes(), &[23, 29, 31, 37]);
/// ```
#[derive(Debug)]
pub enum Sink {
    Count(PrimeCounter),
    CountTuplets(TupletCounter),
    Collect(PrimeCollector),
    Print(PrimePrinter),
}

impl Sink {
    /// Counter for `kind` (plain primes or one tuplet kind).
    pub fn counter(kind: PrimeKind) -> Self {
        match kind {
            PrimeKind::Primes => Sink::Count(PrimeCounter::default()),
            kind => Sink::CountTuplets(TupletCounter { kind, count: 0 }),
        }
    }

    /// Collector of every prime in the range.
    pub fn collector() -> Self {
        Sink::Collect(PrimeCollector::default())
    }

    /// Collector with room for `capacity` primes reserved up front.
    pub fn try_collector(capacity: usize) -> Result<Self, SieveError> {
        let mut primes = Vec::new();
        primes
            .try_reserve_exact(capacity)
            .map_err(|e| SieveError::exhausted("prime collector", e))?;
        Ok(Sink::Collect(PrimeCollector { primes }))
    }

    /// Printer of primes or `(a, b, ...)` tuplets of `kind` to `out`.
    pub fn printer(kind: PrimeKind, out: Box<dyn Write + Send>) -> Self {
        Sink::Print(PrimePrinter {
            kind,
            out: BufWriter::new(out),
            printed: 0,
        })
    }

    /// Emit primes and tuplets that involve 2, 3 or 5.
    pub fn small_primes(&mut self, start: u64, stop: u64) -> Result<(), SieveError> {
        match self {
            Sink::Count(c) => c.count += small_tuplets(PrimeKind::Primes, start, stop).count() as u64,
            Sink::CountTuplets(t) => t.count += small_tuplets(t.kind, start, stop).count() as u64,
            Sink::Collect(c) => c
                .primes
                .extend(small_tuplets(PrimeKind::Primes, start, stop).map(|m| m[0])),
            Sink::Print(p) => {
                for members in small_tuplets(p.kind, start, stop) {
                    p.write_tuplet(members)?;
                    p.printed += 1;
                }
            }
        }
        Ok(())
    }

    /// Consume one finished segment. Only printing can fail.
    pub fn segment(&mut self, segment: &Segment) -> Result<(), SieveError> {
        match self {
            Sink::Count(c) => c.count += segment.count_ones(),
            Sink::CountTuplets(t) => t.count += segment.count_tuplets(t.kind),
            Sink::Collect(c) => c.primes.extend(segment.primes()),
            Sink::Print(p) => {
                if p.kind == PrimeKind::Primes {
                    for prime in segment.primes() {
                        writeln!(p.out, "{}", prime)?;
                        p.printed += 1;
                    }
                } else {
                    for members in segment.tuplets(p.kind) {
                        p.write_tuplet(&members)?;
                        p.printed += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Fold the result of a later, non-overlapping sub-range into this one.
    pub fn merge(&mut self, other: Sink) {
        match (self, other) {
            (Sink::Count(a), Sink::Count(b)) => a.count += b.count,
            (Sink::CountTuplets(a), Sink::CountTuplets(b)) => {
                assert_eq!(a.kind, b.kind, "merging counters of different kinds");
                a.count += b.count;
            }
            (Sink::Collect(a), Sink::Collect(mut b)) => a.primes.append(&mut b.primes),
            (Sink::Print(a), Sink::Print(b)) => a.printed += b.printed,
            _ => panic!("merging different sink variants"),
        }
    }

    /// Primes counted, tuplets counted, primes collected, or lines printed.
    pub fn count(&self) -> u64 {
        match self {
            Sink::Count(c) => c.count,
            Sink::CountTuplets(t) => t.count,
            Sink::Collect(c) => c.primes.len() as u64,
            Sink::Print(p) => p.printed,
        }
    }

    /// Primes collected so far; empty for every other sink.
    pub fn primes(&self) -> &[u64] {
        match self {
            Sink::Collect(c) => &c.primes,
            _ => &[],
        }
    }

    /// Move collected primes out, leaving the collector empty.
    pub fn take_primes(&mut self) -> Vec<u64> {
        match self {
            Sink::Collect(c) => std::mem::take(&mut c.primes),
            _ => Vec::new(),
        }
    }

    /// Consume the sink and return the collected primes.
    pub fn into_primes(mut self) -> Vec<u64> {
        self.take_primes()
    }

    /// Flush buffered output.
    pub fn finish(&mut self) -> Result<(), SieveError> {
        if let Sink::Print(p) = self {
            p.out.flush()?;
        }
        Ok(())
    }
}
