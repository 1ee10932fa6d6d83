//! # Progress — Atomic Sieving Progress Counters
//!
//! Thread-safe progress tracking shared between sieving workers and the
//! background status reporter. Every worker adds the width of each finished
//! segment to one `AtomicU64`, so the reported percentage covers the whole
//! range no matter how it was partitioned.
//!
//! ## Background Reporter
//!
//! A dedicated thread logs progress at a fixed interval: numbers sieved,
//! percentage of the range, rate (numbers/sec) and elapsed time. Shuts down
//! via the `shutdown` atomic flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug)]
pub struct Progress {
    pub sieved: AtomicU64,
    total: u64,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    /// `total` is the number of integers in the range being sieved.
    pub fn new(total: u64) -> Arc<Self> {
        Arc::new(Progress {
            sieved: AtomicU64::new(0),
            total,
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn add_sieved(&self, numbers: u64) {
        self.sieved.fetch_add(numbers, Ordering::Relaxed);
    }

    /// Percentage of the range sieved so far, in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let sieved = self.sieved.load(Ordering::Relaxed).min(self.total);
        sieved as f64 * 100.0 / self.total as f64
    }

    pub fn start_reporter(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || loop {
            thread::sleep(interval);
            if progress.shutdown.load(Ordering::Relaxed) {
                break;
            }
            progress.print_status();
        })
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let sieved = self.sieved.load(Ordering::Relaxed);
        let rate = if elapsed.as_secs() > 0 {
            sieved as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            sieved,
            percent = format_args!("{:.1}", self.percent()),
            rate = format_args!("{:.3e}", rate),
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "sieve progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
