//! # Approx — Prime Counting Estimates
//!
//! Analytic estimates used to size nth-prime searches and to pre-reserve
//! collectors. None of these are exact; callers always verify by sieving.
//!
//! ## Riemann R
//!
//! Gram series: `R(x) = 1 + Σ_{k≥1} (ln x)^k / (k · k! · ζ(k+1))`.
//! `R(x)` tracks `π(x)` to within a few hundred for `x ≤ 10^12`, far
//! better than `x / ln x`. Terms are summed until they stop changing the
//! result at `f64` precision.
//!
//! ## Inverse
//!
//! `R⁻¹(n)` is found by Newton iteration on `R(t) − n` using
//! `R'(t) = Σ (ln t)^k / (k! · ζ(k+1)) / (t ln t)`, starting from Cesàro's
//! asymptotic expansion of the nth prime. Iteration stops as soon as a step
//! no longer shrinks.
//!
//! ## ζ Table
//!
//! `1/ζ(s)` for `s = 2 ..= 129` is computed once with Euler–Maclaurin
//! summation (32 explicit terms plus four Bernoulli corrections), which is
//! accurate to `f64` precision for every `s ≥ 2`.

use std::sync::OnceLock;

const ZETA_TERMS: usize = 128;

/// `1 / ζ(k + 1)` for `k = 1 ..= 128`, and 1 beyond.
fn zeta_inv(k: usize) -> f64 {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    let table = TABLE.get_or_init(|| (1..=ZETA_TERMS).map(|k| 1.0 / zeta(k as f64 + 1.0)).collect());
    table.get(k.wrapping_sub(1)).copied().unwrap_or(1.0)
}

/// Riemann zeta for real `s > 1` by Euler–Maclaurin summation.
fn zeta(s: f64) -> f64 {
    const N: u32 = 32;
    const BERNOULLI: [f64; 4] = [1.0 / 6.0, -1.0 / 30.0, 1.0 / 42.0, -1.0 / 30.0];
    let n = N as f64;
    let mut sum: f64 = (1..N).map(|k| (k as f64).powf(-s)).sum();
    sum += n.powf(1.0 - s) / (s - 1.0) + 0.5 * n.powf(-s);
    // B_2k / (2k)! · s(s+1)…(s+2k−2) · N^(−s−2k+1)
    let mut rising = s * n.powf(-s - 1.0);
    let mut factorial = 2.0;
    for (i, b) in BERNOULLI.iter().enumerate() {
        sum += b * rising / factorial;
        let k = (i + 1) as f64;
        rising *= (s + 2.0 * k - 1.0) * (s + 2.0 * k) / (n * n);
        factorial *= (2.0 * k + 1.0) * (2.0 * k + 2.0);
    }
    sum
}

/// Riemann R function.
pub fn riemann_r(x: f64) -> f64 {
    if x < 0.1 {
        return 0.0;
    }
    if (x - 1.0).abs() < f64::EPSILON {
        return 1.0;
    }
    let log_x = x.ln();
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..1000 {
        let k_inv = 1.0 / k as f64;
        term *= log_x * k_inv;
        let old = sum;
        sum += term * k_inv * zeta_inv(k);
        if (sum - old).abs() <= f64::EPSILON * sum.abs() {
            break;
        }
    }
    sum
}

/// Derivative of [`riemann_r`].
fn riemann_r_prime(x: f64) -> f64 {
    if x < 0.1 {
        return 0.0;
    }
    let log_x = x.ln();
    let mut sum = 0.0;
    let mut term = 1.0;
    for k in 1..1000 {
        term *= log_x / k as f64;
        let old = sum;
        sum += term * zeta_inv(k);
        if (sum - old).abs() <= f64::EPSILON * sum.abs() {
            break;
        }
    }
    sum / (x * log_x)
}

/// Cesàro's expansion `p_n ≈ n (ln n + ln ln n − 1 + (ln ln n − 2)/ln n − …)`.
fn initial_nth_prime_approx(x: f64) -> f64 {
    if x < 2.0 {
        return 0.0;
    }
    let log_x = x.ln();
    let mut t = log_x;
    if x > std::f64::consts::E {
        let loglog_x = log_x.ln();
        t += 0.5 * loglog_x;
        if x > 1600.0 {
            t += 0.5 * loglog_x - 1.0 + (loglog_x - 2.0) / log_x;
        }
        if x > 1_200_000.0 {
            t -= (loglog_x * loglog_x - 6.0 * loglog_x + 11.0) / (2.0 * log_x * log_x);
        }
    }
    x * t
}

/// Inverse Riemann R: the `t` with `R(t) = x`.
pub fn riemann_r_inverse(x: f64) -> f64 {
    if x < 2.0 {
        return 0.0;
    }
    let mut t = initial_nth_prime_approx(x);
    let mut old_step = f64::INFINITY;
    loop {
        let step = (riemann_r(t) - x) / riemann_r_prime(t);
        if !step.is_finite() || step.abs() >= old_step.abs() {
            break;
        }
        t -= step;
        old_step = step;
    }
    t
}

/// Estimate of π(x).
pub fn prime_pi_approx(x: u64) -> u64 {
    riemann_r(x as f64) as u64
}

/// Estimate of the nth prime.
pub fn nth_prime_approx(n: u64) -> u64 {
    riemann_r_inverse(n as f64) as u64
}

/// Upper bound on the number of primes in `[start, stop]`, for reserving
/// collector capacity. Combines Dusart's `π(x) ≤ x / (ln x − 1.1)` with the
/// Brun–Titchmarsh bound `π(x + y) − π(x) ≤ 2y / ln y`.
pub fn prime_count_upper(start: u64, stop: u64) -> usize {
    if start > stop || stop < 2 {
        return 0;
    }
    let pi_upper = |x: f64| if x < 10.0 { 4.0 } else { x / (x.ln() - 1.1) };
    let dist = (stop - start) as f64 + 1.0;
    let interval = if dist < 10.0 { dist } else { 2.0 * dist / dist.ln() };
    let bound = pi_upper(stop as f64).min(interval) + 5.0;
    bound.min(usize::MAX as f64) as usize
}
