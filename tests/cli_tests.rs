//! CLI integration tests using assert_cmd.
//!
//! Every test clears the `SEGSIEVE_*` environment variables so the results
//! do not depend on the caller's shell, and runs with `RUST_LOG=warn` so
//! stderr only carries errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[allow(deprecated)]
fn segsieve() -> Command {
    let mut cmd = Command::cargo_bin("segsieve").unwrap();
    cmd.env_remove("SEGSIEVE_SIEVE_SIZE")
        .env_remove("SEGSIEVE_THREADS")
        .env("RUST_LOG", "warn");
    cmd
}

// --- Help and arg validation ---

#[test]
fn help_shows_all_subcommands() {
    segsieve().arg("--help").assert().success().stdout(
        predicate::str::contains("count")
            .and(predicate::str::contains("print"))
            .and(predicate::str::contains("nth"))
            .and(predicate::str::contains("riemann-r"))
            .and(predicate::str::contains("riemann-r-inverse"))
            .and(predicate::str::contains("stress-test")),
    );
}

#[test]
fn help_count_shows_args() {
    segsieve()
        .args(["count", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--dist")
                .and(predicate::str::contains("--kind"))
                .and(predicate::str::contains("--sieve-size"))
                .and(predicate::str::contains("--threads")),
        );
}

#[test]
fn count_requires_stop() {
    segsieve().arg("count").assert().failure();
}

#[test]
fn unknown_kind_rejected() {
    segsieve()
        .args(["count", "100", "--kind", "septuplets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("septuplets"));
}

#[test]
fn stop_beyond_64_bits_rejected() {
    segsieve()
        .args(["count", "2^64"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds the maximum"));
}

#[test]
fn invalid_sieve_size_rejected() {
    segsieve()
        .args(["--sieve-size", "3", "count", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid sieve size"));
}

// --- count ---

#[test]
fn count_prints_settings_and_result() {
    segsieve()
        .args(["count", "1e6", "--threads", "1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Sieve size = 256 KiB")
                .and(predicate::str::contains("Threads = 1"))
                .and(predicate::str::contains("Primes: 78498")),
        );
}

#[test]
fn count_quiet_prints_number_only() {
    segsieve()
        .args(["count", "-q", "1000"])
        .assert()
        .success()
        .stdout("168\n");
}

#[test]
fn count_range_and_dist() {
    segsieve()
        .args(["count", "-q", "100", "200"])
        .assert()
        .success()
        .stdout("21\n");
    segsieve()
        .args(["count", "-q", "100", "--dist", "100"])
        .assert()
        .success()
        .stdout("21\n");
}

#[test]
fn count_several_kinds() {
    segsieve()
        .args(["count", "1e6", "-k", "primes", "-k", "twins", "-k", "quadruplets"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Primes: 78498")
                .and(predicate::str::contains("Twin primes: 8169"))
                .and(predicate::str::contains("Prime quadruplets: 166")),
        );
}

#[test]
fn count_json_report() {
    let output = segsieve()
        .args(["--json", "count", "1000", "-k", "twins"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stop"], 1000);
    assert_eq!(report["counts"][0]["kind"], "twins");
    assert_eq!(report["counts"][0]["count"], 35);
}

#[test]
fn count_time_flag() {
    segsieve()
        .args(["count", "--time", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Seconds: "));
}

// --- print ---

#[test]
fn print_primes() {
    segsieve()
        .args(["print", "10", "30"])
        .assert()
        .success()
        .stdout("11\n13\n17\n19\n23\n29\n");
}

#[test]
fn print_twins() {
    segsieve()
        .args(["print", "30", "--kind", "twins"])
        .assert()
        .success()
        .stdout("(3, 5)\n(5, 7)\n(11, 13)\n(17, 19)\n");
}

// --- nth ---

#[test]
fn nth_prime_forward() {
    segsieve()
        .args(["nth", "-q", "1e4"])
        .assert()
        .success()
        .stdout("104729\n");
    segsieve()
        .args(["nth", "25"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nth prime: 97"));
}

#[test]
fn nth_prime_backward() {
    segsieve()
        .args(["nth", "-q", "--", "-1", "10"])
        .assert()
        .success()
        .stdout("7\n");
}

#[test]
fn nth_prime_below_two_fails() {
    segsieve()
        .args(["nth", "--", "-1", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside"));
}

// --- Riemann R ---

#[test]
fn riemann_r_values() {
    segsieve()
        .args(["riemann-r", "1e6"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("78527.3"));
    segsieve()
        .args(["riemann-r-inverse", "78527"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("99999"));
}

// --- stress-test ---

#[test]
fn stress_test_runs_until_timeout() {
    segsieve()
        .args(["stress-test", "--timeout", "1", "-t", "2"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Started stress testing using 2 threads")
                .and(predicate::str::contains("PrimeCount(0e7, 1e7) = 664579   OK"))
                .and(predicate::str::contains("without errors")),
        );
}

#[test]
fn stress_test_json_report() {
    let output = segsieve()
        .args(["--json", "stress-test", "--timeout", "0", "-t", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["threads"], 1);
    assert_eq!(report["windows"], 0);
}

// --- Status reporting ---

#[test]
fn status_flag_finishes_cleanly() {
    segsieve()
        .args(["count", "-q", "--status", "1e6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("78498"))
        .stderr(predicate::str::contains("panicked").not());
}

// --- Configuration layering ---

#[test]
fn config_file_sets_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sieve_size = 65536\nthreads = 1").unwrap();
    segsieve()
        .args(["count", "1000", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Sieve size = 64 KiB")
                .and(predicate::str::contains("Threads = 1"))
                .and(predicate::str::contains("Primes: 168")),
        );
}

#[test]
fn flags_override_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sieve_size = 65536\nthreads = 1").unwrap();
    segsieve()
        .args(["count", "1000", "--sieve-size", "32", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Sieve size = 32 KiB"));
}

#[test]
fn env_sets_sieve_size() {
    segsieve()
        .env("SEGSIEVE_SIEVE_SIZE", "16")
        .args(["count", "1000", "-t", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sieve size = 16 KiB"));
}

#[test]
fn invalid_config_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sieve_size = 1000").unwrap();
    segsieve()
        .args(["count", "1000", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid sieve size"));
}
