//! Measurement helpers for the benchmark runner.
//!
//! Peak memory is read from `/proc/self/status` on Linux; elsewhere it is reported as 0.

use std::time::{Duration, Instant};

/// Reads the peak resident set size (`VmHWM`) from /proc/self/status on Linux.
///
/// # Returns
/// The peak memory usage in kilobytes (KB), or 0 if the value cannot be read.
#[cfg(target_os = "linux")]
pub fn get_peak_rss_kb() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
pub fn get_peak_rss_kb() -> u64 {
    use std::sync::Once;
    static WARN_ONCE: Once = Once::new();
    WARN_ONCE.call_once(|| {
        log::warn!("Peak RSS measurement is only supported on Linux; returning 0.");
    });
    0
}

/// Runs `f` and returns its result with the elapsed wall time.
pub fn timed<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}
