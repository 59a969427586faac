#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Host and timing info strings used in experiment diagnostics.

use std::{fs, thread};

use chrono::{DateTime, Local};

/// Collapses runs of whitespace into single spaces and trims the ends.
#[must_use]
pub fn squeeze_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First whitespace-delimited word of `text`, empty when there is none.
#[must_use]
pub fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

/// CPU model name with the available thread count appended. Hosts without
/// a readable procfs yield the defined fallback `"missing cpu name"`.
#[must_use]
pub fn cpu_info() -> String {
    let threads = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    let model = cpu_model_name().unwrap_or_else(|| String::from("missing cpu name"));
    format!("{model} ({threads} threads)")
}

fn cpu_model_name() -> Option<String> {
    let raw = fs::read_to_string("/proc/cpuinfo").ok()?;
    raw.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "model name").then(|| squeeze_spaces(value))
    })
}

/// Bracketed local-time stamp with microsecond resolution, e.g.
/// `[2026/08/05 14:03:20.012345]`.
#[must_use]
pub fn current_time_info() -> String {
    time_info(&Local::now())
}

/// Formats the given moment the same way as [`current_time_info`].
#[must_use]
pub fn time_info(moment: &DateTime<Local>) -> String {
    moment.format("[%Y/%m/%d %H:%M:%S%.6f]").to_string()
}

/// Signed difference `end - start` in seconds.
#[must_use]
pub fn time_diff(start: &DateTime<Local>, end: &DateTime<Local>) -> f64 {
    let delta = end.signed_duration_since(start);
    delta.num_microseconds().map_or_else(
        || delta.num_seconds() as f64,
        |micros| micros as f64 / 1_000_000.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn squeezing_collapses_interior_whitespace() {
        assert_eq!(
            squeeze_spaces("  Intel(R)   Core(TM)\t i7  "),
            "Intel(R) Core(TM) i7"
        );
        assert_eq!(squeeze_spaces(""), "");
    }

    #[test]
    fn first_word_handles_padding_and_empty_input() {
        assert_eq!(first_word("  model name : x"), "model");
        assert_eq!(first_word("   "), "");
    }

    #[test]
    fn cpu_info_always_reports_something() {
        let info = cpu_info();
        assert!(info.contains("threads"));
        assert!(!info.starts_with(' '));
    }

    #[test]
    fn time_stamps_are_bracketed_with_microseconds() {
        let moment = Local.with_ymd_and_hms(2026, 8, 5, 14, 3, 20).unwrap();
        let stamp = time_info(&moment);
        assert!(stamp.starts_with("[2026/08/05 14:03:20."));
        assert!(stamp.ends_with(']'));
    }

    #[test]
    fn time_diff_is_signed_seconds() {
        let start = Local.with_ymd_and_hms(2026, 8, 5, 14, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(1500);
        assert!((time_diff(&start, &end) - 1.5).abs() < 1e-9);
        assert!((time_diff(&end, &start) + 1.5).abs() < 1e-9);
    }
}
