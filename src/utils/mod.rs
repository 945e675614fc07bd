pub mod logging;

/// Formats a millisecond duration as `H:MM:SS`.
pub fn format_hms(total_ms: u64) -> String {
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Rounds to two decimals, the precision entries are billed at.
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
