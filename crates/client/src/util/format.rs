//! Display formatters shared by overlay features.

/// Rendered wherever a price is missing. Never show NaN or Infinity.
pub const MISSING_PRICE_MARKER: &str = "-- ⚠";

/// Compact number: 999 → "999", 12_345 → "12.3k", 4_500_000 → "4.5M".
pub fn format_compact_number(value: f64) -> String {
    if !value.is_finite() {
        return MISSING_PRICE_MARKER.to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (abs / 1e9, "B")
    } else if abs >= 1e6 {
        (abs / 1e6, "M")
    } else if abs >= 1e3 {
        (abs / 1e3, "k")
    } else {
        return format!("{sign}{}", abs.round() as i64);
    };
    // Three significant digits keeps overlays narrow.
    let text = if scaled >= 100.0 {
        format!("{scaled:.0}")
    } else if scaled >= 10.0 {
        format!("{scaled:.1}")
    } else {
        format!("{scaled:.2}")
    };
    format!("{sign}{text}{suffix}")
}

/// `h:mm:ss`, or `m:ss` under an hour.
pub fn format_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// `0.1234` → `"12.3%"`.
pub fn format_percent(fraction: f64) -> String {
    if !fraction.is_finite() {
        return MISSING_PRICE_MARKER.to_string();
    }
    format!("{:.1}%", fraction * 100.0)
}
