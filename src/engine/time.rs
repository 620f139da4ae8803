// src/engine/time.rs

/// Clamp a transport position into `[0, duration]`.
///
/// While no track has loaded the duration is unknown (zero) and only the lower
/// bound applies.
pub fn clamp_position(seconds: f64, duration: f64) -> f64 {
    let lower = seconds.max(0.0);
    if duration > 0.0 { lower.min(duration) } else { lower }
}

/// Progress through the media in percent, zero while the duration is unknown.
pub fn percentage(position: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    (position / duration * 100.0).clamp(0.0, 100.0)
}

/// `m:ss`, minutes unbounded.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0).floor() as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}
