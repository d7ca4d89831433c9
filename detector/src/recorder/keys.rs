use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

fn local_time(ms: i64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Local::now)
}

/// Artifact file name for a capture, in the local timezone.
/// e.g. "motion_20250218_093000_123.jpg", or "motion_20250218_093000_123_1.jpg"
/// for the first collision.
pub fn artifact_file_name(captured_at_ms: i64, collision: u32) -> String {
    file_name_at(&local_time(captured_at_ms), collision)
}

/// File name for `dt`; a non-zero `collision` is appended as a `_N` suffix.
pub fn file_name_at<Tz>(dt: &DateTime<Tz>, collision: u32) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stamp = dt.format("%Y%m%d_%H%M%S_%3f");
    if collision == 0 {
        format!("motion_{stamp}.jpg")
    } else {
        format!("motion_{stamp}_{collision}.jpg")
    }
}

/// Hidden scratch name the encoder writes to before the final rename.
pub fn temp_file_name(final_name: &str) -> String {
    format!(".{final_name}.tmp")
}
