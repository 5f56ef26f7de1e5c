//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole milliseconds between two instants, clamped at zero
pub fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(0)
}

/// Local-time stamp used to prefix export artifacts (`20250505_141921`)
pub fn export_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
