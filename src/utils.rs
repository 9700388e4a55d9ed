/// Utility functions for time handling and log formatting
use time::macros::format_description;
use time::{OffsetDateTime, Time, UtcOffset};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Midnight UTC of the calendar day containing `dt`
pub fn start_of_day_utc(dt: OffsetDateTime) -> OffsetDateTime {
    dt.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Render bytes as `\xFF\x27...` for error messages
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{:02X}", b)).collect()
}
