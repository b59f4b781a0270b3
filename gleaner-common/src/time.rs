//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Column format used for timestamps written to sink tables
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp for a sink row (second precision, UTC)
pub fn row_timestamp(at: DateTime<Utc>) -> String {
    at.format(ROW_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_row_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(row_timestamp(at), "2024-03-09 07:05:01");
    }

    #[test]
    fn test_row_timestamp_drops_subseconds() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(999);
        assert_eq!(row_timestamp(at), "2024-12-31 23:59:59");
    }
}
