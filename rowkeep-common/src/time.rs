//! Timestamp utilities
//!
//! Timestamps are stored as RFC 3339 text in every table.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Timestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_db_round_trip_keeps_microseconds() {
        let original = now();
        let parsed = from_db(&to_db(&original)).unwrap();
        assert_eq!(parsed.timestamp_micros(), original.timestamp_micros());
    }

    #[test]
    fn test_from_db_rejects_garbage() {
        let err = from_db("yesterday").unwrap_err();
        assert!(matches!(err, Error::Timestamp { ref value, .. } if value == "yesterday"), "got {:?}", err);
    }

    #[test]
    fn test_to_db_is_utc_zulu() {
        let formatted = to_db(&now());
        assert!(formatted.ends_with('Z'), "expected Zulu suffix: {}", formatted);
    }
}
