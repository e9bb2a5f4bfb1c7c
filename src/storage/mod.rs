pub mod accounts;
pub mod journal;
mod repository;
pub mod reservations;

pub use repository::*;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Encode a timestamp so that lexical order matches chronological order.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp: {}", raw))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_timestamp_encoding_is_fixed_width() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let later = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(0, 0, 0, 500_000)
            .unwrap()
            .and_utc();

        assert_eq!(encode_timestamp(midnight), "2024-03-01T00:00:00.000000Z");
        assert!(encode_timestamp(midnight) < encode_timestamp(later));
        assert_eq!(decode_timestamp(&encode_timestamp(later)).unwrap(), later);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_timestamp("yesterday").is_err());
    }
}
