use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, ServiceId};

/// A service that orders are placed for. Only used to label revenue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Label used in reports for services missing from the catalogue.
pub fn fallback_service_name(id: ServiceId) -> String {
    format!("service-{}", id)
}

/// A calendar month in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevenuePeriod {
    pub month: u32,
    pub year: i32,
}

impl RevenuePeriod {
    /// Returns `None` when the month is not in 1..=12 or the year is
    /// outside chrono's supported range.
    pub fn new(month: u32, year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { month, year })
    }

    /// Month containing the given instant.
    pub fn containing(at: DateTime<Utc>) -> Self {
        use chrono::Datelike;
        Self {
            month: at.month(),
            year: at.year(),
        }
    }

    /// Half-open interval `[start, end)` covering the whole month.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1)?;
        let end = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)?
        };
        Some((
            start.and_hms_opt(0, 0, 0)?.and_utc(),
            end.and_hms_opt(0, 0, 0)?.and_utc(),
        ))
    }
}

impl std::fmt::Display for RevenuePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Approved revenue for one service over one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueRecord {
    pub service_id: ServiceId,
    pub service_name: String,
    pub total_amount: Cents,
}
