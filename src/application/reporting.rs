use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, RevenuePeriod, RevenueRecord};

use super::LedgerError;

/// Approved revenue for one month, one line per service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyRevenueReport {
    pub period: RevenuePeriod,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub services: Vec<RevenueRecord>,
    pub total: Cents,
}

impl MonthlyRevenueReport {
    pub fn new(
        period: RevenuePeriod,
        from_date: DateTime<Utc>,
        to_date: DateTime<Utc>,
        services: Vec<RevenueRecord>,
    ) -> Result<Self, LedgerError> {
        let total = services
            .iter()
            .try_fold(0 as Cents, |acc, r| acc.checked_add(r.total_amount))
            .ok_or_else(|| {
                LedgerError::ReportGenerationFailed(format!(
                    "revenue total for {} exceeds the representable amount",
                    period
                ))
            })?;

        Ok(Self {
            period,
            from_date,
            to_date,
            services,
            total,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_sums_services() {
        let period = RevenuePeriod::new(3, 2024).unwrap();
        let (from, to) = period.bounds().unwrap();
        let report = MonthlyRevenueReport::new(
            period,
            from,
            to,
            vec![
                RevenueRecord {
                    service_id: 1,
                    service_name: "delivery".into(),
                    total_amount: 1500,
                },
                RevenueRecord {
                    service_id: 2,
                    service_name: "hosting".into(),
                    total_amount: 250,
                },
            ],
        )
        .unwrap();
        assert_eq!(report.total, 1750);
        assert!(!report.is_empty());
    }

    #[test]
    fn test_total_overflow_is_an_error() {
        let period = RevenuePeriod::new(3, 2024).unwrap();
        let (from, to) = period.bounds().unwrap();
        let services = (1..=2)
            .map(|id| RevenueRecord {
                service_id: id,
                service_name: format!("service-{}", id),
                total_amount: Cents::MAX - 1,
            })
            .collect();

        let err = MonthlyRevenueReport::new(period, from, to, services).unwrap_err();
        assert!(matches!(err, LedgerError::ReportGenerationFailed(_)));
    }
}
