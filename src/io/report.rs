use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::application::LedgerError;
use crate::config::LedgerConfig;
use crate::domain::{format_cents, RevenuePeriod, RevenueRecord};

/// Where a written report lives on disk and the link it is served under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLink {
    pub path: PathBuf,
    pub link: String,
}

/// Writes monthly revenue reports as CSV files into a reports directory.
pub struct ReportWriter {
    dir: PathBuf,
    link_prefix: String,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, link_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            link_prefix: link_prefix.into(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(&config.reports_dir, &config.report_link_prefix)
    }

    /// `report_<month>_<year>.csv`, month without zero padding.
    pub fn file_name(period: RevenuePeriod) -> String {
        format!("report_{}_{}.csv", period.month, period.year)
    }

    pub fn link_for(&self, period: RevenuePeriod) -> String {
        format!(
            "{}/{}",
            self.link_prefix.trim_end_matches('/'),
            Self::file_name(period)
        )
    }

    /// Write `records` as CSV to any writer. Returns the number of rows.
    pub fn write_csv<W: Write>(writer: W, records: &[RevenueRecord]) -> Result<usize> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["service_name", "amount"])?;

        for record in records {
            csv_writer.write_record([
                record.service_name.as_str(),
                format_cents(record.total_amount).as_str(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(records.len())
    }

    /// Write the report file for `period`, replacing any earlier version.
    pub fn write(
        &self,
        period: RevenuePeriod,
        records: &[RevenueRecord],
    ) -> Result<ReportLink, LedgerError> {
        self.write_file(period, records)
            .map_err(|e| LedgerError::ReportGenerationFailed(format!("{:#}", e)))
    }

    fn write_file(&self, period: RevenuePeriod, records: &[RevenueRecord]) -> Result<ReportLink> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create reports directory {}", self.dir.display())
        })?;

        let path = self.dir.join(Self::file_name(period));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create report file {}", path.display()))?;

        let rows = Self::write_csv(file, records)
            .with_context(|| format!("Failed to write report file {}", path.display()))?;

        info!(%period, rows, path = %path.display(), "revenue report written");
        Ok(ReportLink {
            link: self.link_for(period),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period() -> RevenuePeriod {
        RevenuePeriod::new(11, 2022).unwrap()
    }

    #[test]
    fn test_file_name_and_link() {
        let writer = ReportWriter::new("/tmp/reports", "/api/v1/balance/month_reports/");
        assert_eq!(ReportWriter::file_name(period()), "report_11_2022.csv");
        assert_eq!(
            writer.link_for(RevenuePeriod::new(3, 2023).unwrap()),
            "/api/v1/balance/month_reports/report_3_2023.csv"
        );
    }

    #[test]
    fn test_write_csv() {
        let records = vec![RevenueRecord {
            service_id: 5,
            service_name: "delivery".into(),
            total_amount: 30000,
        }];

        let mut buf = Vec::new();
        let rows = ReportWriter::write_csv(&mut buf, &records).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "service_name,amount\ndelivery,300.00\n"
        );
    }

    #[test]
    fn test_write_creates_directory_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("nested/reports"), "/reports");

        let long = vec![
            RevenueRecord {
                service_id: 1,
                service_name: "a".into(),
                total_amount: 100,
            },
            RevenueRecord {
                service_id: 2,
                service_name: "b".into(),
                total_amount: 200,
            },
        ];
        writer.write(period(), &long).unwrap();

        let link = writer.write(period(), &long[..1]).unwrap();
        assert_eq!(link.link, "/reports/report_11_2022.csv");

        let content = std::fs::read_to_string(&link.path).unwrap();
        assert_eq!(content, "service_name,amount\na,1.00\n");
    }

    #[test]
    fn test_unwritable_directory_is_report_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();

        let writer = ReportWriter::new(&blocker, "/reports");
        let err = writer.write(period(), &[]).unwrap_err();
        assert!(matches!(err, LedgerError::ReportGenerationFailed(_)));
    }
}
