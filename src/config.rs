use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the ledger. Passed explicitly to
/// `LedgerService::init` / `LedgerService::connect`; nothing is global.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory monthly revenue reports are written to
    pub reports_dir: PathBuf,
    /// Public URL prefix under which report files are served
    pub report_link_prefix: String,
    /// Upper bound on pooled database connections
    pub max_connections: u32,
    /// How long a writer waits for the database write lock before giving up
    pub busy_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("balance.db"),
            reports_dir: PathBuf::from("month_reports"),
            report_link_prefix: "/api/v1/balance/month_reports".to_string(),
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl LedgerConfig {
    /// Default settings with the database and reports rooted in `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            database_path: dir.join("balance.db"),
            reports_dir: dir.join("month_reports"),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_dir_keeps_other_defaults() {
        let config = LedgerConfig::in_dir("/tmp/ledger");
        assert_eq!(config.database_path, PathBuf::from("/tmp/ledger/balance.db"));
        assert_eq!(config.reports_dir, PathBuf::from("/tmp/ledger/month_reports"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }
}
