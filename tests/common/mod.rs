// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use balance_ledger::application::LedgerService;
use balance_ledger::config::LedgerConfig;
use balance_ledger::domain::{AccountId, Cents, ReservationKey};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = LedgerConfig::in_dir(temp_dir.path());
    let service = LedgerService::init(&config).await?;
    Ok((service, temp_dir))
}

/// Same as [`test_service`], also returning the config for report output.
pub async fn test_service_with_config() -> Result<(LedgerService, LedgerConfig, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = LedgerConfig::in_dir(temp_dir.path());
    let service = LedgerService::init(&config).await?;
    Ok((service, config, temp_dir))
}

/// Test service whose config is adjusted by `configure` before opening.
pub async fn test_service_with(
    configure: impl FnOnce(&mut LedgerConfig),
) -> Result<(LedgerService, LedgerConfig, TempDir)> {
    let temp_dir = TempDir::new()?;
    let mut config = LedgerConfig::in_dir(temp_dir.path());
    configure(&mut config);
    let service = LedgerService::init(&config).await?;
    Ok((service, config, temp_dir))
}

/// Open a separate connection and take the database write lock on it.
/// The lock is held until [`unlock_database`] is called.
pub async fn lock_database(config: &LedgerConfig) -> Result<SqliteConnection> {
    let options = SqliteConnectOptions::new().filename(&config.database_path);
    let mut conn = SqliteConnection::connect_with(&options).await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut conn).await?;
    Ok(conn)
}

pub async fn unlock_database(mut conn: SqliteConnection) -> Result<()> {
    sqlx::query("ROLLBACK").execute(&mut conn).await?;
    conn.close().await?;
    Ok(())
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

pub fn order(account_id: AccountId, service_id: i64, order_id: i64) -> ReservationKey {
    ReservationKey::new(account_id, service_id, order_id)
}

/// Create an account holding `amount` through a single deposit.
pub async fn funded_account(service: &LedgerService, account_id: AccountId, amount: Cents) -> Result<()> {
    service.deposit(account_id, amount).await?;
    Ok(())
}
