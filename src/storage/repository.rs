use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::config::LedgerConfig;
use crate::domain::{
    fallback_service_name, Account, AccountAudit, AccountId, LedgerEntry, Reservation,
    ReservationKey, ReservationStatus, RevenueRecord, Service, ServiceId,
};

use super::journal::{row_to_entry, ENTRY_COLUMNS};
use super::reservations::{row_to_reservation, RESERVATION_COLUMNS};
use super::{accounts, reservations};
use super::{decode_timestamp, encode_timestamp, MIGRATION_001_INITIAL};

/// Counters for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub reservation_count: i64,
    pub entry_count: i64,
    pub orphan_reservations: i64,
}

/// Owner of the connection pool. Write paths go through [`Repository::begin`]
/// and the transaction-scoped store functions; everything else here is a
/// read-only query.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`.
    ///
    /// WAL mode lets readers proceed while one writer holds the lock; other
    /// writers wait up to `busy_timeout` for it.
    pub async fn open(config: &LedgerConfig, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.busy_timeout)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;

        Ok(Self::new(pool))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        Self::open(config, false).await
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        Ok(())
    }

    /// Initialize a database (create if missing + migrate).
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let repo = Self::open(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a write transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire connection")
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Account queries
    // ========================

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let mut conn = self.acquire().await?;
        accounts::get(&mut conn, id).await
    }

    // ========================
    // Reservation queries
    // ========================

    pub async fn get_reservation(&self, key: &ReservationKey) -> Result<Option<Reservation>> {
        let mut conn = self.acquire().await?;
        reservations::get(&mut conn, key).await
    }

    /// List reservations for an account, oldest first.
    pub async fn list_reservations(
        &self,
        account_id: AccountId,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>> {
        let mut query = format!(
            "SELECT {} FROM reservations WHERE account_id = ?",
            RESERVATION_COLUMNS
        );
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at, service_id, order_id");

        let mut sql_query = sqlx::query(&query).bind(account_id);
        if let Some(status) = status {
            sql_query = sql_query.bind(status.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list reservations")?;

        rows.iter().map(row_to_reservation).collect()
    }

    // ========================
    // Journal queries
    // ========================

    /// Most recent entries for an account, newest first.
    pub async fn list_entries(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>> {
        let query = format!(
            "SELECT {} FROM ledger_entries WHERE account_id = ? ORDER BY sequence DESC LIMIT ?",
            ENTRY_COLUMNS
        );
        // Limits past i64::MAX mean "everything".
        let limit = limit.map_or(i64::MAX, |lim| i64::try_from(lim).unwrap_or(i64::MAX));

        let rows = sqlx::query(&query)
            .bind(account_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries")?;

        rows.iter().map(row_to_entry).collect()
    }

    // ========================
    // Service catalogue
    // ========================

    /// Insert a service or rename an existing one.
    pub async fn upsert_service(
        &self,
        id: ServiceId,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<Service> {
        let row = sqlx::query(
            r#"
            INSERT INTO services (id, name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name
            RETURNING id, name, created_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(encode_timestamp(at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to save service")?;

        Self::row_to_service(&row)
    }

    pub async fn list_services(&self) -> Result<Vec<Service>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM services ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list services")?;

        rows.iter().map(Self::row_to_service).collect()
    }

    fn row_to_service(row: &sqlx::sqlite::SqliteRow) -> Result<Service> {
        let created_at_str: String = row.get("created_at");
        Ok(Service {
            id: row.get("id"),
            name: row.get("name"),
            created_at: decode_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Revenue
    // ========================

    /// Sum approved reservations settled within `[from, to)`, per service.
    pub async fn revenue_by_service(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RevenueRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT r.service_id AS service_id, s.name AS service_name, SUM(r.amount) AS total
            FROM reservations r
            LEFT JOIN services s ON s.id = r.service_id
            WHERE r.status = 'approved' AND r.settled_at >= ? AND r.settled_at < ?
            GROUP BY r.service_id
            "#,
        )
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate revenue")?;

        let mut records: Vec<RevenueRecord> = rows
            .iter()
            .map(|row| {
                let service_id: ServiceId = row.get("service_id");
                let service_name: Option<String> = row.get("service_name");
                RevenueRecord {
                    service_id,
                    service_name: service_name
                        .unwrap_or_else(|| fallback_service_name(service_id)),
                    total_amount: row.get("total"),
                }
            })
            .collect();

        records.sort_by(|a, b| {
            a.service_name
                .cmp(&b.service_name)
                .then(a.service_id.cmp(&b.service_id))
        });
        Ok(records)
    }

    // ========================
    // Integrity
    // ========================

    /// Per-account balance, journal and reservation totals.
    pub async fn account_audits(&self) -> Result<Vec<AccountAudit>> {
        let rows = sqlx::query(
            r#"
            SELECT
                a.id AS account_id,
                a.balance AS balance,
                COALESCE((SELECT SUM(e.amount) FROM ledger_entries e
                          WHERE e.account_id = a.id), 0) AS journal_total,
                COALESCE((SELECT -SUM(e.amount) FROM ledger_entries e
                          WHERE e.account_id = a.id AND e.kind = 'reserve'), 0) AS reserved_total,
                COALESCE((SELECT SUM(e.amount) FROM ledger_entries e
                          WHERE e.account_id = a.id AND e.kind = 'release'), 0) AS released_total,
                COALESCE((SELECT SUM(r.amount) FROM reservations r
                          WHERE r.account_id = a.id AND r.status = 'held'), 0) AS held,
                COALESCE((SELECT SUM(r.amount) FROM reservations r
                          WHERE r.account_id = a.id AND r.status = 'approved'), 0) AS approved,
                COALESCE((SELECT SUM(r.amount) FROM reservations r
                          WHERE r.account_id = a.id AND r.status = 'disapproved'), 0) AS disapproved
            FROM accounts a
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to audit accounts")?;

        Ok(rows
            .iter()
            .map(|row| AccountAudit {
                account_id: row.get("account_id"),
                balance: row.get("balance"),
                journal_total: row.get("journal_total"),
                reserved_total: row.get("reserved_total"),
                released_total: row.get("released_total"),
                held: row.get("held"),
                approved: row.get("approved"),
                disapproved: row.get("disapproved"),
            })
            .collect())
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let reservation_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM reservations")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let entry_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM ledger_entries")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let orphan_reservations: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM reservations r
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = r.account_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            reservation_count,
            entry_count,
            orphan_reservations,
        })
    }
}
