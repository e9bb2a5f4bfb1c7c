use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    build_integrity_report, format_cents, Account, AccountId, Cents, IntegrityReport,
    LedgerEntry, Reservation, ReservationKey, ReservationStatus, RevenuePeriod, RevenueRecord,
    Service, ServiceId, Settlement,
};
use crate::storage::accounts::{self, CreditOutcome, DeltaOutcome};
use crate::storage::reservations::{self, CreateOutcome, SettleOutcome};
use crate::storage::{journal, Repository};

use super::{LedgerError, MonthlyRevenueReport};

/// The ledger engine: every balance or reservation mutation goes through one
/// of these methods, each executed as a single database transaction.
///
/// The service is cheap to share: wrap it in an `Arc` and call it from as
/// many tasks as needed.
pub struct LedgerService {
    repo: Arc<Repository>,
}

impl LedgerService {
    /// Create a new ledger service over the given repository.
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Initialize the database (creating it if needed) and connect.
    pub async fn init(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let repo = Repository::init(config).await?;
        Ok(Self::new(Arc::new(repo)))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let repo = Repository::connect(config).await?;
        Ok(Self::new(Arc::new(repo)))
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }

    // ========================
    // Balance operations
    // ========================

    /// Current state of an account.
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Add funds to an account, creating the account on first deposit.
    pub async fn deposit(&self, account_id: AccountId, amount: Cents) -> Result<Account, LedgerError> {
        ensure_id(account_id, "user_id")?;
        ensure_positive(amount)?;
        debug!(account_id, amount, "deposit requested");

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;

        let outcome = accounts::credit_or_create(&mut tx, account_id, amount, now).await?;
        let account = match outcome {
            CreditOutcome::Applied(account) => account,
            CreditOutcome::Overflow { balance } => {
                return abort(
                    tx,
                    LedgerError::InvalidAmount(format!(
                        "deposit of {} would overflow balance {}",
                        format_cents(amount),
                        format_cents(balance)
                    )),
                )
                .await;
            }
        };

        let mut entry = LedgerEntry::deposit(account_id, amount, account.balance, now);
        journal::append(&mut tx, &mut entry).await?;

        tx.commit().await.context("Failed to commit deposit")?;
        info!(account_id, amount, balance = account.balance, "deposit committed");
        Ok(account)
    }

    // ========================
    // Reservation operations
    // ========================

    /// Hold `amount` against an order: debit the account and record a held
    /// reservation, both or neither.
    pub async fn reserve(&self, key: ReservationKey, amount: Cents) -> Result<Account, LedgerError> {
        ensure_key(&key)?;
        ensure_positive(amount)?;
        debug!(
            account_id = key.account_id,
            service_id = key.service_id,
            order_id = key.order_id,
            amount,
            "reserve requested"
        );

        let now = Utc::now();
        let reservation = Reservation::new(key, amount, now);
        let mut tx = self.repo.begin().await?;

        // Claim the key first so a retried request reports the duplicate
        // even if the balance has moved since.
        let created = reservations::create(&mut tx, &reservation).await?;
        if created == CreateOutcome::AlreadyExists {
            return abort(tx, LedgerError::DuplicateReservation(key)).await;
        }

        let outcome = accounts::apply_delta(&mut tx, key.account_id, -amount, now).await?;
        let account = match outcome {
            DeltaOutcome::Applied(account) => account,
            DeltaOutcome::InsufficientFunds { balance } => {
                return abort(
                    tx,
                    LedgerError::InsufficientFunds {
                        account_id: key.account_id,
                        balance,
                        required: amount,
                    },
                )
                .await;
            }
            DeltaOutcome::NotFound => {
                return abort(tx, LedgerError::AccountNotFound(key.account_id)).await;
            }
            DeltaOutcome::Overflow { .. } => {
                return abort(
                    tx,
                    LedgerError::Storage(anyhow::anyhow!("debit reported as overflow for {}", key)),
                )
                .await;
            }
        };

        let mut entry = LedgerEntry::reserve(&key, amount, account.balance, now);
        journal::append(&mut tx, &mut entry).await?;

        tx.commit().await.context("Failed to commit reservation")?;
        info!(
            account_id = key.account_id,
            service_id = key.service_id,
            order_id = key.order_id,
            amount,
            balance = account.balance,
            "reservation held"
        );
        Ok(account)
    }

    /// Realize a held reservation as revenue. The balance does not change;
    /// the funds left it when they were reserved.
    pub async fn approve(&self, key: ReservationKey, amount: Cents) -> Result<Reservation, LedgerError> {
        self.approve_at(key, amount, Utc::now()).await
    }

    /// Like [`approve`](Self::approve), recording `settled_at` as the
    /// settlement time (which decides the revenue month).
    pub async fn approve_at(
        &self,
        key: ReservationKey,
        amount: Cents,
        settled_at: DateTime<Utc>,
    ) -> Result<Reservation, LedgerError> {
        self.settle(key, amount, Settlement::Approve, settled_at).await
    }

    /// Cancel a held reservation and return its funds to the account.
    pub async fn disapprove(
        &self,
        key: ReservationKey,
        amount: Cents,
    ) -> Result<Reservation, LedgerError> {
        self.disapprove_at(key, amount, Utc::now()).await
    }

    pub async fn disapprove_at(
        &self,
        key: ReservationKey,
        amount: Cents,
        settled_at: DateTime<Utc>,
    ) -> Result<Reservation, LedgerError> {
        self.settle(key, amount, Settlement::Disapprove, settled_at).await
    }

    async fn settle(
        &self,
        key: ReservationKey,
        amount: Cents,
        settlement: Settlement,
        settled_at: DateTime<Utc>,
    ) -> Result<Reservation, LedgerError> {
        ensure_positive(amount)?;
        debug!(
            account_id = key.account_id,
            service_id = key.service_id,
            order_id = key.order_id,
            amount,
            outcome = settlement.status().as_str(),
            "settlement requested"
        );

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;

        let outcome = reservations::settle(&mut tx, &key, amount, settlement, settled_at).await?;
        let reservation = match outcome {
            SettleOutcome::Settled(reservation) => reservation,
            SettleOutcome::NotFound => {
                return abort(tx, LedgerError::ReservationNotFound(key)).await;
            }
            SettleOutcome::AlreadyTerminal(status) => {
                debug!(%key, %status, "reservation already settled");
                return abort(tx, LedgerError::AlreadyTerminal { key, status }).await;
            }
            SettleOutcome::AmountMismatch { held } => {
                warn!(%key, held, requested = amount, "settlement amount mismatch");
                return abort(
                    tx,
                    LedgerError::AmountMismatch {
                        key,
                        held,
                        requested: amount,
                    },
                )
                .await;
            }
        };

        if settlement == Settlement::Disapprove {
            let outcome = accounts::apply_delta(&mut tx, key.account_id, amount, now).await?;
            let account = match outcome {
                DeltaOutcome::Applied(account) => account,
                DeltaOutcome::NotFound => {
                    return abort(tx, LedgerError::AccountNotFound(key.account_id)).await;
                }
                DeltaOutcome::Overflow { balance } => {
                    return abort(
                        tx,
                        LedgerError::InvalidAmount(format!(
                            "releasing {} would overflow balance {}",
                            format_cents(amount),
                            format_cents(balance)
                        )),
                    )
                    .await;
                }
                DeltaOutcome::InsufficientFunds { .. } => {
                    return abort(
                        tx,
                        LedgerError::Storage(anyhow::anyhow!(
                            "credit reported as insufficient funds for {}",
                            key
                        )),
                    )
                    .await;
                }
            };

            let mut entry = LedgerEntry::release(&key, amount, account.balance, now);
            journal::append(&mut tx, &mut entry).await?;
        }

        tx.commit().await.context("Failed to commit settlement")?;
        info!(
            account_id = key.account_id,
            service_id = key.service_id,
            order_id = key.order_id,
            amount,
            status = reservation.status.as_str(),
            "reservation settled"
        );
        Ok(reservation)
    }

    /// Get a reservation by key.
    pub async fn get_reservation(&self, key: ReservationKey) -> Result<Reservation, LedgerError> {
        self.repo
            .get_reservation(&key)
            .await?
            .ok_or(LedgerError::ReservationNotFound(key))
    }

    /// List an account's reservations, optionally only those in one status.
    pub async fn list_reservations(
        &self,
        account_id: AccountId,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>, LedgerError> {
        self.get_balance(account_id).await?;
        Ok(self.repo.list_reservations(account_id, status).await?)
    }

    /// Account statement, newest entry first.
    pub async fn list_entries(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.get_balance(account_id).await?;
        Ok(self.repo.list_entries(account_id, limit).await?)
    }

    // ========================
    // Services and revenue
    // ========================

    /// Register a service name for reports, or rename an existing one.
    pub async fn register_service(&self, id: ServiceId, name: &str) -> Result<Service, LedgerError> {
        ensure_id(id, "service_id")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "service name must not be empty".to_string(),
            ));
        }

        let service = self.repo.upsert_service(id, name, Utc::now()).await?;
        info!(service_id = id, name, "service registered");
        Ok(service)
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, LedgerError> {
        Ok(self.repo.list_services().await?)
    }

    /// Approved revenue per service for one calendar month, ordered by
    /// service name. Empty when nothing was approved in the period.
    pub async fn monthly_revenue_by_service(
        &self,
        period: RevenuePeriod,
    ) -> Result<Vec<RevenueRecord>, LedgerError> {
        let (from, to) = period_bounds(period)?;
        let records = self.repo.revenue_by_service(from, to).await?;
        debug!(%period, services = records.len(), "revenue aggregated");
        Ok(records)
    }

    /// Revenue for the month along with its date range and grand total.
    pub async fn monthly_revenue_report(
        &self,
        period: RevenuePeriod,
    ) -> Result<MonthlyRevenueReport, LedgerError> {
        let (from, to) = period_bounds(period)?;
        let records = self.monthly_revenue_by_service(period).await?;
        MonthlyRevenueReport::new(period, from, to, records)
    }

    // ========================
    // Integrity
    // ========================

    /// Cross-check balances, the journal and reservations.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let audits = self.repo.account_audits().await?;
        let stats = self.repo.get_integrity_stats().await?;

        let report = build_integrity_report(
            &audits,
            stats.reservation_count,
            stats.entry_count,
            stats.orphan_reservations,
        );

        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity check found issues");
        }
        Ok(report)
    }
}

fn ensure_id(id: i64, field: &str) -> Result<(), LedgerError> {
    if id <= 0 {
        return Err(LedgerError::InvalidRequest(format!("{} must be positive", field)));
    }
    Ok(())
}

fn ensure_key(key: &ReservationKey) -> Result<(), LedgerError> {
    ensure_id(key.account_id, "user_id")?;
    ensure_id(key.service_id, "service_id")?;
    ensure_id(key.order_id, "order_id")
}

fn ensure_positive(amount: Cents) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

fn period_bounds(period: RevenuePeriod) -> Result<(DateTime<Utc>, DateTime<Utc>), LedgerError> {
    period
        .bounds()
        .ok_or_else(|| LedgerError::InvalidRequest(format!("unsupported period {}", period)))
}

/// Roll back explicitly so the write lock is released before returning `err`.
async fn abort<T>(tx: Transaction<'static, Sqlite>, err: LedgerError) -> Result<T, LedgerError> {
    if let Err(rollback_err) = tx.rollback().await {
        // The connection discards the transaction when it is returned anyway.
        warn!(error = %rollback_err, "rollback failed");
    }
    Err(err)
}
