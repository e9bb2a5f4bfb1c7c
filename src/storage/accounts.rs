//! Account store. Every function runs on a connection that is already inside
//! a write transaction; callers commit or roll back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::domain::{Account, AccountId, Cents};

use super::{decode_timestamp, encode_timestamp};

/// Result of applying a signed delta to a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied(Account),
    InsufficientFunds { balance: Cents },
    /// A credit would push the balance past `Cents::MAX`
    Overflow { balance: Cents },
    NotFound,
}

/// Result of crediting an account that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied(Account),
    /// The credit would overflow the balance
    Overflow { balance: Cents },
}

pub async fn get(conn: &mut SqliteConnection, id: AccountId) -> Result<Option<Account>> {
    let row = sqlx::query(
        r#"
        SELECT id, balance, created_at, updated_at
        FROM accounts
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch account")?;

    row.as_ref().map(row_to_account).transpose()
}

/// Atomically add `delta` to the balance unless the result would be negative.
///
/// The conditional update is the first statement touching the row, so the
/// check and the write happen under the same database write lock.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    id: AccountId,
    delta: Cents,
    at: DateTime<Utc>,
) -> Result<DeltaOutcome> {
    // balance + delta >= 0, phrased so that it cannot overflow
    let row = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = balance + ?, updated_at = ?
        WHERE id = ? AND balance >= ? AND balance <= ?
        RETURNING id, balance, created_at, updated_at
        "#,
    )
    .bind(delta)
    .bind(encode_timestamp(at))
    .bind(id)
    .bind(if delta < 0 { -delta } else { 0 })
    .bind(if delta > 0 { Cents::MAX - delta } else { Cents::MAX })
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to update balance")?;

    if let Some(row) = row {
        return Ok(DeltaOutcome::Applied(row_to_account(&row)?));
    }

    match get(conn, id).await? {
        Some(account) if delta > 0 => Ok(DeltaOutcome::Overflow {
            balance: account.balance,
        }),
        Some(account) => Ok(DeltaOutcome::InsufficientFunds {
            balance: account.balance,
        }),
        None => Ok(DeltaOutcome::NotFound),
    }
}

/// Credit `amount` to the account, creating it with a zero balance first if
/// it does not exist.
pub async fn credit_or_create(
    conn: &mut SqliteConnection,
    id: AccountId,
    amount: Cents,
    at: DateTime<Utc>,
) -> Result<CreditOutcome> {
    debug_assert!(amount > 0);
    let now = encode_timestamp(at);

    let row = sqlx::query(
        r#"
        INSERT INTO accounts (id, balance, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE
        SET balance = balance + excluded.balance, updated_at = excluded.updated_at
        WHERE accounts.balance <= ?
        RETURNING id, balance, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(amount)
    .bind(&now)
    .bind(&now)
    .bind(Cents::MAX - amount)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to credit account")?;

    if let Some(row) = row {
        return Ok(CreditOutcome::Applied(row_to_account(&row)?));
    }

    let balance = get(conn, id)
        .await?
        .map(|account| account.balance)
        .ok_or_else(|| anyhow::anyhow!("Account {} vanished during credit", id))?;
    Ok(CreditOutcome::Overflow { balance })
}

pub(crate) fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Account {
        id: row.get("id"),
        balance: row.get("balance"),
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}
