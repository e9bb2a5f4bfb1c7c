//! Reservation store. Like the account store, these run inside the caller's
//! write transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{
    Cents, Reservation, ReservationKey, ReservationStatus, Settlement,
};

use super::{decode_timestamp, encode_timestamp};

pub(crate) const RESERVATION_COLUMNS: &str =
    "id, account_id, service_id, order_id, amount, status, created_at, settled_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled(Reservation),
    NotFound,
    AlreadyTerminal(ReservationStatus),
    AmountMismatch { held: Cents },
}

/// Insert a new held reservation unless one already exists for its key.
pub async fn create(conn: &mut SqliteConnection, reservation: &Reservation) -> Result<CreateOutcome> {
    let result = sqlx::query(
        r#"
        INSERT INTO reservations (id, account_id, service_id, order_id, amount, status, created_at, settled_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (account_id, service_id, order_id) DO NOTHING
        "#,
    )
    .bind(reservation.id.to_string())
    .bind(reservation.key.account_id)
    .bind(reservation.key.service_id)
    .bind(reservation.key.order_id)
    .bind(reservation.amount)
    .bind(reservation.status.as_str())
    .bind(encode_timestamp(reservation.created_at))
    .bind(reservation.settled_at.map(encode_timestamp))
    .execute(&mut *conn)
    .await
    .context("Failed to save reservation")?;

    Ok(if result.rows_affected() == 1 {
        CreateOutcome::Created
    } else {
        CreateOutcome::AlreadyExists
    })
}

pub async fn get(conn: &mut SqliteConnection, key: &ReservationKey) -> Result<Option<Reservation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM reservations WHERE account_id = ? AND service_id = ? AND order_id = ?",
        RESERVATION_COLUMNS
    ))
    .bind(key.account_id)
    .bind(key.service_id)
    .bind(key.order_id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch reservation")?;

    row.as_ref().map(row_to_reservation).transpose()
}

/// Move a held reservation to its terminal status, exactly once.
///
/// The transition only happens when the reservation is still held and the
/// supplied amount equals the held amount; otherwise nothing is written and
/// the outcome says why.
pub async fn settle(
    conn: &mut SqliteConnection,
    key: &ReservationKey,
    amount: Cents,
    settlement: Settlement,
    at: DateTime<Utc>,
) -> Result<SettleOutcome> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE reservations
        SET status = ?, settled_at = ?
        WHERE account_id = ? AND service_id = ? AND order_id = ?
          AND status = 'held' AND amount = ?
        RETURNING {}
        "#,
        RESERVATION_COLUMNS
    ))
    .bind(settlement.status().as_str())
    .bind(encode_timestamp(at))
    .bind(key.account_id)
    .bind(key.service_id)
    .bind(key.order_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to settle reservation")?;

    if let Some(row) = row {
        return Ok(SettleOutcome::Settled(row_to_reservation(&row)?));
    }

    Ok(match get(conn, key).await? {
        None => SettleOutcome::NotFound,
        Some(existing) if existing.status.is_terminal() => {
            SettleOutcome::AlreadyTerminal(existing.status)
        }
        Some(existing) => SettleOutcome::AmountMismatch {
            held: existing.amount,
        },
    })
}

pub(crate) fn row_to_reservation(row: &sqlx::sqlite::SqliteRow) -> Result<Reservation> {
    let id_str: String = row.get("id");
    let status_str: String = row.get("status");
    let created_at_str: String = row.get("created_at");
    let settled_at_str: Option<String> = row.get("settled_at");

    Ok(Reservation {
        id: Uuid::parse_str(&id_str).context("Invalid reservation ID")?,
        key: ReservationKey {
            account_id: row.get("account_id"),
            service_id: row.get("service_id"),
            order_id: row.get("order_id"),
        },
        amount: row.get("amount"),
        status: ReservationStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid reservation status: {}", status_str))?,
        created_at: decode_timestamp(&created_at_str)?,
        settled_at: settled_at_str
            .as_deref()
            .map(decode_timestamp)
            .transpose()?,
    })
}
