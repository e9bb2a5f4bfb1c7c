use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{EntryKind, LedgerEntry};

use super::{decode_timestamp, encode_timestamp};

pub(crate) const ENTRY_COLUMNS: &str = "sequence, id, account_id, kind, amount, balance_after, service_id, order_id, recorded_at";

/// Append an entry to the journal and assign its sequence number.
pub async fn append(conn: &mut SqliteConnection, entry: &mut LedgerEntry) -> Result<()> {
    let row = sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, account_id, kind, amount, balance_after, service_id, order_id, recorded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING sequence
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.account_id)
    .bind(entry.kind.as_str())
    .bind(entry.amount)
    .bind(entry.balance_after)
    .bind(entry.service_id)
    .bind(entry.order_id)
    .bind(encode_timestamp(entry.recorded_at))
    .fetch_one(&mut *conn)
    .await
    .context("Failed to append ledger entry")?;

    entry.sequence = row.get("sequence");
    Ok(())
}

pub(crate) fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
    let id_str: String = row.get("id");
    let kind_str: String = row.get("kind");
    let recorded_at_str: String = row.get("recorded_at");

    Ok(LedgerEntry {
        id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
        sequence: row.get("sequence"),
        account_id: row.get("account_id"),
        kind: EntryKind::from_str(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid entry kind: {}", kind_str))?,
        amount: row.get("amount"),
        balance_after: row.get("balance_after"),
        service_id: row.get("service_id"),
        order_id: row.get("order_id"),
        recorded_at: decode_timestamp(&recorded_at_str)?,
    })
}
