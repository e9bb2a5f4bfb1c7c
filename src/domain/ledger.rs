use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{format_cents, AccountId, Cents, OrderId, ReservationKey, ServiceId};

pub type EntryId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Funds added to the balance
    Deposit,
    /// Funds debited into a held reservation
    Reserve,
    /// Held funds returned after a disapproval
    Release,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Reserve => "reserve",
            EntryKind::Release => "release",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EntryKind::Deposit),
            "reserve" => Some(EntryKind::Reserve),
            "release" => Some(EntryKind::Release),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One balance mutation in an account's statement.
/// Entries are append-only and written in the same transaction as the
/// balance change they describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Monotonically increasing, assigned by the repository
    pub sequence: i64,
    pub account_id: AccountId,
    pub kind: EntryKind,
    /// Signed balance delta in cents
    pub amount: Cents,
    pub balance_after: Cents,
    pub service_id: Option<ServiceId>,
    pub order_id: Option<OrderId>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn deposit(
        account_id: AccountId,
        amount: Cents,
        balance_after: Cents,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(account_id, EntryKind::Deposit, amount, balance_after, None, at)
    }

    pub fn reserve(
        key: &ReservationKey,
        amount: Cents,
        balance_after: Cents,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            key.account_id,
            EntryKind::Reserve,
            -amount,
            balance_after,
            Some(key),
            at,
        )
    }

    pub fn release(
        key: &ReservationKey,
        amount: Cents,
        balance_after: Cents,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            key.account_id,
            EntryKind::Release,
            amount,
            balance_after,
            Some(key),
            at,
        )
    }

    fn build(
        account_id: AccountId,
        kind: EntryKind,
        amount: Cents,
        balance_after: Cents,
        key: Option<&ReservationKey>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by repository
            account_id,
            kind,
            amount,
            balance_after,
            service_id: key.map(|k| k.service_id),
            order_id: key.map(|k| k.order_id),
            recorded_at: at,
        }
    }
}

/// Per-account figures gathered for an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountAudit {
    pub account_id: AccountId,
    pub balance: Cents,
    /// Sum of all journal deltas
    pub journal_total: Cents,
    /// Sum of reserve debits, as a positive number
    pub reserved_total: Cents,
    /// Sum of release credits
    pub released_total: Cents,
    pub held: Cents,
    pub approved: Cents,
    pub disapproved: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub reservation_count: i64,
    pub entry_count: i64,
    pub total_balance: Cents,
    pub total_held: Cents,
    pub total_approved: Cents,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Cross-check balances against the journal and reservations.
pub fn build_integrity_report(
    audits: &[AccountAudit],
    reservation_count: i64,
    entry_count: i64,
    orphan_reservations: i64,
) -> IntegrityReport {
    let mut issues = Vec::new();

    for audit in audits {
        let id = audit.account_id;
        if audit.balance < 0 {
            issues.push(format!(
                "Account {} has negative balance {}",
                id,
                format_cents(audit.balance)
            ));
        }
        if audit.journal_total != audit.balance {
            issues.push(format!(
                "Account {} balance {} does not match journal total {}",
                id,
                format_cents(audit.balance),
                format_cents(audit.journal_total)
            ));
        }
        let reservations_total = audit.held + audit.approved + audit.disapproved;
        if audit.reserved_total != reservations_total {
            issues.push(format!(
                "Account {} reserved {} but reservations total {}",
                id,
                format_cents(audit.reserved_total),
                format_cents(reservations_total)
            ));
        }
        if audit.released_total != audit.disapproved {
            issues.push(format!(
                "Account {} released {} but disapproved reservations total {}",
                id,
                format_cents(audit.released_total),
                format_cents(audit.disapproved)
            ));
        }
    }

    if orphan_reservations > 0 {
        issues.push(format!(
            "{} reservation(s) reference missing accounts",
            orphan_reservations
        ));
    }

    IntegrityReport {
        account_count: audits.len() as i64,
        reservation_count,
        entry_count,
        total_balance: audits.iter().map(|a| a.balance).sum(),
        total_held: audits.iter().map(|a| a.held).sum(),
        total_approved: audits.iter().map(|a| a.approved).sum(),
        issues,
    }
}
