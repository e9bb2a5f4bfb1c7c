use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Opaque numeric account (user) identifier. Always positive.
pub type AccountId = i64;

/// A user balance. The balance never drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Spendable balance in cents. Funds held by open reservations are
    /// already debited from it.
    pub balance: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
