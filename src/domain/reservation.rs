use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type ServiceId = i64;
pub type OrderId = i64;
pub type ReservationId = Uuid;

/// Identifies one reservation: at most one may exist per triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationKey {
    pub account_id: AccountId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
}

impl ReservationKey {
    pub fn new(account_id: AccountId, service_id: ServiceId, order_id: OrderId) -> Self {
        Self {
            account_id,
            service_id,
            order_id,
        }
    }
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user {} / service {} / order {}",
            self.account_id, self.service_id, self.order_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Funds are debited and waiting for settlement
    Held,
    /// Funds realized as service revenue
    Approved,
    /// Funds returned to the account
    Disapproved,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Disapproved => "disapproved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "held" => Some(ReservationStatus::Held),
            "approved" => Some(ReservationStatus::Approved),
            "disapproved" => Some(ReservationStatus::Disapproved),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Held)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a held reservation is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Approve,
    Disapprove,
}

impl Settlement {
    /// Terminal status reached by this settlement.
    pub fn status(&self) -> ReservationStatus {
        match self {
            Settlement::Approve => ReservationStatus::Approved,
            Settlement::Disapprove => ReservationStatus::Disapproved,
        }
    }
}

/// Funds held against one (account, service, order) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub key: ReservationKey,
    /// Held amount in cents (always positive)
    pub amount: Cents,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    /// Set once when the reservation leaves `Held`
    pub settled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn new(key: ReservationKey, amount: Cents, at: DateTime<Utc>) -> Self {
        assert!(amount > 0, "Reservation amount must be positive");
        Self {
            id: Uuid::new_v4(),
            key,
            amount,
            status: ReservationStatus::Held,
            created_at: at,
            settled_at: None,
        }
    }
}
