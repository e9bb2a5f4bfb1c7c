use thiserror::Error;

use crate::domain::{AccountId, Cents, ReservationKey, ReservationStatus};

use super::ValidationError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationKey),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient funds on account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Reservation already exists: {0}")]
    DuplicateReservation(ReservationKey),

    #[error("Amount mismatch for reservation {key}: held {held}, requested {requested}")]
    AmountMismatch {
        key: ReservationKey,
        held: Cents,
        requested: Cents,
    },

    #[error("Reservation {key} is already {status}")]
    AlreadyTerminal {
        key: ReservationKey,
        status: ReservationStatus,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Report generation failed: {0}")]
    ReportGenerationFailed(String),

    #[error("Database error: {0}")]
    Storage(anyhow::Error),
}

/// Flat classification of [`LedgerError`], e.g. for mapping onto transport
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidAmount,
    InvalidRequest,
    InsufficientFunds,
    DuplicateReservation,
    AmountMismatch,
    AlreadyTerminal,
    StorageUnavailable,
    ReportGenerationFailed,
    Storage,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::DuplicateReservation(_) => ErrorKind::DuplicateReservation,
            LedgerError::AmountMismatch { .. } => ErrorKind::AmountMismatch,
            LedgerError::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
            LedgerError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            LedgerError::ReportGenerationFailed(_) => ErrorKind::ReportGenerationFailed,
            LedgerError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only transient storage failures may be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable(_))
    }
}

/// SQLite primary result codes for a held lock.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        let transient = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
            .any(is_transient);

        if transient {
            LedgerError::StorageUnavailable(format!("{:#}", err))
        } else {
            LedgerError::Storage(err)
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        if err.is_amount() {
            LedgerError::InvalidAmount(err.to_string())
        } else {
            LedgerError::InvalidRequest(err.to_string())
        }
    }
}
