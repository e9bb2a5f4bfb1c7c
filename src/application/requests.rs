//! Request shapes accepted by the ledger and their validation.
//!
//! Each request decodes leniently (every field optional) and is then checked
//! by [`Validate::validate`], which yields a typed value the service accepts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{parse_cents, AccountId, Cents, ReservationKey, RevenuePeriod};

const AMOUNT_FIELDS: [&str; 2] = ["amount", "price"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("{field} is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Required(field) | ValidationError::NotPositive(field) => field,
            ValidationError::Malformed { field, .. } | ValidationError::OutOfRange { field, .. } => {
                field
            }
        }
    }

    /// True when the offending field carries money.
    pub fn is_amount(&self) -> bool {
        AMOUNT_FIELDS.contains(&self.field())
    }
}

pub trait Validate {
    type Valid;

    fn validate(&self) -> Result<Self::Valid, ValidationError>;
}

/// A money field as it arrives on the wire: a JSON number or a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountField {
    Number(serde_json::Number),
    Text(String),
}

impl AmountField {
    fn to_cents(&self, field: &'static str) -> Result<Cents, ValidationError> {
        let text = match self {
            AmountField::Number(number) => number.to_string(),
            AmountField::Text(text) => text.clone(),
        };
        parse_cents(&text).map_err(|e| ValidationError::Malformed {
            field,
            reason: e.to_string(),
        })
    }
}

impl From<&str> for AmountField {
    fn from(text: &str) -> Self {
        AmountField::Text(text.to_string())
    }
}

fn required<T: Copy>(value: Option<T>, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::Required(field))
}

fn positive_id(value: Option<i64>, field: &'static str) -> Result<i64, ValidationError> {
    let value = required(value, field)?;
    if value <= 0 {
        return Err(ValidationError::NotPositive(field));
    }
    Ok(value)
}

fn positive_amount(value: Option<&AmountField>, field: &'static str) -> Result<Cents, ValidationError> {
    let cents = value
        .ok_or(ValidationError::Required(field))?
        .to_cents(field)?;
    if cents <= 0 {
        return Err(ValidationError::NotPositive(field));
    }
    Ok(cents)
}

fn in_range(
    value: Option<i64>,
    field: &'static str,
    min: i64,
    max: i64,
) -> Result<i64, ValidationError> {
    let value = required(value, field)?;
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// `{user_id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Validate for BalanceRequest {
    type Valid = AccountId;

    fn validate(&self) -> Result<AccountId, ValidationError> {
        positive_id(self.user_id, "user_id")
    }
}

/// `{user_id, amount}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub amount: Option<AmountField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidDeposit {
    pub account_id: AccountId,
    pub amount: Cents,
}

impl Validate for DepositRequest {
    type Valid = ValidDeposit;

    fn validate(&self) -> Result<ValidDeposit, ValidationError> {
        Ok(ValidDeposit {
            account_id: positive_id(self.user_id, "user_id")?,
            amount: positive_amount(self.amount.as_ref(), "amount")?,
        })
    }
}

/// `{user_id, service_id, order_id, price}`, shared by reserve, approve and
/// disapprove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub service_id: Option<i64>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub price: Option<AmountField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidOrder {
    pub key: ReservationKey,
    pub amount: Cents,
}

impl Validate for OrderRequest {
    type Valid = ValidOrder;

    fn validate(&self) -> Result<ValidOrder, ValidationError> {
        let key = ReservationKey::new(
            positive_id(self.user_id, "user_id")?,
            positive_id(self.service_id, "service_id")?,
            positive_id(self.order_id, "order_id")?,
        );
        Ok(ValidOrder {
            key,
            amount: positive_amount(self.price.as_ref(), "price")?,
        })
    }
}

/// `{month, year}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueReportRequest {
    #[serde(default)]
    pub month: Option<i64>,
    #[serde(default)]
    pub year: Option<i64>,
}

impl Validate for RevenueReportRequest {
    type Valid = RevenuePeriod;

    fn validate(&self) -> Result<RevenuePeriod, ValidationError> {
        let month = in_range(self.month, "month", 1, 12)?;
        let year = in_range(self.year, "year", 1, 9999)?;
        // Both values were range-checked above, so the conversions are lossless.
        RevenuePeriod::new(month as u32, year as i32).ok_or(ValidationError::OutOfRange {
            field: "month",
            value: month,
            min: 1,
            max: 12,
        })
    }
}
