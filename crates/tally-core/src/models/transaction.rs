//! Transaction model

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether money flows into or out of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Outcome,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Outcome => "outcome",
        }
    }

    /// Apply the direction's sign to an unsigned amount.
    #[must_use]
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Income => amount,
            Self::Outcome => -amount,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" | "in" | "+" => Ok(Self::Income),
            "outcome" | "out" | "expense" | "-" => Ok(Self::Outcome),
            other => Err(Error::InvalidInput(format!("unknown direction '{other}'"))),
        }
    }
}

/// A money movement on one account.
///
/// Negative ids are minted locally while the transaction has not reached the
/// server yet. Equality and hashing look at the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub category_id: i64,
    pub direction: Direction,
    /// Unsigned magnitude; the sign comes from `direction`
    pub amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub comment: Option<String>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Fields that identify the same real-world transaction across id spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub account_id: i64,
    pub amount: Decimal,
    pub transaction_date_ms: i64,
    pub category_id: i64,
}

impl Transaction {
    /// Whether the id was minted locally and is not known to the server
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.id < 0
    }

    /// Amount with the direction's sign applied
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }

    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            account_id: self.account_id,
            amount: self.amount.normalize(),
            transaction_date_ms: self.transaction_date.timestamp_millis(),
            category_id: self.category_id,
        }
    }

    /// Mutation body sent to the remote service
    #[must_use]
    pub fn to_request_body(&self) -> TransactionRequestBody {
        TransactionRequestBody {
            account_id: self.account_id,
            category_id: self.category_id,
            amount: self.amount.to_string(),
            transaction_date: self
                .transaction_date
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            comment: self.comment.clone(),
        }
    }

    /// Build a transaction from a mutation body under the given id.
    pub fn from_request_body(
        id: i64,
        direction: Direction,
        body: &TransactionRequestBody,
    ) -> Result<Self> {
        Ok(Self {
            id,
            account_id: body.account_id,
            category_id: body.category_id,
            direction,
            amount: body.parsed_amount()?,
            transaction_date: body.parsed_date()?,
            comment: body.comment.clone(),
        })
    }
}

/// A transaction that has not been assigned any id yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account_id: i64,
    pub category_id: i64,
    pub direction: Direction,
    pub amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub comment: Option<String>,
}

impl NewTransaction {
    /// Validate the draft and attach an id.
    pub fn into_transaction(self, id: i64) -> Result<Transaction> {
        if self.amount.is_sign_negative() {
            return Err(Error::InvalidInput(
                "amount must not be negative; use the direction instead".to_string(),
            ));
        }
        Ok(Transaction {
            id,
            account_id: self.account_id,
            category_id: self.category_id,
            direction: self.direction,
            amount: self.amount,
            transaction_date: truncate_to_millis(self.transaction_date),
            comment: self
                .comment
                .map(|comment| comment.trim().to_string())
                .filter(|comment| !comment.is_empty()),
        })
    }
}

/// Wire body for transaction create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequestBody {
    pub account_id: i64,
    pub category_id: i64,
    /// Decimal amount as text
    pub amount: String,
    /// RFC 3339 timestamp
    pub transaction_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TransactionRequestBody {
    pub fn parsed_amount(&self) -> Result<Decimal> {
        Ok(Decimal::from_str(self.amount.trim())?)
    }

    pub fn parsed_date(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.transaction_date.trim())
            .map(|date| truncate_to_millis(date.with_timezone(&Utc)))
            .map_err(|error| {
                Error::InvalidInput(format!(
                    "invalid transaction date '{}': {error}",
                    self.transaction_date
                ))
            })
    }
}

/// Drop sub-millisecond precision so stored and compared dates agree.
#[must_use]
pub fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(date.timestamp_millis()).unwrap_or(date)
}
