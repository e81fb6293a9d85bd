//! Remote finance service interface.
//!
//! The engine talks to the server only through [`RemoteService`]. Failures
//! are classified so the sync orchestrator can tell conflicts apart from
//! everything else.

mod http;

pub use http::HttpRemote;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{
    AccountUpdateBody, BankAccount, Category, Transaction, TransactionRequestBody,
};

/// Result type for remote calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// How the engine reacts to a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Entity was concurrently modified or removed; halts a sync pass
    Conflict,
    /// Entity does not exist on the server
    NotFound,
    /// Anything else; the operation stays queued
    Other,
}

/// Errors returned by a [`RemoteService`]
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// Timeouts, rate limits, and 5xx responses
    #[error("Temporary remote failure: {0}")]
    Transient(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid response payload: {0}")]
    Decode(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API is not configured")]
    NotConfigured,
}

impl RemoteError {
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Conflict(_) => FailureClass::Conflict,
            Self::NotFound(_) => FailureClass::NotFound,
            _ => FailureClass::Other,
        }
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class(), FailureClass::Conflict)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class(), FailureClass::NotFound)
    }
}

/// Server operations the engine depends on
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Authoritative transactions of one account dated within `[from, to]`
    async fn fetch_transactions(
        &self,
        account_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RemoteResult<Vec<Transaction>>;

    /// Create a transaction and return its server-assigned id
    async fn create_transaction(&self, body: &TransactionRequestBody) -> RemoteResult<i64>;

    async fn update_transaction(
        &self,
        id: i64,
        body: &TransactionRequestBody,
    ) -> RemoteResult<Transaction>;

    async fn delete_transaction(&self, id: i64) -> RemoteResult<()>;

    async fn fetch_accounts(&self) -> RemoteResult<Vec<BankAccount>>;

    /// Create an account and return its server-assigned id
    async fn create_account(&self, body: &AccountUpdateBody) -> RemoteResult<i64>;

    async fn update_account(&self, id: i64, body: &AccountUpdateBody)
        -> RemoteResult<BankAccount>;

    async fn delete_account(&self, id: i64) -> RemoteResult<()>;

    async fn fetch_categories(&self) -> RemoteResult<Vec<Category>>;
}

/// Placeholder used when no API base URL is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredRemote;

#[async_trait]
impl RemoteService for UnconfiguredRemote {
    async fn fetch_transactions(
        &self,
        _account_id: i64,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> RemoteResult<Vec<Transaction>> {
        Err(RemoteError::NotConfigured)
    }

    async fn create_transaction(&self, _body: &TransactionRequestBody) -> RemoteResult<i64> {
        Err(RemoteError::NotConfigured)
    }

    async fn update_transaction(
        &self,
        _id: i64,
        _body: &TransactionRequestBody,
    ) -> RemoteResult<Transaction> {
        Err(RemoteError::NotConfigured)
    }

    async fn delete_transaction(&self, _id: i64) -> RemoteResult<()> {
        Err(RemoteError::NotConfigured)
    }

    async fn fetch_accounts(&self) -> RemoteResult<Vec<BankAccount>> {
        Err(RemoteError::NotConfigured)
    }

    async fn create_account(&self, _body: &AccountUpdateBody) -> RemoteResult<i64> {
        Err(RemoteError::NotConfigured)
    }

    async fn update_account(
        &self,
        _id: i64,
        _body: &AccountUpdateBody,
    ) -> RemoteResult<BankAccount> {
        Err(RemoteError::NotConfigured)
    }

    async fn delete_account(&self, _id: i64) -> RemoteResult<()> {
        Err(RemoteError::NotConfigured)
    }

    async fn fetch_categories(&self) -> RemoteResult<Vec<Category>> {
        Err(RemoteError::NotConfigured)
    }
}
