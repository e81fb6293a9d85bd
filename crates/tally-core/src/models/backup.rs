//! Pending mutation records kept in the backup log

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountUpdateBody, TransactionRequestBody};
use crate::error::Error;

/// A unique identifier for a backup operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupOperationId(Uuid);

impl BackupOperationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BackupOperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackupOperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackupOperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of entity a pending mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Transaction,
    Account,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transaction" => Ok(Self::Transaction),
            "account" => Ok(Self::Account),
            other => Err(Error::Database(format!("unknown entity type '{other}'"))),
        }
    }
}

/// Payload-free discriminant of a [`BackupMutation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::Database(format!("unknown operation type '{other}'"))),
        }
    }
}

/// Body carried by create and update operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "lowercase")]
pub enum BackupPayload {
    Transaction(TransactionRequestBody),
    Account(AccountUpdateBody),
}

impl BackupPayload {
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Transaction(_) => EntityType::Transaction,
            Self::Account(_) => EntityType::Account,
        }
    }
}

/// What a pending operation does to its entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMutation {
    Create(BackupPayload),
    Update(BackupPayload),
    Delete,
}

impl BackupMutation {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::Delete => OperationKind::Delete,
        }
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&BackupPayload> {
        match self {
            Self::Create(payload) | Self::Update(payload) => Some(payload),
            Self::Delete => None,
        }
    }
}

/// One durable pending mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOperation {
    pub id: BackupOperationId,
    /// Negative for locally minted ids
    pub entity_id: i64,
    pub entity_type: EntityType,
    pub mutation: BackupMutation,
    /// Creation time (Unix ms); replay order
    pub timestamp: i64,
    /// Non-conflict replay failures so far
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl BackupOperation {
    /// Create an operation stamped with the current time.
    #[must_use]
    pub fn new(entity_id: i64, entity_type: EntityType, mutation: BackupMutation) -> Self {
        Self {
            id: BackupOperationId::new(),
            entity_id,
            entity_type,
            mutation,
            timestamp: crate::util::now_millis(),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn create_transaction(entity_id: i64, body: TransactionRequestBody) -> Self {
        Self::new(
            entity_id,
            EntityType::Transaction,
            BackupMutation::Create(BackupPayload::Transaction(body)),
        )
    }

    pub fn update_transaction(entity_id: i64, body: TransactionRequestBody) -> Self {
        Self::new(
            entity_id,
            EntityType::Transaction,
            BackupMutation::Update(BackupPayload::Transaction(body)),
        )
    }

    pub fn delete_transaction(entity_id: i64) -> Self {
        Self::new(entity_id, EntityType::Transaction, BackupMutation::Delete)
    }

    pub fn create_account(entity_id: i64, body: AccountUpdateBody) -> Self {
        Self::new(
            entity_id,
            EntityType::Account,
            BackupMutation::Create(BackupPayload::Account(body)),
        )
    }

    pub fn delete_account(entity_id: i64) -> Self {
        Self::new(entity_id, EntityType::Account, BackupMutation::Delete)
    }

    pub fn update_account(entity_id: i64, body: AccountUpdateBody) -> Self {
        Self::new(
            entity_id,
            EntityType::Account,
            BackupMutation::Update(BackupPayload::Account(body)),
        )
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.mutation.kind()
    }

    /// Override the timestamp; used when replaying history with known times.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}
