//! Data models for Tally

mod account;
mod backup;
mod category;
mod sync_status;
mod transaction;

pub use account::{AccountUpdateBody, BankAccount};
pub use backup::{
    BackupMutation, BackupOperation, BackupOperationId, BackupPayload, EntityType, OperationKind,
};
pub use category::Category;
pub use sync_status::{ConflictInfo, SyncError, SyncProgress, SyncStatus};
pub use transaction::{
    truncate_to_millis, Direction, NaturalKey, NewTransaction, Transaction,
    TransactionRequestBody,
};
