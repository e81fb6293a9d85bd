//! Database layer for Tally

mod account_repository;
mod backup_repository;
mod category_repository;
mod connection;
mod meta_repository;
mod migrations;
mod transaction_repository;

pub use account_repository::{AccountRepository, LibSqlAccountRepository};
pub use backup_repository::{BackupRepository, LibSqlBackupRepository};
pub use category_repository::{CategoryRepository, LibSqlCategoryRepository};
pub use connection::Database;
pub use meta_repository::{LibSqlMetaRepository, MetaRepository};
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use transaction_repository::{LibSqlTransactionRepository, TransactionRepository};
