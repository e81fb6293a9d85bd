//! tally-core - Core library for Tally
//!
//! Offline-first engine for a personal finance tracker: local libSQL store,
//! compacting backup log of unsynced mutations, sync orchestration against
//! the finance API, and local/server reconciliation.

pub mod backup;
pub mod balance;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod network;
pub mod reconcile;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{BankAccount, Category, Direction, NewTransaction, Transaction};
pub use services::{DatabaseService, Engine};
