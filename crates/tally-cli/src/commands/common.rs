use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::config::CONFIG_FILE_NAME;
use tally_core::models::BackupOperation;
use tally_core::{DatabaseService, Direction, Engine, EngineConfig, Transaction};

use crate::cli::DirectionArg;
use crate::error::CliError;

/// Paths and flags shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub offline: bool,
}

impl CliContext {
    pub fn resolve(db_path: Option<PathBuf>, config_path: Option<PathBuf>, offline: bool) -> Self {
        Self {
            db_path: resolve_db_path(db_path),
            config_path: config_path.unwrap_or_else(default_config_path),
            offline,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListItem {
    pub id: i64,
    pub account_id: i64,
    pub category_id: i64,
    pub direction: String,
    pub amount: String,
    pub signed_amount: String,
    pub transaction_date: String,
    pub comment: Option<String>,
    pub pending: bool,
}

#[derive(Debug, Serialize)]
pub struct PendingOperationItem {
    pub id: String,
    pub operation: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub queued_at: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join(CONFIG_FILE_NAME)
}

pub fn load_config(context: &CliContext) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::load(&context.config_path)?;
    if context.offline {
        config.start_offline = true;
    }
    Ok(config)
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path).await?)
}

pub async fn open_engine(context: &CliContext) -> Result<Engine, CliError> {
    let config = load_config(context)?;
    let db = open_database(&context.db_path).await?;
    let (engine, _connectivity) = Engine::from_config(db, &config)?;
    if !engine.is_connected() {
        tracing::debug!("Working offline; changes will be queued for sync");
    }
    Ok(engine)
}

/// Explicit account or the current one.
pub async fn resolve_account_id(engine: &Engine, account: Option<i64>) -> Result<i64, CliError> {
    match account {
        Some(id) => Ok(id),
        None => Ok(engine.accounts().current_account().await?.id),
    }
}

pub fn parse_amount(raw: &str) -> Result<Decimal, CliError> {
    let amount =
        Decimal::from_str(raw.trim()).map_err(|_| CliError::InvalidAmount(raw.to_string()))?;
    if amount.is_sign_negative() {
        return Err(CliError::InvalidAmount(raw.to_string()));
    }
    Ok(amount)
}

pub fn parse_day(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(raw.to_string()))
}

/// Accepts a plain day (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, CliError> {
    let raw_trimmed = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw_trimmed, "%Y-%m-%d") {
        return Ok(day.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(raw_trimmed)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| CliError::InvalidDate(raw.to_string()))
}

pub const fn direction_from_arg(direction: DirectionArg) -> Direction {
    match direction {
        DirectionArg::Income => Direction::Income,
        DirectionArg::Outcome => Direction::Outcome,
    }
}

pub fn transaction_to_list_item(transaction: &Transaction) -> TransactionListItem {
    TransactionListItem {
        id: transaction.id,
        account_id: transaction.account_id,
        category_id: transaction.category_id,
        direction: transaction.direction.to_string(),
        amount: transaction.amount.normalize().to_string(),
        signed_amount: transaction.signed_amount().normalize().to_string(),
        transaction_date: transaction
            .transaction_date
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        comment: transaction.comment.clone(),
        pending: transaction.is_local(),
    }
}

pub fn format_transaction_lines(transactions: &[Transaction]) -> Vec<String> {
    transactions
        .iter()
        .map(|transaction| {
            let marker = if transaction.is_local() { " *" } else { "" };
            let comment = transaction
                .comment
                .as_deref()
                .map(|comment| format!("  {comment}"))
                .unwrap_or_default();
            format!(
                "{:>6}  {}  {:>12}  cat {}{}{}",
                transaction.id,
                transaction.transaction_date.format("%Y-%m-%d"),
                format_signed(transaction.signed_amount()),
                transaction.category_id,
                comment,
                marker
            )
        })
        .collect()
}

pub fn pending_operation_to_item(operation: &BackupOperation) -> PendingOperationItem {
    PendingOperationItem {
        id: operation.id.to_string(),
        operation: operation.kind().to_string(),
        entity_type: operation.entity_type.to_string(),
        entity_id: operation.entity_id,
        queued_at: format_timestamp(operation.timestamp),
        attempts: operation.attempts,
        last_error: operation.last_error.clone(),
    }
}

pub fn format_pending_lines(operations: &[BackupOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let failure = operation
                .last_error
                .as_deref()
                .map(|error| format!("  ({} attempt(s): {error})", operation.attempts))
                .unwrap_or_default();
            format!(
                "{}  {:<6} {:<11} {:>6}{}",
                format_timestamp(operation.timestamp),
                operation.kind(),
                operation.entity_type,
                operation.entity_id,
                failure
            )
        })
        .collect()
}

pub fn format_signed(amount: Decimal) -> String {
    let amount = amount.normalize();
    if amount.is_sign_negative() {
        amount.to_string()
    } else {
        format!("+{amount}")
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M").to_string(),
    )
}
