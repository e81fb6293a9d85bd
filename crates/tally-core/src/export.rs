//! Transaction export rendering shared by clients.

use std::fmt::Write as _;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::models::Transaction;

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Flat transaction record used by both formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTransaction {
    pub id: i64,
    pub account_id: i64,
    pub category_id: i64,
    pub direction: String,
    pub amount: String,
    pub transaction_date: String,
    pub comment: Option<String>,
    /// Still waiting for a server id
    pub local: bool,
}

const CSV_HEADER: &str = "id,account_id,category_id,direction,amount,transaction_date,comment";

#[must_use]
pub fn transaction_to_export_item(transaction: &Transaction) -> ExportTransaction {
    ExportTransaction {
        id: transaction.id,
        account_id: transaction.account_id,
        category_id: transaction.category_id,
        direction: transaction.direction.to_string(),
        amount: transaction.amount.normalize().to_string(),
        transaction_date: transaction
            .transaction_date
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        comment: transaction.comment.clone(),
        local: transaction.is_local(),
    }
}

/// Render transactions as pretty-printed JSON.
pub fn render_json_export(transactions: &[Transaction]) -> serde_json::Result<String> {
    let items = transactions
        .iter()
        .map(transaction_to_export_item)
        .collect::<Vec<ExportTransaction>>();
    serde_json::to_string_pretty(&items)
}

/// Render transactions as CSV with a header row.
#[must_use]
pub fn render_csv_export(transactions: &[Transaction]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{CSV_HEADER}");

    for transaction in transactions {
        let item = transaction_to_export_item(transaction);
        let _ = writeln!(
            output,
            "{},{},{},{},{},{},{}",
            item.id,
            item.account_id,
            item.category_id,
            item.direction,
            item.amount,
            item.transaction_date,
            csv_field(item.comment.as_deref().unwrap_or_default())
        );
    }

    output
}

/// Render transactions based on selected export format.
pub fn render_transactions_export(
    transactions: &[Transaction],
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(transactions),
        ExportFormat::Csv => Ok(render_csv_export(transactions)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("tally-export-{timestamp_ms}.{}", format.extension())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
