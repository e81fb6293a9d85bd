use chrono::{Days, Utc};

use crate::commands::common::{
    format_transaction_lines, open_engine, parse_day, resolve_account_id,
    transaction_to_list_item, CliContext, TransactionListItem,
};
use crate::error::CliError;

const DEFAULT_RANGE_DAYS: u64 = 30;

pub async fn run_list(
    account: Option<i64>,
    from: Option<&str>,
    to: Option<&str>,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    let account_id = resolve_account_id(&engine, account).await?;

    let to = to.map(parse_day).transpose()?.unwrap_or_else(|| Utc::now().date_naive());
    let from = match from {
        Some(raw) => parse_day(raw)?,
        None => to.checked_sub_days(Days::new(DEFAULT_RANGE_DAYS)).unwrap_or(to),
    };

    let transactions = engine
        .transactions()
        .fetch_transactions(account_id, from, to)
        .await?;

    if as_json {
        let json_items = transactions
            .iter()
            .map(transaction_to_list_item)
            .collect::<Vec<TransactionListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if transactions.is_empty() {
        println!("No transactions between {from} and {to}.");
    } else {
        for line in format_transaction_lines(&transactions) {
            println!("{line}");
        }
    }

    Ok(())
}
