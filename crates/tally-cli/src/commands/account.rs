use tally_core::BankAccount;

use crate::commands::common::{open_engine, parse_amount, CliContext};
use crate::error::CliError;

pub async fn run_account_init(
    id: i64,
    name: &str,
    balance: &str,
    currency: &str,
    context: &CliContext,
) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    let account = engine
        .accounts()
        .create_local(BankAccount {
            id,
            name: name.to_string(),
            balance: parse_signed_balance(balance)?,
            currency: currency.to_string(),
        })
        .await?;

    println!("{}", format_account_line(&account));
    Ok(())
}

/// Returns the new account's id; negative while it waits to sync.
pub async fn run_account_add(
    name: &str,
    balance: &str,
    currency: &str,
    context: &CliContext,
) -> Result<i64, CliError> {
    let engine = open_engine(context).await?;
    let account = engine
        .accounts()
        .create(BankAccount {
            id: 0,
            name: name.to_string(),
            balance: parse_signed_balance(balance)?,
            currency: currency.to_string(),
        })
        .await?;

    if account.id < 0 {
        println!("{} (queued for sync)", format_account_line(&account));
    } else {
        println!("{}", format_account_line(&account));
    }
    Ok(account.id)
}

pub async fn run_account_delete(id: i64, context: &CliContext) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    let removed = engine.accounts().delete(id).await?;
    println!("Deleted account {} ({})", removed.id, removed.name);
    Ok(())
}

pub async fn run_account_show(
    id: Option<i64>,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    let id = match id {
        Some(id) => id,
        None => engine.accounts().current_account().await?.id,
    };
    let account = engine.accounts().fetch_account(id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        println!("{}", format_account_line(&account));
        let unsynced = engine.status().unsynced_count();
        if unsynced > 0 {
            println!("{unsynced} change(s) waiting to sync");
        }
    }
    Ok(())
}

pub async fn run_account_update(
    id: Option<i64>,
    name: Option<String>,
    balance: Option<&str>,
    currency: Option<String>,
    context: &CliContext,
) -> Result<(), CliError> {
    if name.is_none() && balance.is_none() && currency.is_none() {
        return Err(CliError::NothingToUpdate);
    }

    let engine = open_engine(context).await?;
    let existing = match id {
        Some(id) => engine
            .db()
            .get_account(id)
            .await?
            .ok_or_else(|| tally_core::Error::NotFound(format!("account {id}")))?,
        None => engine.accounts().current_account().await?,
    };

    let updated = engine
        .accounts()
        .update(BankAccount {
            name: name.unwrap_or_else(|| existing.name.clone()),
            balance: balance
                .map(parse_signed_balance)
                .transpose()?
                .unwrap_or(existing.balance),
            currency: currency.unwrap_or_else(|| existing.currency.clone()),
            ..existing
        })
        .await?;

    println!("{}", format_account_line(&updated));
    Ok(())
}

/// Balances may be negative; amounts may not.
pub(crate) fn parse_signed_balance(raw: &str) -> Result<rust_decimal::Decimal, CliError> {
    match raw.trim().strip_prefix('-') {
        Some(magnitude) => parse_amount(magnitude)
            .map(|value| -value)
            .map_err(|_| CliError::InvalidAmount(raw.to_string())),
        None => parse_amount(raw),
    }
}

pub fn format_account_line(account: &BankAccount) -> String {
    format!(
        "{}  {}  {} {}",
        account.id,
        account.name,
        account.balance.normalize(),
        account.currency
    )
}
