use chrono::Utc;
use tally_core::NewTransaction;

use crate::cli::DirectionArg;
use crate::commands::common::{
    direction_from_arg, open_engine, parse_amount, parse_date, resolve_account_id, CliContext,
};
use crate::error::CliError;

pub struct AddArgs<'a> {
    pub amount: &'a str,
    pub direction: DirectionArg,
    pub category: i64,
    pub account: Option<i64>,
    pub date: Option<&'a str>,
    pub comment: Option<String>,
}

pub async fn run_add(args: AddArgs<'_>, context: &CliContext) -> Result<i64, CliError> {
    let engine = open_engine(context).await?;
    let account_id = resolve_account_id(&engine, args.account).await?;
    let transaction_date = args.date.map(parse_date).transpose()?.unwrap_or_else(Utc::now);

    let created = engine
        .transactions()
        .create(NewTransaction {
            account_id,
            category_id: args.category,
            direction: direction_from_arg(args.direction),
            amount: parse_amount(args.amount)?,
            transaction_date,
            comment: args.comment,
        })
        .await?;

    if created.is_local() {
        println!("{} (queued for sync)", created.id);
    } else {
        println!("{}", created.id);
    }
    Ok(created.id)
}
