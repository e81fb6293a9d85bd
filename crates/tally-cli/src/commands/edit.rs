use tally_core::Transaction;

use crate::cli::DirectionArg;
use crate::commands::common::{direction_from_arg, open_engine, parse_amount, parse_date, CliContext};
use crate::error::CliError;

#[derive(Default)]
pub struct EditArgs<'a> {
    pub amount: Option<&'a str>,
    pub direction: Option<DirectionArg>,
    pub category: Option<i64>,
    pub date: Option<&'a str>,
    pub comment: Option<String>,
}

impl EditArgs<'_> {
    const fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.direction.is_none()
            && self.category.is_none()
            && self.date.is_none()
            && self.comment.is_none()
    }
}

pub async fn run_edit(id: i64, args: EditArgs<'_>, context: &CliContext) -> Result<(), CliError> {
    if args.is_empty() {
        return Err(CliError::NothingToUpdate);
    }

    let engine = open_engine(context).await?;
    let existing = engine
        .transactions()
        .get(id)
        .await?
        .ok_or_else(|| tally_core::Error::NotFound(format!("transaction {id}")))?;

    let edited = Transaction {
        amount: args.amount.map(parse_amount).transpose()?.unwrap_or(existing.amount),
        direction: args
            .direction
            .map_or(existing.direction, direction_from_arg),
        category_id: args.category.unwrap_or(existing.category_id),
        transaction_date: args
            .date
            .map(parse_date)
            .transpose()?
            .unwrap_or(existing.transaction_date),
        comment: args.comment.or_else(|| existing.comment.clone()),
        ..existing
    };

    let stored = engine.transactions().update(edited).await?;
    println!("{}", stored.id);
    Ok(())
}
