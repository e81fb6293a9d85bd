use crate::commands::common::{open_engine, CliContext};
use crate::error::CliError;

pub async fn run_delete(id: i64, context: &CliContext) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    let deleted = engine.transactions().delete(id).await?;

    println!("Deleted {}", deleted.id);
    Ok(())
}
