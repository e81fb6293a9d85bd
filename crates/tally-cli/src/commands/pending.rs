use crate::commands::common::{
    format_pending_lines, open_database, pending_operation_to_item, CliContext,
    PendingOperationItem,
};
use crate::error::CliError;

pub async fn run_pending(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let db = open_database(&context.db_path).await?;
    let operations = db.list_backup_operations().await?;

    if as_json {
        let json_items = operations
            .iter()
            .map(pending_operation_to_item)
            .collect::<Vec<PendingOperationItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Everything is synced.");
        return Ok(());
    }

    for line in format_pending_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}
