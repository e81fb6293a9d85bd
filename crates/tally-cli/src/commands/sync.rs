use tally_core::models::SyncStatus;

use crate::commands::common::{open_engine, CliContext};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    if !engine.is_connected() {
        let pending = engine.sync().refresh_unsynced_count().await?;
        println!("Offline: {pending} change(s) waiting to sync");
        return Ok(());
    }

    let outcome = engine.sync().sync_all().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.synced.is_empty() && outcome.remaining == 0 && outcome.conflict.is_none() {
        println!("Nothing to sync");
        return Ok(());
    }

    println!(
        "Synced {} change(s), {} still pending",
        outcome.synced.len(),
        outcome.remaining
    );
    if let SyncStatus::Conflict(conflict) = engine.status().status() {
        println!(
            "Stopped on a conflict for {} {}: {}",
            conflict.entity_type, conflict.entity_id, conflict.message
        );
    }
    if !outcome.stuck.is_empty() {
        println!(
            "{} change(s) keep failing; see `tally pending` for details",
            outcome.stuck.len()
        );
    }
    Ok(())
}
