//! Tally CLI - record income and spending from the terminal
//!
//! Works offline: changes are stored locally and replayed on `tally sync`.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{AccountCommands, Cli, Commands, ConfigCommands};
use crate::commands::account::{
    run_account_add, run_account_delete, run_account_init, run_account_show, run_account_update,
};
use crate::commands::add::{run_add, AddArgs};
use crate::commands::categories::run_categories;
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::config::{run_config_init, run_config_show, ConfigInitArgs};
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::pending::run_pending;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "tally=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext::resolve(cli.db_path, cli.config, cli.offline);

    match cli.command {
        Commands::Add {
            amount,
            direction,
            category,
            account,
            date,
            comment,
        } => {
            run_add(
                AddArgs {
                    amount: &amount,
                    direction,
                    category,
                    account,
                    date: date.as_deref(),
                    comment,
                },
                &context,
            )
            .await?;
        }
        Commands::List {
            account,
            from,
            to,
            json,
        } => run_list(account, from.as_deref(), to.as_deref(), json, &context).await?,
        Commands::Edit {
            id,
            amount,
            direction,
            category,
            date,
            comment,
        } => {
            run_edit(
                id,
                EditArgs {
                    amount: amount.as_deref(),
                    direction,
                    category,
                    date: date.as_deref(),
                    comment,
                },
                &context,
            )
            .await?;
        }
        Commands::Delete { id } => run_delete(id, &context).await?,
        Commands::Account { command } => match command {
            AccountCommands::Init {
                id,
                name,
                balance,
                currency,
            } => run_account_init(id, &name, &balance, &currency, &context).await?,
            AccountCommands::Add {
                name,
                balance,
                currency,
            } => {
                run_account_add(&name, &balance, &currency, &context).await?;
            }
            AccountCommands::Show { id, json } => run_account_show(id, json, &context).await?,
            AccountCommands::Delete { id } => run_account_delete(id, &context).await?,
            AccountCommands::Update {
                id,
                name,
                balance,
                currency,
            } => run_account_update(id, name, balance.as_deref(), currency, &context).await?,
        },
        Commands::Categories { direction, json } => {
            run_categories(direction, json, &context).await?;
        }
        Commands::Sync { json } => run_sync(json, &context).await?,
        Commands::Pending { json } => run_pending(json, &context).await?,
        Commands::Export { format, output } => {
            run_export(format, output.as_deref(), &context).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => run_config_show(&context)?,
            ConfigCommands::Init {
                api_base_url,
                timeout_secs,
                stuck_after,
                start_offline,
            } => {
                run_config_init(
                    ConfigInitArgs {
                        api_base_url,
                        timeout_secs,
                        stuck_after,
                        start_offline,
                    },
                    &context,
                )?;
            }
        },
    }

    Ok(())
}
