use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track income and spending, online or offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to engine config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not contact the server; queue every change locally
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a transaction
    #[command(alias = "new")]
    Add {
        /// Amount, always positive
        amount: String,
        /// Money in or out
        #[arg(short, long, value_enum, default_value_t = DirectionArg::Outcome)]
        direction: DirectionArg,
        /// Category ID
        #[arg(short, long)]
        category: i64,
        /// Account ID (current account when omitted)
        #[arg(short, long)]
        account: Option<i64>,
        /// Date as YYYY-MM-DD or RFC 3339 (now when omitted)
        #[arg(long)]
        date: Option<String>,
        /// Free-text comment
        #[arg(long)]
        comment: Option<String>,
    },
    /// List transactions of an account
    List {
        /// Account ID (current account when omitted)
        #[arg(short, long)]
        account: Option<i64>,
        /// First day, YYYY-MM-DD (30 days ago when omitted)
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD (today when omitted)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing transaction
    Edit {
        /// Transaction ID
        #[arg(allow_hyphen_values = true)]
        id: i64,
        #[arg(long)]
        amount: Option<String>,
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
        #[arg(short, long)]
        category: Option<i64>,
        #[arg(long)]
        date: Option<String>,
        /// New comment; pass an empty string to clear it
        #[arg(long)]
        comment: Option<String>,
    },
    /// Delete an existing transaction
    Delete {
        /// Transaction ID
        #[arg(allow_hyphen_values = true)]
        id: i64,
    },
    /// Manage bank accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// List categories
    Categories {
        /// Only income or only outcome categories
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued changes against the server
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show changes waiting to sync
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export transactions
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Show or write engine configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    Income,
    Outcome,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create the local account used by other commands
    Init {
        /// Account ID as known to the server
        #[arg(long, default_value = "1")]
        id: i64,
        #[arg(long)]
        name: String,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: String,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// Open a new account, queued for sync when offline
    Add {
        #[arg(long)]
        name: String,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: String,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// Show an account, refreshed from the server when reachable
    Show {
        /// Account ID (current account when omitted)
        #[arg(long)]
        id: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change account details
    Update {
        /// Account ID (current account when omitted)
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        balance: Option<String>,
        #[arg(long)]
        currency: Option<String>,
    },
    /// Delete an account that has no transactions
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write configuration values to the config file
    Init {
        /// Finance API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// HTTP request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Failed replays before an operation is reported as stuck
        #[arg(long)]
        stuck_after: Option<u32>,
        /// Start in offline mode
        #[arg(long)]
        start_offline: Option<bool>,
    },
}
