use std::path::{Path, PathBuf};

use tally_core::export::{self, render_transactions_export, suggested_export_file_name};
use tally_core::util::now_millis;

use crate::cli::ExportFormat;
use crate::commands::common::{open_database, CliContext};
use crate::error::CliError;

impl From<ExportFormat> for export::ExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => Self::Json,
            ExportFormat::Csv => Self::Csv,
        }
    }
}

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    context: &CliContext,
) -> Result<(), CliError> {
    let db = open_database(&context.db_path).await?;
    let transactions = db.list_transactions().await?;
    let format = export::ExportFormat::from(format);
    let rendered = render_transactions_export(&transactions, format)?;

    if let Some(path) = output_path {
        let path = resolve_output_path(path, format);
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

/// A directory target gets a timestamped file name inside it.
fn resolve_output_path(path: &Path, format: export::ExportFormat) -> PathBuf {
    if path.is_dir() {
        path.join(suggested_export_file_name(format, now_millis()))
    } else {
        path.to_path_buf()
    }
}
