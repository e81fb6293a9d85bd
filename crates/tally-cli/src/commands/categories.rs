use crate::cli::DirectionArg;
use crate::commands::common::{direction_from_arg, open_engine, CliContext};
use crate::error::CliError;

pub async fn run_categories(
    direction: Option<DirectionArg>,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    let categories = match direction {
        Some(direction) => {
            engine
                .categories()
                .by_direction(direction_from_arg(direction))
                .await?
        }
        None => engine.categories().fetch_categories().await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else if categories.is_empty() {
        println!("No categories available.");
    } else {
        for category in &categories {
            println!(
                "{:>4}  {} {} ({})",
                category.id, category.emoji, category.name, category.direction
            );
        }
    }
    Ok(())
}
