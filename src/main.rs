//! homeval - train, evaluate and explain home valuation models

use clap::Parser;
use home_valuation::cli::{cmd_info, cmd_predict, cmd_train, query_record, Cli, Commands, TrainOverrides};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "home_valuation=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, config, output, models, seed, test_size, n_iter, cv_folds } => {
            let overrides = TrainOverrides { output, models, seed, test_size, n_iter, cv_folds };
            cmd_train(&data, config.as_deref(), &overrides)?;
        }
        Commands::Predict { model, sqft, bedrooms, bathrooms, year_built, zip, top_k } => {
            let record = query_record(sqft, bedrooms, bathrooms, year_built, zip.as_deref());
            cmd_predict(&model, record, top_k)?;
        }
        Commands::Info { data, target } => {
            cmd_info(&data, target.as_deref())?;
        }
    }

    Ok(())
}
