use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use spotter::{
    batch::{run_batch, BatchOptions},
    configuration::get_configuration,
    domain::Ean,
    progress::LogProgress,
    services::{EanLookup, PriceChecker},
};

/// Fetch billiger.de lowest prices by EAN code.
#[derive(Parser)]
#[command(name = "spotter", version)]
struct Cli {
    /// CSV file with EAN codes (one row per product)
    #[arg(required_unless_present = "ean")]
    input: Option<PathBuf>,

    /// Where to write the enriched CSV (defaults to <input>_output.csv)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Name of the EAN column (auto-detected when omitted)
    #[arg(long)]
    ean_column: Option<String>,

    /// Start row, 0-indexed
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Maximum number of rows to process (0 = all)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Save progress every N processed rows
    #[arg(long, default_value_t = 10)]
    save_interval: usize,

    /// Run the browser headless regardless of configuration
    #[arg(long)]
    headless: bool,

    /// Look up a single code and print the result as JSON instead of
    /// processing a file
    #[arg(long)]
    ean: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    if cli.headless {
        configuration.browser.headless = true;
    }

    let mut checker = PriceChecker::new(configuration, Box::new(LogProgress));

    if let Some(code) = &cli.ean {
        let ean = Ean::parse(code).map_err(anyhow::Error::msg)?;
        let quote = checker.get_price(&ean).await;
        checker.close().await;
        let quote = quote?;
        println!("{}", serde_json::to_string_pretty(&quote)?);
        return Ok(());
    }

    let input = cli.input.context("an input file is required")?;
    let options = BatchOptions {
        input,
        output: cli.output,
        ean_column: cli.ean_column,
        start_row: cli.start,
        limit: cli.limit,
        save_interval: cli.save_interval,
    };

    // Ctrl-C arms the cancellation flag; the in-flight lookup completes and
    // progress is saved before the loop stops.
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received - finishing the current row");
            cancel_flag.store(true, Ordering::Relaxed);
        }
    });

    let mut progress = LogProgress;
    let outcome = run_batch(&options, &mut checker, &mut progress, &cancel).await;
    checker.close().await;
    outcome?;

    Ok(())
}
