use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use std::path::PathBuf;

use chase_qfx_fixer::{run, CsvColumns, IoTarget, RunConfig};

/// Attempt to fix up a Chase QFX file
#[derive(Debug, Parser)]
#[command(name = "fixqfx", author, version, about, long_about = None)]
struct Args {
    /// QFX file to read, usually called JPMC.QFX ("-" for stdin)
    src: String,

    /// Output file. If not present, prints to screen ("-" for stdout)
    dst: Option<String>,

    /// Optional CSV copy of the same transactions, read for greater accuracy. Usually called JPMC.CSV
    #[arg(long = "csv", value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Override location of the intermediate file (kept after the run)
    #[arg(long = "temp", value_name = "PATH")]
    temp: Option<PathBuf>,

    /// Pause before converting the intermediate file back to QFX
    #[arg(long = "pause")]
    pause: bool,

    /// Name of the posted-date column in the CSV
    #[arg(long = "csv-date-column", value_name = "NAME", default_value = "Post Date")]
    csv_date_column: String,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout may be the QFX itself
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let mut config = RunConfig::new(IoTarget::parse(&args.src))
        .with_pause(args.pause)
        .with_csv_columns(CsvColumns {
            date: args.csv_date_column,
            ..CsvColumns::default()
        });
    if let Some(dst) = &args.dst {
        config = config.with_output(IoTarget::parse(dst));
    }
    if let Some(csv) = args.csv {
        config = config.with_csv(csv);
    }
    if let Some(temp) = args.temp {
        config = config.with_temp(temp);
    }

    let summary = run(&config)?;
    info!("Done: {}", summary.summary());
    match serde_json::to_string(&summary) {
        Ok(json) => debug!("Run summary: {}", json),
        Err(e) => warn!("Could not serialize run summary: {}", e),
    }

    Ok(())
}
