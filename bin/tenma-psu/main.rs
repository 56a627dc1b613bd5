use clap::{ArgGroup, CommandFactory, Parser};
use lab_bench::{
    init_logging, load_config, load_series, parse_period, plot_series, AppConfig,
    CancellationToken, PlaceholderSupply, RecordBound, SamplingRecorder,
};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

/// Log and plot voltage/current readings from a TENMA power supply
#[derive(Parser, Debug)]
#[command(name = "tenma-psu")]
#[command(about = "Utilities to log and plot information from the TENMA PSU", long_about = None)]
#[command(group(ArgGroup::new("action").args(["record_iv", "plot_iv"])))]
struct Args {
    /// Log the current and voltage for a certain duration. A measurement is
    /// made every PERIOD_S seconds and the series is written to
    /// DESTINATION_FILE. A DURATION of 0 records until interrupted, otherwise
    /// it is a number of seconds.
    #[arg(
        long = "record_iv",
        num_args = 3,
        value_names = ["DESTINATION_FILE", "PERIOD_S", "DURATION"]
    )]
    record_iv: Option<Vec<String>>,

    /// Plot the data in DATA_FILE that was generated with --record_iv
    #[arg(long = "plot_iv", value_name = "DATA_FILE")]
    plot_iv: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.record_iv.is_none() && args.plot_iv.is_none() {
        Args::command().print_help()?;
        println!();
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging, args.log_level.as_deref())?;

    let result = if let Some(record_args) = &args.record_iv {
        record_iv(&config, record_args)
    } else if let Some(data_file) = &args.plot_iv {
        plot_iv(data_file)
    } else {
        Ok(())
    };

    if let Err(e) = &result {
        error!("✗ {}", e);
    }
    result
}

/// Parse `DESTINATION_FILE PERIOD_S DURATION`, record, then plot
fn record_iv(config: &AppConfig, record_args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let [destination, period, duration] = record_args else {
        return Err(format!(
            "--record_iv expects 3 values, got {}",
            record_args.len()
        )
        .into());
    };

    // Both are validated before anything touches the destination
    let period = parse_period(period)?;
    let bound: RecordBound = duration.parse()?;

    let token = setup_shutdown_handler()?;
    let supply = PlaceholderSupply::new(
        config.psu.placeholder_voltage_v,
        config.psu.placeholder_current_a,
    );
    let mut recorder = SamplingRecorder::new(supply, token.clone());

    let series = recorder.record(Path::new(destination), period, bound)?;
    if token.is_cancelled() {
        info!("✓ Recording stopped by user ({} samples)", series.len());
    } else {
        info!("✓ Recording completed ({} samples)", series.len());
    }

    if let Err(e) = plot_series(&series) {
        warn!("Nothing to plot: {}", e);
    }
    Ok(())
}

fn plot_iv(data_file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let series = load_series(data_file)?;
    plot_series(&series)?;
    Ok(())
}

/// Cancel the returned token on Ctrl+C so the recorder can flush and exit
fn setup_shutdown_handler() -> Result<CancellationToken, ctrlc::Error> {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - stopping after the current sample...");
        handler_token.cancel();
    })?;

    Ok(token)
}
