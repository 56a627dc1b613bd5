use clap::{ArgGroup, CommandFactory, Parser};
use lab_bench::{
    discover_devices, flash_led, init_logging, load_config, plot_trace, record_trace,
    save_trace, AppConfig, CancellationToken, LabError, SimulatedScope, TraceSettings,
};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

/// Utilities to gather data from the PicoScope
#[derive(Parser, Debug)]
#[command(name = "picoscope")]
#[command(about = "Utilities to gather data from the PicoScope", long_about = None)]
#[command(group(ArgGroup::new("action").args(["flash_led", "list_devices", "record_trace"])))]
struct Args {
    /// The serial number of the PicoScope to connect to
    #[arg(short = 'n', long = "serial_number", value_name = "SERIAL")]
    serial_number: Option<String>,

    /// Flash the LED
    #[arg(short = 'f', long = "flash_led")]
    flash_led: bool,

    /// Print out serial numbers of all connected devices
    #[arg(short = 'l', long = "list_devices")]
    list_devices: bool,

    /// Record a block-mode trace, save it to DATA_FILE and plot it
    #[arg(short = 'r', long = "record_trace", value_name = "DATA_FILE")]
    record_trace: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !args.flash_led && !args.list_devices && args.record_trace.is_none() {
        Args::command().print_help()?;
        println!();
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging, args.log_level.as_deref())?;

    let serial_number = args
        .serial_number
        .clone()
        .unwrap_or_else(|| config.scope.default_serial_number.clone());
    let token = setup_shutdown_handler()?;
    // TODO: select a PS3000a-backed implementation once a driver binding is available
    let mut scope = SimulatedScope::new(vec![config.scope.default_serial_number.clone()]);

    let result: Result<(), Box<dyn std::error::Error>> = if args.flash_led {
        flash_led(&mut scope, &serial_number, config.scope.led_flashes, &token)
            .map_err(Into::into)
    } else if args.list_devices {
        discover_devices(&mut scope, true)
            .map(|_| ())
            .map_err(Into::into)
    } else if let Some(data_file) = &args.record_trace {
        run_record_trace(&mut scope, &config, &serial_number, data_file, &token)
    } else {
        Ok(())
    };

    if let Err(e) = &result {
        error!("✗ {}", e);
    }
    result
}

fn run_record_trace(
    scope: &mut SimulatedScope,
    config: &AppConfig,
    serial_number: &str,
    data_file: &Path,
    token: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = TraceSettings::try_from(&config.scope)?;
    let trace = match record_trace(scope, serial_number, &settings, token) {
        Ok(trace) => trace,
        Err(LabError::Cancelled) => {
            info!("Trace recording stopped by user, nothing saved");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    save_trace(&trace, data_file)?;
    info!("✓ Trace written to {}", data_file.display());

    if let Err(e) = plot_trace(&trace, 0) {
        warn!("Could not plot trace: {}", e);
    }
    Ok(())
}

fn setup_shutdown_handler() -> Result<CancellationToken, ctrlc::Error> {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - aborting...");
        handler_token.cancel();
    })?;

    Ok(token)
}
