use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use thorium::devices::caen::Caen;
use thorium::devices::lecroy::LeCroy;
use thorium::stop::spawn_monitor;
use thorium::{DaqError, DaqRunner, RunConfig, StopSignal};

#[derive(Parser)]
#[command(name = "thorium", about = "Step a CAEN supply through a voltage list and capture LeCroy waveforms at each point")]
struct Cli {
    /// Config file with settings for the DAQ
    #[arg(long)]
    config: PathBuf,

    /// Output file prefix, each set point is written to <outfile>_<volts>V
    #[arg(long, default_value = "latest_daq.root")]
    outfile: String,

    /// Don't read stop requests from the console
    #[arg(long)]
    no_monitor: bool,
}

fn main() -> Result<(), DaqError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Welcome to Thorium DAQ");

    info!("Loading in {}", cli.config.display());
    let cfg = RunConfig::load(&cli.config)?;
    let sweep = cfg.sweep_config(&cli.outfile)?;
    info!("Saving to {}_<volts>V for set points {:?}", cli.outfile, sweep.volts);

    let stop = StopSignal::new();
    if !cli.no_monitor {
        // Not joined, it may still be blocked on stdin when the sweep ends
        spawn_monitor(stop.clone(), BufReader::new(io::stdin()), io::stdout(), cfg.monitor_delay()?);
    }

    let supply = Caen::new(&cfg.caen.ip, cfg.caen.port, cfg.caen.board, cfg.io_timeout())?;
    let scope = LeCroy::new(&cfg.lecroy.ip, cfg.io_timeout())?;

    let report = DaqRunner::new(sweep, supply, scope, stop).run()?;

    match serde_json::to_string_pretty(&report) {
        Ok(s) => println!("{}", s),
        Err(e) => warn!("Unable to format run report: {}", e),
    }
    Ok(())
}
