//! `tofctl`: the Controller (C10) composition-root executable (spec.md §6
//! CLI surface).

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tof_core::config::{DEFAULT_COMMAND_PORT, DEFAULT_EVENT_PORT};
use tof_core::controller::{Controller, ControllerOptions};
use tof_core::logging::{self, LogLevel, LogTarget};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "tofctl", about = "TOF Flight Operations Control Core")]
struct Args {
  /// Run without attaching to DMA ring hardware; use the in-memory DMA
  /// simulation for the DAQ Worker.
  #[arg(long)]
  no_fpga: bool,

  /// TCP port the Command Link connects to on the Hub.
  #[arg(long, default_value_t = DEFAULT_COMMAND_PORT)]
  command_port: u16,

  /// TCP port the Event Link connects to on the Hub.
  #[arg(long, default_value_t = DEFAULT_EVENT_PORT)]
  event_port: u16,

  /// IP address of the Hub.
  #[arg(long)]
  event_ip: IpAddr,

  /// Path to the INI-style configuration file.
  #[arg(long)]
  config_file: PathBuf,

  /// Path to write JSON log lines, or `-` for stderr.
  #[arg(long, default_value = "-")]
  log_file: String,
}

fn main() -> ExitCode {
  let args = Args::parse();

  if args.log_file == "-" {
    logging::init(LogTarget::Stderr, LogLevel::Info);
  } else {
    logging::init(LogTarget::File(std::path::Path::new(&args.log_file)), LogLevel::Info);
  }

  let config = match tof_core::config::load(&args.config_file) {
    Ok(c) => c,
    Err(e) => {
      error!(event = "config_load_failed", error = %e, "configuration load failed");
      return ExitCode::FAILURE;
    }
  };

  let tofdata_root = match std::env::var("TOFDATA") {
    Ok(v) => PathBuf::from(v),
    Err(_) => {
      error!(event = "tofdata_unset", "$TOFDATA must be set in the environment");
      return ExitCode::FAILURE;
    }
  };

  let script_root = config
    .get_absolute_path("main", "script_root")
    .unwrap_or_else(|_| config.config_dir().to_path_buf());

  let controller = Controller::new(ControllerOptions {
    no_fpga: args.no_fpga,
    command_port: args.command_port,
    event_port: args.event_port,
    event_ip: args.event_ip,
    config,
    script_root,
    tofdata_root,
  });

  if let Err(e) = controller.initialize() {
    error!(event = "daq_init_failed", error = %e, "DAQ initialization failed");
    return ExitCode::FAILURE;
  }

  controller.run();
  ExitCode::SUCCESS
}
