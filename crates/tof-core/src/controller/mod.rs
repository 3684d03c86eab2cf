//! Controller (C10, spec.md §4.10): the composition root. Configures
//! logging, loads configuration, instantiates the DAQ worker, script
//! executor, dispatcher, event link, and command link; wires the command
//! handler to dispatch-then-callback; owns ordered shutdown.

mod signals;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::codec::{CommandCode, Packet};
use crate::config::Config;
use crate::daq::{DaqKind, DaqWorker, DaqWorkerConfig, FrameServer, MockDmaDevice, NullFrameServer, DEFAULT_PARTITIONS, PARTITION_BYTES};
use crate::dispatch::{DaqSession, Dispatcher, SessionError};
use crate::fdreg::FdRegistry;
use crate::link::{CommandLink, EventLink};
use crate::pipeline::PipelineExecutor;
use crate::script::{self, ScriptExecutor};

pub use signals::{install as install_signals, shutdown_requested};

/// CLI surface (spec.md §6): the options `apps/tofctl` parses and passes in.
pub struct ControllerOptions {
  pub no_fpga: bool,
  pub command_port: u16,
  pub event_port: u16,
  pub event_ip: IpAddr,
  pub config: Config,
  pub script_root: PathBuf,
  pub tofdata_root: PathBuf,
}

pub struct Controller {
  fdreg: Arc<FdRegistry>,
  command_link: CommandLink,
  event_link: Arc<EventLink>,
  dispatcher: Arc<Dispatcher>,
  no_fpga: bool,
}

impl Controller {
  /// Build every collaborator. Configuration load failure is fatal at
  /// startup (spec.md §4.10 Failure semantics); the DAQ worker itself is
  /// only probed for initializability here — call `initialize()` before
  /// `run()` to perform that probe.
  pub fn new(opts: ControllerOptions) -> Self {
    let no_fpga = opts.no_fpga;
    let fdreg = Arc::new(FdRegistry::new());

    let hub_addr_command = SocketAddr::new(opts.event_ip, opts.command_port);
    let hub_addr_event = SocketAddr::new(opts.event_ip, opts.event_port);

    let command_link = CommandLink::new(hub_addr_command, fdreg.clone());
    let event_link = Arc::new(EventLink::new(hub_addr_event, fdreg.clone()));

    let worker = build_daq_worker(&opts);
    let session = DaqSession::new(worker);

    let scripts = ScriptExecutor::new(opts.config.clone(), opts.script_root.clone());
    let pipeline = PipelineExecutor::new(opts.config.clone(), opts.tofdata_root.clone());
    let env = script::build_env(&opts.tofdata_root, opts.config.config_dir(), false);

    let dispatcher = Arc::new(Dispatcher::new(session, scripts, pipeline, env));

    Self {
      fdreg,
      command_link,
      event_link,
      dispatcher,
      no_fpga,
    }
  }

  /// DAQ initialization probe (spec.md §4.10 Failure semantics): "DAQ
  /// initialization failure is fatal only if `--no-fpga` was not set".
  /// Skipped entirely in `--no-fpga` mode, matching the original
  /// controller's `if (!config_.noFpgaMode) { ... }` gate around its own
  /// `initialize()` call.
  pub fn initialize(&self) -> Result<(), SessionError> {
    if self.no_fpga {
      info!(event = "daq_init_skipped_no_fpga", "running in no-fpga mode, DAQ init skipped");
      return Ok(());
    }
    self.dispatcher.probe_daq_initialize()
  }

  /// Start both links and block until shutdown is requested (spec.md §4.10,
  /// §5). Returns once the command link, event link, and any DAQ session
  /// have been stopped and joined, in that order.
  pub fn run(&self) {
    install_signals();

    self.event_link.start(|_pkt: Packet| {
      // The event link is primarily a sender; unsolicited inbound packets
      // from the Hub on this channel carry no defined handling today.
    });

    let dispatcher = self.dispatcher.clone();
    let event_link = self.event_link.clone();
    self.command_link.start(move |pkt: Packet| {
      handle_command(&dispatcher, &event_link, pkt);
    });

    info!(event = "controller_started", "controller running");

    while !shutdown_requested() {
      std::thread::sleep(Duration::from_millis(100));
    }

    self.shutdown();
  }

  /// Ordered shutdown (spec.md §4.10): command link, then event link, then
  /// any DAQ session.
  pub fn shutdown(&self) {
    info!(event = "controller_shutdown_start", "controller shutting down");
    self.command_link.stop();
    self.event_link.stop();
    if self.dispatcher.is_daq_running() {
      let _ = self.dispatcher.dispatch(CommandCode::StopDaq, &[]);
    }
    info!(event = "controller_shutdown_done", "controller shut down");
  }

  pub fn fdreg(&self) -> &Arc<FdRegistry> {
    &self.fdreg
  }
}

fn build_daq_worker(opts: &ControllerOptions) -> DaqWorker {
  let socket_path = opts
    .config
    .get_absolute_path("daq", "socket_path")
    .unwrap_or_else(|_| PathBuf::from("/tmp/d.sock"));
  let shm_name = opts
    .config
    .get_string("daq", "shm_name")
    .unwrap_or_else(|_| "/daqd_shm".to_string());

  let dma = Arc::new(MockDmaDevice::new(DEFAULT_PARTITIONS));
  let frame_server: Arc<dyn FrameServer> = Arc::new(NullFrameServer);

  if opts.no_fpga {
    info!(event = "daq_no_fpga_mode", "running with simulated dma ring");
  }

  DaqWorker::new(
    DaqWorkerConfig {
      socket_path,
      shm_name,
      shm_len: PARTITION_BYTES * DEFAULT_PARTITIONS,
      kind: DaqKind::Gbe,
    },
    dma,
    frame_server,
  )
}

/// Translate the wire code, dispatch, and send the CALLBACK (spec.md §4.10
/// steps 1-4). Never lets a send failure or an unknown code terminate the
/// service.
fn handle_command(dispatcher: &Arc<Dispatcher>, event_link: &Arc<EventLink>, pkt: Packet) {
  let success = match CommandCode::try_from_wire(pkt.code) {
    Some(code) => dispatcher.dispatch(code, &pkt.argv),
    None => crate::dispatch::unknown_code(pkt.code),
  };

  let callback = Packet::new(CommandCode::Callback.to_wire(), vec![pkt.code as i32, success as i32]);
  if let Err(e) = event_link.send_packet(&callback) {
    warn!(event = "controller_callback_send_failed", error = %e, "CALLBACK send failed");
  }
}
