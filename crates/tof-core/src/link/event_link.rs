//! Event Link (C5, spec.md §4.5): a second outbound TCP connection used to
//! push asynchronous event/telemetry packets to the Hub. Unlike the Command
//! Link it is primarily a sender; an inbound reader is only spun up when the
//! caller supplies a sink (spec.md §4.5 "may also receive").

use std::net::{SocketAddr, TcpStream};
use std::os::fd::{IntoRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::socket::{MsgFlags, recv};
use tracing::{info, warn};

use crate::codec::{self, Packet};
use crate::fdreg::{FdRegistry, Role};

use super::{CONNECT_BACKOFF, LinkError, POLL_TIMEOUT, READ_CHUNK, Reassembler, SOCKET_ERROR_BACKOFF};

pub struct EventLink {
  hub_addr: SocketAddr,
  fdreg: Arc<FdRegistry>,
  running: Arc<AtomicBool>,
  thread: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EventLink {
  pub fn new(hub_addr: SocketAddr, fdreg: Arc<FdRegistry>) -> Self {
    Self {
      hub_addr,
      fdreg,
      running: Arc::new(AtomicBool::new(false)),
      thread: std::sync::Mutex::new(None),
    }
  }

  /// Connect (with reconnect-on-failure) and optionally forward inbound
  /// packets to `sink`. Pass a no-op sink to run send-only.
  pub fn start<S>(&self, sink: S)
  where
    S: Fn(Packet) + Send + Sync + 'static,
  {
    self.running.store(true, Ordering::SeqCst);
    let running = self.running.clone();
    let fdreg = self.fdreg.clone();
    let hub_addr = self.hub_addr;

    let join = thread::Builder::new()
      .name("event-link".to_string())
      .spawn(move || run_loop(hub_addr, fdreg, running, sink))
      .expect("spawn event-link thread");

    *self.thread.lock().unwrap() = Some(join);
  }

  /// Send a packet out over the current event connection, serialized by
  /// the FD registry's per-fd send mutex (spec.md §4.1 sendOn).
  pub fn send_packet(&self, pkt: &Packet) -> Result<(), LinkError> {
    let fd = self
      .fdreg
      .get_server(Role::Event)
      .ok_or(LinkError::NotConnected)?;
    let wire = codec::serialize(pkt);
    self.fdreg.send_on(fd, &wire).map_err(|_| LinkError::NotConnected)?;
    Ok(())
  }

  pub fn stop(&self) {
    self.running.store(false, Ordering::SeqCst);
    self.fdreg.remove_server(Role::Event);
    if let Some(handle) = self.thread.lock().unwrap().take() {
      let _ = handle.join();
    }
  }
}

fn run_loop<S>(hub_addr: SocketAddr, fdreg: Arc<FdRegistry>, running: Arc<AtomicBool>, sink: S)
where
  S: Fn(Packet) + Send + Sync + 'static,
{
  while running.load(Ordering::SeqCst) {
    let stream = match TcpStream::connect(hub_addr) {
      Ok(s) => s,
      Err(e) => {
        warn!(event = "event_link_connect_failed", error = %e, "connect failed, retrying");
        sleep_while_running(&running, CONNECT_BACKOFF);
        continue;
      }
    };

    if stream.set_read_timeout(Some(POLL_TIMEOUT)).is_err() {
      continue;
    }
    // Transfer fd ownership to the registry: it becomes the sole closer,
    // so a force-close from `stop()` can never race a live `TcpStream`
    // drop over the same fd number.
    let fd = stream.into_raw_fd();
    if fdreg.set_server(Role::Event, fd).is_err() {
      let _ = nix::unistd::close(fd);
      continue;
    }
    info!(event = "event_link_connected", addr = %hub_addr, "event link connected");

    read_until_disconnect(fd, &running, &sink);

    fdreg.remove_server(Role::Event);
    if running.load(Ordering::SeqCst) {
      warn!(event = "event_link_reconnecting", "connection lost, reconnecting");
      sleep_while_running(&running, SOCKET_ERROR_BACKOFF);
    }
  }
}

fn read_until_disconnect<S>(fd: RawFd, running: &Arc<AtomicBool>, sink: &S)
where
  S: Fn(Packet) + Send + Sync + 'static,
{
  let mut reassembler = Reassembler::new();
  let mut scratch = [0u8; READ_CHUNK];

  while running.load(Ordering::SeqCst) {
    match recv(fd, &mut scratch, MsgFlags::empty()) {
      Ok(0) => return,
      Ok(n) => {
        let drained = reassembler.feed(&scratch[..n]);
        for frame in drained.frames {
          if let Ok(pkt) = codec::parse(&frame) {
            sink(pkt);
          } else {
            warn!(event = "event_link_parse_failed", "frame parse failed");
            return;
          }
        }
        if drained.corrupt {
          warn!(event = "event_link_corrupt_stream", "argc overflow; closing connection");
          return;
        }
      }
      Err(nix::errno::Errno::EAGAIN | nix::errno::Errno::EWOULDBLOCK | nix::errno::Errno::EINTR) => continue,
      Err(_) => return,
    }
  }
}

fn sleep_while_running(running: &Arc<AtomicBool>, total: Duration) {
  let step = Duration::from_millis(50);
  let mut waited = Duration::ZERO;
  while waited < total && running.load(Ordering::SeqCst) {
    thread::sleep(step.min(total - waited));
    waited += step;
  }
}
