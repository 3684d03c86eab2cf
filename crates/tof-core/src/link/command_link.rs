//! Command Link (C4, spec.md §4.4): one persistent outbound TCP connection
//! to the Hub's command port, reassembling the stream into packets,
//! dispatching each to a handler, and ACKing after each successful
//! invocation.

use std::net::{SocketAddr, TcpStream};
use std::os::fd::{IntoRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::socket::{MsgFlags, recv};
use tracing::{debug, info, warn};

use crate::codec::{self, Packet};
use crate::fdreg::{FdRegistry, Role};

use super::{CONNECT_BACKOFF, POLL_TIMEOUT, READ_CHUNK, Reassembler, SOCKET_ERROR_BACKOFF};

pub struct CommandLink {
  hub_addr: SocketAddr,
  fdreg: Arc<FdRegistry>,
  running: Arc<AtomicBool>,
  thread: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CommandLink {
  pub fn new(hub_addr: SocketAddr, fdreg: Arc<FdRegistry>) -> Self {
    Self {
      hub_addr,
      fdreg,
      running: Arc::new(AtomicBool::new(false)),
      thread: std::sync::Mutex::new(None),
    }
  }

  /// Start the reader thread. `handler` is invoked once per packet, in
  /// wire order, after the ACK for that packet has been sent (spec.md
  /// §4.4 step g–h, §5 ordering guarantee).
  pub fn start<H>(&self, handler: H)
  where
    H: Fn(Packet) + Send + Sync + 'static,
  {
    self.running.store(true, Ordering::SeqCst);
    let running = self.running.clone();
    let fdreg = self.fdreg.clone();
    let hub_addr = self.hub_addr;

    let join = thread::Builder::new()
      .name("command-link".to_string())
      .spawn(move || run_loop(hub_addr, fdreg, running, handler))
      .expect("spawn command-link thread");

    *self.thread.lock().unwrap() = Some(join);
  }

  /// Stop the link: clears the running flag, closes the fd to unblock any
  /// in-flight read, and joins the reader thread (spec.md §5 cancellation).
  pub fn stop(&self) {
    self.running.store(false, Ordering::SeqCst);
    self.fdreg.remove_server(Role::Command);
    if let Some(handle) = self.thread.lock().unwrap().take() {
      let _ = handle.join();
    }
  }
}

fn run_loop<H>(hub_addr: SocketAddr, fdreg: Arc<FdRegistry>, running: Arc<AtomicBool>, handler: H)
where
  H: Fn(Packet) + Send + Sync + 'static,
{
  while running.load(Ordering::SeqCst) {
    let stream = match TcpStream::connect(hub_addr) {
      Ok(s) => s,
      Err(e) => {
        warn!(event = "command_link_connect_failed", error = %e, "connect failed, retrying");
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
    if fdreg.set_server(Role::Command, fd).is_err() {
      let _ = nix::unistd::close(fd);
      continue;
    }
    info!(event = "command_link_connected", addr = %hub_addr, "command link connected");

    serve_connection(fd, &fdreg, &running, &handler);

    fdreg.remove_server(Role::Command);
    if running.load(Ordering::SeqCst) {
      warn!(event = "command_link_reconnecting", "connection lost, reconnecting");
      sleep_while_running(&running, SOCKET_ERROR_BACKOFF);
    }
  }
}

fn serve_connection<H>(fd: RawFd, fdreg: &Arc<FdRegistry>, running: &Arc<AtomicBool>, handler: &H)
where
  H: Fn(Packet) + Send + Sync + 'static,
{
  let mut reassembler = Reassembler::new();
  let mut scratch = [0u8; READ_CHUNK];

  while running.load(Ordering::SeqCst) {
    match recv(fd, &mut scratch, MsgFlags::empty()) {
      Ok(0) => {
        info!(event = "command_link_peer_closed", "peer closed connection");
        return;
      }
      Ok(n) => {
        let drained = reassembler.feed(&scratch[..n]);
        for frame in drained.frames {
          match codec::parse(&frame) {
            Ok(pkt) => {
              let ack = Packet::new(pkt.code, vec![codec::packet_size(&pkt) as i32]);
              let wire = codec::serialize(&ack);
              if fdreg.send_on(fd, &wire).is_err() {
                warn!(event = "command_link_ack_send_failed", "ACK send failed");
                return;
              }
              debug!(event = "command_link_packet", code = pkt.code, "dispatching packet");
              handler(pkt);
            }
            Err(e) => {
              warn!(event = "command_link_parse_failed", error = %e, "frame parse failed");
              return;
            }
          }
        }
        if drained.corrupt {
          warn!(event = "command_link_corrupt_stream", "argc overflow; closing connection");
          return;
        }
      }
      Err(nix::errno::Errno::EAGAIN | nix::errno::Errno::EWOULDBLOCK | nix::errno::Errno::EINTR) => {
        continue;
      }
      Err(e) => {
        warn!(event = "command_link_read_error", error = %e, "read error");
        return;
      }
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
