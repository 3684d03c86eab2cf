//! FD Registry (C1): process-wide authority over every socket the core
//! owns. Grounded on `original_source/FlightOps/include/GRAMS_TOF_FDManager.h`
//! (the `SafeFD`/`GRAMS_TOF_FDManager` pair) and on the teacher's singleton
//! registry pattern (`agency-core::adapters::pty::registry`, a
//! `once_cell::sync::Lazy<Mutex<_>>`).

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::socket::{MsgFlags, recv, send};
use thiserror::Error;

/// Role tag for a server-role file descriptor (spec.md §3 FDEntry).
/// Mirrors the original's `ServerKind` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
  Command,
  Event,
  Daq,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
  #[error("refusing to register standard stream fd {0}")]
  StdioFd(RawFd),
  #[error("fd {0} is not registered")]
  NotRegistered(RawFd),
}

/// A single owned fd: atomically replaceable, with sends serialized by a
/// per-fd mutex (spec.md §4.1).
#[derive(Debug)]
struct SafeFd {
  fd: AtomicI32,
  send_mtx: Mutex<()>,
}

impl SafeFd {
  fn new(fd: RawFd) -> Self {
    Self {
      fd: AtomicI32::new(fd),
      send_mtx: Mutex::new(()),
    }
  }

  fn get(&self) -> RawFd {
    self.fd.load(Ordering::Acquire)
  }

  /// Atomically install `fd`, closing whatever was previously owned.
  fn set(&self, fd: RawFd) {
    let old = self.fd.swap(fd, Ordering::AcqRel);
    close_if_owned(old);
  }

  fn close(&self) {
    let old = self.fd.swap(-1, Ordering::AcqRel);
    close_if_owned(old);
  }

  /// Blocking write of the full buffer; short writes and `EINTR` retry.
  /// Uses `MSG_NOSIGNAL` so a peer disconnect never raises `SIGPIPE`.
  fn send_all(&self, data: &[u8]) -> Result<usize, std::io::Error> {
    let _guard = self.send_mtx.lock().unwrap();
    let fd = self.fd.load(Ordering::Acquire);
    if fd <= 2 {
      return Err(std::io::Error::from(std::io::ErrorKind::NotConnected));
    }
    let mut total = 0usize;
    while total < data.len() {
      match send(fd, &data[total..], MsgFlags::MSG_NOSIGNAL) {
        Ok(n) => total += n,
        Err(nix::errno::Errno::EINTR) => continue,
        Err(e) => return Err(std::io::Error::from(e)),
      }
    }
    Ok(total)
  }
}

impl Drop for SafeFd {
  fn drop(&mut self) {
    self.close();
  }
}

fn close_if_owned(fd: RawFd) {
  if fd > 2 {
    let _ = nix::unistd::close(fd);
  }
}

/// Outcome of a single non-blocking `recvOn` (spec.md §4.1).
#[derive(Debug, PartialEq, Eq)]
pub enum RecvOutcome {
  WouldBlock,
  Data(usize),
  Error,
}

/// Process-wide registry of owned sockets (spec.md §4.1 FD Registry).
#[derive(Default)]
pub struct FdRegistry {
  servers: Mutex<HashMap<Role, Arc<SafeFd>>>,
  clients: Mutex<HashMap<RawFd, Arc<SafeFd>>>,
}

impl FdRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_server(&self, role: Role, fd: RawFd) -> Result<(), ResourceError> {
    if fd <= 2 {
      return Err(ResourceError::StdioFd(fd));
    }
    let mut servers = self.servers.lock().unwrap();
    match servers.get(&role) {
      Some(existing) => existing.set(fd),
      None => {
        servers.insert(role, Arc::new(SafeFd::new(fd)));
      }
    }
    Ok(())
  }

  pub fn get_server(&self, role: Role) -> Option<RawFd> {
    let servers = self.servers.lock().unwrap();
    servers.get(&role).map(|s| s.get()).filter(|fd| *fd > 2)
  }

  pub fn remove_server(&self, role: Role) {
    let mut servers = self.servers.lock().unwrap();
    if let Some(entry) = servers.remove(&role) {
      entry.close();
    }
  }

  pub fn add_client(&self, fd: RawFd) -> Result<(), ResourceError> {
    if fd <= 2 {
      return Err(ResourceError::StdioFd(fd));
    }
    let mut clients = self.clients.lock().unwrap();
    clients
      .entry(fd)
      .or_insert_with(|| Arc::new(SafeFd::new(fd)));
    Ok(())
  }

  pub fn remove_client(&self, fd: RawFd) {
    let mut clients = self.clients.lock().unwrap();
    if let Some(entry) = clients.remove(&fd) {
      entry.close();
    }
  }

  pub fn list_clients(&self) -> Vec<RawFd> {
    self.clients.lock().unwrap().keys().copied().collect()
  }

  fn lookup(&self, fd: RawFd) -> Option<Arc<SafeFd>> {
    if let Some(entry) = self.clients.lock().unwrap().get(&fd) {
      return Some(entry.clone());
    }
    self
      .servers
      .lock()
      .unwrap()
      .values()
      .find(|entry| entry.get() == fd)
      .cloned()
  }

  /// Acquire the per-fd mutex and write the full buffer (spec.md §4.1 sendOn).
  pub fn send_on(&self, fd: RawFd, data: &[u8]) -> Result<usize, ResourceError> {
    let entry = self.lookup(fd).ok_or(ResourceError::NotRegistered(fd))?;
    entry
      .send_all(data)
      .map_err(|_| ResourceError::NotRegistered(fd))
  }

  /// Fan out `data` to every registered client, returning how many sends
  /// succeeded (original `GRAMS_TOF_FDManager::sendToAllClients`).
  pub fn send_to_all_clients(&self, data: &[u8]) -> usize {
    let snapshot: Vec<Arc<SafeFd>> = self.clients.lock().unwrap().values().cloned().collect();
    snapshot
      .iter()
      .filter(|entry| entry.send_all(data).is_ok())
      .count()
  }

  /// Single non-blocking read (spec.md §4.1 recvOn).
  pub fn recv_on(&self, fd: RawFd, buffer: &mut [u8]) -> RecvOutcome {
    match recv(fd, buffer, MsgFlags::MSG_DONTWAIT) {
      Ok(0) => RecvOutcome::Error,
      Ok(n) => RecvOutcome::Data(n),
      Err(nix::errno::Errno::EWOULDBLOCK) => RecvOutcome::WouldBlock,
      Err(_) => RecvOutcome::Error,
    }
  }
}
