//! POSIX shared-memory region owned by the DAQ Worker (spec.md §4.7
//! "allocate shared memory" / "release shared memory").

use std::os::fd::{AsFd, OwnedFd};
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap, msync, shm_open, shm_unlink, MsFlags};
use nix::sys::stat::Mode;
use nix::fcntl::OFlag;

use super::error::DaqError;

/// A named, memory-mapped POSIX shm segment. `initialize()` creates it;
/// `cleanup()` unmaps and unlinks it (spec.md §4.7 lifecycle).
pub struct SharedMemoryRegion {
  name: String,
  len: usize,
  fd: Option<OwnedFd>,
  ptr: Option<NonNull<u8>>,
}

// Safety: the mapped region is only ever accessed through `as_slice`/
// `as_mut_slice`, which borrow from `&self`/`&mut self`; the pointer itself
// grants no aliased mutable access across threads.
unsafe impl Send for SharedMemoryRegion {}
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
  /// Open-or-create `name` sized `len` bytes and map it.
  pub fn create(name: &str, len: usize) -> Result<Self, DaqError> {
    let fd = shm_open(
      name,
      OFlag::O_CREAT | OFlag::O_RDWR,
      Mode::S_IRUSR | Mode::S_IWUSR,
    )
    .map_err(|e| DaqError::SharedMemory(format!("shm_open({name}): {e}")))?;

    nix::unistd::ftruncate(&fd, len as i64)
      .map_err(|e| DaqError::SharedMemory(format!("ftruncate({name}): {e}")))?;

    let ptr = unsafe {
      mmap(
        None,
        std::num::NonZeroUsize::new(len).ok_or_else(|| DaqError::SharedMemory("zero-length shm region".into()))?,
        ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        MapFlags::MAP_SHARED,
        fd.as_fd(),
        0,
      )
    }
    .map_err(|e| DaqError::SharedMemory(format!("mmap({name}): {e}")))?;

    Ok(Self {
      name: name.to_string(),
      len,
      fd: Some(fd),
      ptr: NonNull::new(ptr.as_ptr() as *mut u8),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn as_slice(&self) -> &[u8] {
    match self.ptr {
      Some(p) => unsafe { std::slice::from_raw_parts(p.as_ptr(), self.len) },
      None => &[],
    }
  }

  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    match self.ptr {
      Some(p) => unsafe { std::slice::from_raw_parts_mut(p.as_ptr(), self.len) },
      None => &mut [],
    }
  }

  fn unmap(&mut self) {
    if let Some(ptr) = self.ptr.take() {
      unsafe {
        let raw = NonNull::new_unchecked(ptr.as_ptr() as *mut core::ffi::c_void);
        let _ = msync(raw, self.len, MsFlags::MS_SYNC);
        let _ = nix::sys::mman::munmap(raw, self.len);
      }
    }
  }

  /// Unmap and unlink the shm object (spec.md §4.7 `cleanup()`).
  pub fn cleanup(mut self) {
    self.unmap();
    self.fd.take();
    let _ = shm_unlink(self.name.as_str());
  }
}

impl Drop for SharedMemoryRegion {
  fn drop(&mut self) {
    self.unmap();
  }
}
