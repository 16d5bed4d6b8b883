//! Advisory lock over the layer and image store.
//!
//! Builds and garbage collection take the lock exclusively; `run` and
//! `inspect` take it shared so an image cannot be collected while it is
//! being read. Locks never block: a held lock is reported with the holder's
//! command and PID.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_FILENAME: &str = ".lock";
const LOCK_METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Written by exclusive holders so contention errors can name them.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockHolder {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub store: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error(
    "store is in use by `cdstage {command}` (PID {pid}, started at unix time {started_at_unix})\n\
     if no cdstage process is running, remove the lock file:\n  {}",
    lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "store is in use by another cdstage process\n\
     if no cdstage process is running, remove the lock file:\n  {}",
    lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create store directory {}: {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock holder: {0}")]
  WriteHolder(#[source] io::Error),

  #[error("failed to acquire store lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held until dropped.
pub struct StoreLock {
  file: File,
  lock_path: PathBuf,
  mode: LockMode,
}

impl StoreLock {
  pub fn acquire(store: &Path, mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    std::fs::create_dir_all(store).map_err(|source| StoreLockError::CreateDir {
      path: store.to_path_buf(),
      source,
    })?;

    let lock_path = store.join(LOCK_FILENAME);
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StoreLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention_error(&lock_path));
      }
      return Err(StoreLockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      write_holder(&file, command, store)?;
    }
    debug!(path = ?lock_path, ?mode, command, "acquired store lock");

    Ok(StoreLock { file, lock_path, mode })
  }

  /// Holder record, read through the held handle. Opening a second handle
  /// would fail on Windows while the lock is held.
  pub fn holder(&self) -> io::Result<LockHolder> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }
}

fn write_holder(file: &File, command: &str, store: &Path) -> Result<(), StoreLockError> {
  let holder = LockHolder {
    version: LOCK_METADATA_VERSION,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    store: store.to_path_buf(),
  };

  file.set_len(0).map_err(StoreLockError::WriteHolder)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &holder).map_err(|e| StoreLockError::WriteHolder(io::Error::other(e)))?;
  writer.flush().map_err(StoreLockError::WriteHolder)
}

fn contention_error(lock_path: &Path) -> StoreLockError {
  let holder = std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockHolder>(&contents).ok());

  match holder {
    Some(holder) => StoreLockError::Contention {
      command: holder.command,
      pid: holder.pid,
      started_at_unix: holder.started_at_unix,
      lock_path: lock_path.to_path_buf(),
    },
    None => StoreLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: a zeroed OVERLAPPED is valid and `handle` is an open file.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
