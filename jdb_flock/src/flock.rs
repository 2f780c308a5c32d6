//! Shared lock object / 共享锁对象
//!
//! One per live file identity. Owns a private duplicate descriptor and is the
//! only place in the process that issues flock on that identity. Only the first
//! shared acquirer and the last shared releaser reach the kernel.
//! 每个存活文件标识一个。持有私有的复制描述符，是进程内唯一对该标识调用
//! flock 的地方。只有第一个共享获取者和最后一个共享释放者会进入内核。

use std::{
  io,
  os::fd::{AsRawFd, OwnedFd},
};

use log::warn;
use parking_lot::Mutex;

use crate::{FileId, sys};

/// Lock state / 锁状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
  Unlocked,
  /// Number of shared holds, always >= 1 / 共享持有数，始终 >= 1
  Shared(u32),
  Exclusive,
}

pub(crate) struct Flock {
  id: FileId,
  fd: OwnedFd,
  // Also serializes syscalls on fd / 同时串行化 fd 上的系统调用
  state: Mutex<State>,
}

impl Flock {
  pub fn new(id: FileId, fd: OwnedFd) -> Self {
    Self {
      id,
      fd,
      state: Mutex::new(State::Unlocked),
    }
  }

  #[inline(always)]
  pub fn id(&self) -> FileId {
    self.id
  }

  #[cfg(test)]
  pub fn state(&self) -> State {
    *self.state.lock()
  }

  /// Ok(false) on contention or when any hold exists, no upgrade
  /// 争用或已有任何持有时返回 Ok(false)，不支持升级
  pub fn try_exclusive(&self) -> io::Result<bool> {
    let mut state = self.state.lock();
    if *state != State::Unlocked {
      return Ok(false);
    }
    if !sys::flock(self.fd.as_raw_fd(), libc::LOCK_EX)? {
      return Ok(false);
    }
    *state = State::Exclusive;
    Ok(true)
  }

  pub fn try_shared(&self) -> io::Result<bool> {
    let mut state = self.state.lock();
    match *state {
      State::Exclusive => Ok(false),
      State::Shared(n) => {
        let Some(n) = n.checked_add(1) else {
          panic!("shared hold count overflow on {} / 共享持有计数溢出", self.id);
        };
        *state = State::Shared(n);
        Ok(true)
      }
      State::Unlocked => {
        if !sys::flock(self.fd.as_raw_fd(), libc::LOCK_SH)? {
          return Ok(false);
        }
        *state = State::Shared(1);
        Ok(true)
      }
    }
  }

  /// Drop one hold. Panics on an unlocked object or a failing LOCK_UN, both
  /// mean the bookkeeping is corrupt.
  /// 释放一个持有。对未加锁对象或 LOCK_UN 失败会 panic，二者都表示记账已损坏。
  pub fn unlock(&self) {
    let mut state = self.state.lock();
    match *state {
      State::Unlocked => panic!("unlock of unlocked flock {} / 解锁未加锁的 flock", self.id),
      State::Shared(n) if n > 1 => {
        *state = State::Shared(n - 1);
        return;
      }
      State::Shared(_) | State::Exclusive => {}
    }
    if let Err(e) = sys::flock(self.fd.as_raw_fd(), libc::LOCK_UN) {
      panic!("LOCK_UN failed on {}: {e} / LOCK_UN 失败", self.id);
    }
    *state = State::Unlocked;
  }
}

impl Drop for Flock {
  fn drop(&mut self) {
    // The duplicate shares its open file description with the caller's fd,
    // closing it alone would keep the lock alive.
    // 副本与调用方 fd 共享打开文件描述，仅关闭它不会释放锁。
    let state = *self.state.get_mut();
    if state != State::Unlocked {
      warn!("flock {} dropped while {state:?} / 持锁状态下被释放", self.id);
      if let Err(e) = sys::flock(self.fd.as_raw_fd(), libc::LOCK_UN) {
        warn!("flock {} LOCK_UN on drop failed: {e} / drop 时解锁失败", self.id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{fs::File, os::fd::AsRawFd};

  use super::*;

  fn flock_of(file: &File) -> Flock {
    let id = FileId::of(file).unwrap();
    Flock::new(id, sys::dup(file.as_raw_fd()).unwrap())
  }

  #[test]
  fn test_exclusive_blocks_all() {
    let file = tempfile::tempfile().unwrap();
    let f = flock_of(&file);

    assert!(f.try_exclusive().unwrap());
    assert_eq!(f.state(), State::Exclusive);
    assert!(!f.try_exclusive().unwrap());
    assert!(!f.try_shared().unwrap());

    f.unlock();
    assert_eq!(f.state(), State::Unlocked);
    assert!(f.try_shared().unwrap());
    f.unlock();
  }

  #[test]
  fn test_shared_counts() {
    let file = tempfile::tempfile().unwrap();
    let f = flock_of(&file);

    assert!(f.try_shared().unwrap());
    assert!(f.try_shared().unwrap());
    assert!(f.try_shared().unwrap());
    assert_eq!(f.state(), State::Shared(3));
    assert!(!f.try_exclusive().unwrap());

    f.unlock();
    f.unlock();
    assert_eq!(f.state(), State::Shared(1));
    assert!(!f.try_exclusive().unwrap());

    f.unlock();
    assert_eq!(f.state(), State::Unlocked);
    assert!(f.try_exclusive().unwrap());
    f.unlock();
  }

  #[test]
  #[should_panic(expected = "shared hold count overflow")]
  fn test_shared_overflow_panics() {
    let file = tempfile::tempfile().unwrap();
    let f = flock_of(&file);
    assert!(f.try_shared().unwrap());
    *f.state.lock() = State::Shared(u32::MAX);
    let _ = f.try_shared();
  }

  #[test]
  #[should_panic(expected = "unlock of unlocked flock")]
  fn test_unlock_unlocked_panics() {
    let file = tempfile::tempfile().unwrap();
    flock_of(&file).unlock();
  }

  #[test]
  fn test_drop_while_locked_unlocks() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let f = flock_of(tmp.as_file());
    assert!(f.try_exclusive().unwrap());

    // Separate open, separate open file description
    // 独立打开，独立的打开文件描述
    let other = File::open(tmp.path()).unwrap();
    assert!(other.try_lock().is_err());

    // The caller's fd keeps the description alive, drop must unlock
    // 调用方 fd 仍持有该描述，drop 必须解锁
    drop(f);
    assert!(other.try_lock().is_ok());
  }

  #[cfg(target_os = "linux")]
  #[test]
  fn test_drop_with_failing_unlock_does_not_panic() {
    use std::{fs::OpenOptions, os::unix::fs::OpenOptionsExt};

    let tmp = tempfile::NamedTempFile::new().unwrap();
    // O_PATH: fstat and dup work, flock fails with EBADF
    // O_PATH：fstat 与 dup 可用，flock 返回 EBADF
    let path_fd = OpenOptions::new()
      .read(true)
      .custom_flags(libc::O_PATH)
      .open(tmp.path())
      .unwrap();
    let f = flock_of(&path_fd);
    assert!(f.try_exclusive().is_err());

    *f.state.lock() = State::Exclusive;
    drop(f);
  }
}
