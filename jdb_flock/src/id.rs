//! File identity / 文件标识
//!
//! Two descriptors lock the same thing iff they resolve to the same
//! (device, inode), whatever path or symlink reached the file.
//! 两个描述符当且仅当解析到相同 (device, inode) 时锁定同一对象，
//! 与打开路径或符号链接无关。

use std::{
  fmt,
  os::fd::{AsFd, AsRawFd, RawFd},
};

use crate::{Error, Result, sys};

/// (device, inode) pair / (设备, inode) 对
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
  dev: u64,
  ino: u64,
}

impl FileId {
  /// Resolve identity of descriptor / 解析描述符的文件标识
  pub fn of(fd: impl AsFd) -> Result<Self> {
    Self::of_raw(fd.as_fd().as_raw_fd())
  }

  pub(crate) fn of_raw(fd: RawFd) -> Result<Self> {
    let (dev, ino) = sys::dev_ino(fd).map_err(Error::Identity)?;
    Ok(Self { dev, ino })
  }

  #[inline(always)]
  pub fn dev(&self) -> u64 {
    self.dev
  }

  #[inline(always)]
  pub fn ino(&self) -> u64 {
    self.ino
  }
}

impl fmt::Display for FileId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.dev, self.ino)
  }
}
