//! Thin libc wrappers / libc 薄封装

use std::{
  io,
  mem::MaybeUninit,
  os::fd::{FromRawFd, OwnedFd, RawFd},
};

/// (dev, ino) of descriptor / 描述符的 (dev, ino)
pub fn dev_ino(fd: RawFd) -> io::Result<(u64, u64)> {
  let mut stat = MaybeUninit::<libc::stat>::uninit();
  if unsafe { libc::fstat(fd, stat.as_mut_ptr()) } < 0 {
    return Err(io::Error::last_os_error());
  }
  // SAFETY: fstat succeeded / fstat 成功
  let stat = unsafe { stat.assume_init() };
  Ok((stat.st_dev as u64, stat.st_ino as u64))
}

/// Private close-on-exec duplicate / 私有的 close-on-exec 副本
pub fn dup(fd: RawFd) -> io::Result<OwnedFd> {
  let new = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
  if new < 0 {
    return Err(io::Error::last_os_error());
  }
  // SAFETY: fcntl returned a fresh descriptor we now own
  // 安全：fcntl 返回了归我们所有的新描述符
  Ok(unsafe { OwnedFd::from_raw_fd(new) })
}

/// Non-blocking flock, Ok(false) on contention
/// 非阻塞 flock，争用时返回 Ok(false)
pub fn flock(fd: RawFd, op: libc::c_int) -> io::Result<bool> {
  loop {
    if unsafe { libc::flock(fd, op | libc::LOCK_NB) } == 0 {
      return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.kind() {
      io::ErrorKind::Interrupted => continue,
      io::ErrorKind::WouldBlock => return Ok(false),
      _ => return Err(err),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{fs::File, os::fd::AsRawFd};

  use super::*;

  #[test]
  fn test_flock_bad_fd_is_error() {
    let err = flock(-1, libc::LOCK_EX).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
  }

  #[test]
  fn test_flock_contention_is_false() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.as_file().try_lock().unwrap();

    let other = File::open(tmp.path()).unwrap();
    assert!(!flock(other.as_raw_fd(), libc::LOCK_EX).unwrap());
    assert!(!flock(other.as_raw_fd(), libc::LOCK_SH).unwrap());

    tmp.as_file().unlock().unwrap();
    assert!(flock(other.as_raw_fd(), libc::LOCK_EX).unwrap());
  }
}
