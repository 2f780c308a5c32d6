#![cfg_attr(docsrs, feature(doc_cfg))]

//! # jdb_flock - In-process multiplexed flock / 进程内复用的 flock
//!
//! flock state belongs to an open file description, not to the file. Two
//! descriptors opened separately on one file lock independently, so a process
//! can deadlock itself or let two call sites both hold "exclusive" access.
//! This crate resolves every descriptor to (device, inode), funnels all
//! in-process requests for that identity through one duplicated descriptor,
//! and unlocks and closes it once the last handle is gone.
//!
//! flock 状态属于打开文件描述而非文件。对同一文件分别打开的两个描述符各自
//! 独立加锁，进程可能自我死锁，或让两个调用点同时认为自己持有排他锁。
//! 本 crate 将描述符解析为 (device, inode)，同一标识的所有进程内请求都经由
//! 一个复制的描述符，最后一个句柄释放时解锁并关闭它。
//!
//! All lock attempts are non-blocking: contention is `Ok(false)`.
//! 所有加锁尝试均非阻塞：争用返回 `Ok(false)`。

pub mod error;
mod flock;
pub mod handle;
pub mod id;
pub mod registry;
mod sys;

use std::{
  os::fd::{AsFd, RawFd},
  path::Path,
};

pub use error::{Error, Result};
pub use handle::Handle;
pub use id::FileId;
pub use registry::Registry;

/// Process-wide registry, initialized before main, lives until exit
/// 进程级注册表，main 之前初始化，存活至进程退出
#[static_init::dynamic]
pub static REGISTRY: Registry = Registry::new();

/// [`Registry::acquire`] on [`REGISTRY`]
pub fn acquire(fd: impl AsFd) -> Result<Handle> {
  REGISTRY.acquire(fd)
}

/// [`Registry::acquire_raw`] on [`REGISTRY`]
pub fn acquire_raw(fd: RawFd) -> Result<Handle> {
  REGISTRY.acquire_raw(fd)
}

/// [`Registry::open`] on [`REGISTRY`]
pub fn open(path: impl AsRef<Path>) -> Result<Handle> {
  REGISTRY.open(path)
}
