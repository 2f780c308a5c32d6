//! Lock registry / 锁注册表
//!
//! Maps file identity to its shared lock object. Lookup, insertion and
//! eviction run in one critical section, so a lookup never returns an object
//! that is being torn down.
//! 文件标识到共享锁对象的映射。查找、插入、淘汰在同一临界区内完成，
//! 查找不会拿到正在销毁的对象。

use std::{
  collections::{HashMap, hash_map::Entry as MapEntry},
  fs::File,
  os::fd::{AsFd, AsRawFd, RawFd},
  path::Path,
  sync::Arc,
};

use log::{debug, trace};
use parking_lot::Mutex;

use crate::{Error, FileId, Handle, Result, flock::Flock, sys};

struct Entry {
  flock: Arc<Flock>,
  /// Live handles on this identity / 该标识上的存活句柄数
  refs: usize,
}

#[derive(Default)]
struct Inner {
  map: Mutex<HashMap<FileId, Entry>>,
}

/// Registry of in-process flocks, cheap to clone
/// 进程内 flock 注册表，克隆开销低
///
/// Two registries touching the same file will conflict with each other the
/// way raw flock calls do, share one per process (see [`crate::REGISTRY`]).
/// 两个注册表操作同一文件会像裸 flock 一样相互冲突，每个进程应共享一个。
#[derive(Clone, Default)]
pub struct Registry(Arc<Inner>);

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Get a handle on the file behind `fd` / 获取 `fd` 所指文件的句柄
  pub fn acquire(&self, fd: impl AsFd) -> Result<Handle> {
    self.acquire_raw(fd.as_fd().as_raw_fd())
  }

  /// Same as [`Self::acquire`] for a raw descriptor number; an invalid number
  /// yields [`Error::Identity`].
  /// 与 [`Self::acquire`] 相同，接受裸描述符编号；无效编号返回 [`Error::Identity`]。
  pub fn acquire_raw(&self, fd: RawFd) -> Result<Handle> {
    let id = FileId::of_raw(fd)?;
    let flock = {
      let mut map = self.0.map.lock();
      match map.entry(id) {
        MapEntry::Occupied(mut e) => {
          let e = e.get_mut();
          e.refs += 1;
          trace!("flock {id} join, refs {}", e.refs);
          e.flock.clone()
        }
        MapEntry::Vacant(e) => {
          let fd = sys::dup(fd).map_err(Error::Dup)?;
          let flock = Arc::new(Flock::new(id, fd));
          e.insert(Entry {
            flock: flock.clone(),
            refs: 1,
          });
          debug!("flock {id} created / 创建");
          flock
        }
      }
    };
    Ok(Handle::new(self.clone(), flock))
  }

  /// Open `path` read-only and acquire it. The temporary file is closed on
  /// return, the handle keeps its own duplicate.
  /// 只读打开 `path` 并获取句柄。临时文件在返回时关闭，句柄保有自己的副本。
  pub fn open(&self, path: impl AsRef<Path>) -> Result<Handle> {
    let file = File::open(path)?;
    self.acquire(&file)
  }

  /// Live identities / 存活标识数
  pub fn len(&self) -> usize {
    self.0.map.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[cfg(test)]
  pub(crate) fn refs(&self, id: FileId) -> usize {
    self.0.map.lock().get(&id).map_or(0, |e| e.refs)
  }

  /// Drop one reference. On the last one the entry is evicted and the
  /// descriptor closed before the map lock is released.
  /// 减少一个引用。最后一个引用时在释放 map 锁之前淘汰条目并关闭描述符。
  pub(crate) fn release(&self, flock: Arc<Flock>) {
    let id = flock.id();
    let mut map = self.0.map.lock();
    let Some(e) = map.get_mut(&id) else {
      panic!("flock {id} missing from registry / 注册表中缺失");
    };
    debug_assert!(Arc::ptr_eq(&e.flock, &flock));
    e.refs -= 1;
    if e.refs > 0 {
      trace!("flock {id} leave, refs {}", e.refs);
      return;
    }
    map.remove(&id);
    // Last Arc, closes the duplicate under the map lock
    // 最后一个 Arc，在 map 锁内关闭副本
    drop(flock);
    debug!("flock {id} evicted / 淘汰");
  }
}
