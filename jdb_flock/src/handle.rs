//! Per-acquisition handle / 每次获取的句柄
//!
//! Tracks the holds taken through it, so releasing a handle (explicitly or on
//! drop) returns them to the shared object before leaving the registry.
//! 记录经由它取得的持有，释放句柄（显式或 drop）时先归还这些持有再退出注册表。

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{Error, FileId, Registry, Result, flock::Flock};

struct Hold {
  /// None once released / 释放后为 None
  flock: Option<Arc<Flock>>,
  shared: u32,
  exclusive: bool,
}

/// Interest in one file identity, released on drop
/// 对一个文件标识的持有兴趣，drop 时释放
///
/// `Send + Sync`: a handle may be shared and released from several threads,
/// only the first release takes effect.
/// `Send + Sync`：句柄可被共享并在多线程释放，只有第一次释放生效。
pub struct Handle {
  registry: Registry,
  id: FileId,
  hold: Mutex<Hold>,
}

impl Handle {
  pub(crate) fn new(registry: Registry, flock: Arc<Flock>) -> Self {
    Self {
      registry,
      id: flock.id(),
      hold: Mutex::new(Hold {
        flock: Some(flock),
        shared: 0,
        exclusive: false,
      }),
    }
  }

  #[inline(always)]
  pub fn id(&self) -> FileId {
    self.id
  }

  /// Try exclusive lock. Ok(false) on contention, in-process or not
  /// 尝试排他锁。争用时（无论是否进程内）返回 Ok(false)
  pub fn try_exclusive(&self) -> Result<bool> {
    let mut hold = self.hold.lock();
    let ok = hold
      .flock
      .as_ref()
      .ok_or(Error::Released)?
      .try_exclusive()?;
    if ok {
      hold.exclusive = true;
    }
    Ok(ok)
  }

  /// Try shared lock / 尝试共享锁
  pub fn try_shared(&self) -> Result<bool> {
    let mut hold = self.hold.lock();
    let ok = hold.flock.as_ref().ok_or(Error::Released)?.try_shared()?;
    if ok {
      hold.shared += 1;
    }
    Ok(ok)
  }

  /// Drop one hold taken through this handle.
  ///
  /// # Panics
  /// If the handle holds nothing or is released.
  /// 句柄未持有任何锁或已释放时 panic。
  pub fn unlock(&self) {
    let mut hold = self.hold.lock();
    let Hold {
      flock,
      shared,
      exclusive,
    } = &mut *hold;
    let Some(flock) = flock else {
      panic!("unlock on released handle {} / 对已释放句柄解锁", self.id);
    };
    if *exclusive {
      *exclusive = false;
    } else if *shared > 0 {
      *shared -= 1;
    } else {
      panic!("unlock without hold on {} / 未持有锁时解锁", self.id);
    }
    flock.unlock();
  }

  /// Give up this handle, idempotent. Remaining holds are unlocked first.
  /// 放弃此句柄，幂等。先解锁剩余持有。
  pub fn release(&self) {
    let mut hold = self.hold.lock();
    let Some(flock) = hold.flock.take() else {
      return;
    };
    if hold.exclusive {
      flock.unlock();
    }
    for _ in 0..hold.shared {
      flock.unlock();
    }
    hold.exclusive = false;
    hold.shared = 0;
    self.registry.release(flock);
  }

  pub fn is_released(&self) -> bool {
    self.hold.lock().flock.is_none()
  }

  pub fn holds_exclusive(&self) -> bool {
    self.hold.lock().exclusive
  }

  /// Shared holds taken through this handle / 经此句柄取得的共享持有数
  pub fn shared_holds(&self) -> u32 {
    self.hold.lock().shared
  }

  #[cfg(test)]
  pub(crate) fn weak(&self) -> std::sync::Weak<Flock> {
    match &self.hold.lock().flock {
      Some(flock) => Arc::downgrade(flock),
      None => std::sync::Weak::new(),
    }
  }
}

impl Drop for Handle {
  fn drop(&mut self) {
    self.release();
  }
}

impl fmt::Debug for Handle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let hold = self.hold.lock();
    f.debug_struct("Handle")
      .field("id", &self.id)
      .field("released", &hold.flock.is_none())
      .field("exclusive", &hold.exclusive)
      .field("shared", &hold.shared)
      .finish()
  }
}
