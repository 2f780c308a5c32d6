use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// fstat failed, descriptor is invalid or closed / fstat 失败，描述符无效或已关闭
  #[error("resolve file identity: {0} / 解析文件标识失败")]
  Identity(#[source] io::Error),

  /// Duplicating the descriptor failed / 复制描述符失败
  #[error("duplicate descriptor: {0} / 复制描述符失败")]
  Dup(#[source] io::Error),

  /// Handle already released / 句柄已释放
  #[error("handle released / 句柄已释放")]
  Released,

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
