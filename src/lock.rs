//! spawn 锁
//!
//! 多个进程同时 ensure 时，spawn + save 在 `flock(LOCK_EX)` 下串行执行。
//! 锁随文件描述符关闭而释放，进程被杀也不会残留。

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::private_fs::{ensure_private_dir, open_private};

/// 持有期间独占 spawn 锁
#[derive(Debug)]
pub struct SpawnLock {
    file: File,
    path: PathBuf,
}

impl SpawnLock {
    /// 阻塞直到拿到锁
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        tracing::debug!("🔒 waiting for spawn lock {:?}", path);

        loop {
            match flock(&file, false) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::Config(format!(
                        "无法获取 spawn 锁 {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// 非阻塞尝试；已被占用时返回 None
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;

        match flock(&file, true) {
            Ok(true) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(Error::Config(format!(
                "无法获取 spawn 锁 {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpawnLock {
    fn drop(&mut self) {
        unlock(&self.file);
        tracing::debug!("🔓 released spawn lock {:?}", self.path);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent).map_err(|e| {
            Error::Config(format!("无法创建目录 {}: {}", parent.display(), e))
        })?;
    }

    open_private(path, false)
        .map_err(|e| Error::Config(format!("无法打开锁文件 {}: {}", path.display(), e)))
}

/// 返回 Ok(false) 表示非阻塞模式下锁已被占用
#[cfg(unix)]
fn flock(file: &File, non_blocking: bool) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let mut operation = libc::LOCK_EX;
    if non_blocking {
        operation |= libc::LOCK_NB;
    }

    // fd 由 file 持有，在调用期间有效
    let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if result == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if non_blocking && err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

#[cfg(not(unix))]
fn flock(_file: &File, _non_blocking: bool) -> io::Result<bool> {
    Ok(true)
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
