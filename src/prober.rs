//! 存活探测
//!
//! 按代价从低到高依次检查，遇到第一个失败即返回 Dead：
//! 1. 描述符字段完整
//! 2. socket 路径存在（socket 或普通文件）
//! 3. pid 可以被 signal 0 探测
//! 4. query-identities 能连上（0 和 1 都算存活）

use std::fmt;
use std::fs;
use std::path::Path;

use crate::backend::AgentBackend;
use crate::types::{AgentDescriptor, ExitClass};

/// 判为 Dead 的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadReason {
    IncompleteDescriptor,
    SocketMissing,
    ProcessGone,
    Unreachable,
}

impl fmt::Display for DeadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadReason::IncompleteDescriptor => write!(f, "incomplete descriptor"),
            DeadReason::SocketMissing => write!(f, "socket missing"),
            DeadReason::ProcessGone => write!(f, "process gone"),
            DeadReason::Unreachable => write!(f, "agent unreachable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Dead(DeadReason),
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        matches!(self, Liveness::Live)
    }
}

/// 探测候选描述符
pub fn probe<B: AgentBackend + ?Sized>(backend: &B, candidate: &AgentDescriptor) -> Liveness {
    let liveness = check(backend, candidate);
    match liveness {
        Liveness::Live => tracing::debug!("probe {}: live", candidate),
        Liveness::Dead(reason) => tracing::debug!("probe {}: dead ({})", candidate, reason),
    }
    liveness
}

fn check<B: AgentBackend + ?Sized>(backend: &B, candidate: &AgentDescriptor) -> Liveness {
    if !candidate.is_complete() {
        return Liveness::Dead(DeadReason::IncompleteDescriptor);
    }

    if !is_socket_like(&candidate.socket_path) {
        return Liveness::Dead(DeadReason::SocketMissing);
    }

    if !process_alive(candidate.pid) {
        return Liveness::Dead(DeadReason::ProcessGone);
    }

    match backend.list_identities(candidate) {
        Ok(output) if output.class != ExitClass::Unreachable => Liveness::Live,
        Ok(_) => Liveness::Dead(DeadReason::Unreachable),
        Err(e) => {
            tracing::debug!("query-identities failed: {}", e);
            Liveness::Dead(DeadReason::Unreachable)
        }
    }
}

/// 路径存在且是 socket（测试替身允许普通文件）
pub fn is_socket_like(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let file_type = metadata.file_type();

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_socket() {
            return true;
        }
    }

    file_type.is_file()
}

/// 进程是否存在且调用者有权向其发信号
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // kill(pid, 0) 不发送信号，只检查存在性和权限
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    pid > 0
}
