//! 会话文件
//!
//! 持久化的 AgentDescriptor，格式可直接被 shell source：
//!
//! ```text
//! SSH_AUTH_SOCK=/tmp/ssh-XXXX/agent.123; export SSH_AUTH_SOCK;
//! SSH_AGENT_PID=124; export SSH_AGENT_PID;
//! # created 2026-10-16T09:30:00+08:00 by alice (pid 4242)
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{Error, Result};
use crate::private_fs::write_private;
use crate::types::AgentDescriptor;

/// 会话文件存储，独占会话文件的读写
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取会话文件
    ///
    /// 文件不存在返回 None；存在但无法解析时视为不存在并删除。
    pub fn load(&self) -> Option<AgentDescriptor> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read session record {:?}: {}", self.path, e);
                return None;
            }
        };

        match AgentDescriptor::from_assignments(&text) {
            Some(descriptor) => {
                tracing::debug!("📄 session record: {}", descriptor);
                Some(descriptor)
            }
            None => {
                tracing::warn!("Unparsable session record {:?}, discarding", self.path);
                self.invalidate();
                None
            }
        }
    }

    /// 写入会话文件（目录 700，文件 600，整体覆盖）
    pub fn save(&self, descriptor: &AgentDescriptor) -> Result<()> {
        let record = render_record(descriptor, Local::now(), &creator_identity());

        write_private(&self.path, &record).map_err(|e| {
            Error::Config(format!("无法写入会话文件 {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("📝 saved session record: {} -> {:?}", descriptor, self.path);
        Ok(())
    }

    /// 删除会话文件；失败只告警
    pub fn invalidate(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("🧹 removed session record {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove session record {:?}: {}", self.path, e),
        }
    }
}

/// 渲染会话文件内容
pub fn render_record(
    descriptor: &AgentDescriptor,
    created_at: DateTime<Local>,
    creator: &str,
) -> String {
    format!(
        "{}# created {} by {}\n",
        descriptor.to_assignments(),
        created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
        creator
    )
}

/// 创建者标识：用户名 + 进程号
fn creator_identity() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{} (pid {})", user, std::process::id())
}
