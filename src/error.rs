//! 错误类型定义

use thiserror::Error;

/// 库错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 配置错误：必需的目录或状态文件无法创建/访问
    #[error("配置错误: {0}")]
    Config(String),

    /// 无法连接或启动 agent
    #[error("agent 不可用: {0}")]
    AgentUnavailable(String),

    /// spawn 原语执行失败或输出无法解析
    #[error("启动 agent 失败: {0}")]
    Spawn(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 是否属于 "agent 不可用" 一类（check-only 模式下的正常否定结果）
    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, Error::AgentUnavailable(_) | Error::Spawn(_))
    }

    /// 进程退出码
    ///
    /// 只有配置错误和 agent 不可用会变成非零退出，
    /// 部分密钥加载失败等只体现在摘要里。
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 78,
            Error::AgentUnavailable(_) | Error::Spawn(_) => 69,
            Error::Io(_) | Error::Serialization(_) | Error::Other(_) => 1,
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, Error>;
