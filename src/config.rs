//! 会话配置

use std::path::PathBuf;

use crate::types::LoadPolicy;

/// 外部原语的二进制路径
#[derive(Debug, Clone)]
pub struct AgentCommands {
    /// spawn 原语（默认 `ssh-agent`）
    pub agent_program: PathBuf,
    /// query / add / remove 原语（默认 `ssh-add`）
    pub add_program: PathBuf,
}

impl AgentCommands {
    /// 从环境变量或默认值创建
    ///
    /// 查找顺序：SSH_SESSION_AGENT_BIN / SSH_SESSION_ADD_BIN 环境变量，否则走 PATH。
    pub fn from_env() -> Self {
        Self {
            agent_program: env_path("SSH_SESSION_AGENT_BIN")
                .unwrap_or_else(|| PathBuf::from("ssh-agent")),
            add_program: env_path("SSH_SESSION_ADD_BIN")
                .unwrap_or_else(|| PathBuf::from("ssh-add")),
        }
    }
}

impl Default for AgentCommands {
    fn default() -> Self {
        Self::from_env()
    }
}

/// 会话配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 状态目录（默认 ~/.ssh-session），存放会话文件、manifest 缓存和 spawn 锁
    pub data_dir: PathBuf,
    /// 密钥目录（默认 ~/.ssh）
    pub key_dir: PathBuf,
    /// 公钥后缀
    pub public_suffix: String,
    /// 凭据加载策略
    pub load_policy: LoadPolicy,
    /// 是否采用调用进程继承的 SSH_AUTH_SOCK / SSH_AGENT_PID
    pub inherit_env: bool,
    /// 外部原语
    pub commands: AgentCommands,
}

impl SessionConfig {
    /// 使用指定目录创建配置（不继承环境中的会话）
    pub fn new<D: Into<PathBuf>, K: Into<PathBuf>>(data_dir: D, key_dir: K) -> Self {
        Self {
            data_dir: data_dir.into(),
            key_dir: key_dir.into(),
            public_suffix: ".pub".to_string(),
            load_policy: LoadPolicy::default(),
            inherit_env: false,
            commands: AgentCommands::default(),
        }
    }

    /// 从环境变量或默认路径创建配置
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let data_dir = env_path("SSH_SESSION_HOME").unwrap_or_else(|| home.join(".ssh-session"));
        let key_dir = env_path("SSH_SESSION_KEY_DIR").unwrap_or_else(|| home.join(".ssh"));

        let load_policy = match std::env::var("SSH_SESSION_LOAD_POLICY") {
            Ok(value) if !value.is_empty() => value.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to {}", e, LoadPolicy::default());
                LoadPolicy::default()
            }),
            _ => LoadPolicy::default(),
        };

        Self {
            load_policy,
            inherit_env: true,
            ..Self::new(data_dir, key_dir)
        }
    }

    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn with_inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// 会话文件路径
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("agent.env")
    }

    /// manifest 缓存路径
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("manifest")
    }

    /// spawn 锁路径
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("spawn.lock")
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
