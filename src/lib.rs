//! ssh-agent-session - 每个登录复用同一个 ssh-agent
//!
//! 多次独立调用之间只保留一个 agent，并让它持有的 identity 与密钥目录保持同步，
//! 同时避免不必要的（可能需要输入口令的）重复加载。
//!
//! # 核心功能
//!
//! - **会话解析**: 发现 / 校验 / 复用 / 启动 agent（[`SessionResolver`]）
//! - **存活探测**: 描述符字段 → socket → pid → query 的递进检查
//! - **会话文件**: 可被 shell source 的 `NAME=value;` 记录
//! - **密钥清单**: 扫描带公钥的私钥并缓存
//! - **加载决策**: 按 identity 数量判断是否需要重新加载
//! - **凭据加载**: 逐个或批量 add，按退出码分类
//!
//! # Feature Flags
//!
//! - `cli`: `ssh-session` 命令行适配器（默认开启）
//!
//! # 架构
//!
//! agent 被视为不透明的子进程协作者，只通过 [`AgentBackend`] 的四个原语访问。
//! 会话以 [`SessionHandle`] 显式传递给每个下游调用，不修改进程环境变量。
//! 全部操作单线程、同步阻塞。

pub mod backend;
pub mod config;
pub mod error;
pub mod loader;
pub mod lock;
pub mod manifest;
pub mod private_fs;
pub mod prober;
pub mod reconcile;
pub mod resolver;
pub mod state;
pub mod sync;
pub mod types;

// Re-exports
pub use backend::{AgentBackend, CommandBackend, CommandOutput};
pub use config::{AgentCommands, SessionConfig};
pub use error::{Error, Result};
pub use loader::{load_credentials, unload_all, UnloadOutcome};
pub use lock::SpawnLock;
pub use manifest::{scan_manifest, KeyManifest, ScanOutcome};
pub use prober::{probe, DeadReason, Liveness};
pub use reconcile::{reconcile, IdentityCount, LoadReason, ReconcileDecision};
pub use resolver::SessionResolver;
pub use state::SessionStore;
pub use sync::{StatusReport, SyncReport};
pub use types::*;
