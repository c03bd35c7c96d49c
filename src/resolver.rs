//! 会话解析
//!
//! 解析流程：
//! 1. 当前作用域已采用 / 继承的描述符存活 → 直接复用，不写盘
//! 2. 会话文件中的描述符存活 → 采用
//! 3. 会话文件描述符已失效 → 删除后继续
//! 4. 没有可用会话：check-only 返回 AgentUnavailable；
//!    ensure 在 spawn 锁下启动新 agent → 采用 → 保存 → 再次探测，
//!    探测失败则完整回滚

use crate::backend::AgentBackend;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::lock::SpawnLock;
use crate::private_fs::ensure_private_dir;
use crate::prober::{probe, Liveness};
use crate::state::SessionStore;
use crate::types::{AgentDescriptor, ResolveMode, SessionHandle, SessionOrigin};

/// 会话解析器
///
/// 独占 "描述符是否有效" 的判断。`adopted` 即调用方作用域内的会话，
/// 同一进程内的后续调用先复用它。
pub struct SessionResolver<B: AgentBackend> {
    config: SessionConfig,
    backend: B,
    store: SessionStore,
    inherited: Option<AgentDescriptor>,
    adopted: Option<SessionHandle>,
}

impl<B: AgentBackend> SessionResolver<B> {
    /// 创建解析器；`inherit_env` 为 true 时读取进程环境中的描述符
    pub fn new(config: SessionConfig, backend: B) -> Self {
        let inherited = if config.inherit_env {
            AgentDescriptor::from_env()
        } else {
            None
        };
        let store = SessionStore::new(config.state_path());

        Self {
            config,
            backend,
            store,
            inherited,
            adopted: None,
        }
    }

    /// 显式指定继承的描述符
    pub fn with_inherited(mut self, descriptor: AgentDescriptor) -> Self {
        self.inherited = Some(descriptor);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// 当前作用域内已采用的会话
    pub fn current(&self) -> Option<&SessionHandle> {
        self.adopted.as_ref()
    }

    /// 确保（或查询）会话
    pub fn ensure_session(&mut self, mode: ResolveMode) -> Result<SessionHandle> {
        if let Some(handle) = self.reuse_in_scope() {
            return Ok(handle);
        }

        if let Some(handle) = self.reuse_persisted() {
            return Ok(handle);
        }

        if mode == ResolveMode::CheckOnly {
            tracing::debug!("no usable agent session (check-only)");
            return Err(Error::AgentUnavailable("没有可用的 agent 会话".into()));
        }

        let lock_path = self.config.lock_path();
        let _lock = match SpawnLock::try_acquire(&lock_path)? {
            Some(lock) => lock,
            None => {
                tracing::info!("⏳ another process is starting an agent, waiting");
                SpawnLock::acquire(&lock_path)?
            }
        };

        // 等锁期间其他进程可能已经完成了 spawn
        if let Some(handle) = self.reuse_persisted() {
            return Ok(handle);
        }

        self.spawn_and_adopt()
    }

    /// 作用域内的会话或继承的描述符
    fn reuse_in_scope(&mut self) -> Option<SessionHandle> {
        if let Some(handle) = self.adopted.clone() {
            if probe(&self.backend, &handle.descriptor).is_live() {
                return Some(handle);
            }
            tracing::info!("adopted session {} is gone", handle.descriptor);
            self.adopted = None;
        }

        // 继承的描述符只尝试一次
        let inherited = self.inherited.take()?;
        match probe(&self.backend, &inherited) {
            Liveness::Live => {
                tracing::debug!("♻️ reusing inherited agent {}", inherited);
                Some(self.adopt(inherited, SessionOrigin::Inherited))
            }
            Liveness::Dead(reason) => {
                tracing::debug!("inherited agent {} unusable: {}", inherited, reason);
                None
            }
        }
    }

    /// 会话文件中的描述符；失效时删除会话文件
    fn reuse_persisted(&mut self) -> Option<SessionHandle> {
        let descriptor = self.store.load()?;

        match probe(&self.backend, &descriptor) {
            Liveness::Live => {
                tracing::debug!("♻️ reusing persisted agent {}", descriptor);
                Some(self.adopt(descriptor, SessionOrigin::Persisted))
            }
            Liveness::Dead(reason) => {
                tracing::info!("🧹 stale session record {} ({}), invalidating", descriptor, reason);
                self.store.invalidate();
                None
            }
        }
    }

    fn spawn_and_adopt(&mut self) -> Result<SessionHandle> {
        ensure_private_dir(&self.config.key_dir).map_err(|e| {
            Error::Config(format!(
                "无法创建密钥目录 {}: {}",
                self.config.key_dir.display(),
                e
            ))
        })?;

        let output = self.backend.spawn()?;
        let descriptor = AgentDescriptor::from_assignments(&output).ok_or_else(|| {
            Error::Spawn(format!("无法解析 spawn 输出: {:?}", output.trim()))
        })?;

        tracing::info!("🚀 spawned agent {}", descriptor);
        let handle = self.adopt(descriptor, SessionOrigin::Spawned);

        if let Err(e) = self.store.save(&handle.descriptor) {
            self.rollback();
            return Err(e);
        }

        match probe(&self.backend, &handle.descriptor) {
            Liveness::Live => Ok(handle),
            Liveness::Dead(reason) => {
                tracing::warn!(
                    "spawned agent {} failed re-probe ({}), rolling back",
                    handle.descriptor,
                    reason
                );
                self.rollback();
                Err(Error::AgentUnavailable(format!(
                    "新启动的 agent {} 未通过探测: {}",
                    handle.descriptor, reason
                )))
            }
        }
    }

    fn adopt(&mut self, descriptor: AgentDescriptor, origin: SessionOrigin) -> SessionHandle {
        let handle = SessionHandle::new(descriptor, origin);
        self.adopted = Some(handle.clone());
        handle
    }

    /// 撤销未确认存活的采用，并删除刚写入的会话文件
    fn rollback(&mut self) {
        self.adopted = None;
        self.store.invalidate();
    }
}
