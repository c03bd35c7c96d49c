//! 凭据加载
//!
//! 把 manifest 中的私钥逐个（或一次性）交给 add-identities，按退出码分类：
//! 0 → Added，1 → NeedsPassphrase（告警，不致命），≥2 → AgentUnreachable。
//! 文件已不存在的条目记为 FileMissing，不调用原语。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::backend::AgentBackend;
use crate::error::{Error, Result};
use crate::manifest::KeyManifest;
use crate::types::{ExitClass, LoadOutcome, LoadPolicy, LoadStatus, LoadSummary, SessionHandle};

/// 按策略加载 manifest 中的全部凭据
pub fn load_credentials<B: AgentBackend + ?Sized>(
    backend: &B,
    session: &SessionHandle,
    manifest: &KeyManifest,
    key_dir: &Path,
    policy: LoadPolicy,
) -> LoadSummary {
    let outcomes = match policy {
        LoadPolicy::PerEntry => load_per_entry(backend, session, manifest, key_dir),
        LoadPolicy::Batch => load_batch(backend, session, manifest, key_dir),
    };
    let summary = LoadSummary { policy, outcomes };

    for failure in summary.failures() {
        tracing::warn!("⚠️ {}: {}", failure.basename, failure.status);
    }
    tracing::info!("🔑 credentials: {} ({})", summary.message(), policy);

    summary
}

/// 每个 key 一次调用
fn load_per_entry<B: AgentBackend + ?Sized>(
    backend: &B,
    session: &SessionHandle,
    manifest: &KeyManifest,
    key_dir: &Path,
) -> Vec<LoadOutcome> {
    manifest
        .iter()
        .map(|name| {
            let path = key_dir.join(name);
            if !path.is_file() {
                return LoadOutcome::new(name, LoadStatus::FileMissing);
            }

            let status = match backend.add_identities(&session.descriptor, &[path]) {
                Ok(output) => LoadStatus::from_exit(output.class),
                Err(e) => {
                    tracing::debug!("add-identities {} failed: {}", name, e);
                    LoadStatus::AgentUnreachable
                }
            };
            LoadOutcome::new(name, status)
        })
        .collect()
}

/// 所有 key 一次调用
///
/// 退出码 1 时按 `Identity added: <path>` 行区分成功项，其余记为 NeedsPassphrase；
/// 连不上时整批记为 AgentUnreachable。
fn load_batch<B: AgentBackend + ?Sized>(
    backend: &B,
    session: &SessionHandle,
    manifest: &KeyManifest,
    key_dir: &Path,
) -> Vec<LoadOutcome> {
    let resolved: Vec<(&str, PathBuf, bool)> = manifest
        .iter()
        .map(|name| {
            let path = key_dir.join(name);
            let present = path.is_file();
            (name, path, present)
        })
        .collect();

    let paths: Vec<PathBuf> = resolved
        .iter()
        .filter(|(_, _, present)| *present)
        .map(|(_, path, _)| path.clone())
        .collect();

    let result = if paths.is_empty() {
        None
    } else {
        Some(backend.add_identities(&session.descriptor, &paths))
    };

    let added = match &result {
        Some(Ok(output)) if output.class == ExitClass::Partial => added_paths(&output.stderr),
        _ => HashSet::new(),
    };

    resolved
        .into_iter()
        .map(|(name, path, present)| {
            let status = match (&result, present) {
                (_, false) => LoadStatus::FileMissing,
                (Some(Ok(output)), true) => match output.class {
                    ExitClass::Partial if added.contains(&path) => LoadStatus::Added,
                    class => LoadStatus::from_exit(class),
                },
                (Some(Err(e)), true) => {
                    tracing::debug!("add-identities batch failed: {}", e);
                    LoadStatus::AgentUnreachable
                }
                (None, true) => LoadStatus::AgentUnreachable,
            };
            LoadOutcome::new(name, status)
        })
        .collect()
}

/// 解析 ssh-add 的 `Identity added: <path> (<comment>)` 行
fn added_paths(stderr: &str) -> HashSet<PathBuf> {
    stderr
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Identity added: "))
        .map(|rest| match rest.rfind(" (") {
            Some(idx) if rest.ends_with(')') => &rest[..idx],
            _ => rest,
        })
        .map(PathBuf::from)
        .collect()
}

/// remove-all 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Removed,
    NothingRemoved,
}

/// 移除 agent 中的全部 identity
pub fn unload_all<B: AgentBackend + ?Sized>(
    backend: &B,
    session: &SessionHandle,
) -> Result<UnloadOutcome> {
    let output = backend.remove_all_identities(&session.descriptor)?;

    match output.class {
        ExitClass::Success => {
            tracing::info!("🧹 removed all identities from {}", session.descriptor);
            Ok(UnloadOutcome::Removed)
        }
        ExitClass::Partial => {
            tracing::debug!("no identities removed from {}", session.descriptor);
            Ok(UnloadOutcome::NothingRemoved)
        }
        ExitClass::Unreachable => Err(Error::AgentUnavailable(format!(
            "无法连接 {}: {}",
            session.descriptor,
            output.stderr.trim()
        ))),
    }
}
