//! 加载决策
//!
//! 比较 agent 当前 identity 数量和 manifest 行数，
//! 只有 agent 可达且两者完全相等时才跳过加载，避免不必要的口令提示。
//!
//! 数量相等不代表内容相等：这是粗粒度启发式，不做指纹比较。

use serde::{Deserialize, Serialize};

use crate::backend::AgentBackend;
use crate::manifest::KeyManifest;
use crate::types::{ExitClass, SessionHandle};

/// query-identities 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityCount {
    Loaded(usize),
    Unreachable,
}

/// 查询 agent 当前持有的 identity 数
pub fn query_identities<B: AgentBackend + ?Sized>(
    backend: &B,
    session: &SessionHandle,
) -> IdentityCount {
    match backend.list_identities(&session.descriptor) {
        Ok(output) => match output.class {
            ExitClass::Success => IdentityCount::Loaded(
                output
                    .stdout
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .count(),
            ),
            ExitClass::Partial => IdentityCount::Loaded(0),
            ExitClass::Unreachable => IdentityCount::Unreachable,
        },
        Err(e) => {
            tracing::warn!("Failed to query identities: {}", e);
            IdentityCount::Unreachable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LoadReason {
    CountMismatch { loaded: usize, expected: usize },
    AgentUnreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReconcileDecision {
    /// agent 已持有与 manifest 等量的 identity
    Skip { identities: usize },
    /// manifest 为空，agent 可达
    NothingToLoad,
    /// 需要调用 Credential Loader
    Load(LoadReason),
}

impl ReconcileDecision {
    pub fn needs_load(&self) -> bool {
        matches!(self, ReconcileDecision::Load(_))
    }
}

/// 决定是否需要（重新）加载
pub fn reconcile<B: AgentBackend + ?Sized>(
    backend: &B,
    session: &SessionHandle,
    manifest: &KeyManifest,
) -> ReconcileDecision {
    let decision = decide(query_identities(backend, session), manifest.len());
    tracing::debug!("reconcile: {:?}", decision);
    decision
}

/// 纯决策函数
pub fn decide(identities: IdentityCount, expected: usize) -> ReconcileDecision {
    match identities {
        IdentityCount::Unreachable => ReconcileDecision::Load(LoadReason::AgentUnreachable),
        IdentityCount::Loaded(_) if expected == 0 => ReconcileDecision::NothingToLoad,
        IdentityCount::Loaded(loaded) if loaded == expected => {
            ReconcileDecision::Skip { identities: loaded }
        }
        IdentityCount::Loaded(loaded) => {
            ReconcileDecision::Load(LoadReason::CountMismatch { loaded, expected })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_counts_skip() {
        assert_eq!(
            decide(IdentityCount::Loaded(3), 3),
            ReconcileDecision::Skip { identities: 3 }
        );
    }

    #[test]
    fn test_mismatch_loads() {
        assert_eq!(
            decide(IdentityCount::Loaded(1), 2),
            ReconcileDecision::Load(LoadReason::CountMismatch {
                loaded: 1,
                expected: 2
            })
        );
        // agent 里多出来的 identity 也算不一致
        assert!(decide(IdentityCount::Loaded(4), 2).needs_load());
    }

    #[test]
    fn test_unreachable_always_loads() {
        for expected in [0, 1, 5] {
            assert_eq!(
                decide(IdentityCount::Unreachable, expected),
                ReconcileDecision::Load(LoadReason::AgentUnreachable)
            );
        }
    }

    #[test]
    fn test_empty_manifest_needs_nothing() {
        assert_eq!(
            decide(IdentityCount::Loaded(0), 0),
            ReconcileDecision::NothingToLoad
        );
        assert_eq!(
            decide(IdentityCount::Loaded(2), 0),
            ReconcileDecision::NothingToLoad
        );
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&ReconcileDecision::Skip { identities: 2 }).unwrap();
        assert!(json.contains("\"decision\":\"skip\""));
    }
}
