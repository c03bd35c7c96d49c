//! 一次完整同步：ensure → scan → reconcile → load
//!
//! 交互工具、CLI、profile source 脚本共用这一条路径，各自只做参数和输出的适配。

use serde::Serialize;

use crate::backend::AgentBackend;
use crate::error::{Error, Result};
use crate::loader::load_credentials;
use crate::manifest::{scan_manifest, KeyManifest};
use crate::reconcile::{query_identities, reconcile, IdentityCount, ReconcileDecision};
use crate::resolver::SessionResolver;
use crate::types::{LoadSummary, ResolveMode, SessionHandle};

/// 同步结果
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub session: SessionHandle,
    pub manifest: KeyManifest,
    pub decision: ReconcileDecision,
    /// 只有真正调用了 Credential Loader 时才有
    pub summary: Option<LoadSummary>,
}

impl SyncReport {
    /// 跳过加载，或至少加载成功一个
    pub fn is_success(&self) -> bool {
        match &self.summary {
            None => true,
            Some(summary) => summary.outcomes.is_empty() || summary.is_success(),
        }
    }

    pub fn message(&self) -> String {
        match (&self.decision, &self.summary) {
            (_, Some(summary)) => summary.message(),
            (ReconcileDecision::Skip { identities }, None) => {
                format!("{} identities already loaded", identities)
            }
            _ => "nothing to load".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 执行一次同步
pub fn run<B: AgentBackend>(
    resolver: &mut SessionResolver<B>,
    mode: ResolveMode,
) -> Result<SyncReport> {
    let session = resolver.ensure_session(mode)?;
    let config = resolver.config();

    let manifest = scan_manifest(
        &config.key_dir,
        &config.public_suffix,
        &config.manifest_path(),
    )?
    .into_manifest();

    let decision = reconcile(resolver.backend(), &session, &manifest);
    let summary = if decision.needs_load() {
        Some(load_credentials(
            resolver.backend(),
            &session,
            &manifest,
            &config.key_dir,
            config.load_policy,
        ))
    } else {
        tracing::debug!("skipping credential load: {:?}", decision);
        None
    };

    // 会话在加载途中失联
    if summary.as_ref().is_some_and(|s| s.is_unreachable()) {
        return Err(Error::AgentUnavailable(format!(
            "agent {} 在加载凭据时无法连接",
            session.descriptor
        )));
    }

    Ok(SyncReport {
        session,
        manifest,
        decision,
        summary,
    })
}

/// 只读状态（check-only，不扫描、不加载）
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub session: Option<SessionHandle>,
    pub identities: Option<IdentityCount>,
    /// manifest 缓存条目数；从未扫描过为 None
    pub manifest_entries: Option<usize>,
}

impl StatusReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 查询当前状态
pub fn status<B: AgentBackend>(resolver: &mut SessionResolver<B>) -> Result<StatusReport> {
    let session = match resolver.ensure_session(ResolveMode::CheckOnly) {
        Ok(session) => Some(session),
        Err(e) if e.is_agent_unavailable() => None,
        Err(e) => return Err(e),
    };

    let identities = session
        .as_ref()
        .map(|session| query_identities(resolver.backend(), session));
    let manifest_entries =
        KeyManifest::read_cache(&resolver.config().manifest_path())?.map(|m| m.len());

    Ok(StatusReport {
        session,
        identities,
        manifest_entries,
    })
}
