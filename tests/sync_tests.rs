//! ensure → scan → reconcile → load 端到端测试

mod common;

use std::fs;

use common::Sandbox;
use ssh_agent_session::sync;
use ssh_agent_session::{
    Error, IdentityCount, KeyManifest, LoadPolicy, LoadStatus, ReconcileDecision, ResolveMode,
    SessionResolver, SessionStore,
};

#[test]
fn test_empty_key_dir_has_nothing_to_load() {
    let sandbox = Sandbox::new();
    let mut resolver = SessionResolver::new(sandbox.config(), sandbox.backend());

    let report = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();

    assert!(report.manifest.is_empty());
    assert_eq!(report.decision, ReconcileDecision::NothingToLoad);
    assert!(report.summary.is_none());
    assert!(report.is_success());
    assert_eq!(report.message(), "nothing to load");
    assert!(resolver.backend().add_calls.borrow().is_empty());

    // 扫过但为空：缓存文件存在且为空
    let cached = KeyManifest::read_cache(&resolver.config().manifest_path()).unwrap();
    assert_eq!(cached, Some(KeyManifest::default()));
}

#[test]
fn test_lone_public_key_is_excluded() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    fs::write(sandbox.key_dir().join("beta.pub"), "PUBLIC").unwrap();
    let mut resolver = SessionResolver::new(sandbox.config(), sandbox.backend());

    let report = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();

    assert_eq!(report.manifest.entries().to_vec(), vec!["alpha".to_string()]);
    let summary = report.summary.unwrap();
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].basename, "alpha");
    assert_eq!(summary.outcomes[0].status, LoadStatus::Added);
}

#[test]
fn test_matching_counts_never_invoke_loader() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    sandbox.add_key_pair("beta");
    let backend = sandbox.backend();
    let agent = backend.add_agent("running", true, &["alpha", "beta"]);
    SessionStore::new(sandbox.config().state_path())
        .save(&agent)
        .unwrap();
    let mut resolver = SessionResolver::new(sandbox.config(), backend);

    let report = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();

    assert_eq!(report.decision, ReconcileDecision::Skip { identities: 2 });
    assert!(report.summary.is_none());
    assert!(resolver.backend().add_calls.borrow().is_empty());
    assert_eq!(resolver.backend().spawns.get(), 0);
}

#[test]
fn test_passphrase_key_reports_partial_success() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    sandbox.add_key_pair("beta");
    let backend = sandbox.backend();
    backend.lock_key("beta");
    let mut resolver = SessionResolver::new(sandbox.config(), backend);

    let report = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();

    let summary = report.summary.as_ref().unwrap();
    let beta = summary
        .outcomes
        .iter()
        .find(|o| o.basename == "beta")
        .unwrap();
    assert_eq!(beta.status, LoadStatus::NeedsPassphrase);
    assert_eq!(summary.added(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(summary.is_partial());
    assert!(report.is_success());
}

#[test]
fn test_second_sync_skips_after_load() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    let mut resolver = SessionResolver::new(sandbox.config(), sandbox.backend());

    let first = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();
    assert!(first.summary.is_some());

    let second = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();
    assert_eq!(second.decision, ReconcileDecision::Skip { identities: 1 });
    assert_eq!(resolver.backend().spawns.get(), 1);
    assert_eq!(resolver.backend().add_calls.borrow().len(), 1);
}

#[test]
fn test_batch_policy_from_config() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    sandbox.add_key_pair("beta");
    let config = sandbox.config().with_policy(LoadPolicy::Batch);
    let mut resolver = SessionResolver::new(config, sandbox.backend());

    let report = sync::run(&mut resolver, ResolveMode::Ensure).unwrap();

    assert_eq!(report.summary.unwrap().added(), 2);
    assert_eq!(resolver.backend().add_calls.borrow().len(), 1);
}

#[test]
fn test_agent_lost_during_load_is_unavailable() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    sandbox.add_key_pair("beta");
    let backend = sandbox.backend();
    backend.adds_unreachable.set(true);
    let mut resolver = SessionResolver::new(sandbox.config(), backend);

    let err = sync::run(&mut resolver, ResolveMode::Ensure).unwrap_err();

    assert!(matches!(err, Error::AgentUnavailable(_)));
    assert_eq!(err.exit_code(), 69);
    assert_eq!(resolver.backend().spawns.get(), 1);
    assert_eq!(resolver.backend().add_calls.borrow().len(), 2);
}

#[test]
fn test_check_only_sync_without_agent_fails() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    let mut resolver = SessionResolver::new(sandbox.config(), sandbox.backend());

    let err = sync::run(&mut resolver, ResolveMode::CheckOnly).unwrap_err();

    assert!(err.is_agent_unavailable());
    assert_eq!(resolver.backend().spawns.get(), 0);
}

#[test]
fn test_status_never_spawns() {
    let sandbox = Sandbox::new();
    let mut resolver = SessionResolver::new(sandbox.config(), sandbox.backend());

    let report = sync::status(&mut resolver).unwrap();

    assert!(report.session.is_none());
    assert!(report.identities.is_none());
    assert_eq!(report.manifest_entries, None);
    assert_eq!(resolver.backend().spawns.get(), 0);
}

#[test]
fn test_status_after_sync() {
    let sandbox = Sandbox::new();
    sandbox.add_key_pair("alpha");
    let mut resolver = SessionResolver::new(sandbox.config(), sandbox.backend());
    sync::run(&mut resolver, ResolveMode::Ensure).unwrap();

    let report = sync::status(&mut resolver).unwrap();

    assert!(report.session.is_some());
    assert_eq!(report.identities, Some(IdentityCount::Loaded(1)));
    assert_eq!(report.manifest_entries, Some(1));

    let json = report.to_json().unwrap();
    assert!(json.contains("\"manifest_entries\": 1"));
}
