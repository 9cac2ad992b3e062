//! End-to-end orchestrator scenarios against a mock HTTP server
//!
//! Covers the batch state machine: dependency-ordered installs, partial
//! failure with dependent skipping, idempotent re-runs, and strict
//! rollback.

mod support;

use devstrap::app::models::{BatchStatus, ComponentState, FailureClass, InstallState};
use devstrap::app::orchestrator::OrchestratorConfig;
use support::TestEnv;

#[tokio::test]
async fn full_chain_installs_in_dependency_order() {
    let env = TestEnv::new().await;
    let runtime = env.serve_component("runtime", &[]).await;
    let lib = env.serve_component("lib", &["runtime"]).await;
    let app = env.serve_component("app", &["lib", "runtime"]).await;

    // Deliberately submitted out of order
    let result = env
        .orchestrator
        .install(vec![app, runtime, lib])
        .await
        .unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.order, vec!["runtime", "lib", "app"]);

    // Every dependency's install completed before its dependent started
    let order = env.install_order().await;
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(position("runtime") < position("lib"));
    assert!(position("lib") < position("app"));

    for report in &result.reports {
        assert!(report.state.is_completed(), "{:?}", report);
        let record = report.install.as_ref().unwrap();
        assert_eq!(record.state, InstallState::Completed);
        let outcome = report.download.as_ref().unwrap();
        assert!(outcome.verified);
    }
}

#[tokio::test]
async fn partial_batch_with_skipped_dependent() {
    let env = TestEnv::new().await;
    let good_a = env.serve_component("good-a", &[]).await;
    let good_b = env.serve_component("good-b", &[]).await;
    let broken = env.serve_error("broken", &[], 404).await;
    let dependent = env.serve_component("dependent", &["broken"]).await;

    let result = env
        .orchestrator
        .install(vec![good_a, good_b, broken, dependent])
        .await
        .unwrap();

    assert_eq!(result.status, BatchStatus::Partial);
    assert!(result.report("good-a").unwrap().state.is_completed());
    assert!(result.report("good-b").unwrap().state.is_completed());

    let broken_report = result.report("broken").unwrap();
    assert!(broken_report.state.is_failed());
    let outcome = broken_report.download.as_ref().unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("manually"));

    match &result.report("dependent").unwrap().state {
        ComponentState::Skipped { failed_dependency } => {
            assert_eq!(failed_dependency, "broken");
        }
        other => panic!("expected skipped, got {:?}", other),
    }
    // The skipped dependent was never downloaded
    assert!(result.report("dependent").unwrap().download.is_none());
}

#[tokio::test]
async fn rerun_is_idempotent_and_served_from_cache() {
    let env = TestEnv::new().await;
    let tool = env.serve_component("tool", &[]).await;

    let first = env.orchestrator.install(vec![tool.clone()]).await.unwrap();
    assert_eq!(first.status, BatchStatus::Completed);
    let requests_after_first = env.request_count().await;

    let second = env.orchestrator.install(vec![tool]).await.unwrap();
    assert_eq!(second.status, BatchStatus::Completed);

    // Second run hit the verified cache: no further network requests
    assert_eq!(env.request_count().await, requests_after_first);
    let outcome = second.report("tool").unwrap().download.as_ref().unwrap();
    assert_eq!(outcome.bytes_transferred, 0);

    // And the install ledger was not duplicated
    let first_record = first.report("tool").unwrap().install.as_ref().unwrap();
    let second_record = second.report("tool").unwrap().install.as_ref().unwrap();
    assert_eq!(first_record.started_at, second_record.started_at);
    assert_eq!(first_record.actions.len(), second_record.actions.len());
}

#[tokio::test]
async fn install_failure_rolls_back_only_failing_component() {
    let env = TestEnv::new().await;
    let good = env.serve_component("good", &[]).await;
    let flaky = env.serve_component_failing_install("flaky", &[]).await;

    let result = env.orchestrator.install(vec![good, flaky]).await.unwrap();

    assert_eq!(result.status, BatchStatus::Partial);
    assert!(result.report("good").unwrap().state.is_completed());

    let flaky_report = result.report("flaky").unwrap();
    match &flaky_report.state {
        ComponentState::Failed { class, error } => {
            assert_eq!(*class, FailureClass::Installation);
            assert!(error.contains("exit code 9"), "got: {error}");
        }
        other => panic!("expected failed, got {:?}", other),
    }
    assert_eq!(
        flaky_report.install.as_ref().unwrap().state,
        InstallState::RolledBack
    );

    // Default policy: the good component stays installed
    let good_record = result.report("good").unwrap().install.as_ref().unwrap();
    assert_eq!(good_record.state, InstallState::Completed);
}

#[tokio::test]
async fn strict_rollback_undoes_previous_installs() {
    let config = OrchestratorConfig::for_testing().with_strict_rollback(true);
    let env = TestEnv::with_config(config).await;

    let base = env.serve_component("base", &[]).await;
    let flaky = env
        .serve_component_failing_install("flaky", &["base"])
        .await;

    let result = env.orchestrator.install(vec![base, flaky]).await.unwrap();

    assert_eq!(result.status, BatchStatus::Failed);

    // The previously completed component was rolled back too
    let base_report = result.report("base").unwrap();
    assert!(base_report.state.is_failed());
    assert_eq!(
        base_report.install.as_ref().unwrap().state,
        InstallState::RolledBack
    );
}

#[tokio::test]
async fn cycle_is_rejected_before_any_download() {
    let env = TestEnv::new().await;
    let a = env.serve_component("a", &["b"]).await;
    let b = env.serve_component("b", &["c"]).await;
    let c = env.serve_component("c", &["a"]).await;

    let result = env.orchestrator.install(vec![a, b, c]).await.unwrap();

    assert_eq!(result.status, BatchStatus::Failed);
    assert!(result.planning_errors[0].contains("a -> b -> c -> a"));
    assert!(result.reports.is_empty());
    // Nothing was downloaded or installed
    assert_eq!(env.request_count().await, 0);
    assert!(env.install_order().await.is_empty());
}

#[tokio::test]
async fn check_updates_tracks_install_state() {
    let env = TestEnv::new().await;
    let installed = env.serve_component("installed", &[]).await;
    let pending = env.serve_component("pending", &[]).await;

    env.orchestrator
        .install(vec![installed.clone()])
        .await
        .unwrap();

    let stale = env
        .orchestrator
        .check_updates(&[installed.clone(), pending])
        .await
        .unwrap();
    assert_eq!(stale, vec!["pending".to_string()]);

    // A changed digest makes an installed component stale again
    let mut updated = installed;
    updated.digest = Some(
        devstrap::app::digest::ChecksumVerifier::compute_bytes(
            b"new release",
            devstrap::app::digest::DigestAlgorithm::Sha256,
        ),
    );
    let stale = env.orchestrator.check_updates(&[updated]).await.unwrap();
    assert_eq!(stale, vec!["installed".to_string()]);
}
