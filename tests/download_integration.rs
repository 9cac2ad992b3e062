//! Download-path integration scenarios through the orchestrator
//!
//! Exercises the security precondition, digest mismatch handling and
//! mirror fallback as observed from batch results.

mod support;

use anyhow::{Context, Result};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devstrap::app::models::{BatchStatus, FailureClass};
use support::TestEnv;

#[tokio::test]
async fn missing_digest_is_security_failure_with_zero_attempts() -> Result<()> {
    let env = TestEnv::new().await;
    let mut spec = env.spec_for("undigested", &[], b"whatever", 0);
    spec.digest = None;

    let result = env.orchestrator.install(vec![spec]).await?;

    assert_eq!(result.status, BatchStatus::Failed);
    let report = result.report("undigested").context("report missing")?;
    let outcome = report.download.as_ref().context("outcome missing")?;
    assert_eq!(outcome.failure, Some(FailureClass::Security));
    assert_eq!(outcome.retry_count, 0);
    assert!(outcome.message.contains("digest"));
    // The security refusal happens before any network activity
    assert_eq!(env.request_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn tampered_payload_fails_verification_and_leaves_no_artifact() -> Result<()> {
    let env = TestEnv::new().await;

    // Serve bytes that do not match the declared digest
    Mock::given(method("GET"))
        .and(path("/tampered.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"evil bytes".to_vec()))
        .mount(&env.server)
        .await;
    let spec = env.spec_for("tampered", &[], b"expected bytes", 0);

    let result = env.orchestrator.install(vec![spec.clone()]).await?;

    assert_eq!(result.status, BatchStatus::Failed);
    let outcome = result
        .report("tampered")
        .context("report missing")?
        .download
        .as_ref()
        .context("outcome missing")?;
    assert_eq!(outcome.failure, Some(FailureClass::Verification));
    assert!(!outcome.verified);

    // No file at the public path, and nothing cached
    let digest = spec.digest.clone().context("spec digest")?;
    assert!(!env.cache.artifact_path(&spec, &digest).exists());
    assert!(env.cache.lookup(&spec).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn mirror_fallback_succeeds_after_primary_exhausted() -> Result<()> {
    let env = TestEnv::new().await;

    // Primary always errors
    Mock::given(method("GET"))
        .and(path("/mirrored.bin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&env.server)
        .await;

    // Mirror serves the correct payload
    let mirror = MockServer::start().await;
    let payload = b"payload-mirrored".to_vec();
    Mock::given(method("GET"))
        .and(path("/mirrored.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&mirror)
        .await;

    let mut spec = env.spec_for("mirrored", &[], &payload, 0);
    spec.mirrors = vec![format!("{}/mirrored.bin", mirror.uri())];

    let result = env.orchestrator.install(vec![spec]).await?;

    assert_eq!(result.status, BatchStatus::Completed);
    let outcome = result
        .report("mirrored")
        .context("report missing")?
        .download
        .as_ref()
        .context("outcome missing")?;
    assert!(outcome.success);
    // The primary consumed its full attempt budget first
    assert_eq!(outcome.retry_count, 3);
    assert!(outcome.message.contains(&mirror.uri()));

    // Primary was attempted three times, the mirror once
    assert_eq!(env.request_count().await, 3);
    assert_eq!(
        mirror.received_requests().await.context("recording")?.len(),
        1
    );
    Ok(())
}
