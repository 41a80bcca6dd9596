//! Integration tests against a live mock notary.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::{MockNotary, TestOracle, BTC_PYTH_FEED, FAILING_HOST};
use adc_oracle::notary::{encode_public_key, Notary, NotaryClient, NotaryConfig};
use adc_oracle::registry::ConfigRegistry;
use adc_oracle::request::{FetchSpec, Redaction};
use adc_oracle::verifier::REDACTION_MASK;
use adc_oracle::{
    ConfigError, DeploymentBuilder, Error, ErrorKind, OracleConfig, RequestId, RequestStatus,
    Savings,
};
use bytes::Bytes;
use saorsa_pqc::api::sig::ml_dsa_65;
use std::time::Duration;

const TXNS_URL: &str = "https://ledger.example.com/api/txns";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The notary advertises a PEM encoded key and reports itself live.
#[tokio::test]
async fn test_notary_info_advertises_pem_key() {
    let notary = MockNotary::start().await.expect("Failed to start notary");

    let client = NotaryClient::new(NotaryConfig {
        base_url: notary.url(),
        ..Default::default()
    })
    .unwrap();
    let info = client.get_info().await.unwrap();

    assert!(info.live);
    assert!(info.public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert_eq!(info.public_key_pem, notary.public_key_pem());

    notary.teardown().await;
}

/// The processor's verifier has a 27 character text identity.
#[tokio::test]
async fn test_processor_verifier_identity() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let deployment = oracle.deployment();

    let verifier = deployment
        .registry()
        .get(&deployment.roles().processor)
        .expect("processor is bound");
    assert_eq!(&verifier, deployment.verifier().identity());
    assert_eq!(deployment.processor().get_verifier_canister(), Some(verifier.clone()));
    assert_eq!(verifier.to_text().len(), 27);

    oracle.teardown().await;
}

/// The caller reports exactly the processor it was bound to.
#[tokio::test]
async fn test_get_adc_address() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let deployment = oracle.deployment();

    assert_eq!(
        deployment.caller().get_adc_address(),
        Some(deployment.roles().processor.clone())
    );

    oracle.teardown().await;
}

/// Closing the chain back on itself is refused at bind time.
#[tokio::test]
async fn test_binding_cycle_rejected() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let deployment = oracle.deployment();
    let roles = deployment.roles();

    let err = deployment
        .registry()
        .bind(&roles.verifier, &roles.processor)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::CycleDetected { .. })
    ));

    // The chain still works afterwards
    assert!(deployment.caller().ensure_ready().is_ok());

    oracle.teardown().await;
}

/// A plain GET completes within a minute with the ledger page.
#[tokio::test]
async fn test_blocking_get_completes() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");

    let body = tokio::time::timeout(
        Duration::from_secs(60),
        oracle
            .deployment()
            .caller()
            .send_http_request(TXNS_URL, "GET", "", vec![], Bytes::new()),
    )
    .await
    .expect("request timed out")
    .expect("request failed");

    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("\"txns\""));
    assert!(body.len() > 2024, "body is only {} bytes", body.len());
    assert_eq!(oracle.notary().calls(), 1);

    oracle.teardown().await;
}

/// Both calling conventions return the same body.
#[tokio::test]
async fn test_blocking_and_polled_bodies_match() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let deployment = oracle.deployment();

    let blocking = deployment
        .caller()
        .send(FetchSpec::get(TXNS_URL))
        .await
        .unwrap();

    let id = deployment
        .caller()
        .submit_http_request(TXNS_URL, "GET", "", vec![], Bytes::new())
        .unwrap();
    let polled = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(body) = deployment.caller().get_adc_response(&id) {
                break body;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("request never completed");

    assert_eq!(blocking, polled);
    assert_eq!(oracle.notary().calls(), 2);

    oracle.teardown().await;
}

/// Submit and poll costs less in total than the blocking path.
#[tokio::test]
async fn test_compare_paths_reports_savings() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let deployment = oracle.deployment();
    let roles = deployment.roles();

    let comparison = deployment
        .compare_paths(FetchSpec::get(TXNS_URL), POLL_INTERVAL)
        .await
        .unwrap();

    assert_eq!(comparison.blocking_body, comparison.orchestrated_body);

    let fees = deployment.config().fees;
    assert_eq!(
        comparison.blocking.consumed_by(&roles.caller),
        Some(u128::from(fees.transaction_fee + fees.blocking_surcharge))
    );
    assert_eq!(
        comparison.orchestrated.consumed_by(&roles.caller),
        Some(u128::from(fees.transaction_fee))
    );
    assert_eq!(
        comparison.orchestrated.consumed_by(&roles.verifier),
        Some(u128::from(fees.verify))
    );
    assert_eq!(comparison.blocking.consumed_by(&roles.processor), Some(0));
    assert_eq!(
        comparison.blocking.credited_to(&roles.processor),
        Some(u128::from(fees.transaction_fee - fees.notarize))
    );

    match comparison.savings() {
        Savings::Percent(p) => assert!(p > 0.0, "expected savings, got {p}"),
        Savings::Undefined => panic!("blocking path consumed nothing"),
    }

    oracle.teardown().await;
}

/// A notary-side failure surfaces as a failed record, not a pending one.
#[tokio::test]
async fn test_notarization_failure_is_recorded() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let caller = oracle.deployment().caller();

    let url = format!("https://{FAILING_HOST}/txns");
    let id = caller.submit(FetchSpec::get(url)).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let status = caller.poll_adc_response(&id).unwrap();
            if status.is_terminal() {
                break status;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("request never finished");

    let err = match status {
        RequestStatus::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.is_retryable());
    assert_eq!(caller.get_adc_response(&id), None);

    oracle.teardown().await;
}

/// Redacted body bytes come back masked and redacted headers withheld.
#[tokio::test]
async fn test_redactions_applied() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let deployment = oracle.deployment();

    let body = deployment
        .caller()
        .send_http_request(TXNS_URL, "GET", "res:body:0-8", vec![], Bytes::new())
        .await
        .unwrap();
    assert!(body[..8].iter().all(|b| *b == REDACTION_MASK));
    assert_eq!(&body[8..], &super::harness::transactions_body()[8..]);

    let spec = FetchSpec::get(TXNS_URL).with_redaction(Redaction::ResponseHeader {
        name: "set-cookie".to_string(),
    });
    let verified = deployment.verifier().notarize_and_verify(&spec).await.unwrap();
    assert!(verified
        .headers
        .iter()
        .all(|h| !h.name.eq_ignore_ascii_case("set-cookie")));

    oracle.teardown().await;
}

/// Pair prices come from verified feed responses, averaged and converted.
#[tokio::test]
async fn test_currency_pair_prices() {
    let oracle = TestOracle::start_with(|config| {
        config
            .price
            .pyth_feed_ids
            .insert("BTC".to_string(), format!("0x{BTC_PYTH_FEED}"));
    })
    .await
    .expect("Failed to start oracle");
    let caller = oracle.deployment().caller();

    let id = caller.submit_adc_request("btc/eth,btc,xyz").unwrap();
    let prices = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(prices) = caller.get_adc_prices(&id) {
                break prices;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("price request never completed");

    let btc = prices.get("BTC").unwrap().price.unwrap();
    assert!((btc - 65_000.0).abs() < 1e-9);
    let btc_eth = prices.get("BTC/ETH").unwrap().price.unwrap();
    assert!((btc_eth - 65_000.0 / 3_200.0).abs() < 1e-9);
    assert!(prices.get("XYZ").unwrap().error.is_some());

    // BTC twice, ETH and XYZ once each
    assert_eq!(oracle.notary().calls(), 4);

    let err = caller
        .submit_adc_request(&["BTC"; 11].join(","))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    oracle.teardown().await;
}

/// Polling an id that was never issued fails instead of reporting Pending.
#[tokio::test]
async fn test_unknown_id_not_found() {
    let oracle = TestOracle::start().await.expect("Failed to start oracle");
    let caller = oracle.deployment().caller();

    let id: RequestId = "42_abcde".parse().unwrap();
    assert_eq!(caller.poll_adc_response(&id), Err(Error::NotFound(id.to_string())));
    assert_eq!(caller.get_adc_response(&id), None);

    oracle.teardown().await;
}

/// Bindings survive a restart and a pin on a different key is refused.
#[tokio::test]
async fn test_bindings_persist_and_pin_enforced() {
    let notary = MockNotary::start().await.expect("Failed to start notary");
    let state_dir = tempfile::tempdir().unwrap();
    let mut config = OracleConfig {
        state_dir: state_dir.path().to_path_buf(),
        ..Default::default()
    };
    config.notary.url = notary.url();

    let first = DeploymentBuilder::new(config.clone()).build().await.unwrap();
    let roles = first.roles().clone();
    drop(first);

    let persisted = ConfigRegistry::load(&config.bindings_path()).unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(
        persisted.chain(&roles.caller),
        vec![roles.caller.clone(), roles.processor.clone(), roles.verifier.clone()]
    );

    config.notary.pinned_public_key = Some(notary.public_key_pem().to_string());
    let pinned = DeploymentBuilder::new(config.clone()).build().await.unwrap();
    assert!(pinned.caller().ensure_ready().is_ok());
    drop(pinned);

    let (other_key, _) = ml_dsa_65().generate_keypair().unwrap();
    config.notary.pinned_public_key = Some(encode_public_key(&other_key.to_bytes()));
    let err = DeploymentBuilder::new(config).build().await.unwrap_err();
    assert_eq!(err, Error::Config(ConfigError::PinnedKeyMismatch));

    notary.teardown().await;
}
