//! Test harness: a mock notary and a deployment wired to it.
//!
//! [`MockNotary`] speaks the notary's HTTP protocol on an ephemeral port.
//! It answers `GET /notaryinfo` with its PEM key and `POST /notarize` with
//! a signed transcript whose response body is a synthetic transaction list,
//! or a canned price list for RedStone and Pyth price URLs.

use adc_oracle::notary::{
    encode_public_key, NotarizeRequest, NotarizeResponse, NotaryInfoResponse, Transcript,
    TranscriptRequest, TranscriptResponse,
};
use adc_oracle::request::Header;
use adc_oracle::verifier::ATTESTATION_CONTEXT;
use adc_oracle::{Deployment, DeploymentBuilder, OracleConfig};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use saorsa_pqc::api::sig::ml_dsa_65;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Requests to this host make the mock notary fail the notarization.
pub const FAILING_HOST: &str = "unreachable.invalid";

/// Number of transactions in the synthetic response body.
const TXN_COUNT: usize = 48;

/// Pyth feed id the mock notary serves a BTC price for.
pub const BTC_PYTH_FEED: &str = "b7c0ffee";

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Socket error
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Key generation error
    #[error("Key generation failed: {0}")]
    Keygen(String),

    /// Deployment error
    #[error("Deployment error: {0}")]
    Deployment(#[from] adc_oracle::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

type Signer = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

struct NotaryState {
    public_key_pem: String,
    sign: Signer,
    calls: AtomicUsize,
}

/// An HTTP notary running inside the test process.
pub struct MockNotary {
    addr: SocketAddr,
    state: Arc<NotaryState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockNotary {
    /// Generate a key and start serving on `127.0.0.1:0`.
    pub async fn start() -> Result<Self> {
        let dsa = ml_dsa_65();
        let (public_key, secret_key) = dsa
            .generate_keypair()
            .map_err(|e| HarnessError::Keygen(format!("{e:?}")))?;
        let sign: Signer = Arc::new(move |msg: &[u8]| {
            ml_dsa_65()
                .sign_with_context(&secret_key, msg, ATTESTATION_CONTEXT)
                .expect("sign transcript")
                .to_bytes()
                .to_vec()
        });

        let state = Arc::new(NotaryState {
            public_key_pem: encode_public_key(&public_key.to_bytes()),
            sign,
            calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/notaryinfo", get(notary_info))
            .route("/notarize", post(notarize))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stopped.await;
                })
                .await;
        });

        info!("Mock notary listening on {addr}");
        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown),
            handle,
        })
    }

    /// Base URL of the notary.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The advertised PEM key.
    pub fn public_key_pem(&self) -> &str {
        &self.state.public_key_pem
    }

    /// Number of notarizations served.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Stop serving.
    pub async fn teardown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

async fn notary_info(State(state): State<Arc<NotaryState>>) -> Json<NotaryInfoResponse> {
    Json(NotaryInfoResponse {
        public_key: state.public_key_pem.clone(),
    })
}

async fn notarize(
    State(state): State<Arc<NotaryState>>,
    Json(request): Json<NotarizeRequest>,
) -> std::result::Result<Json<NotarizeResponse>, (StatusCode, String)> {
    state.calls.fetch_add(1, Ordering::SeqCst);

    if request.url.contains(FAILING_HOST) {
        return Err((
            StatusCode::BAD_GATEWAY,
            format!("could not connect to {}", request.url),
        ));
    }

    let response_body = price_body(&request.url).unwrap_or_else(transactions_body);
    let transcript = Transcript {
        request: TranscriptRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
        },
        response: TranscriptResponse {
            status: 200,
            headers: vec![
                Header::new("Content-Type", "application/json"),
                Header::new("Set-Cookie", "session=mock"),
            ],
            body: response_body,
        },
        notarized_at: Utc::now(),
    };
    let transcript = serde_json::to_vec(&transcript)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let signature = (state.sign)(&transcript);

    Ok(Json(NotarizeResponse {
        transcript: Bytes::from(transcript),
        signature: Bytes::from(signature),
        public_key: state.public_key_pem.clone(),
    }))
}

/// Canned feed answers: BTC at 64000 (RedStone) and 66000 (Pyth), ETH at
/// 3200, anything else an empty list.
fn price_body(url: &str) -> Option<Bytes> {
    if url.contains("/prices?symbol=") {
        let value = if url.contains("symbol=BTC&") {
            serde_json::json!([{ "symbol": "BTC", "value": 64_000.0 }])
        } else if url.contains("symbol=ETH&") {
            serde_json::json!([{ "symbol": "ETH", "value": 3_200.0 }])
        } else {
            serde_json::json!([])
        };
        return Some(Bytes::from(value.to_string()));
    }
    if url.contains("latest_price_feeds") && url.ends_with(BTC_PYTH_FEED) {
        let value = serde_json::json!([{
            "id": BTC_PYTH_FEED,
            "price": { "price": "6600000", "conf": "1500", "expo": -2, "publish_time": 1_700_000_000 },
        }]);
        return Some(Bytes::from(value.to_string()));
    }
    None
}

/// A canned ledger page: `{"txns":[...]}`.
pub fn transactions_body() -> Bytes {
    let txns: Vec<serde_json::Value> = (0..TXN_COUNT)
        .map(|i| {
            serde_json::json!({
                "id": format!("txn-{i:04}"),
                "from": format!("account-{:03}", i % 7),
                "to": format!("account-{:03}", (i * 3) % 11),
                "amount": 1_000 + i * 37,
            })
        })
        .collect();
    Bytes::from(serde_json::json!({ "txns": txns }).to_string())
}

/// A deployment wired to its own mock notary and state directory.
pub struct TestOracle {
    notary: MockNotary,
    deployment: Deployment,
    _state_dir: tempfile::TempDir,
}

impl TestOracle {
    /// Start a notary and build a default deployment against it.
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// As [`start`](Self::start), adjusting the configuration first.
    pub async fn start_with(adjust: impl FnOnce(&mut OracleConfig)) -> Result<Self> {
        let notary = MockNotary::start().await?;
        let state_dir = tempfile::tempdir()?;

        let mut config = OracleConfig {
            state_dir: state_dir.path().to_path_buf(),
            ..Default::default()
        };
        config.notary.url = notary.url();
        adjust(&mut config);

        let deployment = DeploymentBuilder::new(config).build().await?;
        Ok(Self {
            notary,
            deployment,
            _state_dir: state_dir,
        })
    }

    /// The mock notary.
    pub fn notary(&self) -> &MockNotary {
        &self.notary
    }

    /// The deployment under test.
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Stop the notary.
    pub async fn teardown(self) {
        self.notary.teardown().await;
    }
}
