//! Signing keys and an in-memory notary for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::{Error, Result, TransportError};
use crate::notary::{
    encode_public_key, Attestation, Notary, NotaryInfo, Transcript, TranscriptRequest,
    TranscriptResponse,
};
use crate::request::{FetchSpec, Header};
use crate::verifier::ATTESTATION_CONTEXT;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use saorsa_pqc::api::sig::ml_dsa_65;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

type Signer = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// An ML-DSA-65 keypair that can sign transcripts.
#[derive(Clone)]
pub(crate) struct TestKeys {
    pub public_key: Bytes,
    sign: Signer,
}

impl TestKeys {
    pub fn generate() -> Self {
        let dsa = ml_dsa_65();
        let (public_key, secret_key) = dsa.generate_keypair().expect("keygen");
        let sign: Signer = Arc::new(move |msg: &[u8]| {
            ml_dsa_65()
                .sign_with_context(&secret_key, msg, ATTESTATION_CONTEXT)
                .expect("sign")
                .to_bytes()
                .to_vec()
        });
        Self {
            public_key: Bytes::from(public_key.to_bytes().to_vec()),
            sign,
        }
    }

    /// One keypair reused across property test cases.
    pub fn shared() -> &'static Self {
        static KEYS: OnceLock<TestKeys> = OnceLock::new();
        KEYS.get_or_init(Self::generate)
    }

    pub fn pem(&self) -> String {
        encode_public_key(&self.public_key)
    }

    pub fn sign(&self, message: &[u8]) -> Bytes {
        Bytes::from((self.sign)(message))
    }

    /// Sign a transcript of `spec` answered with `response`.
    pub fn attest(&self, spec: &FetchSpec, response: TranscriptResponse) -> Attestation {
        let transcript = Transcript {
            request: TranscriptRequest::from_spec(spec),
            response,
            notarized_at: Utc::now(),
        };
        let transcript = Bytes::from(serde_json::to_vec(&transcript).unwrap());
        Attestation {
            signature: self.sign(&transcript),
            transcript,
            signer_public_key: self.public_key.clone(),
        }
    }
}

pub(crate) fn response(status: u16, body: &[u8]) -> TranscriptResponse {
    TranscriptResponse {
        status,
        headers: vec![Header::new("Content-Type", "application/json")],
        body: Bytes::copy_from_slice(body),
    }
}

/// How a [`FakeNotary`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeMode {
    Honest,
    Unreachable,
    /// Signs a transcript for a different URL than requested.
    Redirect,
    /// Flips a byte of the response body after signing.
    TamperBody,
}

/// In-process notary that signs real transcripts.
///
/// Answers every URL with its default body unless a route whose needle
/// the URL contains says otherwise.
pub(crate) struct FakeNotary {
    keys: TestKeys,
    body: Bytes,
    routes: Vec<(String, Bytes)>,
    failing: Vec<String>,
    mode: Mutex<FakeMode>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeNotary {
    pub fn new(body: &[u8]) -> Self {
        Self::with_keys(TestKeys::generate(), body)
    }

    pub fn with_keys(keys: TestKeys, body: &[u8]) -> Self {
        Self {
            keys,
            body: Bytes::copy_from_slice(body),
            routes: Vec::new(),
            failing: Vec::new(),
            mode: Mutex::new(FakeMode::Honest),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer URLs containing `needle` with `body`.
    pub fn with_route(mut self, needle: &str, body: &[u8]) -> Self {
        self.routes.push((needle.to_string(), Bytes::copy_from_slice(body)));
        self
    }

    /// Fail notarization of URLs containing `needle`.
    pub fn failing_for(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    fn body_for(&self, url: &str) -> &[u8] {
        self.routes
            .iter()
            .find(|(needle, _)| url.contains(needle.as_str()))
            .map_or(&self.body, |(_, body)| body)
    }

    pub fn set_mode(&self, mode: FakeMode) {
        *self.mode.lock() = mode;
    }

    pub fn keys(&self) -> &TestKeys {
        &self.keys
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notary for FakeNotary {
    async fn get_info(&self) -> Result<NotaryInfo> {
        if *self.mode.lock() == FakeMode::Unreachable {
            return Err(TransportError::NotaryUnreachable("fake notary is down".into()).into());
        }
        Ok(NotaryInfo {
            public_key_pem: self.keys.pem(),
            public_key: self.keys.public_key.clone(),
            live: true,
        })
    }

    async fn notarize(&self, spec: &FetchSpec) -> Result<Attestation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.iter().any(|needle| spec.url.contains(needle.as_str())) {
            return Err(TransportError::NotarizationFailed(format!("cannot reach {}", spec.url)).into());
        }
        let body = self.body_for(&spec.url);
        let mode = *self.mode.lock();
        match mode {
            FakeMode::Unreachable => Err(Error::from(TransportError::NotarizationFailed(
                "fake notary is down".into(),
            ))),
            FakeMode::Honest => Ok(self.keys.attest(spec, response(200, body))),
            FakeMode::Redirect => {
                let mut elsewhere = spec.clone();
                elsewhere.url = "https://attacker.example.com/".to_string();
                Ok(self.keys.attest(&elsewhere, response(200, body)))
            }
            FakeMode::TamperBody => {
                let attestation = self.keys.attest(spec, response(200, body));
                let mut transcript: Transcript =
                    serde_json::from_slice(&attestation.transcript).unwrap();
                let mut body = transcript.response.body.to_vec();
                if let Some(first) = body.first_mut() {
                    *first ^= 0x01;
                }
                transcript.response.body = Bytes::from(body);
                Ok(Attestation {
                    transcript: Bytes::from(serde_json::to_vec(&transcript).unwrap()),
                    ..attestation
                })
            }
        }
    }
}
