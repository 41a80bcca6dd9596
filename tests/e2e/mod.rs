//! End-to-end tests for adc-oracle.
//!
//! Each test starts an in-process notary over real HTTP that signs
//! transcripts with a fresh ML-DSA-65 key, then drives a full deployment
//! through the public API.
//!
//! ```bash
//! cargo test --test e2e
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod harness;
mod integration_tests;

pub use harness::{HarnessError, MockNotary, TestOracle, BTC_PYTH_FEED, FAILING_HOST};
