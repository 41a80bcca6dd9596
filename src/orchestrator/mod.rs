//! Request orchestration for the processor role.
//!
//! One logical "fetch this URL and prove it" operation is one
//! [`RequestRecord`]. Blocking and polling callers read the same record.
//! A currency pair price request is one record too; its pipeline runs one
//! notarized fetch per token and feed (see [`crate::price`]).
//!
//! # Architecture
//!
//! ```text
//! submit / submit_from / submit_prices
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ validate + admit    │──▶ whitelist, transaction fee
//! └─────────┬───────────┘
//!           │ Pending record, id returned
//!           ▼
//!     spawned pipeline
//!           │
//!   resolve verifier (registry + directory)
//!           │
//!   notarize ──▶ verify against pinned key
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  accepted     any error
//!    │             │
//!    ▼             ▼
//! Completed     Failed
//!    │             │
//!    └──────┬──────┘
//!           ▼
//!   poll(id) / wait(id)
//! ```

mod processor;
mod records;
mod status;

pub use processor::{FeeSchedule, OrchestratorConfig, RequestOrchestrator, DEFAULT_TRANSACTION_FEE};
pub use records::{RecordStats, RecordStore, DEFAULT_RETENTION_CAPACITY};
pub use status::{OracleRequest, RequestRecord, RequestStatus};
