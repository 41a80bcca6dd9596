//! Oracle event system.

use crate::error::ErrorKind;
use crate::identity::Identity;
use crate::request::RequestId;
use tokio::sync::broadcast;

/// Events emitted by a processor.
#[derive(Debug, Clone)]
pub enum OracleEvent {
    /// A request was accepted and is pending.
    RequestSubmitted {
        /// Request id.
        id: RequestId,
        /// Submitting caller, if any.
        origin: Option<Identity>,
        /// Target URL, or the requested currency pairs.
        target: String,
    },

    /// A request was verified.
    RequestCompleted {
        /// Request id.
        id: RequestId,
        /// Verified body length.
        body_len: usize,
    },

    /// A request failed.
    RequestFailed {
        /// Request id.
        id: RequestId,
        /// Error class.
        kind: ErrorKind,
        /// Error message.
        message: String,
    },

    /// The processor's transaction fee changed.
    FeeChanged {
        /// New fee.
        fee: u64,
    },
}

/// Channel for receiving oracle events.
pub type OracleEventsChannel = broadcast::Receiver<OracleEvent>;

/// Sender for oracle events.
pub type OracleEventsSender = broadcast::Sender<OracleEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (OracleEventsSender, OracleEventsChannel) {
    broadcast::channel(256)
}
