//! The engine's structured error union, plus the small event types that
//! feed it from the transport and monitor layers.

use xtables_protocol::{DecodeError, ValidationError};

/// Everything a facade call can fail with, short of the sentinel
/// "not present" result (modeled as `Option::None`, never an error variant
/// — a GET that legitimately has no value is not a failure).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("pending reply abandoned: Req transport was reset")]
    TransportReset,

    #[error("timed out waiting for reply")]
    Timeout,

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("reply type {actual:?} does not match expected {expected:?}")]
    TypeMismatch {
        expected: xtables_protocol::ValueType,
        actual: xtables_protocol::ValueType,
    },

    #[error("key validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("no reachable server endpoint")]
    NotFound,
}
