//! Small, single-purpose error types owned by the wire layer.
//!
//! Hand-rolled `Display`/`Error` impls, matching the lighter-weight error
//! style the teacher uses for focused, leaf-level errors (e.g.
//! `DiscoveryError` in `forwarder/discovery.rs`) rather than `thiserror`,
//! which is reserved for the larger union type in `xtables-client`.

use std::fmt;

/// A frame could not be parsed into a `Message`/`Update`. Always non-fatal
/// to the pipeline: the caller logs and discards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the declared field length.
    Truncated { field: &'static str },
    /// A tag byte didn't match any known `Command`/`ValueType`/`Category`.
    UnknownTag { field: &'static str, tag: u8 },
    /// A `String` field wasn't valid UTF-8.
    InvalidUtf8 { field: &'static str },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { field } => write!(f, "truncated frame at field '{field}'"),
            DecodeError::UnknownTag { field, tag } => {
                write!(f, "unknown tag {tag} for field '{field}'")
            }
            DecodeError::InvalidUtf8 { field } => {
                write!(f, "invalid UTF-8 in field '{field}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// A user-supplied key failed [`crate::validate_key`]'s rules. Raised before
/// any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Empty,
    ContainsSpace,
    LeadingOrTrailingDot,
    EmptySegment,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Empty => write!(f, "key must not be empty"),
            ValidationError::ContainsSpace => write!(f, "key must not contain spaces"),
            ValidationError::LeadingOrTrailingDot => {
                write!(f, "key must not start or end with '.'")
            }
            ValidationError::EmptySegment => {
                write!(f, "key must not contain an empty '.'-separated segment")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
