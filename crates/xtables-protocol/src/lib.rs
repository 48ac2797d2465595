//! Wire format and data model for the XTables client, kept free of any
//! async runtime so it can be unit-tested in isolation and reused by
//! both the transport layer and test stubs.

pub mod codec;
pub mod error;
pub mod message;
pub mod stats;
pub mod update;

pub use error::{DecodeError, ValidationError};
pub use message::{validate_key, Command, Message, ValueType};
pub use stats::{calculate_health, ClientStatistics, HealthStatus};
pub use update::{Category, Update};
