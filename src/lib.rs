//! Client engine for the XTables hub-and-spoke network-table service: a
//! typed put/get/publish API over three logical sockets (Push/Req/Sub), a
//! coalescing subscription feed, and a telemetry responder.

pub mod buffer;
pub mod config;
pub mod error;
pub mod monitor;
pub mod resolver;
pub mod router;
pub mod telemetry;
pub mod transport;

mod facade;

pub use config::{ClientConfig, PortTriple, LEGACY_PORTS, MODERN_PORTS};
pub use error::ClientError;
pub use facade::{PingResult, XTablesClient};
pub use monitor::ConnectionStatus;
pub use router::{LogCallback, UpdateCallback};

pub use xtables_protocol::{Category, Command, Update, ValueType};
