//! Construction-time configuration. There is no TOML file like
//! `forwarder`'s `config.rs` — this is a library, so a builder struct and
//! its defaults play the same role.

/// The three logical TCP ports a generation of the protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortTriple {
    pub push: u16,
    pub req: u16,
    pub sub: u16,
}

pub const MODERN_PORTS: PortTriple = PortTriple {
    push: 48800,
    req: 48801,
    sub: 48802,
};

pub const LEGACY_PORTS: PortTriple = PortTriple {
    push: 1735,
    req: 1736,
    sub: 1737,
};

/// Construction-time configuration for [`crate::XTablesClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) explicit_host: Option<String>,
    pub(crate) ports: PortTriple,
    pub(crate) buffer_capacity: usize,
    pub(crate) ghost_mode: bool,
    pub(crate) client_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            explicit_host: None,
            ports: MODERN_PORTS,
            buffer_capacity: 1024,
            ghost_mode: false,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the resolver chain and connect to this host directly.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.explicit_host = Some(host.into());
        self
    }

    /// Use the legacy 1735/1736/1737 port triple instead of 48800/48801/48802.
    pub fn legacy_ports(mut self, legacy: bool) -> Self {
        self.ports = if legacy { LEGACY_PORTS } else { MODERN_PORTS };
        self
    }

    pub fn ports(mut self, ports: PortTriple) -> Self {
        self.ports = ports;
        self
    }

    /// Capacity of the coalescing ring buffer backing subscription delivery.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be > 0");
        self.buffer_capacity = capacity;
        self
    }

    /// Disable the telemetry responder and its solicitation replies.
    pub fn ghost_mode(mut self, ghost: bool) -> Self {
        self.ghost_mode = ghost;
        self
    }

    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }
}
