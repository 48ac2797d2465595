//! The three logical endpoints to the server: Push (fire-and-forget), Req
//! (strict request/reply), and Sub (prefix-filtered update feed).
//!
//! Framing is `tokio_util::codec::Framed` over `LengthDelimitedCodec`.
//! Reconnect loops are plain `tokio::spawn`ed tasks with a fixed backoff
//! sleep. A connect failure also invalidates the resolver's cached
//! endpoint, since it means the cached address is no longer reachable.

use crate::error::ClientError;
use crate::monitor::{ConnectionEvent, ConnectionMonitor};
use crate::resolver::EndpointResolver;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

const REQ_TIMEOUT: Duration = Duration::from_secs(3);
const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// A frame whose key is empty (the wire form of a solicitation Update)
/// always starts with the single NUL key-terminator byte — see
/// `xtables_protocol::codec::encode_update_prefix`. The Sub transport
/// seeds this as a standing, non-removable prefix so the Telemetry
/// Responder always hears INFORMATION/REGISTRY solicitations regardless
/// of what the user has subscribed to.
pub(crate) const SOLICITATION_PREFIX: [u8; 1] = [0u8];

type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

async fn connect_framed(addr: &str) -> std::io::Result<FramedStream> {
    let stream = TcpStream::connect(addr).await?;
    Ok(Framed::new(stream, LengthDelimitedCodec::new()))
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// Outgoing-only, fire-and-forget. Used for PUT, PUBLISH, and telemetry
/// responses.
pub struct PushTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    _task: tokio::task::JoinHandle<()>,
}

impl PushTransport {
    pub fn spawn(
        addr: String,
        monitor: Arc<ConnectionMonitor>,
        resolver: Arc<EndpointResolver>,
        name: &'static str,
        stop: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        monitor.attach(name);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::run(addr, monitor, resolver, name, rx, stop));
        PushTransport { tx, _task: task }
    }

    /// Enqueue `frame`. Returns `true` iff the enqueue did not fail
    /// synchronously — the background task owns the actual socket write
    /// and its own reconnect/backoff.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.tx.send(frame).is_ok()
    }

    async fn run(
        addr: String,
        monitor: Arc<ConnectionMonitor>,
        resolver: Arc<EndpointResolver>,
        name: &'static str,
        mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            if *stop.borrow() {
                return;
            }
            let mut framed = tokio::select! {
                biased;
                _ = stop.changed() => if *stop.borrow() { return } else { continue },
                result = connect_framed(&addr) => match result {
                    Ok(f) => {
                        monitor.report(name, ConnectionEvent::Connected);
                        f
                    }
                    Err(e) => {
                        warn!(socket = name, error = %e, "push connect failed, retrying in 1s");
                        monitor.report(name, ConnectionEvent::ConnectDelayed);
                        resolver.invalidate_cache();
                        tokio::select! {
                            _ = tokio::time::sleep(BASE_BACKOFF) => {}
                            _ = stop.changed() => if *stop.borrow() { return },
                        }
                        monitor.report(name, ConnectionEvent::ConnectRetried);
                        continue;
                    }
                },
            };

            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            debug!(socket = name, "push transport stopping");
                            return;
                        }
                    }
                    frame = rx.recv() => match frame {
                        None => {
                            debug!(socket = name, "push channel closed, shutting down");
                            return;
                        }
                        Some(frame) => {
                            if let Err(e) = framed.send(Bytes::from(frame)).await {
                                warn!(socket = name, error = %e, "push send failed, reconnecting");
                                monitor.report(name, ConnectionEvent::Disconnected);
                                break;
                            }
                        }
                    },
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Req
// ---------------------------------------------------------------------------

/// Paired request/reply, strictly alternating send-then-receive. Used for
/// GET, PING, DELETE, DEBUG, GET_TABLES.
///
/// The `AsyncMutex<Option<FramedStream>>` is both the serialization lock
/// ("only one request may be in-flight at any time") and the connection
/// state: `Some(_)` means connected, and any send/recv/timeout failure
/// drops it back to `None` so the next call rebuilds the connection from
/// scratch.
pub struct ReqTransport {
    addr: String,
    monitor: Arc<ConnectionMonitor>,
    resolver: Arc<EndpointResolver>,
    conn: AsyncMutex<Option<FramedStream>>,
}

impl ReqTransport {
    pub fn new(addr: String, monitor: Arc<ConnectionMonitor>, resolver: Arc<EndpointResolver>) -> Self {
        monitor.attach("req");
        ReqTransport {
            addr,
            monitor,
            resolver,
            conn: AsyncMutex::new(None),
        }
    }

    /// Send `frame` and wait up to 3s for a reply. On any transport error
    /// or timeout the connection is torn down — the next call rebuilds it
    /// from scratch, which is what clears the strict alternation state.
    pub async fn request(&self, frame: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let framed = guard.as_mut().expect("just connected");

        if let Err(e) = framed.send(Bytes::from(frame)).await {
            warn!(error = %e, "req send failed, resetting");
            *guard = None;
            self.monitor.report("req", ConnectionEvent::Disconnected);
            return Err(ClientError::Transport(e.to_string()));
        }

        match tokio::time::timeout(REQ_TIMEOUT, framed.next()).await {
            Ok(Some(Ok(bytes))) => Ok(bytes.to_vec()),
            Ok(Some(Err(e))) => {
                *guard = None;
                self.monitor.report("req", ConnectionEvent::Disconnected);
                Err(ClientError::Transport(e.to_string()))
            }
            Ok(None) => {
                *guard = None;
                self.monitor.report("req", ConnectionEvent::Disconnected);
                Err(ClientError::TransportReset)
            }
            Err(_elapsed) => {
                *guard = None;
                self.monitor.report("req", ConnectionEvent::Disconnected);
                Err(ClientError::Timeout)
            }
        }
    }

    async fn connect(&self) -> Result<FramedStream, ClientError> {
        match connect_framed(&self.addr).await {
            Ok(framed) => {
                self.monitor.report("req", ConnectionEvent::Connected);
                Ok(framed)
            }
            Err(e) => {
                self.monitor.report("req", ConnectionEvent::ConnectDelayed);
                self.resolver.invalidate_cache();
                Err(ClientError::Transport(e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sub
// ---------------------------------------------------------------------------

/// Incoming-only, with a prefix-filter subscription mechanism. Used for
/// UPDATE_EVENT and server-solicited INFORMATION/REGISTRY frames.
pub struct SubTransport {
    prefixes: Arc<StdMutex<HashSet<Vec<u8>>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl SubTransport {
    pub fn spawn(
        addr: String,
        monitor: Arc<ConnectionMonitor>,
        resolver: Arc<EndpointResolver>,
        stop: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        monitor.attach("sub");
        let prefixes = Arc::new(StdMutex::new(HashSet::from([
            SOLICITATION_PREFIX.to_vec(),
        ])));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::run(addr, monitor, resolver, prefixes.clone(), tx, stop));
        SubTransport {
            prefixes,
            rx: AsyncMutex::new(rx),
            _task: task,
        }
    }

    pub fn add_prefix(&self, prefix: Vec<u8>) {
        self.prefixes.lock().unwrap().insert(prefix);
    }

    pub fn remove_prefix(&self, prefix: &[u8]) {
        self.prefixes.lock().unwrap().remove(prefix);
    }

    /// Receive the next frame that matched a registered prefix. `None`
    /// once the transport has been shut down.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }

    async fn run(
        addr: String,
        monitor: Arc<ConnectionMonitor>,
        resolver: Arc<EndpointResolver>,
        prefixes: Arc<StdMutex<HashSet<Vec<u8>>>>,
        tx: mpsc::UnboundedSender<Vec<u8>>,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            if *stop.borrow() {
                return;
            }
            let mut framed = tokio::select! {
                biased;
                _ = stop.changed() => if *stop.borrow() { return } else { continue },
                result = connect_framed(&addr) => match result {
                    Ok(f) => {
                        monitor.report("sub", ConnectionEvent::Connected);
                        f
                    }
                    Err(e) => {
                        warn!(error = %e, "sub connect failed, retrying in 1s");
                        monitor.report("sub", ConnectionEvent::ConnectDelayed);
                        resolver.invalidate_cache();
                        tokio::select! {
                            _ = tokio::time::sleep(BASE_BACKOFF) => {}
                            _ = stop.changed() => if *stop.borrow() { return },
                        }
                        monitor.report("sub", ConnectionEvent::ConnectRetried);
                        continue;
                    }
                },
            };

            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            debug!("sub transport stopping");
                            return;
                        }
                    }
                    frame = framed.next() => match frame {
                        None => {
                            info!("sub stream closed by peer, reconnecting");
                            monitor.report("sub", ConnectionEvent::Disconnected);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "sub recv failed, reconnecting");
                            monitor.report("sub", ConnectionEvent::Disconnected);
                            break;
                        }
                        Some(Ok(bytes)) => {
                            let matched = {
                                let set = prefixes.lock().unwrap();
                                set.iter().any(|p| bytes.starts_with(p))
                            };
                            if matched && tx.send(bytes.to_vec()).is_err() {
                                debug!("sub intake channel closed, shutting down");
                                return;
                            }
                        }
                    },
                }
            }
        }
    }
}
