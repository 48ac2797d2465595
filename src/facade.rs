//! The user-visible surface: typed put/get/publish/ping/subscribe, request
//! correlation, and idempotent shutdown.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::monitor::{ConnectionMonitor, ConnectionStatus};
use crate::resolver::EndpointResolver;
use crate::router::{SubscriptionRouter, UpdateCallback};
use crate::telemetry::TelemetryResponder;
use crate::transport::{PushTransport, ReqTransport, SubTransport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::warn;
use xtables_protocol::{codec, validate_key, Command, Message, ValueType};

/// Result of a [`XTablesClient::ping`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingResult {
    pub success: bool,
    pub nanoseconds: i64,
}

const FAILED_PING: PingResult = PingResult {
    success: false,
    nanoseconds: -1,
};

pub struct XTablesClient {
    config: ClientConfig,
    monitor: Arc<ConnectionMonitor>,
    _resolver: Arc<EndpointResolver>,
    push: Arc<PushTransport>,
    req: Arc<ReqTransport>,
    _sub: Arc<SubTransport>,
    router: Arc<SubscriptionRouter>,
    _telemetry_task: Option<tokio::task::JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl XTablesClient {
    /// Resolve a server endpoint and bring up all three transports, the
    /// subscription router, and (unless `ghost_mode`) the telemetry
    /// responder.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let resolver = Arc::new(EndpointResolver::new(config.explicit_host.clone()));
        let host = resolver.resolve().await?;

        let monitor = Arc::new(ConnectionMonitor::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let push = Arc::new(PushTransport::spawn(
            format!("{host}:{}", config.ports.push),
            monitor.clone(),
            resolver.clone(),
            "push",
            stop_rx.clone(),
        ));
        let req = Arc::new(ReqTransport::new(
            format!("{host}:{}", config.ports.req),
            monitor.clone(),
            resolver.clone(),
        ));
        let sub = Arc::new(SubTransport::spawn(
            format!("{host}:{}", config.ports.sub),
            monitor.clone(),
            resolver.clone(),
            stop_rx.clone(),
        ));

        let (router, solicit_rx) = SubscriptionRouter::spawn(config.buffer_capacity, sub.clone());

        let telemetry_task = {
            let router = router.clone();
            TelemetryResponder::spawn(
                config.ghost_mode,
                solicit_rx,
                push.clone(),
                config.client_version.clone(),
                move || router.buffer_occupancy(),
                config.buffer_capacity,
            )
        };

        Ok(XTablesClient {
            config,
            monitor,
            _resolver: resolver,
            push,
            req,
            _sub: sub,
            router,
            _telemetry_task: telemetry_task,
            stop_tx,
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn connection_status(&self, socket_name: &str) -> ConnectionStatus {
        self.monitor.status(socket_name)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // PUT / PUBLISH
    // -----------------------------------------------------------------------

    fn enqueue(&self, command: Command, key: &str, value: Vec<u8>, r#type: ValueType) -> Result<bool, ClientError> {
        validate_key(key)?;
        let message = Message::new(command).with_key(key).with_value(value, r#type);
        Ok(self.push.send(codec::encode_message(&message)))
    }

    pub fn put_boolean(&self, key: &str, value: bool) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_bool(value), ValueType::Bool)
    }

    pub fn put_integer(&self, key: &str, value: i32) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_i32(value), ValueType::Int64)
    }

    pub fn put_long(&self, key: &str, value: i64) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_i64(value), ValueType::Int64)
    }

    pub fn put_double(&self, key: &str, value: f64) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_f64(value), ValueType::Double)
    }

    pub fn put_string(&self, key: &str, value: &str) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_string(value), ValueType::String)
    }

    pub fn put_bytes(&self, key: &str, value: Vec<u8>) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, value, ValueType::Bytes)
    }

    pub fn put_string_list(&self, key: &str, values: &[String]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Put,
            key,
            codec::encode_string_list(values),
            ValueType::StringList,
        )
    }

    pub fn put_double_list(&self, key: &str, values: &[f64]) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_double_list(values), ValueType::DoubleList)
    }

    pub fn put_integer_list(&self, key: &str, values: &[i32]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Put,
            key,
            codec::encode_integer_list(values),
            ValueType::IntegerList,
        )
    }

    pub fn put_long_list(&self, key: &str, values: &[i64]) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_long_list(values), ValueType::LongList)
    }

    pub fn put_float_list(&self, key: &str, values: &[f32]) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_float_list(values), ValueType::FloatList)
    }

    pub fn put_boolean_list(&self, key: &str, values: &[bool]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Put,
            key,
            codec::encode_boolean_list(values),
            ValueType::BooleanList,
        )
    }

    pub fn put_bytes_list(&self, key: &str, values: &[Vec<u8>]) -> Result<bool, ClientError> {
        self.enqueue(Command::Put, key, codec::encode_bytes_list(values), ValueType::BytesList)
    }

    pub fn publish_boolean(&self, key: &str, value: bool) -> Result<bool, ClientError> {
        self.enqueue(Command::Publish, key, codec::encode_bool(value), ValueType::Bool)
    }

    pub fn publish_integer(&self, key: &str, value: i32) -> Result<bool, ClientError> {
        self.enqueue(Command::Publish, key, codec::encode_i32(value), ValueType::Int64)
    }

    pub fn publish_long(&self, key: &str, value: i64) -> Result<bool, ClientError> {
        self.enqueue(Command::Publish, key, codec::encode_i64(value), ValueType::Int64)
    }

    pub fn publish_double(&self, key: &str, value: f64) -> Result<bool, ClientError> {
        self.enqueue(Command::Publish, key, codec::encode_f64(value), ValueType::Double)
    }

    pub fn publish_string(&self, key: &str, value: &str) -> Result<bool, ClientError> {
        self.enqueue(Command::Publish, key, codec::encode_string(value), ValueType::String)
    }

    pub fn publish_bytes(&self, key: &str, value: Vec<u8>) -> Result<bool, ClientError> {
        self.enqueue(Command::Publish, key, value, ValueType::Bytes)
    }

    pub fn publish_string_list(&self, key: &str, values: &[String]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_string_list(values),
            ValueType::StringList,
        )
    }

    pub fn publish_double_list(&self, key: &str, values: &[f64]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_double_list(values),
            ValueType::DoubleList,
        )
    }

    pub fn publish_integer_list(&self, key: &str, values: &[i32]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_integer_list(values),
            ValueType::IntegerList,
        )
    }

    pub fn publish_long_list(&self, key: &str, values: &[i64]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_long_list(values),
            ValueType::LongList,
        )
    }

    pub fn publish_float_list(&self, key: &str, values: &[f32]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_float_list(values),
            ValueType::FloatList,
        )
    }

    pub fn publish_boolean_list(&self, key: &str, values: &[bool]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_boolean_list(values),
            ValueType::BooleanList,
        )
    }

    pub fn publish_bytes_list(&self, key: &str, values: &[Vec<u8>]) -> Result<bool, ClientError> {
        self.enqueue(
            Command::Publish,
            key,
            codec::encode_bytes_list(values),
            ValueType::BytesList,
        )
    }

    // -----------------------------------------------------------------------
    // GET
    // -----------------------------------------------------------------------

    async fn get_reply(&self, key: &str) -> Result<Option<Message>, ClientError> {
        validate_key(key)?;
        let request = Message::new(Command::Get).with_id(self.next_id()).with_key(key);
        match self.req.request(codec::encode_message(&request)).await {
            Ok(bytes) => Ok(decode_reply(&bytes)),
            // Any transport error triggers the Req reconnect internally
            // (the connection is dropped); the caller sees "not present".
            Err(_) => Ok(None),
        }
    }

    pub async fn get_boolean(&self, key: &str) -> Result<Option<bool>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::Bool, Some(value)) => Ok(Some(codec::decode_bool(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::Bool,
                actual,
            }),
        }
    }

    pub async fn get_integer(&self, key: &str) -> Result<Option<i32>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::Int64, Some(value)) if value.len() == 4 => {
                Ok(Some(codec::decode_i32(&value)?))
            }
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::Int64,
                actual,
            }),
        }
    }

    pub async fn get_long(&self, key: &str) -> Result<Option<i64>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::Int64, Some(value)) if value.len() == 8 => {
                Ok(Some(codec::decode_i64(&value)?))
            }
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::Int64,
                actual,
            }),
        }
    }

    pub async fn get_double(&self, key: &str) -> Result<Option<f64>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::Double, Some(value)) => Ok(Some(codec::decode_f64(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::Double,
                actual,
            }),
        }
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::String, Some(value)) => Ok(Some(codec::decode_string(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::String,
                actual,
            }),
        }
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::Bytes, Some(value)) => Ok(Some(value)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::Bytes,
                actual,
            }),
        }
    }

    pub async fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::StringList, Some(value)) => Ok(Some(codec::decode_string_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::StringList,
                actual,
            }),
        }
    }

    pub async fn get_double_list(&self, key: &str) -> Result<Option<Vec<f64>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::DoubleList, Some(value)) => Ok(Some(codec::decode_double_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::DoubleList,
                actual,
            }),
        }
    }

    pub async fn get_integer_list(&self, key: &str) -> Result<Option<Vec<i32>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::IntegerList, Some(value)) => Ok(Some(codec::decode_integer_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::IntegerList,
                actual,
            }),
        }
    }

    pub async fn get_long_list(&self, key: &str) -> Result<Option<Vec<i64>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::LongList, Some(value)) => Ok(Some(codec::decode_long_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::LongList,
                actual,
            }),
        }
    }

    pub async fn get_float_list(&self, key: &str) -> Result<Option<Vec<f32>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::FloatList, Some(value)) => Ok(Some(codec::decode_float_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::FloatList,
                actual,
            }),
        }
    }

    pub async fn get_boolean_list(&self, key: &str) -> Result<Option<Vec<bool>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::BooleanList, Some(value)) => Ok(Some(codec::decode_boolean_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::BooleanList,
                actual,
            }),
        }
    }

    pub async fn get_bytes_list(&self, key: &str) -> Result<Option<Vec<Vec<u8>>>, ClientError> {
        let Some(reply) = self.get_reply(key).await? else {
            return Ok(None);
        };
        match (reply.r#type, reply.value) {
            (ValueType::BytesList, Some(value)) => Ok(Some(codec::decode_bytes_list(&value)?)),
            (ValueType::Unknown, _) | (_, None) => Ok(None),
            (actual, _) => Err(ClientError::TypeMismatch {
                expected: ValueType::BytesList,
                actual,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Request/response without a typed interpreter
    // -----------------------------------------------------------------------

    pub async fn ping(&self) -> PingResult {
        let request = Message::new(Command::Ping).with_id(self.next_id());
        let start = Instant::now();
        match self.req.request(codec::encode_message(&request)).await {
            Ok(_) => PingResult {
                success: true,
                nanoseconds: start.elapsed().as_nanos() as i64,
            },
            Err(_) => FAILED_PING,
        }
    }

    pub async fn get_tables(&self) -> Result<Option<Vec<String>>, ClientError> {
        let request = Message::new(Command::GetTables).with_id(self.next_id());
        match self.req.request(codec::encode_message(&request)).await {
            Ok(bytes) => Ok(decode_reply(&bytes)
                .and_then(|m| m.value)
                .and_then(|v| codec::decode_string_list(&v).ok())),
            Err(_) => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool, ClientError> {
        validate_key(key)?;
        let request = Message::new(Command::Delete)
            .with_id(self.next_id())
            .with_key(key);
        Ok(self.req.request(codec::encode_message(&request)).await.is_ok())
    }

    pub async fn debug(&self, payload: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError> {
        let request = Message::new(Command::Debug)
            .with_id(self.next_id())
            .with_value(payload, ValueType::Bytes);
        match self.req.request(codec::encode_message(&request)).await {
            Ok(bytes) => Ok(decode_reply(&bytes).and_then(|m| m.value)),
            Err(_) => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Subscribe / unsubscribe
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, key: &str, callback: UpdateCallback) -> Result<bool, ClientError> {
        if !key.is_empty() {
            validate_key(key)?;
        }
        self.router.subscribe(key, callback);
        Ok(true)
    }

    pub fn unsubscribe(&self, key: &str, callback: &UpdateCallback) -> bool {
        self.router.unsubscribe(key, callback);
        true
    }

    pub fn subscribe_log(&self, consumer: crate::router::LogCallback) {
        self.router.subscribe_log(consumer);
    }

    pub fn buffer_occupancy(&self) -> usize {
        self.router.buffer_occupancy()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Signal all threads to stop, close transports, tear down the
    /// monitor. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.router.shutdown();
        let _ = self.stop_tx.send(true);
        self.monitor.detach("push");
        self.monitor.detach("req");
        self.monitor.detach("sub");
    }
}

fn decode_reply(bytes: &[u8]) -> Option<Message> {
    match codec::decode_message(bytes) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "discarding unparseable reply");
            None
        }
    }
}
