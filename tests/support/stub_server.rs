//! A minimal in-process stand-in for an XTables server, modeled on
//! `rt-test-utils::mock_ws_server`: bind three listeners on random ports,
//! answer Get/Ping/Delete/GetTables/Debug requests from an in-memory table,
//! and let the test push Update frames to connected Sub clients at will.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use xtables_protocol::{codec, Command, Message, Update, ValueType};

type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqMode {
    /// Answer from the in-memory table, as a real server would.
    Normal,
    /// Read the request and never write a reply — used to force a client
    /// timeout.
    NeverReply,
}

pub struct StubServer {
    pub push_addr: SocketAddr,
    pub req_addr: SocketAddr,
    pub sub_addr: SocketAddr,
    table: Arc<StdMutex<HashMap<String, (Vec<u8>, ValueType)>>>,
    push_frames: Arc<StdMutex<Vec<Message>>>,
    req_mode: Arc<StdMutex<ReqMode>>,
    sub_tx: broadcast::Sender<Vec<u8>>,
    _push_task: tokio::task::JoinHandle<()>,
    _req_task: tokio::task::JoinHandle<()>,
    _sub_task: tokio::task::JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let push_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let req_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let push_addr = push_listener.local_addr().unwrap();
        let req_addr = req_listener.local_addr().unwrap();
        let sub_addr = sub_listener.local_addr().unwrap();

        let table = Arc::new(StdMutex::new(HashMap::new()));
        let push_frames = Arc::new(StdMutex::new(Vec::new()));
        let req_mode = Arc::new(StdMutex::new(ReqMode::Normal));
        let (sub_tx, _) = broadcast::channel(1024);

        let push_task = {
            let table = table.clone();
            let push_frames = push_frames.clone();
            tokio::spawn(Self::push_accept_loop(push_listener, table, push_frames))
        };
        let req_task = {
            let table = table.clone();
            let req_mode = req_mode.clone();
            tokio::spawn(Self::req_accept_loop(req_listener, table, req_mode))
        };
        let sub_task = {
            let sub_tx = sub_tx.clone();
            tokio::spawn(Self::sub_accept_loop(sub_listener, sub_tx))
        };

        StubServer {
            push_addr,
            req_addr,
            sub_addr,
            table,
            push_frames,
            req_mode,
            sub_tx,
            _push_task: push_task,
            _req_task: req_task,
            _sub_task: sub_task,
        }
    }

    pub fn set_never_reply(&self, never: bool) {
        *self.req_mode.lock().unwrap() = if never {
            ReqMode::NeverReply
        } else {
            ReqMode::Normal
        };
    }

    /// Prepopulate the table directly, bypassing the Push transport.
    pub fn seed(&self, key: &str, value: Vec<u8>, value_type: ValueType) {
        self.table
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, value_type));
    }

    /// Snapshot every Message decoded off the Push listener so far (PUTs
    /// and telemetry replies alike).
    pub fn push_frames(&self) -> Vec<Message> {
        self.push_frames.lock().unwrap().clone()
    }

    /// Deliver `update` to every currently-connected Sub client.
    pub fn broadcast_update(&self, update: &Update) {
        let _ = self.sub_tx.send(codec::encode_update(update));
    }

    async fn push_accept_loop(
        listener: TcpListener,
        table: Arc<StdMutex<HashMap<String, (Vec<u8>, ValueType)>>>,
        frames: Arc<StdMutex<Vec<Message>>>,
    ) {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let table = table.clone();
            let frames = frames.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                while let Some(Ok(bytes)) = framed.next().await {
                    let Ok(message) = codec::decode_message(&bytes) else {
                        continue;
                    };
                    if message.command == Command::Put {
                        if let (Some(key), Some(value)) = (&message.key, &message.value) {
                            table
                                .lock()
                                .unwrap()
                                .insert(key.clone(), (value.clone(), message.r#type));
                        }
                    }
                    frames.lock().unwrap().push(message);
                }
            });
        }
    }

    async fn req_accept_loop(
        listener: TcpListener,
        table: Arc<StdMutex<HashMap<String, (Vec<u8>, ValueType)>>>,
        req_mode: Arc<StdMutex<ReqMode>>,
    ) {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let table = table.clone();
            let req_mode = req_mode.clone();
            tokio::spawn(async move {
                let mut framed: FramedStream = Framed::new(stream, LengthDelimitedCodec::new());
                while let Some(Ok(bytes)) = framed.next().await {
                    let Ok(request) = codec::decode_message(&bytes) else {
                        continue;
                    };
                    if *req_mode.lock().unwrap() == ReqMode::NeverReply {
                        // Simulate a server that accepted the request but
                        // never answers: sleep past any sane test timeout
                        // without writing anything.
                        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                        continue;
                    }
                    let reply = Self::build_reply(&request, &table);
                    if framed.send(Bytes::from(codec::encode_message(&reply))).await.is_err() {
                        return;
                    }
                }
            });
        }
    }

    fn build_reply(
        request: &Message,
        table: &Arc<StdMutex<HashMap<String, (Vec<u8>, ValueType)>>>,
    ) -> Message {
        let id = request.id.unwrap_or(0);
        match request.command {
            Command::Get => {
                let found = request
                    .key
                    .as_ref()
                    .and_then(|key| table.lock().unwrap().get(key).cloned());
                match found {
                    Some((value, value_type)) => {
                        Message::new(Command::Get).with_id(id).with_value(value, value_type)
                    }
                    None => Message::new(Command::Get).with_id(id),
                }
            }
            Command::Delete => {
                if let Some(key) = &request.key {
                    table.lock().unwrap().remove(key);
                }
                Message::new(Command::Delete).with_id(id)
            }
            Command::GetTables => {
                let keys: Vec<String> = table.lock().unwrap().keys().cloned().collect();
                Message::new(Command::GetTables)
                    .with_id(id)
                    .with_value(codec::encode_string_list(&keys), ValueType::StringList)
            }
            Command::Debug => {
                let echoed = request.value.clone().unwrap_or_default();
                Message::new(Command::Debug)
                    .with_id(id)
                    .with_value(echoed, ValueType::Bytes)
            }
            _ => Message::new(request.command).with_id(id),
        }
    }

    async fn sub_accept_loop(listener: TcpListener, sub_tx: broadcast::Sender<Vec<u8>>) {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut rx = sub_tx.subscribe();
            tokio::spawn(async move {
                let mut framed: FramedStream = Framed::new(stream, LengthDelimitedCodec::new());
                loop {
                    tokio::select! {
                        biased;
                        frame = rx.recv() => match frame {
                            Ok(bytes) => {
                                if framed.send(Bytes::from(bytes)).await.is_err() {
                                    return;
                                }
                            }
                            Err(_) => return,
                        },
                        closed = framed.next() => {
                            if closed.is_none() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    }
}
