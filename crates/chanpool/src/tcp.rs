//! Newline-delimited JSON transport over TCP.
//!
//! Each frame is one JSON object on its own line. Requests carry an `id`
//! that the response echoes back, which lets a single connection carry many
//! calls at once:
//!
//! ```text
//! -> {"id":7,"method":"/chat.ChatService/SayHello","params":{"body":"hi"}}
//! <- {"id":7,"result":{"body":"hello"}}
//! <- {"id":8,"error":"unknown method"}
//! ```

use async_trait::async_trait;
use chanpool_core::{ConnectivityState, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::connection::duration_millis;
use crate::transport::{Channel, DialOptions, Dialer};

/// Maximum frame size (10MB)
const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

type FrameSink = SplitSink<Framed<TcpStream, LinesCodec>, String>;
type FrameStream = SplitStream<Framed<TcpStream, LinesCodec>>;
type ResponseSender = oneshot::Sender<Result<Value, TransportError>>;
type PendingCalls = Arc<Mutex<Pending>>;

/// Calls waiting for a response.
///
/// Once shut, no call can register, so a waiter is either answered or failed.
#[derive(Default)]
struct Pending {
    shut: bool,
    calls: HashMap<u64, ResponseSender>,
}

impl Pending {
    /// Registers a waiter. Returns false if the channel already shut.
    fn register(&mut self, id: u64, tx: ResponseSender) -> bool {
        if self.shut {
            return false;
        }
        self.calls.insert(id, tx);
        true
    }

    fn take(&mut self, id: u64) -> Option<ResponseSender> {
        self.calls.remove(&id)
    }

    /// Fails every waiter and refuses new ones.
    fn shut(&mut self, reason: &str) {
        self.shut = true;
        for (_, tx) in self.calls.drain() {
            let _ = tx.send(Err(TransportError::closed(reason)));
        }
    }
}

/// Request frame sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Response frame sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    fn into_result(self) -> Result<Value, TransportError> {
        match self.error {
            Some(message) => Err(TransportError::remote(message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Dials [`TcpChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    #[instrument(skip(self, options))]
    async fn dial(
        &self,
        target: &str,
        options: &DialOptions,
    ) -> Result<Arc<dyn Channel>, TransportError> {
        let stream = timeout(options.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                target: target.to_string(),
                timeout_ms: duration_millis(options.connect_timeout),
            })?
            .map_err(|e| TransportError::connect_failed(target, e.to_string()))?;

        configure_socket(&stream, options)?;

        let channel = TcpChannel::from_stream(target, stream, options.client_id.clone());
        debug!(channel_id = %channel.id, "TCP channel established");

        Ok(Arc::new(channel))
    }
}

fn configure_socket(stream: &TcpStream, options: &DialOptions) -> Result<(), TransportError> {
    stream.set_nodelay(options.nodelay)?;

    if let Some(interval) = options.keepalive {
        let keepalive = socket2::TcpKeepalive::new().with_time(interval);
        socket2::SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

/// A multiplexed RPC channel over one TCP connection.
pub struct TcpChannel {
    id: Uuid,
    target: String,
    client_id: Option<String>,
    state: Arc<RwLock<ConnectivityState>>,
    sink: tokio::sync::Mutex<FrameSink>,
    pending: PendingCalls,
    next_call_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TcpChannel {
    /// Wraps an already connected stream and starts its reader task.
    pub fn from_stream(target: &str, stream: TcpStream, client_id: Option<String>) -> Self {
        let id = Uuid::new_v4();
        let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_SIZE));
        let (sink, frames) = framed.split();

        let state = Arc::new(RwLock::new(ConnectivityState::Ready));
        let pending: PendingCalls = Arc::new(Mutex::new(Pending::default()));

        let reader = tokio::spawn(read_responses(
            id,
            frames,
            Arc::clone(&pending),
            Arc::clone(&state),
        ));

        Self {
            id,
            target: target.to_string(),
            client_id,
            state,
            sink: tokio::sync::Mutex::new(sink),
            pending,
            next_call_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Target this channel is connected to.
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Removes a pending call when the caller stops waiting for it.
struct PendingCall<'a> {
    pending: &'a PendingCalls,
    id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.pending.lock().take(self.id);
    }
}

#[async_trait]
impl Channel for TcpChannel {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn invoke(&self, method: &str, request: Value) -> Result<Value, TransportError> {
        let state = self.state();
        if !state.is_ready() {
            return Err(TransportError::Unavailable {
                state: state.to_string(),
            });
        }

        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            id,
            method: method.to_string(),
            params: request,
            client_id: self.client_id.clone(),
        };
        let line =
            serde_json::to_string(&frame).map_err(|e| TransportError::protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let registered = self.pending.lock().register(id, tx);
        if !registered {
            return Err(TransportError::Unavailable {
                state: self.state().to_string(),
            });
        }
        let _call = PendingCall {
            pending: &self.pending,
            id,
        };

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(line).await {
                warn!(channel_id = %self.id, error = %e, "Failed to write request frame");
                *self.state.write() = ConnectivityState::TransientFailure;
                return Err(TransportError::Io {
                    message: e.to_string(),
                });
            }
        }

        rx.await
            .map_err(|_| TransportError::closed("connection dropped before the response arrived"))?
    }

    fn state(&self) -> ConnectivityState {
        *self.state.read()
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.state.write() = ConnectivityState::Shutdown;

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.pending.lock().shut("channel shut down");

        let mut sink = self.sink.lock().await;
        sink.close().await.map_err(|e| TransportError::Io {
            message: e.to_string(),
        })?;

        debug!(channel_id = %self.id, addr = %self.target, "TCP channel closed");
        Ok(())
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

async fn read_responses(
    channel_id: Uuid,
    mut frames: FrameStream,
    pending: PendingCalls,
    state: Arc<RwLock<ConnectivityState>>,
) {
    while let Some(line) = frames.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "Failed to read response frame");
                break;
            }
        };

        match serde_json::from_str::<ResponseFrame>(&line) {
            Ok(frame) => {
                let waiter = pending.lock().take(frame.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(frame.into_result());
                    }
                    None => {
                        debug!(channel_id = %channel_id, call_id = frame.id, "Response for abandoned call")
                    }
                }
            }
            Err(e) => warn!(channel_id = %channel_id, error = %e, "Malformed response frame"),
        }
    }

    {
        let mut state = state.write();
        if *state != ConnectivityState::Shutdown {
            *state = ConnectivityState::TransientFailure;
        }
    }

    pending.lock().shut("connection lost");

    debug!(channel_id = %channel_id, "Response reader stopped");
}

/// A call received by [`serve`].
#[derive(Debug, Clone)]
pub struct ServerCall {
    /// Sequence number of the accepted connection the call arrived on
    pub connection: u64,
    /// Address of the caller
    pub peer: SocketAddr,
    /// Method name
    pub method: String,
    /// Request payload
    pub params: Value,
    /// Client id, if the caller sent one
    pub client_id: Option<String>,
}

/// Serves newline-delimited JSON calls on `listener` until the task is dropped.
///
/// Connections are numbered in accept order starting at 0. Calls on a single
/// connection are answered in order.
pub async fn serve<H, Fut>(listener: TcpListener, handler: H) -> Result<(), TransportError>
where
    H: Fn(ServerCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    let handler = Arc::new(handler);
    let mut next_connection = 0u64;

    info!(addr = ?listener.local_addr().ok(), "RPC server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let connection = next_connection;
        next_connection += 1;

        debug!(connection, peer = %peer, "Accepted connection");

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_SIZE));

            while let Some(line) = framed.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(connection, error = %e, "Failed to read request frame");
                        break;
                    }
                };

                let request: RequestFrame = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(connection, error = %e, "Malformed request frame");
                        continue;
                    }
                };

                let id = request.id;
                let call = ServerCall {
                    connection,
                    peer,
                    method: request.method,
                    params: request.params,
                    client_id: request.client_id,
                };

                let response = match handler(call).await {
                    Ok(result) => ResponseFrame {
                        id,
                        result: Some(result),
                        error: None,
                    },
                    Err(error) => ResponseFrame {
                        id,
                        result: None,
                        error: Some(error),
                    },
                };

                let line = match serde_json::to_string(&response) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(connection, error = %e, "Failed to encode response frame");
                        continue;
                    }
                };

                if let Err(e) = framed.send(line).await {
                    warn!(connection, error = %e, "Failed to write response frame");
                    break;
                }
            }

            debug!(connection, "Connection closed");
        });
    }
}
