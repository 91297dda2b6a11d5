//! WebSocket Connector
//!
//! Owns the life of one chart data connection: endpoint fallback,
//! handshake, authentication, and the background read task that echoes
//! keepalives and fans events out through the dispatch hub.
//!
//! The returned [`Connection`] is the crate's [`ChartGateway`]
//! implementation. Closing it (or losing the socket) clears the hub, so
//! every orchestrator blocked on events wakes and reports a connection
//! error instead of hanging.

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::ChartGateway;
use crate::error::ClientError;
use crate::infrastructure::dispatch::{DispatchHub, EventSubscription};
use crate::infrastructure::tradingview::auth::{SessionCredentials, resolve_auth_token};
use crate::infrastructure::tradingview::codec::FrameCodec;
use crate::infrastructure::tradingview::endpoints::EndpointSelector;
use crate::infrastructure::tradingview::messages::Frame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Origin the chart servers expect on the upgrade request.
const ORIGIN: &str = "https://www.tradingview.com";

/// Default budget for opening a socket and completing the handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static CRYPTO_INIT: Once = Once::new();

/// Pin the process-wide TLS crypto provider. Installing twice is fine;
/// only the first call wins.
fn init_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// =============================================================================
// Options
// =============================================================================

/// How to establish a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Browser session cookies; `None` connects anonymously.
    pub credentials: Option<SessionCredentials>,
    /// Endpoint choice and fallback behavior.
    pub endpoint: EndpointSelector,
    /// Budget per endpoint for socket open plus handshake.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            endpoint: EndpointSelector::Default,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One live, authenticated chart data connection.
pub struct Connection {
    write: Arc<Mutex<WsSink>>,
    hub: Arc<DispatchHub>,
    cancel: CancellationToken,
    read_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Connection {
    /// Establish a connection per `options`.
    ///
    /// Endpoints are tried in selector order, each under the connect
    /// timeout covering both the socket open and the server handshake.
    /// The first endpoint that completes its handshake wins; the
    /// connection is then authenticated and its read task started.
    ///
    /// # Errors
    ///
    /// Returns the last endpoint's [`ClientError::Connection`] or
    /// [`ClientError::Timeout`] once every candidate has failed.
    pub async fn connect(options: ConnectOptions) -> Result<Self, ClientError> {
        init_crypto();
        let token = resolve_auth_token(options.credentials.as_ref()).await;

        let mut last_error =
            ClientError::Connection("no endpoint candidates to try".into());
        for url in options.endpoint.candidates() {
            debug!(%url, "attempting endpoint");
            match tokio::time::timeout(options.connect_timeout, establish(&url)).await {
                Ok(Ok(stream)) => {
                    info!(%url, "connected");
                    return Self::start(stream, &token).await;
                }
                Ok(Err(err)) => {
                    warn!(%url, %err, "endpoint failed");
                    last_error = err;
                }
                Err(_) => {
                    warn!(%url, "endpoint timed out");
                    last_error = ClientError::Timeout(format!(
                        "no handshake from {url} within {:?}",
                        options.connect_timeout
                    ));
                }
            }
        }
        Err(last_error)
    }

    /// Authenticate a freshly handshaken stream and start its read task.
    async fn start(stream: WsStream, token: &str) -> Result<Self, ClientError> {
        let (write, read) = stream.split();
        let write = Arc::new(Mutex::new(write));
        let hub = Arc::new(DispatchHub::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(read_loop(
            read,
            Arc::clone(&write),
            Arc::clone(&hub),
            cancel.clone(),
        ));
        let connection = Self {
            write,
            hub,
            cancel,
            read_task: Mutex::new(Some(handle)),
        };
        connection
            .send("set_auth_token", vec![Value::String(token.to_string())])
            .await?;
        Ok(connection)
    }

    /// Issue one protocol command.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] when the connection is closed
    /// or the socket write fails.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Connection("connection is closed".into()));
        }
        let encoded = FrameCodec::encode(method, &params);
        self.write
            .lock()
            .await
            .send(Message::Text(encoded.into()))
            .await
            .map_err(|err| ClientError::Connection(format!("socket write: {err}")))
    }

    /// Open an independent subscription over all inbound events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        Arc::clone(&self.hub).subscribe()
    }

    /// Close the connection. Idempotent; ends every open subscription and
    /// resolves only after the read task has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] when the close frame cannot be
    /// written to the socket.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();
        self.hub.clear();
        let sent = self.write.lock().await.send(Message::Close(None)).await;
        if let Some(handle) = self.read_task.lock().await.take() {
            handle
                .await
                .map_err(|err| ClientError::Connection(format!("read task join: {err}")))?;
        }
        sent.map_err(|err| ClientError::Connection(format!("close frame: {err}")))
    }

    /// Whether the connection has been closed or lost.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection is closed or lost.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

#[async_trait]
impl ChartGateway for Connection {
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        Self::send(self, method, params).await
    }

    fn subscribe(&self) -> EventSubscription {
        Self::subscribe(self)
    }
}

// =============================================================================
// Socket Plumbing
// =============================================================================

/// Open the socket and drive it to the server handshake.
///
/// Keepalives arriving before the handshake are echoed; any other
/// pre-handshake frame is ignored.
async fn establish(url: &str) -> Result<WsStream, ClientError> {
    let mut request = url
        .into_client_request()
        .map_err(|err| ClientError::Connection(format!("bad endpoint url: {err}")))?;
    request.headers_mut().insert(
        "Origin",
        ORIGIN
            .parse()
            .map_err(|_| ClientError::Connection("invalid origin header".into()))?,
    );

    let (mut stream, _) = connect_async(request)
        .await
        .map_err(|err| ClientError::Connection(format!("websocket open: {err}")))?;

    let codec = FrameCodec::new();
    loop {
        let message = stream
            .next()
            .await
            .ok_or_else(|| ClientError::Connection("socket closed before handshake".into()))?
            .map_err(|err| ClientError::Connection(format!("socket read: {err}")))?;

        let Message::Text(text) = message else {
            continue;
        };
        for frame in codec.decode(text.as_str())? {
            match frame {
                Frame::Handshake(handshake) => {
                    debug!(session_id = %handshake.session_id, "handshake complete");
                    return Ok(stream);
                }
                Frame::Keepalive(payload) => {
                    stream
                        .send(Message::Text(FrameCodec::wrap(&payload).into()))
                        .await
                        .map_err(|err| {
                            ClientError::Connection(format!("keepalive echo: {err}"))
                        })?;
                }
                Frame::Event(event) => {
                    debug!(name = %event.name, "event before handshake ignored");
                }
            }
        }
    }
}

/// Background task: pump inbound messages until cancellation or socket
/// loss, echoing keepalives and dispatching events.
async fn read_loop(
    mut read: SplitStream<WsStream>,
    write: Arc<Mutex<WsSink>>,
    hub: Arc<DispatchHub>,
    cancel: CancellationToken,
) {
    let codec = FrameCodec::new();
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = read.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => match codec.decode(text.as_str()) {
                Ok(frames) => {
                    for frame in frames {
                        handle_frame(frame, &write, &hub).await;
                    }
                }
                Err(err) => warn!(%err, "undecodable message dropped"),
            },
            Some(Ok(Message::Ping(payload))) => {
                let _ = write.lock().await.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                info!("server closed the connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(%err, "socket error, closing");
                break;
            }
        }
    }

    cancel.cancel();
    hub.clear();
}

async fn handle_frame(frame: Frame, write: &Arc<Mutex<WsSink>>, hub: &Arc<DispatchHub>) {
    match frame {
        Frame::Keepalive(payload) => {
            let echo = Message::Text(FrameCodec::wrap(&payload).into());
            if let Err(err) = write.lock().await.send(echo).await {
                warn!(%err, "keepalive echo failed");
            }
        }
        Frame::Event(event) => hub.dispatch(&event),
        // Only the first handshake matters; a repeat is noise.
        Frame::Handshake(handshake) => {
            debug!(session_id = %handshake.session_id, "unexpected mid-stream handshake");
        }
    }
}
