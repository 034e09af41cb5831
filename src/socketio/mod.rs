//! Socket.IO transport for the live reading channel
//!
//! One spawned task per session owns the websocket:
//! 1. Connect to `/socket.io/?EIO=4&transport=websocket` (websocket only)
//! 2. Read the Engine.IO open packet, then join the readings namespace
//!    with `{"token": <credential>}` as the handshake auth payload
//! 3. Forward namespace events to the channel, answer pings, send emits
//! 4. Report exactly one terminal event: `ConnectError` or `Disconnected`
//!
//! Connection attempts are bounded by `connect_attempts`, each capped by the
//! handshake timeout. Nothing is retried once the namespace is joined.

pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::channel::events::{error_message, EventSink, InboundEvent, OutboundEvent};
use crate::channel::transport::{ConnectRequest, Transport, TransportHandle};
use crate::config::RealtimeConfig;
use protocol::{EnginePacket, OpenPayload, SocketPacket, SocketPacketType};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pause between failed connection attempts
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Deadline used when the server's ping window does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub const REASON_CLIENT_DISCONNECT: &str = "io client disconnect";
pub const REASON_SERVER_DISCONNECT: &str = "io server disconnect";
pub const REASON_TRANSPORT_CLOSE: &str = "transport close";
pub const REASON_TRANSPORT_ERROR: &str = "transport error";
pub const REASON_PING_TIMEOUT: &str = "ping timeout";

/// Opens Socket.IO sessions against the configured readings endpoint.
///
/// `open` spawns onto the current tokio runtime.
#[derive(Debug, Clone)]
pub struct SocketIoTransport {
    config: Arc<RealtimeConfig>,
}

impl SocketIoTransport {
    pub fn new(config: RealtimeConfig) -> Self {
        info!(
            "Realtime transport configured for {} (namespace {})",
            config.url, config.namespace
        );
        Self {
            config: Arc::new(config),
        }
    }
}

#[derive(Debug)]
enum Command {
    Emit(OutboundEvent),
    Close,
}

/// Control handle for one Socket.IO session. Dropping it closes the session.
pub struct SocketIoHandle {
    commands: mpsc::UnboundedSender<Command>,
    closed: bool,
}

impl TransportHandle for SocketIoHandle {
    fn emit(&mut self, event: OutboundEvent) {
        if self.closed {
            debug!("Session closed, dropping {:?}", event);
            return;
        }
        if self.commands.send(Command::Emit(event)).is_err() {
            debug!("Socket task finished, emit dropped");
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // the task may already be gone
        let _ = self.commands.send(Command::Close);
    }
}

impl Drop for SocketIoHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for SocketIoTransport {
    type Handle = SocketIoHandle;

    fn open(&self, request: ConnectRequest, sink: EventSink) -> SocketIoHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        tokio::spawn(run_session(config, request, sink, rx));
        SocketIoHandle {
            commands: tx,
            closed: false,
        }
    }
}

/// Why a handshake attempt failed
#[derive(Debug)]
enum HandshakeFailure {
    /// Server rejected the connection; retrying cannot help
    Refused(String),
    Transient(String),
}

async fn run_session(
    config: Arc<RealtimeConfig>,
    request: ConnectRequest,
    sink: EventSink,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let session = sink.session();
    let mut pending = Vec::new();

    let connected = tokio::select! {
        result = connect_with_attempts(&config, &request) => result,
        _ = wait_for_close(&mut commands, &mut pending) => {
            debug!("Session {} closed before connecting", session);
            return;
        }
    };

    let (mut ws, open) = match connected {
        Ok(connected) => connected,
        Err(message) => {
            warn!("Session {} failed to connect: {}", session, message);
            sink.emit(InboundEvent::ConnectError(message));
            return;
        }
    };

    info!(
        "Session {} joined {} (sid {})",
        session, config.namespace, open.sid
    );
    sink.emit(InboundEvent::Connected);

    for event in pending {
        if let Err(e) = send_event(&mut ws, &config.namespace, &event).await {
            warn!("Session {} failed to flush {:?}: {}", session, event, e);
        }
    }

    let reason = pump(&mut ws, &config.namespace, &open, &sink, &mut commands).await;
    if reason != REASON_CLIENT_DISCONNECT {
        // already closed in most cases
        let _ = ws.close(None).await;
    }

    info!("Session {} disconnected: {}", session, reason);
    sink.emit(InboundEvent::Disconnected(reason.to_string()));
}

/// Buffer emits until a close is requested (or the handle is dropped).
async fn wait_for_close(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut Vec<OutboundEvent>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Emit(event) => pending.push(event),
            Command::Close => return,
        }
    }
}

async fn connect_with_attempts(
    config: &RealtimeConfig,
    request: &ConnectRequest,
) -> Result<(WsStream, OpenPayload), String> {
    let url = config.socket_url().map_err(|e| e.to_string())?;
    let attempts = config.connect_attempts.max(1);
    let handshake_timeout = config.handshake_timeout();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        debug!(
            "Connecting to {} for device {} (attempt {}/{})",
            url, request.device_id, attempt, attempts
        );

        match timeout(
            handshake_timeout,
            handshake(&url, &config.namespace, &request.credential),
        )
        .await
        {
            Ok(Ok(connected)) => return Ok(connected),
            Ok(Err(HandshakeFailure::Refused(message))) => return Err(message),
            Ok(Err(HandshakeFailure::Transient(message))) => last_error = message,
            Err(_) => {
                last_error = format!("handshake timed out after {:?}", handshake_timeout)
            }
        }

        if attempt < attempts {
            warn!(
                "Connection attempt {}/{} failed: {}. Retrying in {:?}...",
                attempt, attempts, last_error, RETRY_DELAY
            );
            sleep(RETRY_DELAY).await;
        }
    }

    Err(last_error)
}

async fn handshake(
    url: &str,
    namespace: &str,
    credential: &str,
) -> Result<(WsStream, OpenPayload), HandshakeFailure> {
    let (mut ws, _) = connect_async(url).await.map_err(|e| match e {
        WsError::Http(response) if response.status().is_client_error() => {
            HandshakeFailure::Refused(format!("HTTP error: {}", response.status()))
        }
        other => HandshakeFailure::Transient(format!("websocket connect failed: {}", other)),
    })?;

    let open = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(open) => break open,
            other => debug!("Ignoring {:?} before open packet", other),
        }
    };

    let connect = SocketPacket::connect(namespace, Some(json!({ "token": credential })));
    ws.send(Message::Text(connect.to_frame()))
        .await
        .map_err(|e| HandshakeFailure::Transient(format!("websocket send error: {}", e)))?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Ping => {
                ws.send(Message::Text(EnginePacket::Pong.encode()))
                    .await
                    .map_err(|e| {
                        HandshakeFailure::Transient(format!("websocket send error: {}", e))
                    })?;
            }
            EnginePacket::Message(body) => {
                let packet = SocketPacket::parse(&body)
                    .map_err(|e| HandshakeFailure::Transient(e.to_string()))?;
                if packet.namespace != namespace {
                    debug!("Ignoring packet for namespace {}", packet.namespace);
                    continue;
                }
                match packet.kind {
                    SocketPacketType::Connect => return Ok((ws, open)),
                    SocketPacketType::ConnectError => {
                        return Err(HandshakeFailure::Refused(error_message(packet.data)))
                    }
                    other => debug!("Ignoring {:?} before namespace connect", other),
                }
            }
            EnginePacket::Close => {
                return Err(HandshakeFailure::Transient(
                    "server closed the connection during handshake".to_string(),
                ))
            }
            other => debug!("Ignoring {:?} during handshake", other),
        }
    }
}

/// Next Engine.IO packet during the handshake
async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, HandshakeFailure> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return EnginePacket::parse(&text)
                    .map_err(|e| HandshakeFailure::Transient(e.to_string()))
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                return Err(HandshakeFailure::Transient(format!(
                    "websocket error: {}",
                    e
                )))
            }
        }
    }
    Err(HandshakeFailure::Transient(
        "connection closed during handshake".to_string(),
    ))
}

async fn send_event(
    ws: &mut WsStream,
    namespace: &str,
    event: &OutboundEvent,
) -> anyhow::Result<()> {
    let packet = SocketPacket::event(namespace, event.name(), event.payload());
    debug!("Emitting {} on {}", event.name(), namespace);
    ws.send(Message::Text(packet.to_frame()))
        .await
        .map_err(|e| anyhow::anyhow!("WebSocket send error: {}", e))
}

/// Run a joined session until it ends; returns the disconnect reason.
async fn pump(
    ws: &mut WsStream,
    namespace: &str,
    open: &OpenPayload,
    sink: &EventSink,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> &'static str {
    let liveness = liveness_window(open);
    let deadline = sleep_until(deadline_after(liveness));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => match EnginePacket::parse(&text) {
                    Ok(EnginePacket::Ping) => {
                        deadline.as_mut().reset(deadline_after(liveness));
                        if let Err(e) = ws.send(Message::Text(EnginePacket::Pong.encode())).await {
                            warn!("Failed to answer ping: {}", e);
                            return REASON_TRANSPORT_ERROR;
                        }
                    }
                    Ok(EnginePacket::Message(body)) => match SocketPacket::parse(&body) {
                        Ok(packet) => {
                            if let Some(reason) = dispatch(packet, namespace, sink) {
                                return reason;
                            }
                        }
                        Err(e) => warn!("Failed to parse Socket.IO packet: {}", e),
                    },
                    Ok(EnginePacket::Close) => return REASON_TRANSPORT_CLOSE,
                    Ok(other) => debug!("Ignoring Engine.IO {:?}", other),
                    Err(e) => warn!("Failed to parse Engine.IO packet: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return REASON_TRANSPORT_CLOSE,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    return REASON_TRANSPORT_ERROR;
                }
            },
            _ = &mut deadline => {
                warn!("No ping from server within {:?}", liveness);
                return REASON_PING_TIMEOUT;
            }
            command = commands.recv() => match command {
                Some(Command::Emit(event)) => {
                    if let Err(e) = send_event(ws, namespace, &event).await {
                        warn!("{}", e);
                        return REASON_TRANSPORT_ERROR;
                    }
                }
                Some(Command::Close) | None => {
                    let leave = SocketPacket::disconnect(namespace).to_frame();
                    if let Err(e) = ws.send(Message::Text(leave)).await {
                        debug!("Failed to send namespace disconnect: {}", e);
                    }
                    let _ = ws.close(None).await;
                    return REASON_CLIENT_DISCONNECT;
                }
            },
        }
    }
}

/// How long the server may stay silent before the session is declared dead
fn liveness_window(open: &OpenPayload) -> Duration {
    Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout))
}

/// `liveness` from now, capped at a far-future instant when that overflows
fn deadline_after(liveness: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(liveness)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Forward one namespace packet; returns a reason when it ends the session.
fn dispatch(packet: SocketPacket, namespace: &str, sink: &EventSink) -> Option<&'static str> {
    if packet.namespace != namespace {
        debug!("Ignoring packet for namespace {}", packet.namespace);
        return None;
    }

    match packet.kind {
        SocketPacketType::Event => match packet.event_parts() {
            Some((name, payload)) => match InboundEvent::from_socket_event(&name, payload) {
                Some(event) => {
                    sink.emit(event);
                }
                None => debug!("Ignoring event {}", name),
            },
            None => warn!("Malformed event packet: {:?}", packet.data),
        },
        SocketPacketType::Disconnect => return Some(REASON_SERVER_DISCONNECT),
        SocketPacketType::ConnectError => {
            sink.emit(InboundEvent::ServerError(error_message(packet.data)));
        }
        other => debug!("Ignoring Socket.IO {:?}", other),
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::events::SessionEvent;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::StatusCode;

    type ServerWs = WebSocketStream<TcpStream>;

    const OPEN: &str =
        r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    async fn spawn_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            handler(ws).await;
        });
        format!("http://{}", addr)
    }

    /// Accept loop that counts TCP connections and hands each one to `handler`
    async fn spawn_counting_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(TcpStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handler(stream));
            }
        });
        (format!("http://{}", addr), accepted)
    }

    async fn recv_text(ws: &mut ServerWs) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("Expected text frame, got {:?}", other),
            }
        }
    }

    async fn send_text(ws: &mut ServerWs, text: &str) {
        ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// Drain until the client goes away
    async fn wait_closed(ws: &mut ServerWs) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    async fn accept_namespace(ws: &mut ServerWs) {
        accept_namespace_with(ws, OPEN).await;
    }

    async fn accept_namespace_with(ws: &mut ServerWs, open: &str) {
        send_text(ws, open).await;
        assert_eq!(
            recv_text(ws).await,
            r#"40/device-readings,{"token":"tok-abc"}"#
        );
        send_text(ws, r#"40/device-readings,{"sid":"nsp-sid"}"#).await;
    }

    fn config(url: String, connect_attempts: u32) -> RealtimeConfig {
        RealtimeConfig {
            url,
            namespace: "/device-readings".to_string(),
            handshake_timeout_ms: 2000,
            connect_attempts,
        }
    }

    fn request() -> ConnectRequest {
        ConnectRequest {
            device_id: "dev-1".to_string(),
            credential: "tok-abc".to_string(),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> InboundEvent {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed");
        assert_eq!(event.session, 1);
        event.event
    }

    #[tokio::test]
    async fn test_full_session() {
        let url = spawn_server(|mut ws| async move {
            accept_namespace(&mut ws).await;
            send_text(&mut ws, r#"42/device-readings,["authenticated",{"userId":"u-1"}]"#).await;
            assert_eq!(
                recv_text(&mut ws).await,
                r#"42/device-readings,["subscribe_device",{"deviceId":"dev-1"}]"#
            );
            send_text(&mut ws, r#"42/device-readings,["subscribed",{"deviceId":"dev-1"}]"#).await;
            send_text(&mut ws, "2").await;
            assert_eq!(recv_text(&mut ws).await, "3");
            send_text(&mut ws, r#"42/device-readings,["device_data",{"temp":22}]"#).await;
            send_text(&mut ws, "41/device-readings,").await;
            wait_closed(&mut ws).await;
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = transport.open(request(), EventSink::new(1, tx));

        assert_eq!(next_event(&mut rx).await, InboundEvent::Connected);
        assert_eq!(next_event(&mut rx).await, InboundEvent::Authenticated);
        handle.emit(OutboundEvent::SubscribeDevice {
            device_id: "dev-1".to_string(),
        });
        assert_eq!(next_event(&mut rx).await, InboundEvent::Subscribed);
        assert_eq!(
            next_event(&mut rx).await,
            InboundEvent::Data(json!({"temp": 22}))
        );
        assert_eq!(
            next_event(&mut rx).await,
            InboundEvent::Disconnected("io server disconnect".to_string())
        );
    }

    #[tokio::test]
    async fn test_refused_handshake_is_not_retried() {
        let url = spawn_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            let _connect = recv_text(&mut ws).await;
            send_text(&mut ws, r#"44/device-readings,{"message":"jwt expired"}"#).await;
            wait_closed(&mut ws).await;
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = transport.open(request(), EventSink::new(1, tx));

        assert_eq!(
            next_event(&mut rx).await,
            InboundEvent::ConnectError("jwt expired".to_string())
        );
    }

    #[tokio::test]
    async fn test_close_leaves_namespace() {
        let (left_tx, left_rx) = tokio::sync::oneshot::channel();
        let url = spawn_server(|mut ws| async move {
            accept_namespace(&mut ws).await;
            let frame = recv_text(&mut ws).await;
            let _ = left_tx.send(frame);
            wait_closed(&mut ws).await;
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = transport.open(request(), EventSink::new(1, tx));

        assert_eq!(next_event(&mut rx).await, InboundEvent::Connected);
        handle.close();

        let frame = timeout(Duration::from_secs(5), left_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, "41/device-readings,");
        assert_eq!(
            next_event(&mut rx).await,
            InboundEvent::Disconnected("io client disconnect".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = SocketIoTransport::new(config(format!("http://{}", addr), 2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = transport.open(request(), EventSink::new(1, tx));

        match next_event(&mut rx).await {
            InboundEvent::ConnectError(message) => {
                assert!(message.contains("websocket connect failed"), "{message}")
            }
            other => panic!("Expected connect error, got {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_maps_namespace_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);

        let packet = SocketPacket::parse(r#"2/device-readings,["error",{"message":"boom"}]"#).unwrap();
        assert_eq!(dispatch(packet, "/device-readings", &sink), None);
        assert_eq!(
            rx.try_recv().unwrap().event,
            InboundEvent::ServerError("boom".to_string())
        );

        let packet = SocketPacket::parse(r#"2/other,["device_data",{"temp":1}]"#).unwrap();
        assert_eq!(dispatch(packet, "/device-readings", &sink), None);
        assert!(rx.try_recv().is_err());

        let packet = SocketPacket::parse("1/device-readings,").unwrap();
        assert_eq!(
            dispatch(packet, "/device-readings", &sink),
            Some(REASON_SERVER_DISCONNECT)
        );
    }

    #[tokio::test]
    async fn test_connect_attempts_are_bounded() {
        let (url, accepted) = spawn_counting_server(|stream| async move {
            drop(stream);
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = transport.open(request(), EventSink::new(1, tx));

        assert!(matches!(
            next_event(&mut rx).await,
            InboundEvent::ConnectError(_)
        ));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_silent_handshake_times_out() {
        let url = spawn_server(|mut ws| async move {
            // never sends the open packet
            wait_closed(&mut ws).await;
        })
        .await;

        let transport = SocketIoTransport::new(RealtimeConfig {
            handshake_timeout_ms: 200,
            ..config(url, 1)
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = transport.open(request(), EventSink::new(1, tx));

        match next_event(&mut rx).await {
            InboundEvent::ConnectError(message) => {
                assert!(message.contains("handshake timed out"), "{message}")
            }
            other => panic!("Expected connect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_refusal_is_not_retried() {
        let (url, accepted) = spawn_counting_server(|stream| async move {
            let reject = |_req: &Request, _resp: Response| -> Result<Response, ErrorResponse> {
                let mut response = ErrorResponse::new(Some("invalid token".to_string()));
                *response.status_mut() = StatusCode::UNAUTHORIZED;
                Err(response)
            };
            let _ = tokio_tungstenite::accept_hdr_async(stream, reject).await;
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = transport.open(request(), EventSink::new(1, tx));

        assert_eq!(
            next_event(&mut rx).await,
            InboundEvent::ConnectError("HTTP error: 401 Unauthorized".to_string())
        );
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emits_before_connect_are_flushed() {
        let (frame_tx, frame_rx) = tokio::sync::oneshot::channel();
        let url = spawn_server(|mut ws| async move {
            accept_namespace(&mut ws).await;
            let frame = recv_text(&mut ws).await;
            let _ = frame_tx.send(frame);
            wait_closed(&mut ws).await;
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = transport.open(request(), EventSink::new(1, tx));
        handle.emit(OutboundEvent::SubscribeDevice {
            device_id: "dev-1".to_string(),
        });

        assert_eq!(next_event(&mut rx).await, InboundEvent::Connected);
        let frame = timeout(Duration::from_secs(5), frame_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            r#"42/device-readings,["subscribe_device",{"deviceId":"dev-1"}]"#
        );
        handle.close();
    }

    #[tokio::test]
    async fn test_missing_pings_end_session() {
        let url = spawn_server(|mut ws| async move {
            accept_namespace_with(
                &mut ws,
                r#"0{"sid":"test-sid","upgrades":[],"pingInterval":50,"pingTimeout":50}"#,
            )
            .await;
            wait_closed(&mut ws).await;
        })
        .await;

        let transport = SocketIoTransport::new(config(url, 1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = transport.open(request(), EventSink::new(1, tx));

        assert_eq!(next_event(&mut rx).await, InboundEvent::Connected);
        assert_eq!(
            next_event(&mut rx).await,
            InboundEvent::Disconnected("ping timeout".to_string())
        );
    }

    #[test]
    fn test_liveness_window_saturates() {
        let mut open = OpenPayload {
            sid: "test-sid".to_string(),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: None,
        };
        assert_eq!(liveness_window(&open), Duration::from_secs(45));

        open.ping_interval = u64::MAX;
        open.ping_timeout = u64::MAX;
        let liveness = liveness_window(&open);
        assert_eq!(liveness, Duration::from_millis(u64::MAX));
        assert!(deadline_after(liveness) > Instant::now());
        assert!(deadline_after(Duration::MAX) > Instant::now());
    }
}
