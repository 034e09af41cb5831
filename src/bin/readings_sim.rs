//! Readings Simulator
//!
//! Serves the device readings namespace over Socket.IO (websocket
//! transport) and pushes synthetic readings to subscribed clients.
//! Useful for running `garden-live watch` without real devices.
//!
//! Usage: cargo run --bin readings-sim [bind_addr] [token]

use std::env;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

const NAMESPACE: &str = "/device-readings";
const PING_INTERVAL_MS: u64 = 25_000;
const PING_TIMEOUT_MS: u64 = 20_000;
const READING_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bind: SocketAddr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:3000".to_string())
        .parse()?;
    let token = env::args().nth(2).unwrap_or_else(|| "dev-token".to_string());

    let listener = TcpListener::bind(bind).await?;

    println!("🌱 Garden Readings Simulator");
    println!("  Listening: ws://{}/socket.io/", bind);
    println!("  Namespace: {}", NAMESPACE);
    println!("  Token: {}", token);
    println!();

    loop {
        let (stream, peer) = listener.accept().await?;
        let token = token.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    println!("🔌 Client connected from {}", peer);
                    if let Err(e) = serve_client(ws, &token).await {
                        println!("   ❌ {}: {}", peer, e);
                    }
                    println!("👋 Client {} left", peer);
                }
                Err(e) => println!("❌ Websocket upgrade from {} failed: {}", peer, e),
            }
        });
    }
}

async fn serve_client(mut ws: WebSocketStream<TcpStream>, token: &str) -> anyhow::Result<()> {
    let sid = Uuid::new_v4().to_string();
    let open = json!({
        "sid": sid,
        "upgrades": [],
        "pingInterval": PING_INTERVAL_MS,
        "pingTimeout": PING_TIMEOUT_MS,
        "maxPayload": 1_000_000,
    });
    ws.send(Message::Text(format!("0{}", open))).await?;

    // Namespace connect: 40/device-readings,{"token":"..."}
    let connect = next_text(&mut ws).await?;
    let prefix = format!("40{},", NAMESPACE);
    let auth: Value = match connect.strip_prefix(&prefix) {
        Some(body) if !body.is_empty() => serde_json::from_str(body)?,
        _ => Value::Null,
    };
    if auth.get("token").and_then(Value::as_str) != Some(token) {
        println!("   🔒 Rejected credential");
        let refusal = json!({ "message": "Unauthorized: invalid or expired token" });
        ws.send(Message::Text(format!("44{},{}", NAMESPACE, refusal)))
            .await?;
        ws.close(None).await?;
        return Ok(());
    }

    ws.send(Message::Text(format!(
        "40{},{}",
        NAMESPACE,
        json!({ "sid": Uuid::new_v4().to_string() })
    )))
    .await?;
    emit(&mut ws, "authenticated", json!({ "sid": sid })).await?;
    println!("   ✅ Authenticated");

    let mut subscribed: Option<String> = None;
    let mut readings = interval(READING_INTERVAL);
    let mut pings = interval(Duration::from_millis(PING_INTERVAL_MS));
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            msg = ws.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };
                if text == "3" {
                    continue;
                }
                if text.starts_with(&format!("41{}", NAMESPACE)) {
                    println!("   ↩️  Client left namespace");
                    return Ok(());
                }
                let Some((name, payload)) = parse_event(&text) else {
                    println!("   ⚠️  Unexpected frame: {}", text);
                    continue;
                };
                let device_id = payload
                    .get("deviceId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match name.as_str() {
                    "subscribe_device" => {
                        println!("   📡 Subscribed to {}", device_id);
                        emit(&mut ws, "subscribed", json!({ "deviceId": device_id })).await?;
                        subscribed = Some(device_id);
                    }
                    "unsubscribe_device" => {
                        println!("   🔕 Unsubscribed from {}", device_id);
                        emit(&mut ws, "unsubscribed", json!({ "deviceId": device_id })).await?;
                        subscribed = None;
                    }
                    other => {
                        emit(&mut ws, "error", json!({ "message": format!("unknown event {}", other) })).await?;
                    }
                }
            }
            _ = readings.tick() => {
                if let Some(device_id) = &subscribed {
                    tick += 1;
                    emit(&mut ws, "device_data", synthetic_reading(device_id, tick)).await?;
                }
            }
            _ = pings.tick() => {
                ws.send(Message::Text("2".to_string())).await?;
            }
        }
    }
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> anyhow::Result<String> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => return Ok(text),
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(anyhow::anyhow!("client closed before namespace connect"))
}

/// `42/device-readings,["name",payload]` → (name, payload)
fn parse_event(frame: &str) -> Option<(String, Value)> {
    let body = frame.strip_prefix(&format!("42{},", NAMESPACE))?;
    let args: Vec<Value> = serde_json::from_str(body).ok()?;
    let mut args = args.into_iter();
    let name = args.next()?.as_str()?.to_string();
    Some((name, args.next().unwrap_or(Value::Null)))
}

async fn emit(ws: &mut WebSocketStream<TcpStream>, name: &str, payload: Value) -> anyhow::Result<()> {
    let frame = format!("42{},{}", NAMESPACE, json!([name, payload]));
    ws.send(Message::Text(frame)).await?;
    Ok(())
}

fn synthetic_reading(device_id: &str, tick: u64) -> Value {
    let t = tick as f64;
    json!({
        "deviceId": device_id,
        "temperature": round1(21.0 + (t * 0.35).sin() * 3.0),
        "humidity": round1(55.0 + (t * 0.2).cos() * 10.0),
        "soilMoisture": round1(40.0 - (t % 60.0) * 0.2),
        "light": (800.0 + (t * 0.1).sin() * 300.0).round() as u32,
        "recordedAt": chrono::Utc::now().to_rfc3339(),
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
