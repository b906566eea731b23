// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! WebSocket server for the presentation layer
//!
//! Clients receive every bus event and a fresh session snapshot on each
//! change, and drive the alert with action messages:
//!
//! ```text
//! {"type": "action", "action": "cancel" | "confirm" | "sos" | "dismiss" | "test_crash"}
//! {"type": "ping"}
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::StreamingConfig;
use crate::alert::AlertHandle;
use crate::core::EventBus;

/// User action sent by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    Cancel,
    Confirm,
    Sos,
    Dismiss,
    TestCrash,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Action { action: ClientAction },
}

struct ClientHandle {
    connected_at: DateTime<Utc>,
}

type Clients = Arc<RwLock<HashMap<String, ClientHandle>>>;

/// WebSocket server
pub struct WebSocketServer {
    bind: String,
    port: u16,
    max_clients: usize,
    clients: Clients,
    alerts: AlertHandle,
    bus: Arc<EventBus>,
}

impl WebSocketServer {
    pub fn new(config: &StreamingConfig, alerts: AlertHandle, bus: Arc<EventBus>) -> Self {
        Self {
            bind: config.websocket_bind.clone(),
            port: config.websocket_port,
            max_clients: config.websocket_max_clients,
            clients: Arc::new(RwLock::new(HashMap::new())),
            alerts,
            bus,
        }
    }

    /// Bind and serve in the background until `shutdown` fires. Returns the
    /// bound address.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        let listener = TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local);

        let clients = self.clients.clone();
        let max_clients = self.max_clients;
        let alerts = self.alerts.clone();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let client_count = clients.read().await.len();
                                if client_count >= max_clients {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                }

                                tokio::spawn(handle_connection(
                                    stream,
                                    addr,
                                    clients.clone(),
                                    alerts.clone(),
                                    bus.clone(),
                                ));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local)
    }

    pub async fn get_client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn perform(action: ClientAction, alerts: &AlertHandle) -> crate::error::Result<()> {
    match action {
        ClientAction::Cancel => alerts.cancel().await,
        ClientAction::Confirm => alerts.confirm().await,
        ClientAction::Sos => alerts.trigger_sos().await,
        ClientAction::Dismiss => alerts.dismiss().await,
        ClientAction::TestCrash => {
            alerts.crash_detected();
            Ok(())
        }
    }
}

/// Reply to one text frame from a client
pub(crate) async fn respond(text: &str, alerts: &AlertHandle) -> Value {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => json!({ "type": "pong" }),
        Ok(ClientMessage::Action { action }) => {
            let result = perform(action, alerts).await;
            let ok = result.is_ok();
            let error = result.err().map(|e| e.to_string());
            json!({ "type": "ack", "action": action, "ok": ok, "error": error })
        }
        Err(e) => json!({ "type": "error", "message": format!("invalid message: {}", e) }),
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Clients,
    alerts: AlertHandle,
    bus: Arc<EventBus>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    info!("New WebSocket connection from {} (id: {})", addr, client_id);

    {
        let mut clients = clients.write().await;
        clients.insert(client_id.clone(), ClientHandle {
            connected_at: Utc::now(),
        });
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut events = bus.subscribe_events();
    let mut session = alerts.watch();

    let welcome = json!({
        "type": "welcome",
        "client_id": client_id,
        "server": "CrashDoc",
        "version": env!("CARGO_PKG_VERSION"),
        "session": *session.borrow_and_update(),
    });

    if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
        warn!("Failed to send welcome: {}", e);
    }

    loop {
        let outgoing = tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);
                        respond(&text, &alerts).await
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => continue,
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => json!({ "type": "event", "data": event }),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged, {} events dropped", addr, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            changed = session.changed() => {
                if changed.is_err() {
                    info!("Alert controller stopped, closing {}", addr);
                    break;
                }
                let snapshot = session.borrow_and_update().clone();
                json!({ "type": "session", "data": snapshot })
            }
        };

        if let Err(e) = ws_sender.send(Message::Text(outgoing.to_string())).await {
            warn!("Failed to send to {}: {}", addr, e);
            break;
        }
    }

    let connected_for = {
        let mut clients = clients.write().await;
        clients
            .remove(&client_id)
            .map(|c| Utc::now() - c.connected_at)
    };

    info!(
        "WebSocket client {} disconnected after {}s",
        addr,
        connected_for.map(|d| d.num_seconds()).unwrap_or(0)
    );
}
