//! Hosted realtime service client
//!
//! Speaks the Phoenix channel protocol over a websocket. Each subscription
//! owns its own connection: it joins one channel configured for
//! `postgres_changes` inserts on a table, keeps the connection alive with a
//! heartbeat, and forwards every inserted record to the [`Subscription`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{ChangeFeed, RowChange, RowFilter, Subscription};
use crate::auth::BearerToken;
use crate::error::{JournalError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const JOIN_REF: &str = "1";

/// One Phoenix protocol frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    /// Channel topic
    pub topic: String,
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub payload: Value,
    /// Message reference used to correlate replies
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
        }
    }

    fn to_ws(&self) -> Result<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?.into()))
    }

    /// Inserted record carried by a change event, if this frame is one
    ///
    /// Accepts both the `postgres_changes` shape (`payload.data.record`) and
    /// the older `INSERT` event shape (`payload.record`).
    pub fn inserted_record(&self) -> Option<&Value> {
        match self.event.as_str() {
            "postgres_changes" => {
                let data = self.payload.get("data")?;
                let kind = data.get("type").and_then(Value::as_str).unwrap_or("INSERT");
                if kind.eq_ignore_ascii_case("INSERT") {
                    data.get("record")
                } else {
                    None
                }
            }
            "INSERT" => self.payload.get("record"),
            _ => None,
        }
    }

    fn reply_status(&self) -> Option<&str> {
        if self.event != "phx_reply" {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }
}

/// Client for the hosted realtime service
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    endpoint: Url,
    token: BearerToken,
}

impl RealtimeClient {
    /// Create a client for the project at `base_url`
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::auth::BearerToken;
    /// use voice_journal::realtime::RealtimeClient;
    ///
    /// let client = RealtimeClient::new("https://project.supabase.co", "anon", BearerToken::new()).unwrap();
    /// assert!(client.endpoint().as_str().starts_with("wss://project.supabase.co/realtime/v1/websocket"));
    /// ```
    pub fn new(base_url: &str, anon_key: &str, token: BearerToken) -> Result<Self> {
        let mut endpoint = Url::parse(base_url)
            .map_err(|e| JournalError::Config(format!("Invalid realtime url {}: {}", base_url, e)))?;
        let scheme = match endpoint.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        endpoint
            .set_scheme(scheme)
            .map_err(|_| JournalError::Config(format!("Invalid realtime url {}", base_url)))?;
        endpoint.set_path("/realtime/v1/websocket");
        endpoint
            .query_pairs_mut()
            .clear()
            .append_pair("apikey", anon_key)
            .append_pair("vsn", "1.0.0");

        Ok(Self { endpoint, token })
    }

    /// Websocket endpoint including query parameters
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn join_payload(&self, table: &str, filter: Option<&RowFilter>) -> Value {
        let mut change = json!({
            "event": "INSERT",
            "schema": "public",
            "table": table,
        });
        if let Some(filter) = filter {
            change["filter"] = json!(filter.to_filter_string());
        }
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            }
        });
        if let Some(token) = self.token.get() {
            payload["access_token"] = json!(token);
        }
        payload
    }
}

fn topic_for(table: &str, filter: Option<&RowFilter>) -> String {
    match filter {
        Some(f) => format!("realtime:public:{}:{}", table, f.to_filter_string()),
        None => format!("realtime:public:{}", table),
    }
}

fn realtime_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
    JournalError::Realtime(format!("{}: {}", context, err)).into()
}

async fn read_join_reply(ws: &mut WsStream, topic: &str) -> Result<()> {
    while let Some(message) = ws.next().await {
        let message = message.map_err(|e| realtime_error("Websocket error", e))?;
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<PhoenixFrame>(&text) else {
            continue;
        };
        if frame.topic != topic || frame.reference.as_deref() != Some(JOIN_REF) {
            continue;
        }
        match frame.reply_status() {
            Some("ok") => return Ok(()),
            Some(status) => {
                return Err(realtime_error(
                    "Channel join rejected",
                    format!("{} {}", status, frame.payload),
                ))
            }
            None => continue,
        }
    }
    Err(realtime_error("Channel join failed", "connection closed"))
}

async fn await_join(ws: &mut WsStream, topic: &str) -> Result<()> {
    tokio::time::timeout(JOIN_TIMEOUT, read_join_reply(ws, topic))
        .await
        .map_err(|_| realtime_error("Channel join failed", "timed out"))?
}

async fn run_channel(
    ws: WsStream,
    topic: String,
    table: String,
    tx: mpsc::UnboundedSender<RowChange>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let leave = PhoenixFrame::new(&topic, "phx_leave", json!({}), next_ref.to_string());
                if let Ok(frame) = leave.to_ws() {
                    let _ = ws_tx.send(frame).await;
                }
                let _ = ws_tx.close().await;
                tracing::debug!("Left realtime channel {}", topic);
                break;
            }
            _ = heartbeat.tick() => {
                let beat = PhoenixFrame::new("phoenix", "heartbeat", json!({}), next_ref.to_string());
                next_ref += 1;
                match beat.to_ws() {
                    Ok(frame) => {
                        if ws_tx.send(frame).await.is_err() {
                            tracing::warn!("Realtime heartbeat failed on {}", topic);
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Failed to encode heartbeat: {}", e),
                }
            }
            message = ws_rx.next() => {
                let Some(Ok(message)) = message else {
                    tracing::warn!("Realtime connection closed for {}", topic);
                    break;
                };
                let WsMessage::Text(text) = message else { continue };
                let frame = match serde_json::from_str::<PhoenixFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!("Ignoring malformed realtime frame: {}", e);
                        continue;
                    }
                };
                if frame.topic != topic {
                    continue;
                }
                if frame.event == "phx_error" || frame.event == "phx_close" {
                    tracing::warn!("Realtime channel {} ended: {}", topic, frame.event);
                    break;
                }
                if let Some(record) = frame.inserted_record() {
                    let change = RowChange {
                        table: table.clone(),
                        record: record.clone(),
                    };
                    if tx.send(change).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(&self, table: &str, filter: Option<RowFilter>) -> Result<Subscription> {
        let topic = topic_for(table, filter.as_ref());
        tracing::debug!("Joining realtime channel {}", topic);

        let (mut ws, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| realtime_error("Websocket connect failed", e))?;

        let join = PhoenixFrame::new(
            &topic,
            "phx_join",
            self.join_payload(table, filter.as_ref()),
            JOIN_REF.to_string(),
        );
        ws.send(join.to_ws()?)
            .await
            .map_err(|e| realtime_error("Failed to send join", e))?;
        await_join(&mut ws, &topic).await?;
        tracing::info!("Subscribed to realtime channel {}", topic);

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_channel(ws, topic, table.to_string(), tx, shutdown_rx));

        Ok(Subscription::new(rx, Some(shutdown_tx), task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_http_url() {
        let client = RealtimeClient::new("http://localhost:54321", "key", BearerToken::new()).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "ws://localhost:54321/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
    }

    #[test]
    fn test_join_payload_includes_filter_and_token() {
        let token = BearerToken::new();
        token.set(Some("jwt".to_string()));
        let client = RealtimeClient::new("https://p.supabase.co", "key", token).unwrap();
        let payload = client.join_payload("messages", Some(&RowFilter::eq("conversationId", "c1")));

        let change = &payload["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "INSERT");
        assert_eq!(change["table"], "messages");
        assert_eq!(change["filter"], "conversationId=eq.c1");
        assert_eq!(payload["access_token"], "jwt");
    }

    #[test]
    fn test_inserted_record_shapes() {
        let modern = PhoenixFrame {
            topic: "t".to_string(),
            event: "postgres_changes".to_string(),
            payload: json!({ "data": { "type": "INSERT", "record": { "id": 1 } } }),
            reference: None,
        };
        assert_eq!(modern.inserted_record(), Some(&json!({ "id": 1 })));

        let legacy = PhoenixFrame {
            topic: "t".to_string(),
            event: "INSERT".to_string(),
            payload: json!({ "record": { "id": 2 } }),
            reference: None,
        };
        assert_eq!(legacy.inserted_record(), Some(&json!({ "id": 2 })));

        let update = PhoenixFrame {
            topic: "t".to_string(),
            event: "postgres_changes".to_string(),
            payload: json!({ "data": { "type": "UPDATE", "record": { "id": 3 } } }),
            reference: None,
        };
        assert!(update.inserted_record().is_none());
    }

    #[test]
    fn test_frame_ref_field_name() {
        let frame = PhoenixFrame::new("phoenix", "heartbeat", json!({}), "7".to_string());
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["ref"], "7");
    }
}
