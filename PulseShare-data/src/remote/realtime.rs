use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::models::reading::SharedReadingRow;
use crate::repository::{InsertFeed, RepositoryError};

/// The server drops sockets that stay silent for longer than this
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// One frame of the Phoenix channel protocol (JSON serializer, vsn 1.0.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl ChannelMessage {
    fn topic_for(table: &str) -> String {
        format!("realtime:public:{}", table)
    }

    /// Join the table topic with an INSERT-only change filter
    pub fn join(table: &str, msg_ref: u64) -> Self {
        Self {
            topic: Self::topic_for(table),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "postgres_changes": [
                        { "event": "INSERT", "schema": "public", "table": table }
                    ]
                }
            }),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    /// Leave the table topic
    pub fn leave(table: &str, msg_ref: u64) -> Self {
        Self {
            topic: Self::topic_for(table),
            event: "phx_leave".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    /// Keep-alive frame
    pub fn heartbeat(msg_ref: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    /// Whether this is an error reply to one of our requests
    pub fn is_error_reply(&self) -> bool {
        let failed_reply =
            self.event == "phx_reply" && self.payload.get("status").and_then(Value::as_str) == Some("error");
        failed_reply || self.event == "phx_error"
    }

    /// Extract the inserted row from a change event, if this is one
    pub fn inserted_row(&self) -> Option<SharedReadingRow> {
        let record = match self.event.as_str() {
            "postgres_changes" => {
                let data = self.payload.get("data")?;
                if data.get("type").and_then(Value::as_str) != Some("INSERT") {
                    return None;
                }
                data.get("record")?
            }
            // legacy realtime servers push the row under its own event name
            "INSERT" => self.payload.get("record")?,
            _ => return None,
        };

        match serde_json::from_value::<SharedReadingRow>(record.clone()) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("Ignoring malformed shared row in change event: {}", e);
                None
            }
        }
    }

    fn into_frame(self) -> Result<Message, RepositoryError> {
        Ok(Message::Text(serde_json::to_string(&self)?))
    }
}

/// Connect to the realtime socket and stream INSERTs on `table`.
///
/// The socket is driven by a background task. It ends, closing the feed,
/// when the server goes away; it leaves the channel and closes the socket
/// when the returned receiver is dropped.
pub async fn open_insert_feed(base_url: &str, api_key: &str, table: &str) -> Result<InsertFeed, RepositoryError> {
    let endpoint = format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", base_url, api_key);
    debug!("Connecting to realtime endpoint for table {}", table);

    let (socket, _response) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| RepositoryError::Transport(format!("realtime connect failed: {}", e)))?;
    let (mut write, mut read) = socket.split();

    let mut next_ref: u64 = 1;
    write
        .send(ChannelMessage::join(table, next_ref).into_frame()?)
        .await
        .map_err(|e| RepositoryError::Transport(e.to_string()))?;
    info!("Subscribed to inserts on {}", table);

    let (tx, rx) = mpsc::unbounded_channel();
    let table = table.to_string();

    tokio::spawn(async move {
        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    debug!("Insert feed for {} released, leaving channel", table);
                    next_ref += 1;
                    if let Ok(frame) = ChannelMessage::leave(&table, next_ref).into_frame() {
                        let _ = write.send(frame).await;
                    }
                    let _ = write.close().await;
                    break;
                }
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    let sent = match ChannelMessage::heartbeat(next_ref).into_frame() {
                        Ok(frame) => write.send(frame).await.is_ok(),
                        Err(_) => false,
                    };
                    if !sent {
                        warn!("Realtime heartbeat failed, closing insert feed");
                        break;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message: ChannelMessage = match serde_json::from_str(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                debug!("Skipping unreadable realtime frame: {}", e);
                                continue;
                            }
                        };

                        if message.is_error_reply() {
                            warn!("Realtime channel error on {}: {}", table, message.payload);
                            break;
                        }

                        if let Some(row) = message.inserted_row() {
                            if tx.send(row).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {}", e);
                        break;
                    }
                }
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_requests_insert_events_only() {
        let join = ChannelMessage::join("shared_bp_readings", 1);
        let encoded = serde_json::to_value(&join).unwrap();

        assert_eq!(encoded["topic"], "realtime:public:shared_bp_readings");
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["payload"]["config"]["postgres_changes"][0]["event"], "INSERT");
    }

    #[test]
    fn test_inserted_row_from_change_event() {
        let frame = r#"{
            "topic": "realtime:public:shared_bp_readings",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "INSERT",
                    "record": {
                        "id": "r-9",
                        "systolic": 142,
                        "diastolic": 91,
                        "pulse": 88,
                        "date": "2024-05-01T07:00:00Z",
                        "notes": null,
                        "name": "kim@example.com",
                        "age": 54,
                        "gender": "female",
                        "status": "high",
                        "shared_at": "2024-05-01T07:00:02Z"
                    }
                }
            },
            "ref": null
        }"#;

        let message: ChannelMessage = serde_json::from_str(frame).unwrap();
        let row = message.inserted_row().unwrap();
        assert_eq!(row.id, "r-9");
        assert_eq!(row.age, Some(54));
        assert!(row.notes.is_none());
    }

    #[test]
    fn test_non_insert_events_are_ignored() {
        let reply = ChannelMessage {
            topic: "realtime:public:shared_bp_readings".to_string(),
            event: "phx_reply".to_string(),
            payload: json!({ "status": "ok", "response": {} }),
            msg_ref: Some("1".to_string()),
        };
        assert!(reply.inserted_row().is_none());
        assert!(!reply.is_error_reply());

        let update = ChannelMessage {
            topic: "realtime:public:shared_bp_readings".to_string(),
            event: "postgres_changes".to_string(),
            payload: json!({ "data": { "type": "UPDATE", "record": {} } }),
            msg_ref: None,
        };
        assert!(update.inserted_row().is_none());
    }

    #[test]
    fn test_error_reply_is_detected() {
        let reply = ChannelMessage {
            topic: "realtime:public:shared_bp_readings".to_string(),
            event: "phx_reply".to_string(),
            payload: json!({ "status": "error", "response": { "reason": "unmatched topic" } }),
            msg_ref: Some("1".to_string()),
        };
        assert!(reply.is_error_reply());
    }
}
