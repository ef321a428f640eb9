use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use vouch_types::events::{RoomCommand, RoomEvent};
use vouch_types::models::ChallengeId;

use crate::error::ClientError;

/// Room subscription over the server's `/socket` endpoint.
pub struct RoomSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RoomSocket {
    /// `base_url` is the HTTP base of the server; the scheme is switched to ws.
    pub async fn connect(base_url: &str) -> Result<Self, ClientError> {
        let ws_url = format!(
            "{}/socket",
            base_url
                .trim_end_matches('/')
                .replace("http://", "ws://")
                .replace("https://", "wss://")
        );
        let (stream, _) = connect_async(ws_url.as_str()).await?;
        debug!("Room socket connected to {}", ws_url);
        Ok(Self { stream })
    }

    pub async fn join(&mut self, challenge_id: ChallengeId) -> Result<(), ClientError> {
        self.send(&RoomCommand::JoinRoom { challenge_id }).await
    }

    pub async fn leave(&mut self, challenge_id: ChallengeId) -> Result<(), ClientError> {
        self.send(&RoomCommand::LeaveRoom { challenge_id }).await
    }

    async fn send(&mut self, command: &RoomCommand) -> Result<(), ClientError> {
        let text = serde_json::to_string(command)?;
        self.stream.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    /// Next event from a joined room. `None` once the server closes.
    pub async fn next_event(&mut self) -> Result<Option<RoomEvent>, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(text) => match serde_json::from_str::<RoomEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("Ignoring unrecognised room event: {}", e),
                },
                WsMessage::Close(_) => return Ok(None),
                // Pings are answered by tungstenite itself
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
