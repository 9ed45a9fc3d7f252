use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Result, TelemetryError};

/// Write half of a telemetry link.
#[async_trait]
pub trait LinkSender: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a normal-closure frame.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a telemetry link.
#[async_trait]
pub trait LinkReceiver: Send {
    /// Next inbound text, or `None` once the remote end has closed.
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// Dials telemetry links.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(Box<dyn LinkSender>, Box<dyn LinkReceiver>)>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket link over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

struct WsSender {
    sink: SplitSink<WsStream, Message>,
}

struct WsReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl LinkConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(Box<dyn LinkSender>, Box<dyn LinkReceiver>)> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| TelemetryError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        debug!(url, status = %response.status(), "websocket handshake complete");
        let (sink, stream) = ws.split();
        Ok((Box::new(WsSender { sink }), Box::new(WsReceiver { stream })))
    }
}

#[async_trait]
impl LinkSender for WsSender {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TelemetryError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TelemetryError::Send(e.to_string()))
    }
}

#[async_trait]
impl LinkReceiver for WsReceiver {
    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TelemetryError::Receive(e.to_string())),
            }
        }
    }
}
