//! A live relay connection driving a local protocol engine.
//!
//! Every inbound text message goes through `ProtocolEngine::receive`, so the
//! CLI sees exactly the state a graphical client would. Requests are sent
//! from the engine and then awaited by watching the engine's state, since
//! structural changes only land from the relay's echo.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use layers::consts::SESSION_COOKIE;
use layers::engine::ProtocolEngine;
use layers::protocol::{self, ClientMessage, Envelope, WireMessage};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::CliError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Quiet period after which the initial state replay is considered done.
const SETTLE_IDLE: Duration = Duration::from_millis(250);

pub struct Session {
    stream: WsStream,
    engine: ProtocolEngine,
    timeout: Duration,
}

impl Session {
    /// Connect, wait for the user id, then absorb the state replay.
    pub async fn connect(url: &str, session: Option<&str>, timeout: Duration) -> Result<Self, CliError> {
        let mut request = url.into_client_request().map_err(|e| CliError::Ws(Box::new(e)))?;
        if let Some(session) = session {
            let cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={session}"))?;
            request.headers_mut().insert(header::COOKIE, cookie);
        }
        let (stream, _) = connect_async(request).await.map_err(|e| CliError::Ws(Box::new(e)))?;

        let mut this = Self { stream, engine: ProtocolEngine::default(), timeout };
        this.wait_for(|engine| engine.local_user() != 0).await?;
        this.settle().await?;
        info!(user = this.engine.local_user(), layers = this.engine.registry().len(), "cli: connected");
        Ok(this)
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ProtocolEngine {
        &mut self.engine
    }

    pub async fn send(&mut self, message: ClientMessage) -> Result<(), CliError> {
        debug!(kind = message.tag(), "cli: send");
        let text = protocol::encode(&Envelope::new(message))?;
        self.stream.send(Message::text(text)).await.map_err(|e| CliError::Ws(Box::new(e)))
    }

    /// Receive and apply one message, waiting at most `wait`. Returns
    /// `false` if nothing arrived in time.
    pub async fn pump(&mut self, wait: Duration) -> Result<bool, CliError> {
        let Ok(next) = timeout(wait, self.stream.next()).await else {
            return Ok(false);
        };
        match next {
            None | Some(Ok(Message::Close(_))) => Err(CliError::WsClosed),
            Some(Err(e)) => Err(CliError::Ws(Box::new(e))),
            Some(Ok(Message::Text(text))) => {
                self.engine.receive(text.as_str());
                if self.engine.needs_resync() {
                    let resync = self.engine.request_resync();
                    self.send(resync).await?;
                }
                Ok(true)
            }
            Some(Ok(_)) => Ok(true),
        }
    }

    /// Pump until the connection has been quiet for a moment.
    pub async fn settle(&mut self) -> Result<(), CliError> {
        while self.pump(SETTLE_IDLE).await? {}
        Ok(())
    }

    /// Pump until `done` holds for the engine, or the session timeout passes.
    pub async fn wait_for<F>(&mut self, done: F) -> Result<(), CliError>
    where
        F: Fn(&ProtocolEngine) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        while !done(&self.engine) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CliError::Timeout);
            }
            self.pump(remaining).await?;
        }
        Ok(())
    }

    /// Close the socket once queued messages are flushed.
    pub async fn close(mut self) -> Result<(), CliError> {
        self.stream.close(None).await.map_err(|e| CliError::Ws(Box::new(e)))
    }
}
