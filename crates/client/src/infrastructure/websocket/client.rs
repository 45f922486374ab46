//! Game socket tap using tokio-tungstenite.
//!
//! Read-only: inbound text frames are handed to the interceptor; nothing
//! is ever written to the socket. Reconnects with exponential backoff on
//! unexpected closes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::interceptor::Interceptor;
use super::shared::{BackoffState, ConnectionState, MAX_RETRY_ATTEMPTS};

/// WebSocket tap on the game traffic endpoint.
pub struct GameSocket {
    url: String,
    interceptor: Arc<Interceptor>,
    state: Arc<RwLock<ConnectionState>>,
    on_state_change: Arc<Mutex<Option<Box<dyn Fn(ConnectionState) + Send + Sync>>>>,
    /// Tracks whether a disconnect was requested (vs unexpected close).
    intentional_disconnect: Arc<RwLock<bool>>,
}

impl GameSocket {
    pub fn new(url: impl Into<String>, interceptor: Arc<Interceptor>) -> Self {
        Self {
            url: url.into(),
            interceptor,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            on_state_change: Arc::new(Mutex::new(None)),
            intentional_disconnect: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn set_on_state_change<F>(&self, callback: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let mut on_state_change = self.on_state_change.lock().await;
        *on_state_change = Some(Box::new(callback));
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn set_state(&self, new_state: ConnectionState) {
        {
            let mut state = self.state.write().await;
            *state = new_state;
        }
        let callback = self.on_state_change.lock().await;
        if let Some(ref cb) = *callback {
            cb(new_state);
        }
    }

    /// Internal connect logic - returns whether connection closed unexpectedly
    async fn connect_internal(&self) -> Result<bool> {
        self.set_state(ConnectionState::Connecting).await;

        match connect_async(&self.url).await {
            Ok((ws_stream, _)) => {
                tracing::info!("Attached to game socket at {}", self.url);
                self.set_state(ConnectionState::Connected).await;

                let (_write, mut read) = ws_stream.split();
                let mut unexpected_close = false;

                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            self.interceptor.handle_frame(&text).await;
                        }
                        Ok(Message::Close(_)) => {
                            tracing::info!("Game server closed connection");
                            let intentional = *self.intentional_disconnect.read().await;
                            unexpected_close = !intentional;
                            break;
                        }
                        Ok(Message::Ping(_data)) => {}
                        Err(e) => {
                            tracing::error!("WebSocket error: {}", e);
                            unexpected_close = true;
                            break;
                        }
                        _ => {}
                    }
                }

                self.set_state(ConnectionState::Disconnected).await;
                Ok(unexpected_close)
            }
            Err(e) => {
                tracing::error!("Failed to attach to game socket: {}", e);
                self.set_state(ConnectionState::Failed).await;
                Err(e.into())
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    async fn reconnect_with_backoff(&self) {
        let mut backoff = BackoffState::default();

        loop {
            self.set_state(ConnectionState::Reconnecting).await;
            let Some(delay) = backoff.next_delay_and_advance() else {
                tracing::error!("Max reconnection attempts reached, giving up");
                self.set_state(ConnectionState::Failed).await;
                return;
            };
            tracing::info!(
                "Reconnection attempt {} of {}, waiting {}ms",
                backoff.attempts(),
                MAX_RETRY_ATTEMPTS,
                delay
            );

            tokio::time::sleep(Duration::from_millis(delay)).await;

            if *self.intentional_disconnect.read().await {
                tracing::info!("Reconnection cancelled - intentional disconnect");
                self.set_state(ConnectionState::Disconnected).await;
                return;
            }

            match self.connect_internal().await {
                Ok(unexpected_close) => {
                    if unexpected_close && !*self.intentional_disconnect.read().await {
                        continue;
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!("Reconnection attempt {} failed: {}", backoff.attempts(), e);
                }
            }
        }
    }

    /// Attach and pump frames until the connection ends for good.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut flag = self.intentional_disconnect.write().await;
            *flag = false;
        }

        match self.connect_internal().await {
            Ok(unexpected_close) => {
                if unexpected_close && !*self.intentional_disconnect.read().await {
                    tracing::info!("Connection closed unexpectedly, initiating reconnection");
                    self.reconnect_with_backoff().await;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn disconnect(&self) {
        {
            let mut flag = self.intentional_disconnect.write().await;
            *flag = true;
        }
        self.set_state(ConnectionState::Disconnected).await;
    }
}
