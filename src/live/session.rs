use super::protocol::{ClientMessage, ServerContent, ServerMessage, SetupMessage};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// Time allowed for the writer to flush its close frame during teardown
const CLOSE_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Events surfaced by a live session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Setup confirmed by the remote side; safe to start sending audio
    Open,
    /// One streamed content message
    Content(ServerContent),
    /// Remote side closed the session
    Closed,
    /// Transport failure
    Error(String),
}

/// Bidirectional speech session
///
/// Implementations:
/// - WebSocket: the hosted speech-to-speech endpoint
/// - scripted: caller-fed events (tests)
#[async_trait::async_trait]
pub trait LiveSession: Send {
    /// Queue an outbound message (fire-and-forget; a full queue drops)
    fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Next inbound event; None once the session has fully drained
    async fn next_event(&mut self) -> Option<SessionEvent>;

    /// Close the session handle; idempotent
    async fn close(&mut self) -> Result<()>;
}

/// Live session over a WebSocket
///
/// The socket splits into a writer task (setup frame first, then queued
/// outbound messages) and a reader task (text and binary frames parsed as
/// JSON, close and transport errors mapped to terminal events).
pub struct WsLiveSession {
    outbound_tx: Option<mpsc::Sender<ClientMessage>>,
    event_rx: mpsc::Receiver<SessionEvent>,
    writer_handle: JoinHandle<()>,
    reader_handle: JoinHandle<()>,
}

impl WsLiveSession {
    pub async fn connect(endpoint: &str, api_key: &str, setup: SetupMessage) -> Result<Self> {
        // The key rides in the query string; never log the full URL
        let url = if endpoint.contains('?') {
            format!("{}&key={}", endpoint, api_key)
        } else {
            format!("{}?key={}", endpoint, api_key)
        };

        info!("Connecting to live session at {}", endpoint);

        let (ws_stream, _) = connect_async(&url)
            .await
            .context("Failed to connect to live session")?;

        let (mut writer, mut reader) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(64);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(64);

        let writer_handle = tokio::spawn(async move {
            // Setup always leads; audio must not enter a half-established channel
            match serde_json::to_string(&ClientMessage::Setup(setup)) {
                Ok(frame) => {
                    if let Err(e) = writer.send(Message::text(frame)).await {
                        warn!("Failed to send setup frame: {}", e);
                        return;
                    }
                }
                Err(e) => {
                    warn!("Failed to serialize setup frame: {}", e);
                    return;
                }
            }

            while let Some(message) = outbound_rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(frame) => {
                        if let Err(e) = writer.send(Message::text(frame)).await {
                            warn!("Failed to send frame: {}", e);
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to serialize frame: {}", e),
                }
            }

            let _ = writer.close().await;
        });

        let reader_handle = tokio::spawn(async move {
            let mut terminal = None;

            while let Some(frame) = reader.next().await {
                let payload = match frame {
                    Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                    Ok(Message::Binary(bytes)) => bytes.to_vec(),
                    Ok(Message::Close(_)) => {
                        info!("Live session closed by remote");
                        terminal = Some(SessionEvent::Closed);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        terminal = Some(SessionEvent::Error(e.to_string()));
                        break;
                    }
                };

                let message = match ServerMessage::parse(&payload) {
                    Ok(message) => message,
                    Err(e) => {
                        // Recoverable: drop this frame, keep the session alive
                        warn!("Skipping malformed session message: {}", e);
                        continue;
                    }
                };

                if message.setup_complete.is_some()
                    && event_tx.send(SessionEvent::Open).await.is_err()
                {
                    return;
                }

                if let Some(content) = message.server_content {
                    if event_tx.send(SessionEvent::Content(content)).await.is_err() {
                        return;
                    }
                }
            }

            let final_event = terminal.unwrap_or(SessionEvent::Closed);
            let _ = event_tx.send(final_event).await;
        });

        Ok(Self {
            outbound_tx: Some(outbound_tx),
            event_rx,
            writer_handle,
            reader_handle,
        })
    }
}

#[async_trait::async_trait]
impl LiveSession for WsLiveSession {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        let Some(tx) = &self.outbound_tx else {
            anyhow::bail!("Session is closed");
        };

        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                // No cross-chunk backpressure: the transport keeps capture pace
                // or loses ticks
                warn!("Outbound queue full; dropping audio chunk");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                anyhow::bail!("Session writer is gone")
            }
        }
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        if self.outbound_tx.take().is_none() {
            return Ok(());
        }

        // Dropping the sender lets the writer drain and send its close frame
        if tokio::time::timeout(CLOSE_GRACE, &mut self.writer_handle)
            .await
            .is_err()
        {
            self.writer_handle.abort();
        }
        self.reader_handle.abort();

        Ok(())
    }
}

/// Session fed by the caller
///
/// `events()` hands out the producer side so inbound events can be injected
/// at controlled points; outbound messages accumulate in `sent()`.
pub struct ScriptedSession {
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: mpsc::Receiver<SessionEvent>,
    sent: Arc<std::sync::Mutex<Vec<ClientMessage>>>,
    close_calls: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        Self {
            event_tx,
            event_rx,
            sent: Arc::new(std::sync::Mutex::new(Vec::new())),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Producer handle for injecting inbound events
    pub fn events(&self) -> mpsc::Sender<SessionEvent> {
        self.event_tx.clone()
    }

    /// Shared log of everything sent through this session
    pub fn sent(&self) -> Arc<std::sync::Mutex<Vec<ClientMessage>>> {
        Arc::clone(&self.sent)
    }

    /// Shared counter of close() invocations
    pub fn close_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_calls)
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LiveSession for ScriptedSession {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
