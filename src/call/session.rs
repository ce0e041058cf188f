use super::state::{transition, BridgeEvent, ConversationState, Effect};
use super::stats::CallStats;
use crate::audio::{
    self, pcm, AudioChunk, CallRecorder, CaptureBackend, CaptureConfig, OutputSink,
    PlaybackBuffer, PlaybackQueue,
};
use crate::config::Config;
use crate::live::{ClientMessage, LiveSession, RealtimeInputMessage, SessionEvent, SetupMessage};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Time allowed for the remote side to confirm setup before the attempt fails
const OPEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Resources handed to the pump task when the call starts
struct CallParts {
    session: Box<dyn LiveSession>,
    capture: Box<dyn CaptureBackend>,
    sink: Box<dyn OutputSink>,
    recorder: Option<CallRecorder>,
}

/// One active conversation with the assistant
///
/// Owns the live session, the capture backend, and the playback queue for the
/// duration of the call; every resource is released on stop, remote close, or
/// session error through the same teardown path.
pub struct CallSession {
    /// Call identifier (appears in logs and recording filenames)
    call_id: String,

    /// Output sample rate for decoded fragments
    output_sample_rate: u32,

    /// When the call was created
    started_at: chrono::DateTime<chrono::Utc>,

    /// Whether the call is currently active
    is_active: Arc<AtomicBool>,

    /// Transmit-side mute gate (capture keeps running while muted)
    is_muted: Arc<AtomicBool>,

    /// Current conversation phase
    state: Arc<AtomicU8>,

    /// Audio chunks transmitted
    chunks_sent: Arc<AtomicUsize>,

    /// Inbound fragments scheduled for playback
    fragments_played: Arc<AtomicUsize>,

    /// Resources not yet handed to the pump
    pending: Mutex<Option<CallParts>>,

    /// Handle for the pump task
    pump_handle: Mutex<Option<JoinHandle<()>>>,

    /// Wakes the pump for user-initiated teardown
    shutdown: Arc<Notify>,

    /// Flips to true once the pump has finished tearing down
    ended_tx: Arc<watch::Sender<bool>>,
}

impl CallSession {
    /// Assemble a call from its parts
    pub fn new(
        call_id: String,
        session: Box<dyn LiveSession>,
        capture: Box<dyn CaptureBackend>,
        sink: Box<dyn OutputSink>,
        recorder: Option<CallRecorder>,
        output_sample_rate: u32,
    ) -> Self {
        let (ended_tx, _) = watch::channel(false);
        let ended_tx = Arc::new(ended_tx);

        Self {
            call_id,
            output_sample_rate,
            started_at: Utc::now(),
            is_active: Arc::new(AtomicBool::new(false)),
            is_muted: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(ConversationState::Idle.as_u8())),
            chunks_sent: Arc::new(AtomicUsize::new(0)),
            fragments_played: Arc::new(AtomicUsize::new(0)),
            pending: Mutex::new(Some(CallParts {
                session,
                capture,
                sink,
                recorder,
            })),
            pump_handle: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            ended_tx,
        }
    }

    /// Open a live session and assemble a call from configuration
    pub async fn connect(config: &Config) -> Result<Self> {
        let call_id = format!("call-{}", uuid::Uuid::new_v4());
        Self::connect_with_id(call_id, config).await
    }

    /// Open a live session for a caller-chosen call id
    pub async fn connect_with_id(call_id: String, config: &Config) -> Result<Self> {
        // Missing or malformed credentials fail the attempt before anything opens
        config.validate()?;

        info!("Creating call session: {}", call_id);

        let setup = SetupMessage::new(
            &config.live.model,
            &config.live.voice,
            config.live.temperature,
            &config.live.system_instruction,
        );

        let session = crate::live::WsLiveSession::connect(
            &config.live.endpoint,
            &config.live.api_key,
            setup,
        )
        .await?;

        let capture = audio::default_backend(CaptureConfig {
            sample_rate: config.audio.input_sample_rate,
            channels: config.audio.channels,
            chunk_samples: config.audio.chunk_samples,
        })?;

        let sink = audio::default_sink().await?;

        let recorder = if config.recording.enabled {
            Some(CallRecorder::create(
                Path::new(&config.recording.dir),
                &call_id,
                config.audio.input_sample_rate,
                config.audio.output_sample_rate,
            )?)
        } else {
            None
        };

        Ok(Self::new(
            call_id,
            Box::new(session),
            capture,
            sink,
            recorder,
            config.audio.output_sample_rate,
        ))
    }

    /// Start the call
    ///
    /// Waits for the remote side to confirm setup, wires up capture, and
    /// spawns the pump. Capture starts strictly after the open confirmation so
    /// no audio enters a half-established channel.
    pub async fn start(&self) -> Result<()> {
        let mut parts = self
            .pending
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("Call already started"))?;

        info!("Starting call: {}", self.call_id);

        if let Err(e) = self.wait_for_open(&mut parts.session).await {
            // Failed attempt: release whatever the connect opened
            if let Err(close_err) = parts.session.close().await {
                error!("Failed to close session after failed open: {}", close_err);
            }
            return Err(e);
        }

        self.set_state(ConversationState::Listening);

        let capture_rx = match parts.capture.start().await {
            Ok(rx) => rx,
            Err(e) => {
                // Device acquisition failure fails the attempt cleanly
                if let Err(close_err) = parts.session.close().await {
                    error!("Failed to close session after capture failure: {}", close_err);
                }
                self.set_state(ConversationState::Idle);
                return Err(e).context("Failed to start audio capture");
            }
        };

        self.is_active.store(true, Ordering::SeqCst);

        let pump = Pump {
            call_id: self.call_id.clone(),
            session: parts.session,
            capture: parts.capture,
            capture_rx: Some(capture_rx),
            queue: PlaybackQueue::new(parts.sink),
            recorder: parts.recorder,
            output_sample_rate: self.output_sample_rate,
            is_active: Arc::clone(&self.is_active),
            is_muted: Arc::clone(&self.is_muted),
            state: Arc::clone(&self.state),
            chunks_sent: Arc::clone(&self.chunks_sent),
            fragments_played: Arc::clone(&self.fragments_played),
            shutdown: Arc::clone(&self.shutdown),
            ended_tx: Arc::clone(&self.ended_tx),
        };

        let handle = tokio::spawn(pump.run());

        {
            let mut pump_handle = self.pump_handle.lock().await;
            *pump_handle = Some(handle);
        }

        info!("Call started: {}", self.call_id);

        Ok(())
    }

    async fn wait_for_open(&self, session: &mut Box<dyn LiveSession>) -> Result<()> {
        let opened = tokio::time::timeout(OPEN_TIMEOUT, async {
            loop {
                match session.next_event().await {
                    Some(SessionEvent::Open) => return Ok(()),
                    Some(SessionEvent::Content(_)) => {
                        // Content before the open confirmation is out of order
                        warn!("Ignoring content before setup confirmation");
                    }
                    Some(SessionEvent::Closed) | None => {
                        anyhow::bail!("Session closed during setup")
                    }
                    Some(SessionEvent::Error(e)) => {
                        anyhow::bail!("Session error during setup: {}", e)
                    }
                }
            }
        })
        .await;

        match opened {
            Ok(result) => result,
            Err(_) => anyhow::bail!("Timed out waiting for session open"),
        }
    }

    /// Stop the call and release every owned resource
    ///
    /// Safe to invoke from any state, any number of times; this is the single
    /// teardown path for user stops, and the pump runs the same routine for
    /// remote close and error.
    pub async fn stop(&self) -> Result<CallStats> {
        self.shutdown.notify_one();

        // Wait for the pump to finish its teardown
        {
            let mut pump_handle = self.pump_handle.lock().await;
            if let Some(handle) = pump_handle.take() {
                if let Err(e) = handle.await {
                    error!("Pump task panicked: {}", e);
                }
            }
        }

        // A call stopped before start() still owns a connected session
        if let Some(mut parts) = self.pending.lock().await.take() {
            if let Err(e) = parts.session.close().await {
                error!("Failed to close unstarted session: {}", e);
            }
            self.set_state(ConversationState::Idle);
        }

        let _ = self.ended_tx.send(true);

        Ok(self.stats())
    }

    /// Gate or ungate outbound audio; takes effect on the next capture tick
    pub fn set_muted(&self, muted: bool) {
        self.is_muted.store(muted, Ordering::SeqCst);
        info!("Call {} muted: {}", self.call_id, muted);
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn conversation_state(&self) -> ConversationState {
        ConversationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Observable snapshot for the control surface
    pub fn stats(&self) -> CallStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        CallStats {
            is_active: self.is_active(),
            is_muted: self.is_muted(),
            state: self.conversation_state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_sent: self.chunks_sent.load(Ordering::SeqCst),
            fragments_played: self.fragments_played.load(Ordering::SeqCst),
        }
    }

    /// Resolves once the call has fully torn down
    pub async fn wait_ended(&self) {
        let mut ended = self.ended_tx.subscribe();
        while !*ended.borrow() {
            if ended.changed().await.is_err() {
                break;
            }
        }
    }

    fn set_state(&self, state: ConversationState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// The per-call event loop
///
/// Single task owning every mutable call resource, so the state machine, the
/// schedule cursor, and the active source set are never touched concurrently.
struct Pump {
    call_id: String,
    session: Box<dyn LiveSession>,
    capture: Box<dyn CaptureBackend>,
    capture_rx: Option<mpsc::Receiver<AudioChunk>>,
    queue: PlaybackQueue,
    recorder: Option<CallRecorder>,
    output_sample_rate: u32,
    is_active: Arc<AtomicBool>,
    is_muted: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    chunks_sent: Arc<AtomicUsize>,
    fragments_played: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
    ended_tx: Arc<watch::Sender<bool>>,
}

impl Pump {
    async fn run(mut self) {
        info!("Call pump started: {}", self.call_id);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Call {} stopping on request", self.call_id);
                    break;
                }

                maybe_chunk = next_chunk(&mut self.capture_rx) => {
                    match maybe_chunk {
                        Some(chunk) => self.handle_chunk(chunk),
                        None => {
                            warn!("Capture stream ended for call {}", self.call_id);
                            self.capture_rx = None;
                        }
                    }
                }

                maybe_event = self.session.next_event() => {
                    let events = match maybe_event {
                        Some(SessionEvent::Open) => vec![BridgeEvent::SessionOpened],
                        Some(SessionEvent::Content(content)) => {
                            BridgeEvent::from_content(&content)
                        }
                        Some(SessionEvent::Closed) | None => vec![BridgeEvent::SessionClosed],
                        Some(SessionEvent::Error(e)) => vec![BridgeEvent::SessionError(e)],
                    };

                    if self.apply_events(events) {
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Encode and transmit one capture tick, unless muted
    fn handle_chunk(&mut self, chunk: AudioChunk) {
        if self.is_muted.load(Ordering::SeqCst) {
            // Pure transmit-side gate: the tap keeps ticking, nothing is sent
            return;
        }

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.write_outbound(&chunk.samples);
        }

        let message = RealtimeInputMessage::audio_chunk(&chunk.samples, chunk.sample_rate);

        match self.session.send(ClientMessage::RealtimeInput(message)) {
            Ok(()) => {
                self.chunks_sent.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                // The writer is gone; a Closed or Error event follows shortly
                warn!("Failed to send audio chunk: {}", e);
            }
        }
    }

    /// Run the state machine over expanded events; true means tear down
    fn apply_events(&mut self, events: Vec<BridgeEvent>) -> bool {
        for event in events {
            let current = ConversationState::from_u8(self.state.load(Ordering::SeqCst));
            let (next, effects) = transition(current, &event);

            if next != current {
                debug!("Call {} state: {:?} -> {:?}", self.call_id, current, next);
                self.state.store(next.as_u8(), Ordering::SeqCst);
            }

            for effect in effects {
                match effect {
                    Effect::SchedulePlayback(data) => self.schedule_fragment(&data),
                    Effect::ClearPlayback => {
                        info!("Call {} interrupted; discarding queued audio", self.call_id);
                        self.queue.clear();
                    }
                    Effect::Teardown => return true,
                    Effect::StartCapture => {
                        // Capture was wired before the pump spawned
                        debug!("Capture already running for call {}", self.call_id);
                    }
                }
            }
        }

        false
    }

    /// Decode one inbound fragment and chain it onto the playback schedule
    fn schedule_fragment(&mut self, data: &str) {
        let samples = match pcm::decode_payload(data) {
            Ok(samples) => samples,
            Err(e) => {
                // Recoverable: skip the fragment, cursor stays where it was
                warn!("Skipping malformed audio fragment: {}", e);
                return;
            }
        };

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.write_inbound(&samples);
        }

        let buffer = PlaybackBuffer {
            samples,
            sample_rate: self.output_sample_rate,
        };

        match self.queue.schedule(buffer) {
            Ok(_) => {
                self.fragments_played.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => warn!("Failed to schedule playback: {}", e),
        }
    }

    /// Release every owned resource
    ///
    /// Every step runs even when an earlier one fails; this services user
    /// stops, remote closes, and session errors alike.
    async fn teardown(mut self) {
        info!("Tearing down call: {}", self.call_id);

        if let Err(e) = self.session.close().await {
            error!("Failed to close session: {}", e);
        }

        if let Err(e) = self.capture.stop().await {
            error!("Failed to stop capture: {}", e);
        }

        // Disconnect the tap
        self.capture_rx = None;

        // Stops every scheduled source, empties the set, resets the cursor
        self.queue.clear();

        if let Some(recorder) = self.recorder.take() {
            if let Err(e) = recorder.finish() {
                warn!("Failed to finalize call recording: {}", e);
            }
        }

        self.is_muted.store(false, Ordering::SeqCst);
        self.state
            .store(ConversationState::Idle.as_u8(), Ordering::SeqCst);
        self.is_active.store(false, Ordering::SeqCst);
        let _ = self.ended_tx.send(true);

        info!("Call ended: {}", self.call_id);
    }
}

/// Receive from the capture channel, or park forever once it has ended
async fn next_chunk(rx: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match rx {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
