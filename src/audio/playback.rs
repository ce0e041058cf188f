use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One decoded inbound audio fragment, ready for the output device
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    /// Normalized mono samples in -1.0..1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    /// Buffer duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Output device abstraction
///
/// `now` reads a monotonic output clock in seconds. `play` hands a buffer to
/// the device with an intended start time on that clock; devices that cannot
/// seek simply append, since buffers arrive already chained by the queue.
pub trait OutputSink: Send {
    /// Current output clock time in seconds
    fn now(&self) -> f64;

    /// Submit a buffer for playback at the given clock time
    fn play(&mut self, buffer: PlaybackBuffer, at: f64) -> Result<()>;

    /// Immediately stop and discard everything queued or playing
    fn stop_all(&mut self);
}

/// A buffer that has been handed to the sink but has not finished playing
#[derive(Debug, Clone, Copy)]
struct ScheduledSource {
    start: f64,
    end: f64,
}

/// Gapless playback scheduler
///
/// Chains decoded fragments back-to-back on the output clock: each buffer
/// starts at `max(cursor, now)` and advances the cursor by its duration, so
/// fragments arriving faster than real time queue losslessly while a late
/// fragment is never scheduled in the past. The active set tracks exactly the
/// buffers submitted but not yet finished.
pub struct PlaybackQueue {
    sink: Box<dyn OutputSink>,
    cursor: f64,
    active: Vec<ScheduledSource>,
}

impl PlaybackQueue {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            active: Vec::new(),
        }
    }

    /// Schedule one decoded fragment; returns its start time
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<f64> {
        self.prune();

        let now = self.sink.now();
        let start = if self.cursor > now { self.cursor } else { now };
        let duration = buffer.duration_secs();

        self.sink.play(buffer, start)?;

        self.active.push(ScheduledSource {
            start,
            end: start + duration,
        });
        self.cursor = start + duration;

        Ok(start)
    }

    /// Stop everything and reset the schedule
    ///
    /// Used for barge-in and teardown: the active set empties and the cursor
    /// returns to zero regardless of what was queued.
    pub fn clear(&mut self) {
        self.sink.stop_all();
        self.active.clear();
        self.cursor = 0.0;
    }

    /// Number of sources submitted but not yet finished
    pub fn active_count(&mut self) -> usize {
        self.prune();
        self.active.len()
    }

    /// Current schedule cursor in seconds
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Drop sources whose playback window has passed (natural completion)
    fn prune(&mut self) {
        let now = self.sink.now();
        self.active.retain(|source| source.end > now);
    }
}

/// Manually advanced clock shared with a [`NullSink`]
#[derive(Clone)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0f64.to_bits())))
    }

    pub fn set(&self, seconds: f64) {
        self.0.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that discards audio, driven by a [`ManualClock`]
///
/// Keeps the scheduler testable without an output device.
pub struct NullSink {
    clock: ManualClock,
}

impl NullSink {
    pub fn new(clock: ManualClock) -> Self {
        Self { clock }
    }
}

impl OutputSink for NullSink {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn play(&mut self, _buffer: PlaybackBuffer, _at: f64) -> Result<()> {
        Ok(())
    }

    fn stop_all(&mut self) {}
}

/// Create the default output sink for this build
#[cfg(feature = "audio-cpal")]
pub async fn default_sink() -> Result<Box<dyn OutputSink>> {
    Ok(Box::new(rodio_sink::RodioSink::open().await?))
}

#[cfg(not(feature = "audio-cpal"))]
pub async fn default_sink() -> Result<Box<dyn OutputSink>> {
    anyhow::bail!("No output sink available; build with the audio-cpal feature")
}

#[cfg(feature = "audio-cpal")]
mod rodio_sink {
    use super::{OutputSink, PlaybackBuffer};
    use anyhow::{Context, Result};
    use std::time::Instant;
    use tracing::warn;

    enum SinkCmd {
        Play(PlaybackBuffer),
        StopAll,
        Quit,
    }

    /// Output through the default rodio device
    ///
    /// The rodio output stream is not Send, so it lives on a dedicated thread
    /// fed by a command channel. Appended buffers play back-to-back, which
    /// matches the chained start times the queue computes; `stop_all` swaps in
    /// a fresh device sink so playback can resume after an interruption.
    pub struct RodioSink {
        cmd_tx: std::sync::mpsc::Sender<SinkCmd>,
        started: Instant,
    }

    impl RodioSink {
        pub async fn open() -> Result<Self> {
            let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<SinkCmd>();
            let (ready_tx, ready_rx) = std::sync::mpsc::channel();

            std::thread::spawn(move || {
                let stream = match rodio::OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow::Error::from(e)));
                        return;
                    }
                };

                let mut sink = rodio::Sink::connect_new(stream.mixer());

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        SinkCmd::Play(buffer) => {
                            sink.append(rodio::buffer::SamplesBuffer::new(
                                1,
                                buffer.sample_rate,
                                buffer.samples,
                            ));
                        }
                        SinkCmd::StopAll => {
                            sink.stop();
                            sink = rodio::Sink::connect_new(stream.mixer());
                        }
                        SinkCmd::Quit => break,
                    }
                }
            });

            let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
                .await
                .context("Output thread exited before reporting readiness")?;

            match ready {
                Ok(Ok(())) => Ok(Self {
                    cmd_tx,
                    started: Instant::now(),
                }),
                Ok(Err(e)) => Err(e.context("Failed to open output device")),
                Err(_) => anyhow::bail!("Output thread exited before reporting readiness"),
            }
        }
    }

    impl OutputSink for RodioSink {
        fn now(&self) -> f64 {
            self.started.elapsed().as_secs_f64()
        }

        fn play(&mut self, buffer: PlaybackBuffer, _at: f64) -> Result<()> {
            self.cmd_tx
                .send(SinkCmd::Play(buffer))
                .map_err(|_| anyhow::anyhow!("Output thread is gone"))
        }

        fn stop_all(&mut self) {
            if self.cmd_tx.send(SinkCmd::StopAll).is_err() {
                warn!("Output thread is gone; nothing to stop");
            }
        }
    }

    impl Drop for RodioSink {
        fn drop(&mut self) {
            let _ = self.cmd_tx.send(SinkCmd::Quit);
        }
    }
}

#[cfg(feature = "audio-cpal")]
pub use rodio_sink::RodioSink;
