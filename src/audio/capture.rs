use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One block of captured microphone audio (mono, normalized f32)
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Normalized samples in -1.0..1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioChunk {
    /// Chunk duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (device audio is downsampled if needed)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Samples per chunk (one chunk per capture tick)
    pub chunk_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,  // Session input rate
            channels: 1,         // Mono
            chunk_samples: 4096, // ~256ms ticks at 16kHz
        }
    }
}

/// Microphone capture backend trait
///
/// Implementations:
/// - cpal: real input device (feature `audio-cpal`)
/// - scripted: caller-fed chunks (tests, offline development)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio chunks. Acquisition
    /// failures (no device, permission denied) are reported here, not deferred.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Create the default capture backend for this build
pub fn default_backend(config: CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
    #[cfg(feature = "audio-cpal")]
    {
        Ok(Box::new(cpal_backend::CpalCapture::new(config)))
    }

    #[cfg(not(feature = "audio-cpal"))]
    {
        let _ = config;
        anyhow::bail!("No capture backend available; build with the audio-cpal feature")
    }
}

/// Capture backend fed by the caller
///
/// `sender()` hands out the producer side so chunks can be injected at
/// controlled points. `failing()` builds a backend whose `start` refuses,
/// modeling a denied or missing input device.
pub struct ScriptedCapture {
    tx: mpsc::Sender<AudioChunk>,
    rx: std::sync::Mutex<Option<mpsc::Receiver<AudioChunk>>>,
    capturing: Arc<AtomicBool>,
    fail_start: bool,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            tx,
            rx: std::sync::Mutex::new(Some(rx)),
            capturing: Arc::new(AtomicBool::new(false)),
            fail_start: false,
        }
    }

    /// Backend whose start() always fails
    pub fn failing() -> Self {
        let mut backend = Self::new();
        backend.fail_start = true;
        backend
    }

    /// Producer handle for injecting chunks
    pub fn sender(&self) -> mpsc::Sender<AudioChunk> {
        self.tx.clone()
    }
}

impl Default for ScriptedCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.fail_start {
            anyhow::bail!("Input device unavailable");
        }

        let rx = self
            .rx
            .lock()
            .map_err(|_| anyhow::anyhow!("Scripted capture poisoned"))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("Scripted capture already started"))?;

        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(feature = "audio-cpal")]
mod cpal_backend {
    use super::{AudioChunk, CaptureBackend, CaptureConfig};
    use anyhow::{Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tracing::{error, info, warn};

    /// Real microphone capture via the default cpal input device
    ///
    /// The cpal stream handle is not Send, so the stream lives on a dedicated
    /// thread that parks until stop; converted chunks cross back over a
    /// bounded channel.
    pub struct CpalCapture {
        config: CaptureConfig,
        capturing: Arc<AtomicBool>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl CpalCapture {
        pub fn new(config: CaptureConfig) -> Self {
            Self {
                config,
                capturing: Arc::new(AtomicBool::new(false)),
                thread: None,
            }
        }
    }

    /// Accumulates device samples and emits fixed-size mono chunks
    struct ChunkAssembler {
        tx: mpsc::Sender<AudioChunk>,
        buffer: Vec<f32>,
        chunk_samples: usize,
        sample_rate: u32,
        device_channels: usize,
        decimation: usize,
        samples_emitted: u64,
    }

    impl ChunkAssembler {
        fn push(&mut self, data: &[f32]) {
            // Mono by taking the first channel of each frame, then decimate
            // down to the target rate (integer ratio, matching the session's
            // 48kHz -> 16kHz case exactly).
            self.buffer.extend(
                data.iter()
                    .step_by(self.device_channels)
                    .step_by(self.decimation)
                    .copied(),
            );

            while self.buffer.len() >= self.chunk_samples {
                let samples: Vec<f32> = self.buffer.drain(..self.chunk_samples).collect();
                let timestamp_ms = self.samples_emitted * 1000 / self.sample_rate as u64;
                self.samples_emitted += samples.len() as u64;

                // Never block the device callback; a full channel drops the chunk
                let _ = self.tx.try_send(AudioChunk {
                    samples,
                    sample_rate: self.sample_rate,
                    timestamp_ms,
                });
            }
        }
    }

    fn build_stream(
        config: &CaptureConfig,
        tx: mpsc::Sender<AudioChunk>,
    ) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No default input device")?;

        let device_config = device
            .default_input_config()
            .context("Failed to query input device config")?;

        let device_rate = device_config.sample_rate().0;
        let device_channels = device_config.channels() as usize;
        let decimation = if device_rate > config.sample_rate {
            (device_rate / config.sample_rate) as usize
        } else {
            1
        };

        info!(
            "Opening input device {} ({} Hz, {} ch, decimation {})",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            device_rate,
            device_channels,
            decimation
        );

        let mut assembler = ChunkAssembler {
            tx,
            buffer: Vec::with_capacity(config.chunk_samples * 2),
            chunk_samples: config.chunk_samples,
            sample_rate: config.sample_rate,
            device_channels,
            decimation,
            samples_emitted: 0,
        };

        let err_fn = |err| error!("Capture stream error: {}", err);

        let stream = match device_config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &device_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| assembler.push(data),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &device_config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32768.0).collect();
                    assembler.push(&converted);
                },
                err_fn,
                None,
            )?,
            other => anyhow::bail!("Unsupported input sample format: {:?}", other),
        };

        Ok(stream)
    }

    #[async_trait::async_trait]
    impl CaptureBackend for CpalCapture {
        async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
            if self.capturing.load(Ordering::SeqCst) {
                anyhow::bail!("Capture already running");
            }

            let (tx, rx) = mpsc::channel(32);
            let (ready_tx, ready_rx) = std::sync::mpsc::channel();
            let config = self.config.clone();
            let capturing = Arc::clone(&self.capturing);

            capturing.store(true, Ordering::SeqCst);

            let flag = Arc::clone(&self.capturing);
            let thread = std::thread::spawn(move || {
                let stream = match build_stream(&config, tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(
                        anyhow::Error::from(e).context("Failed to start input stream")
                    ));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                while flag.load(Ordering::SeqCst) {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }

                drop(stream);
            });

            // The device thread reports acquisition success or failure before
            // any audio flows; surface that to the caller.
            let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
                .await
                .context("Capture thread exited before reporting readiness")?;

            match ready {
                Ok(Ok(())) => {
                    self.thread = Some(thread);
                    Ok(rx)
                }
                Ok(Err(e)) => {
                    self.capturing.store(false, Ordering::SeqCst);
                    Err(e.context("Failed to acquire input device"))
                }
                Err(_) => {
                    self.capturing.store(false, Ordering::SeqCst);
                    anyhow::bail!("Capture thread exited before reporting readiness")
                }
            }
        }

        async fn stop(&mut self) -> Result<()> {
            self.capturing.store(false, Ordering::SeqCst);

            if let Some(thread) = self.thread.take() {
                let join = tokio::task::spawn_blocking(move || thread.join()).await;
                if !matches!(join, Ok(Ok(()))) {
                    warn!("Capture thread did not shut down cleanly");
                }
            }

            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.capturing.load(Ordering::SeqCst)
        }

        fn name(&self) -> &str {
            "cpal"
        }
    }
}

#[cfg(feature = "audio-cpal")]
pub use cpal_backend::CpalCapture;
