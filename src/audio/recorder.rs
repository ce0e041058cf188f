use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Records both directions of a call to disk as WAV
///
/// Two tracks per call: outbound microphone audio as transmitted (after the
/// mute gate, 16kHz) and inbound assistant audio as decoded (24kHz). Purely a
/// debugging aid; write failures are logged and never fail the call.
pub struct CallRecorder {
    outbound: TrackWriter,
    inbound: TrackWriter,
}

impl CallRecorder {
    pub fn create(
        dir: &Path,
        call_id: &str,
        outbound_rate: u32,
        inbound_rate: u32,
    ) -> Result<Self> {
        fs::create_dir_all(dir).context("Failed to create recording directory")?;

        let outbound = TrackWriter::create(
            dir.join(format!("{}-outbound.wav", call_id)),
            outbound_rate,
        )?;
        let inbound = TrackWriter::create(
            dir.join(format!("{}-inbound.wav", call_id)),
            inbound_rate,
        )?;

        info!("Recording call {} to {}", call_id, dir.display());

        Ok(Self { outbound, inbound })
    }

    /// Append transmitted microphone samples
    pub fn write_outbound(&mut self, samples: &[f32]) {
        if let Err(e) = self.outbound.write(samples) {
            warn!("Failed to record outbound audio: {}", e);
        }
    }

    /// Append decoded assistant samples
    pub fn write_inbound(&mut self, samples: &[f32]) {
        if let Err(e) = self.inbound.write(samples) {
            warn!("Failed to record inbound audio: {}", e);
        }
    }

    /// Finalize both WAV files
    pub fn finish(mut self) -> Result<()> {
        self.outbound.finish()?;
        self.inbound.finish()?;
        Ok(())
    }
}

/// Writes one audio direction to a WAV file (16-bit mono PCM)
struct TrackWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_count: usize,
}

impl TrackWriter {
    fn create(path: PathBuf, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer: Some(writer),
            path,
            sample_count: 0,
        })
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                let quantized = (sample * 32768.0) as i16;
                writer
                    .write_sample(quantized)
                    .context("Failed to write sample to WAV")?;
            }

            self.sample_count += samples.len();
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
            info!(
                "Finalized {} ({} samples)",
                self.path.display(),
                self.sample_count
            );
        }

        Ok(())
    }
}

impl Drop for TrackWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
