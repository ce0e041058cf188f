use anyhow::{Context, Result};
use base64::Engine;

/// Full-scale factor for 16-bit PCM conversion
const PCM_SCALE: f32 = 32768.0;

/// Convert normalized f32 samples (-1.0..1.0) to 16-bit little-endian PCM bytes
///
/// Samples are scaled by 32768 and truncated toward zero; out-of-range input
/// saturates at the i16 bounds.
pub fn samples_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let quantized = (sample * PCM_SCALE) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian PCM bytes back to normalized f32 samples
///
/// Fails on an odd byte count since every sample is exactly two bytes.
pub fn pcm16le_to_samples(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        anyhow::bail!("PCM16 payload has odd length: {} bytes", bytes.len());
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM_SCALE)
        .collect();

    Ok(samples)
}

/// Encode a capture chunk as a base64 wire payload
pub fn encode_payload(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(samples_to_pcm16le(samples))
}

/// Decode a base64 wire payload into normalized f32 samples
pub fn decode_payload(data: &str) -> Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("Invalid base64 in audio payload")?;

    pcm16le_to_samples(&bytes)
}
