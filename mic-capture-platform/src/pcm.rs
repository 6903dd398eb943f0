use std::time::Duration;

use mic_capture_core::{MicrophoneError, PcmFormat, Result, StreamRequest};

/// Reject any request for a format other than the platform one.
pub(crate) fn ensure_platform_format(request: &StreamRequest, backend: &str) -> Result<()> {
    if request.format != PcmFormat::PLATFORM {
        return Err(MicrophoneError::NotSupported(format!(
            "{} backend only captures {} Hz/{}-bit/{}ch PCM, requested {:?}",
            backend,
            PcmFormat::PLATFORM.sample_rate,
            PcmFormat::PLATFORM.bits_per_sample,
            PcmFormat::PLATFORM.channels,
            request.format
        )));
    }
    Ok(())
}

/// Serialize signed 16-bit samples as little-endian bytes.
pub(crate) fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Average interleaved 16-bit frames down to mono little-endian bytes.
/// A trailing partial frame is dropped.
pub(crate) fn i16_to_mono_le(samples: &[i16], channels: u16) -> Vec<u8> {
    if channels <= 1 {
        return samples_to_le_bytes(samples);
    }
    let width = channels as usize;
    samples
        .chunks_exact(width)
        .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / width as i32) as i16)
        .flat_map(i16::to_le_bytes)
        .collect()
}

/// Average interleaved float frames down to mono and quantize to 16-bit
/// little-endian bytes. Samples outside [-1.0, 1.0] are clipped.
pub(crate) fn f32_to_mono_le(samples: &[f32], channels: u16) -> Vec<u8> {
    let width = channels.max(1) as usize;
    samples
        .chunks_exact(width)
        .map(|frame| quantize(frame.iter().sum::<f32>() / width as f32))
        .flat_map(i16::to_le_bytes)
        .collect()
}

fn quantize(sample: f32) -> i16 {
    // NaN casts to 0
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Convert to WASAPI's 100-nanosecond units, saturating at `i64::MAX`.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn duration_to_hns(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / 100).unwrap_or(i64::MAX)
}
