//! PCM stream format and size/duration conversions.
//!
//! Every capture session delivers raw little-endian signed PCM in the
//! platform format: 48 kHz, 16-bit, mono. Nothing in this crate converts or
//! resamples; these helpers only do the arithmetic between byte counts and
//! playback time.

use std::time::Duration;

/// Platform-mandated capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Bits per sample of the captured stream.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Channel count of the captured stream.
pub const CHANNELS: u16 = 1;

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl PcmFormat {
    /// The only format native drivers are asked to deliver.
    pub const PLATFORM: PcmFormat = PcmFormat {
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        channels: CHANNELS,
    };

    /// Bytes per frame: `channels * bits_per_sample / 8`.
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }

    /// Bytes per second: `sample_rate * block_align`.
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Playback duration of `size_in_bytes`. Trailing bytes that do not
    /// form a whole frame are ignored.
    pub fn sample_duration(&self, size_in_bytes: usize) -> Duration {
        let block_align = self.block_align();
        if block_align == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (size_in_bytes / block_align) as u64;
        let rate = self.sample_rate as u64;
        let subsec_nanos = (frames % rate) as u128 * NANOS_PER_SEC / rate as u128;
        Duration::new(frames / rate, subsec_nanos as u32)
    }

    /// Bytes needed to hold `duration` of audio, rounded down to whole frames.
    ///
    /// Returns `None` if the result does not fit in `usize`.
    pub fn sample_size_in_bytes(&self, duration: Duration) -> Option<usize> {
        let frames = duration.as_nanos() * self.sample_rate as u128 / NANOS_PER_SEC;
        let bytes = frames.checked_mul(self.block_align() as u128)?;
        usize::try_from(bytes).ok()
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::PLATFORM
    }
}
