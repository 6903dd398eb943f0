use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration applied to a microphone when it is created.
///
/// The sample format is fixed by the platform (see `PcmFormat::PLATFORM`),
/// so only the advisory buffer granularity and the queue bound are tunable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicrophoneConfiguration {
    /// Requested buffer granularity (default: 1s). Advisory; passed to the driver on start.
    #[serde(rename = "buffer_duration_ms", with = "duration_ms")]
    pub buffer_duration: Duration,

    /// Maximum number of unread buffers kept per session, or None for unbounded.
    /// On overflow the oldest buffer is dropped.
    #[serde(default)]
    pub max_queued_buffers: Option<usize>,
}

pub const MIN_BUFFER_DURATION: Duration = Duration::from_millis(100);
pub const MAX_BUFFER_DURATION: Duration = Duration::from_millis(1000);
const BUFFER_DURATION_STEP_MS: u128 = 10;

impl MicrophoneConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_buffer_duration(self.buffer_duration) {
            return Err(format!(
                "buffer duration must be 100-1000ms in 10ms steps, got {:?}",
                self.buffer_duration
            ));
        }
        if self.max_queued_buffers == Some(0) {
            return Err("max queued buffers must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for MicrophoneConfiguration {
    fn default() -> Self {
        Self {
            buffer_duration: Duration::from_secs(1),
            max_queued_buffers: None,
        }
    }
}

pub(crate) fn is_valid_buffer_duration(duration: Duration) -> bool {
    (MIN_BUFFER_DURATION..=MAX_BUFFER_DURATION).contains(&duration)
        && duration.as_nanos() % (BUFFER_DURATION_STEP_MS * 1_000_000) == 0
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(MicrophoneConfiguration::default().validate().is_ok());
    }

    #[test]
    fn buffer_duration_bounds() {
        assert!(is_valid_buffer_duration(Duration::from_millis(100)));
        assert!(is_valid_buffer_duration(Duration::from_millis(250)));
        assert!(is_valid_buffer_duration(Duration::from_millis(1000)));

        assert!(!is_valid_buffer_duration(Duration::from_millis(90)));
        assert!(!is_valid_buffer_duration(Duration::from_millis(1010)));
        assert!(!is_valid_buffer_duration(Duration::from_millis(105)));
        assert!(!is_valid_buffer_duration(Duration::from_micros(100_500)));
    }

    #[test]
    fn zero_queue_bound_is_rejected() {
        let config = MicrophoneConfiguration {
            max_queued_buffers: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_from_milliseconds() {
        let config: MicrophoneConfiguration =
            serde_json::from_str(r#"{ "buffer_duration_ms": 200, "max_queued_buffers": 32 }"#).unwrap();
        assert_eq!(config.buffer_duration, Duration::from_millis(200));
        assert_eq!(config.max_queued_buffers, Some(32));

        let config: MicrophoneConfiguration = serde_json::from_str(r#"{ "buffer_duration_ms": 500 }"#).unwrap();
        assert_eq!(config.max_queued_buffers, None);
    }
}
