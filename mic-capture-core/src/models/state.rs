use serde::{Deserialize, Serialize};

/// Microphone capture state.
///
/// ```text
/// stopped ──start()──▶ started
///    ▲                    │
///    └──────stop()────────┘
/// ```
///
/// Both transitions are idempotent: starting a started microphone or
/// stopping a stopped one leaves it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicrophoneState {
    #[default]
    Stopped,
    Started,
}

impl MicrophoneState {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_stopped() {
        assert!(MicrophoneState::default().is_stopped());
        assert!(!MicrophoneState::default().is_started());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&MicrophoneState::Started).unwrap();
        assert_eq!(json, "\"started\"");
    }
}
