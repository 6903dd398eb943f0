//! # mic-capture-core
//!
//! Platform-agnostic microphone capture core library.
//!
//! Provides device discovery, the capture session state machine, per-session
//! PCM buffering, and "buffer ready" notifications. Platform-specific
//! backends (WASAPI, cpal) implement the `CaptureDriver` trait and plug into
//! the generic `DeviceRegistry` and `Microphone`.
//!
//! ## Architecture
//!
//! ```text
//! mic-capture-core (this crate)
//! ├── traits/       ← CaptureDriver, CaptureHandle, BufferReadyListener
//! ├── models/       ← MicrophoneError, MicrophoneState, Device, MicrophoneConfiguration, diagnostics
//! ├── processing/   ← BufferQueue, PcmFormat
//! └── session/      ← DeviceRegistry, Microphone, NotificationSink
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::config::MicrophoneConfiguration;
pub use models::device::{Device, TransportType};
pub use models::diagnostics::MicrophoneDiagnostics;
pub use models::error::{ArgumentError, MicrophoneError, Result};
pub use models::state::MicrophoneState;
pub use processing::buffer_queue::{BufferQueue, PushOutcome, RawBuffer};
pub use processing::pcm_format::PcmFormat;
pub use session::microphone::{BufferReady, Microphone};
pub use session::notification::{NotificationSink, Notifier, SubscriptionId};
pub use session::registry::DeviceRegistry;
pub use traits::buffer_listener::BufferReadyListener;
pub use traits::capture_driver::{CaptureDriver, CaptureHandle, PcmBufferCallback, StreamRequest};
