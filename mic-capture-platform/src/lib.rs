//! # mic-capture-platform
//!
//! Native `CaptureDriver` backends for mic-capture-core.
//!
//! Provides:
//! - `WasapiDriver`: shared-mode WASAPI capture endpoints (Windows only)
//! - `CpalDriver`: cpal's default host, on every target
//! - `DeviceEnumerator`: capture endpoint enumeration via the MMDevice API (Windows only)
//! - `default_driver()` / `registry()`: backend selection, overridable with
//!   `MIC_CAPTURE_BACKEND=wasapi|cpal`
//!
//! Both backends deliver 48 kHz 16-bit mono little-endian PCM.
//!
//! ## Usage
//! ```ignore
//! let registry = mic_capture_platform::registry()?;
//! if let Some(mic) = registry.default_microphone()? {
//!     mic.subscribe(|event: &mic_capture_core::BufferReady| log::trace!("{} bytes ready", event.byte_len));
//!     mic.start()?;
//! }
//! ```

pub mod backend;
pub mod cpal_capture;
mod pcm;
mod transport;

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;

pub use backend::{default_driver, driver, registry, BackendKind, UnknownBackend, BACKEND_ENV_VAR};
pub use cpal_capture::CpalDriver;
#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiDriver;

/// Log-friendly device id; the empty id selects the system default.
pub(crate) fn display_id(device_id: &str) -> &str {
    if device_id.is_empty() {
        "default"
    } else {
        device_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_displays_as_default() {
        assert_eq!(display_id(""), "default");
        assert_eq!(display_id("USB Mic"), "USB Mic");
    }
}
