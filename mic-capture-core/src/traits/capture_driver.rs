use std::sync::Arc;
use std::time::Duration;

use crate::models::device::Device;
use crate::models::error::Result;
use crate::processing::pcm_format::PcmFormat;

/// Callback invoked with each chunk of captured PCM bytes.
///
/// Fires on the driver's capture thread. Implementations must return
/// quickly and never block on the consumer.
pub type PcmBufferCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Parameters for opening a native capture stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Platform device handle. Empty selects the system default device.
    pub device_id: String,
    pub format: PcmFormat,
    /// Requested buffer granularity. Drivers may treat it as a hint.
    pub buffer_duration: Duration,
}

/// Platform capture capability: device enumeration plus stream open.
///
/// Implemented per target platform (see `mic-capture-platform`) and injected
/// into the registry and every microphone it creates.
pub trait CaptureDriver: Send + Sync {
    /// Short backend name for logs, e.g. "wasapi".
    fn name(&self) -> &str;

    /// List every capture endpoint the platform knows about, enabled or not.
    fn enumerate(&self) -> Result<Vec<Device>>;

    /// Open a capture stream. Must fail synchronously with
    /// `MicrophoneError::DeviceUnavailable` if the device cannot be opened.
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureHandle>>;
}

/// An open native capture stream, exclusively owned by one started microphone.
pub trait CaptureHandle: Send {
    /// Begin delivering buffers to `callback`.
    fn register_callback(&mut self, callback: PcmBufferCallback) -> Result<()>;

    /// Unregister the callback and release the stream.
    ///
    /// After this returns no further callback invocations may begin, and any
    /// in-flight invocation has finished (unless called from the capture
    /// thread itself).
    fn close(&mut self) -> Result<()>;
}
