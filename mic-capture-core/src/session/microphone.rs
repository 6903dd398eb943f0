use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::{is_valid_buffer_duration, MicrophoneConfiguration};
use crate::models::device::Device;
use crate::models::diagnostics::{DiagnosticsCounters, MicrophoneDiagnostics};
use crate::models::error::{ArgumentError, MicrophoneError, Result};
use crate::models::state::MicrophoneState;
use crate::processing::buffer_queue::{BufferQueue, PushOutcome, RawBuffer};
use crate::processing::pcm_format::PcmFormat;
use crate::session::notification::{NotificationSink, SubscriptionId};
use crate::traits::buffer_listener::BufferReadyListener;
use crate::traits::capture_driver::{CaptureDriver, CaptureHandle, PcmBufferCallback, StreamRequest};

/// Log every Nth overflow eviction after the first.
const OVERFLOW_LOG_INTERVAL: u64 = 100;

/// "At least one new chunk is available" notification.
#[derive(Clone)]
pub struct BufferReady {
    session: Weak<MicrophoneInner>,
    /// Monotonic per-microphone counter of delivered buffers.
    pub sequence: u64,
    /// Size of the buffer that triggered this notification.
    pub byte_len: usize,
}

impl BufferReady {
    /// The microphone that produced this event, if it still exists.
    pub fn microphone(&self) -> Option<Microphone> {
        self.session.upgrade().map(|inner| Microphone { inner })
    }
}

impl fmt::Debug for BufferReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferReady")
            .field("sequence", &self.sequence)
            .field("byte_len", &self.byte_len)
            .finish()
    }
}

/// Mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    state: MicrophoneState,
    /// Present once the first start succeeded. Closed (but kept) after stop.
    queue: Option<Arc<BufferQueue>>,
    buffer_duration: Duration,
}

struct MicrophoneInner {
    name: String,
    device_id: String,
    driver: Arc<dyn CaptureDriver>,
    max_queued_buffers: Option<usize>,
    session_state: Mutex<SessionState>,
    // Serializes start/stop and owns the native stream between them.
    native: Mutex<Option<Box<dyn CaptureHandle>>>,
    notifications: NotificationSink<BufferReady>,
    diagnostics: Arc<DiagnosticsCounters>,
    sequence: Arc<AtomicU64>,
}

/// One microphone capture session.
///
/// Data flow:
/// ```text
/// [CaptureHandle callback] → [BufferQueue] → get_data()  (consumer thread)
///            └──────────→ [NotificationSink] → BufferReady listeners
/// ```
///
/// `Microphone` is a shared handle; clones refer to the same session and
/// every method takes `&self`, so the consumer, listeners, and control code
/// may live on different threads.
#[derive(Clone)]
pub struct Microphone {
    inner: Arc<MicrophoneInner>,
}

impl Microphone {
    pub fn new(name: impl Into<String>, device_id: impl Into<String>, driver: Arc<dyn CaptureDriver>) -> Self {
        Self::from_parts(name.into(), device_id.into(), driver, &MicrophoneConfiguration::default())
    }

    pub fn with_configuration(
        name: impl Into<String>,
        device_id: impl Into<String>,
        driver: Arc<dyn CaptureDriver>,
        config: &MicrophoneConfiguration,
    ) -> Result<Self> {
        config.validate().map_err(MicrophoneError::ConfigurationFailed)?;
        Ok(Self::from_parts(name.into(), device_id.into(), driver, config))
    }

    /// Copies the device's name and id; the `Device` is not retained.
    pub fn from_device(device: &Device, driver: Arc<dyn CaptureDriver>) -> Self {
        Self::new(device.name.clone(), device.id.clone(), driver)
    }

    pub(crate) fn from_parts(
        name: String,
        device_id: String,
        driver: Arc<dyn CaptureDriver>,
        config: &MicrophoneConfiguration,
    ) -> Self {
        Self {
            inner: Arc::new(MicrophoneInner {
                name,
                device_id,
                driver,
                max_queued_buffers: config.max_queued_buffers,
                session_state: Mutex::new(SessionState {
                    state: MicrophoneState::Stopped,
                    queue: None,
                    buffer_duration: config.buffer_duration,
                }),
                native: Mutex::new(None),
                notifications: NotificationSink::new("mic-buffer-ready"),
                diagnostics: Arc::new(DiagnosticsCounters::default()),
                sequence: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn state(&self) -> MicrophoneState {
        self.inner.session_state.lock().state
    }

    /// Always 48000 Hz; fixed by the platform.
    pub fn sample_rate(&self) -> u32 {
        PcmFormat::PLATFORM.sample_rate
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat::PLATFORM
    }

    /// No platform distinguishes headset microphones, so this is always false.
    pub fn is_headset(&self) -> bool {
        false
    }

    pub fn buffer_duration(&self) -> Duration {
        self.inner.session_state.lock().buffer_duration
    }

    /// Set the requested buffer granularity, applied on the next `start`.
    ///
    /// Must be between 100ms and 1000ms in 10ms increments.
    pub fn set_buffer_duration(&self, duration: Duration) -> Result<()> {
        if !is_valid_buffer_duration(duration) {
            return Err(ArgumentError::BufferDurationOutOfRange(duration).into());
        }
        self.inner.session_state.lock().buffer_duration = duration;
        Ok(())
    }

    /// Playback time represented by `size_in_bytes` of captured data.
    pub fn get_sample_duration(&self, size_in_bytes: usize) -> Duration {
        PcmFormat::PLATFORM.sample_duration(size_in_bytes)
    }

    /// Whole-frame byte count that holds `duration` of captured data.
    pub fn get_sample_size_in_bytes(&self, duration: Duration) -> Result<usize> {
        PcmFormat::PLATFORM
            .sample_size_in_bytes(duration)
            .ok_or_else(|| ArgumentError::DurationOutOfRange(duration).into())
    }

    pub fn subscribe<L: BufferReadyListener + 'static>(&self, listener: L) -> SubscriptionId {
        let listener = Arc::new(listener);
        self.inner
            .notifications
            .subscribe(Arc::new(move |event: &BufferReady| listener.on_buffer_ready(event)))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.notifications.unsubscribe(id)
    }

    pub fn diagnostics(&self) -> MicrophoneDiagnostics {
        self.inner.diagnostics.snapshot()
    }

    /// Number of captured buffers waiting to be read.
    pub fn queued_buffers(&self) -> usize {
        self.current_queue().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Start capturing. No-op if already started.
    ///
    /// On failure the microphone stays stopped and no queue is published.
    pub fn start(&self) -> Result<()> {
        let mut native = self.inner.native.lock();

        let buffer_duration = {
            let s = self.inner.session_state.lock();
            if s.state.is_started() {
                return Ok(());
            }
            s.buffer_duration
        };

        self.inner.notifications.ensure_running()?;

        let queue = Arc::new(BufferQueue::with_limit(self.inner.max_queued_buffers));
        let request = StreamRequest {
            device_id: self.inner.device_id.clone(),
            format: PcmFormat::PLATFORM,
            buffer_duration,
        };
        let mut handle = self.inner.driver.open(&request).map_err(device_unavailable)?;

        // Publish the fresh queue before callbacks can fire, so the first
        // BufferReady never finds a stale queue.
        let previous = self.inner.session_state.lock().queue.replace(Arc::clone(&queue));

        if let Err(e) = handle.register_callback(self.buffer_callback(queue)) {
            if let Err(close_err) = handle.close() {
                log::warn!("Failed to close stream for '{}' after error: {}", self.inner.name, close_err);
            }
            self.inner.session_state.lock().queue = previous;
            log::error!("Failed to start microphone '{}': {}", self.inner.name, e);
            return Err(device_unavailable(e));
        }

        self.inner.session_state.lock().state = MicrophoneState::Started;
        *native = Some(handle);
        self.inner.diagnostics.record_start();

        log::info!(
            "Microphone '{}' started via {} ({} Hz, buffer {:?})",
            self.inner.name,
            self.inner.driver.name(),
            request.format.sample_rate,
            buffer_duration
        );
        Ok(())
    }

    /// Stop capturing and discard unread data. No-op if already stopped.
    ///
    /// Never fails: teardown errors are logged and the microphone always
    /// ends up stopped. Safe to call from a `BufferReady` listener.
    pub fn stop(&self) {
        let mut native = self.inner.native.lock();

        let queue = {
            let s = self.inner.session_state.lock();
            if s.state.is_stopped() {
                return;
            }
            s.queue.clone()
        };

        if let Some(mut handle) = native.take() {
            if let Err(e) = handle.close() {
                log::warn!("Error closing capture stream for '{}': {}", self.inner.name, e);
            }
        }

        let discarded = queue.map(|q| q.close()).unwrap_or(0);
        self.inner.notifications.cancel_pending();
        self.inner.session_state.lock().state = MicrophoneState::Stopped;

        log::info!(
            "Microphone '{}' stopped ({} unread buffers discarded)",
            self.inner.name,
            discarded
        );
    }

    /// Read the oldest captured chunk into `destination`.
    ///
    /// Same as `get_data_at(destination, 0, destination.len())`.
    pub fn get_data(&self, destination: &mut [u8]) -> Result<usize> {
        let count = destination.len();
        self.get_data_at(destination, 0, count)
    }

    /// Pop the oldest captured chunk and copy up to `count` of its bytes
    /// into `destination[offset..]`.
    ///
    /// Returns the number of bytes copied, or `Ok(0)` if nothing is queued.
    /// The chunk is consumed even if only part of it fits in `count`.
    /// `destination` must be at least as long as the chunk, and `offset`
    /// must fall inside both. A rejected call leaves the chunk queued.
    ///
    /// `offset` positions the write in `destination` only; the copy always
    /// starts at the first byte of the chunk.
    pub fn get_data_at(&self, destination: &mut [u8], offset: usize, count: usize) -> Result<usize> {
        let destination_len = destination.len();
        if destination_len == 0 {
            return Err(ArgumentError::BufferNotInitialized.into());
        }
        if offset >= destination_len {
            return Err(ArgumentError::OffsetOutOfRange {
                offset,
                destination_len,
            }
            .into());
        }
        if !matches!(offset.checked_add(count), Some(end) if end <= destination_len) {
            return Err(ArgumentError::CountOutOfRange {
                offset,
                count,
                destination_len,
            }
            .into());
        }

        let Some(queue) = self.current_queue() else {
            return Ok(0);
        };

        let popped = queue.pop_validated(|head| {
            if destination_len < head.len() {
                return Err(ArgumentError::BufferTooSmall {
                    required: head.len(),
                    actual: destination_len,
                });
            }
            if offset >= head.len() {
                return Err(ArgumentError::OffsetBeyondChunk {
                    offset,
                    buffer_len: head.len(),
                });
            }
            Ok(())
        })?;

        let Some(buffer) = popped else {
            log::trace!("get_data on '{}': queue empty", self.inner.name);
            return Ok(0);
        };

        let copied = count.min(buffer.len());
        destination[offset..offset + copied].copy_from_slice(&buffer.as_bytes()[..copied]);
        Ok(copied)
    }

    fn current_queue(&self) -> Option<Arc<BufferQueue>> {
        self.inner.session_state.lock().queue.clone()
    }

    /// Build the native callback. It only touches the queue, atomics and the
    /// notification channel; it never takes the session or lifecycle locks.
    fn buffer_callback(&self, queue: Arc<BufferQueue>) -> PcmBufferCallback {
        let session = Arc::downgrade(&self.inner);
        let notifier = self.inner.notifications.notifier();
        let diagnostics = Arc::clone(&self.inner.diagnostics);
        let sequence = Arc::clone(&self.inner.sequence);
        let name = self.inner.name.clone();

        Arc::new(move |bytes: &[u8]| {
            if bytes.is_empty() {
                return;
            }
            diagnostics.record_callback(bytes.len());

            // Read before pushing: a stop that lands after the push has
            // bumped the epoch and the notification is discarded.
            let epoch = notifier.epoch();
            match queue.push(RawBuffer::from(bytes)) {
                PushOutcome::Queued => {}
                PushOutcome::QueuedDroppingOldest => {
                    let total = diagnostics.record_dropped(1);
                    if total == 1 || total % OVERFLOW_LOG_INTERVAL == 0 {
                        log::warn!("Microphone '{}' queue full, dropped oldest buffer ({} total)", name, total);
                    }
                }
                PushOutcome::Rejected => {
                    diagnostics.record_dropped(1);
                    log::trace!("Microphone '{}' discarded buffer delivered after stop", name);
                    return;
                }
            }

            let event = BufferReady {
                session: session.clone(),
                sequence: sequence.fetch_add(1, Ordering::Relaxed),
                byte_len: bytes.len(),
            };
            notifier.notify_at(epoch, event);
        })
    }
}

impl fmt::Debug for Microphone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Microphone")
            .field("name", &self.inner.name)
            .field("device_id", &self.inner.device_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for MicrophoneInner {
    fn drop(&mut self) {
        if let Some(mut handle) = self.native.get_mut().take() {
            log::warn!("Microphone '{}' dropped while started; stopping", self.name);
            if let Err(e) = handle.close() {
                log::warn!("Error closing capture stream for '{}': {}", self.name, e);
            }
        }
        if let Some(queue) = self.session_state.get_mut().queue.take() {
            queue.close();
        }
    }
}

/// Start-path errors surface as `DeviceUnavailable` unless the driver
/// reported something more specific the caller can act on.
fn device_unavailable(error: MicrophoneError) -> MicrophoneError {
    match error {
        MicrophoneError::DeviceUnavailable(_) | MicrophoneError::NotSupported(_) => error,
        other => MicrophoneError::DeviceUnavailable(other.to_string()),
    }
}
