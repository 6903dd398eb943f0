//! In-memory `CaptureDriver` for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::device::Device;
use crate::models::error::{MicrophoneError, Result};
use crate::traits::capture_driver::{CaptureDriver, CaptureHandle, PcmBufferCallback, StreamRequest};

#[derive(Default)]
struct StreamLog {
    active: Mutex<Option<PcmBufferCallback>>,
    last_registered: Mutex<Option<PcmBufferCallback>>,
    requests: Mutex<Vec<StreamRequest>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Fake driver. `deliver` plays the role of the native capture thread.
#[derive(Default)]
pub(crate) struct FakeDriver {
    devices: Mutex<Vec<Device>>,
    fail_enumerate: AtomicBool,
    fail_open: AtomicBool,
    fail_register: AtomicBool,
    fail_close: Arc<AtomicBool>,
    log: Arc<StreamLog>,
}

impl FakeDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_devices(devices: Vec<Device>) -> Arc<Self> {
        let driver = Self::default();
        *driver.devices.lock() = devices;
        Arc::new(driver)
    }

    pub(crate) fn fail_enumerate(&self, fail: bool) {
        self.fail_enumerate.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Invoke the registered callback as the capture thread would.
    /// Returns false if no stream is currently registered.
    pub(crate) fn deliver(&self, bytes: &[u8]) -> bool {
        let callback = self.log.active.lock().clone();
        match callback {
            Some(callback) => {
                callback(bytes);
                true
            }
            None => false,
        }
    }

    /// The most recently registered callback, kept even after close.
    pub(crate) fn last_callback(&self) -> Option<PcmBufferCallback> {
        self.log.last_registered.lock().clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.log.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.log.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.log.active.lock().is_some()
    }

    pub(crate) fn last_request(&self) -> Option<StreamRequest> {
        self.log.requests.lock().last().cloned()
    }
}

impl CaptureDriver for FakeDriver {
    fn name(&self) -> &str {
        "fake"
    }

    fn enumerate(&self) -> Result<Vec<Device>> {
        if self.fail_enumerate.load(Ordering::SeqCst) {
            return Err(MicrophoneError::Enumeration("enumeration service unavailable".into()));
        }
        Ok(self.devices.lock().clone())
    }

    fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureHandle>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(MicrophoneError::DeviceUnavailable(format!(
                "device '{}' was removed",
                request.device_id
            )));
        }
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        self.log.requests.lock().push(request.clone());
        Ok(Box::new(FakeHandle {
            log: Arc::clone(&self.log),
            fail_register: self.fail_register.load(Ordering::SeqCst),
            fail_close: Arc::clone(&self.fail_close),
            closed: false,
        }))
    }
}

struct FakeHandle {
    log: Arc<StreamLog>,
    fail_register: bool,
    fail_close: Arc<AtomicBool>,
    closed: bool,
}

impl CaptureHandle for FakeHandle {
    fn register_callback(&mut self, callback: PcmBufferCallback) -> Result<()> {
        if self.fail_register {
            return Err(MicrophoneError::Unknown("device in exclusive use".into()));
        }
        *self.log.last_registered.lock() = Some(Arc::clone(&callback));
        *self.log.active.lock() = Some(callback);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
            *self.log.active.lock() = None;
        }
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(MicrophoneError::Unknown("stream already torn down by the OS".into()));
        }
        Ok(())
    }
}
