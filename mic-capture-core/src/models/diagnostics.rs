use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a microphone's counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MicrophoneDiagnostics {
    pub callback_count: u64,
    pub bytes_captured: u64,
    /// Buffers evicted by the queue bound or delivered after stop.
    pub buffers_dropped: u64,
    pub start_count: u64,
}

/// Lock-free counters updated from the capture callback.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticsCounters {
    callback_count: AtomicU64,
    bytes_captured: AtomicU64,
    buffers_dropped: AtomicU64,
    start_count: AtomicU64,
}

impl DiagnosticsCounters {
    pub(crate) fn record_callback(&self, bytes: usize) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_captured.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Returns the running total.
    pub(crate) fn record_dropped(&self, count: u64) -> u64 {
        self.buffers_dropped.fetch_add(count, Ordering::Relaxed) + count
    }

    pub(crate) fn record_start(&self) {
        self.start_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MicrophoneDiagnostics {
        MicrophoneDiagnostics {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
            start_count: self.start_count.load(Ordering::Relaxed),
        }
    }
}
