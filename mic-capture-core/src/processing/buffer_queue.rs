use std::collections::VecDeque;

use parking_lot::Mutex;

/// One delivered chunk of raw PCM audio, exactly as the driver handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    bytes: Box<[u8]>,
}

impl RawBuffer {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl From<Vec<u8>> for RawBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for RawBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for RawBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// What happened to a pushed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued, but the queue was full and its oldest buffer was discarded.
    QueuedDroppingOldest,
    /// The queue is closed; the buffer was discarded.
    Rejected,
}

impl PushOutcome {
    pub fn is_queued(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

#[derive(Debug)]
struct QueueState {
    buffers: VecDeque<RawBuffer>,
    open: bool,
    dropped: u64,
}

/// Thread-safe FIFO of raw buffers between the capture callback and the
/// polling consumer.
///
/// Each operation holds the internal lock only for its own duration, so the
/// producer never waits on anything but another single push/pop/clear.
///
/// Overflow behavior (when bounded): drops the oldest buffer.
/// Once closed, pushes are rejected; `close` clears under the same lock a
/// push takes, so no buffer can slip in after it.
#[derive(Debug)]
pub struct BufferQueue {
    state: Mutex<QueueState>,
    max_buffers: Option<usize>,
}

impl BufferQueue {
    /// An unbounded, open queue.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(max_buffers: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                buffers: VecDeque::new(),
                open: true,
                dropped: 0,
            }),
            max_buffers: max_buffers.map(|max| max.max(1)),
        }
    }

    /// Append a buffer to the tail.
    pub fn push(&self, buffer: RawBuffer) -> PushOutcome {
        let mut state = self.state.lock();
        if !state.open {
            state.dropped += 1;
            return PushOutcome::Rejected;
        }

        let mut outcome = PushOutcome::Queued;
        if let Some(max) = self.max_buffers {
            while state.buffers.len() >= max {
                state.buffers.pop_front();
                state.dropped += 1;
                outcome = PushOutcome::QueuedDroppingOldest;
            }
        }
        state.buffers.push_back(buffer);
        outcome
    }

    /// Remove and return the oldest buffer, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<RawBuffer> {
        self.state.lock().buffers.pop_front()
    }

    /// Pop the oldest buffer only if `check` accepts it.
    ///
    /// The head is inspected and removed under one lock acquisition. When
    /// `check` fails the head stays queued and its error is returned.
    pub fn pop_validated<E>(
        &self,
        check: impl FnOnce(&RawBuffer) -> Result<(), E>,
    ) -> Result<Option<RawBuffer>, E> {
        let mut state = self.state.lock();
        let Some(head) = state.buffers.front() else {
            return Ok(None);
        };
        check(head)?;
        Ok(state.buffers.pop_front())
    }

    /// Discard every queued buffer. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.buffers.len();
        state.buffers.clear();
        discarded
    }

    /// Clear the queue and reject all further pushes.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.open = false;
        let discarded = state.buffers.len();
        state.buffers.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffers.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Buffers lost to overflow or pushed after close.
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped
    }

    pub fn max_buffers(&self) -> Option<usize> {
        self.max_buffers
    }
}

impl Default for BufferQueue {
    fn default() -> Self {
        Self::new()
    }
}
