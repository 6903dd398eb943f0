use crate::session::microphone::BufferReady;

/// Receives "buffer ready" notifications from a microphone.
///
/// Called on the notification dispatcher thread, never on the capture
/// thread. Listeners may call back into the microphone, including `stop()`.
pub trait BufferReadyListener: Send + Sync {
    fn on_buffer_ready(&self, event: &BufferReady);
}

impl<F> BufferReadyListener for F
where
    F: Fn(&BufferReady) + Send + Sync,
{
    fn on_buffer_ready(&self, event: &BufferReady) {
        self(event)
    }
}
