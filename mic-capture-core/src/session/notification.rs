use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::models::error::{MicrophoneError, Result};

/// A subscribed callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

enum Message<E> {
    Deliver { epoch: u64, event: E },
    Shutdown,
}

struct Shared<E> {
    listeners: RwLock<Vec<(SubscriptionId, Listener<E>)>>,
    epoch: AtomicU64,
}

/// Subscription registry with off-thread delivery.
///
/// `notify` only enqueues; a dedicated dispatcher thread invokes listeners,
/// so a slow listener never stalls whoever is notifying. Envelopes are
/// tagged with the epoch current at enqueue time and `cancel_pending`
/// bumps the epoch, discarding everything still in flight.
///
/// ```text
/// [producer] --notify--> [unbounded channel] --> [dispatcher] --> listeners
/// ```
pub struct NotificationSink<E: Send + 'static> {
    shared: Arc<Shared<E>>,
    sender: Sender<Message<E>>,
    receiver: Receiver<Message<E>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    thread_name: String,
}

impl<E: Send + 'static> NotificationSink<E> {
    pub fn new(thread_name: impl Into<String>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                listeners: RwLock::new(Vec::new()),
                epoch: AtomicU64::new(0),
            }),
            sender,
            receiver,
            dispatcher: Mutex::new(None),
            next_id: AtomicU64::new(1),
            thread_name: thread_name.into(),
        }
    }

    pub fn subscribe(&self, listener: Listener<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.write().push((id, listener));
        log::debug!("{}: subscribed listener {:?}", self.thread_name, id);
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }

    /// Spawn the dispatcher thread if it is not running yet.
    pub fn ensure_running(&self) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return Ok(());
        }

        let receiver = self.receiver.clone();
        let shared = Arc::clone(&self.shared);
        let name = self.thread_name.clone();
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || dispatch_loop(&name, receiver, shared))
            .map_err(|e| MicrophoneError::Unknown(format!("failed to spawn notification thread: {}", e)))?;

        *dispatcher = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.lock().is_some()
    }

    /// Enqueue `event` for delivery. Never blocks.
    pub fn notify(&self, event: E) {
        self.notifier().notify(event);
    }

    /// A cloneable enqueue-only handle for use on other threads.
    pub fn notifier(&self) -> Notifier<E> {
        Notifier {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Discard every event enqueued before this call.
    pub fn cancel_pending(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl<E: Send + 'static> Drop for NotificationSink<E> {
    fn drop(&mut self) {
        self.cancel_pending();
        let Some(handle) = self.dispatcher.get_mut().take() else {
            return;
        };
        let _ = self.sender.send(Message::Shutdown);

        // Dropped from inside a listener: the loop exits on its own once
        // the listener returns and it reads the shutdown message.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("{}: dispatcher thread panicked", self.thread_name);
        }
    }
}

/// Enqueue-only side of a `NotificationSink`.
pub struct Notifier<E> {
    sender: Sender<Message<E>>,
    shared: Arc<Shared<E>>,
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> Notifier<E> {
    /// The current cancellation epoch.
    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    pub fn notify(&self, event: E) {
        self.notify_at(self.epoch(), event);
    }

    /// Enqueue `event` as belonging to `epoch`. If `cancel_pending` has run
    /// since `epoch` was read, the event is discarded by the dispatcher.
    pub fn notify_at(&self, epoch: u64, event: E) {
        // Fails only once the sink and its dispatcher are gone.
        let _ = self.sender.send(Message::Deliver { epoch, event });
    }
}

fn dispatch_loop<E>(name: &str, receiver: Receiver<Message<E>>, shared: Arc<Shared<E>>) {
    log::debug!("{}: dispatcher started", name);

    while let Ok(message) = receiver.recv() {
        let (epoch, event) = match message {
            Message::Shutdown => break,
            Message::Deliver { epoch, event } => (epoch, event),
        };

        let listeners: Vec<Listener<E>> = shared
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            // A listener may have cancelled (e.g. stopped the session).
            if shared.epoch.load(Ordering::SeqCst) != epoch {
                log::trace!("{}: dropping cancelled notification", name);
                break;
            }
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                log::error!("{}: listener panicked", name);
            }
        }
    }

    log::debug!("{}: dispatcher stopped", name);
}
