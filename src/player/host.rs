use std::sync::{Arc, Mutex};

/// Handle of one pending host frame request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Display-frame scheduler of the embedding host.
///
/// The host answers each request by calling [`crate::Player::on_frame`] once with the same id.
pub trait FrameHost: Send {
    /// Ask for a callback on the next display frame.
    fn request_frame(&mut self) -> RequestId;

    /// Withdraw a pending request.
    fn cancel(&mut self, id: RequestId);
}

#[derive(Debug, Default)]
struct ManualHostInner {
    next: u64,
    pending: Option<RequestId>,
    requests: u64,
    cancelled: Vec<RequestId>,
}

/// Headless host whose frames fire only when the owner says so.
///
/// Clones share state, so one clone can be handed to the player while another drives it.
#[derive(Clone, Debug, Default)]
pub struct ManualHost {
    inner: Arc<Mutex<ManualHostInner>>,
}

impl ManualHost {
    /// Create a host with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pending request, if any, for the owner to fire.
    pub fn take_pending(&self) -> Option<RequestId> {
        self.lock().pending.take()
    }

    /// The pending request, without taking it.
    pub fn pending(&self) -> Option<RequestId> {
        self.lock().pending
    }

    /// Total number of requests made.
    pub fn requests(&self) -> u64 {
        self.lock().requests
    }

    /// Requests withdrawn by the player.
    pub fn cancelled(&self) -> Vec<RequestId> {
        self.lock().cancelled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualHostInner> {
        // A poisoned lock only means another clone panicked mid-update; the counters stay usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FrameHost for ManualHost {
    fn request_frame(&mut self) -> RequestId {
        let mut inner = self.lock();
        let id = RequestId(inner.next);
        inner.next += 1;
        inner.requests += 1;
        inner.pending = Some(id);
        id
    }

    fn cancel(&mut self, id: RequestId) {
        let mut inner = self.lock();
        if inner.pending == Some(id) {
            inner.pending = None;
        }
        inner.cancelled.push(id);
    }
}
