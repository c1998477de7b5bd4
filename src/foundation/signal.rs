//! Subscription lists used to publish scheduler changes (state, frame, duration, results).

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Broadcast of discrete events without caching.
pub struct EventDispatcher<T> {
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
    next_id: u64,
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> EventDispatcher<T> {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked on every dispatch, in subscription order.
    pub fn subscribe(&mut self, f: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Remove a callback. Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Invoke every subscriber with `value`.
    pub fn dispatch(&mut self, value: &T) {
        for (_, f) in &mut self.subscribers {
            f(value);
        }
    }

    /// Number of active subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Return `true` when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Dispatcher that caches the last published value.
///
/// New subscribers are called immediately with the current value.
pub struct ValueDispatcher<T> {
    current: T,
    events: EventDispatcher<T>,
}

impl<T> ValueDispatcher<T> {
    /// Create a dispatcher holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            current: initial,
            events: EventDispatcher::new(),
        }
    }

    /// The last published value.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Replace the value as a whole and notify subscribers.
    pub fn set(&mut self, value: T) {
        self.current = value;
        self.events.dispatch(&self.current);
    }

    /// Subscribe and immediately receive the current value.
    pub fn subscribe(&mut self, mut f: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        f(&self.current);
        self.events.subscribe(f)
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl<T: Copy> ValueDispatcher<T> {
    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.current
    }
}
