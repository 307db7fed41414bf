//! Multicast lifecycle notifications.

/// Multicast signal: an explicit list of subscriber callbacks, invoked
/// synchronously in registration order.
///
/// Owned by the session that raises it; there is no global registry. The
/// emitted value is the session's id rather than a session reference, so a
/// subscriber can never observe a session that has already been destroyed.
pub struct Signal<T> {
    slots: Vec<Box<dyn FnMut(T) + Send>>,
}

impl<T: Copy> Signal<T> {
    /// Create a signal with no subscribers.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register a subscriber. Subscribers are never removed; they live as
    /// long as the signal's owner.
    pub fn connect<F>(&mut self, slot: F)
    where
        F: FnMut(T) + Send + 'static,
    {
        self.slots.push(Box::new(slot));
    }

    /// Invoke every subscriber with `value`, in registration order.
    pub fn emit(&mut self, value: T) {
        for slot in &mut self.slots {
            slot(value);
        }
    }

    /// True when nothing is subscribed.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T: Copy> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.slots.len())
            .finish()
    }
}
