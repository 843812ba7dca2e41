//! Named-channel publish/subscribe used by components and script instances
//!
//! Channels are plain strings. Scoped variants follow the `<base>:<name>`
//! convention (`create:player`, `attr:speed`) so observers written against the
//! generic channel and the scoped one receive the same payload.

use std::collections::HashMap;
use std::fmt;

/// Handle returned by [`EventEmitter::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Build the scoped channel name for `base` and `name`
pub fn scoped(base: &str, name: &str) -> String {
    format!("{base}:{name}")
}

/// A set of listeners keyed by channel name
///
/// `H` is the (unsized) listener type, usually a `dyn FnMut(&Event)`. Firing
/// takes a closure that invokes each listener, which lets payloads borrow from
/// the emitter's owner.
pub struct EventEmitter<H: ?Sized> {
    channels: HashMap<String, Vec<(ListenerId, Box<H>)>>,
    next_id: u64,
}

impl<H: ?Sized> EventEmitter<H> {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            next_id: 0,
        }
    }

    /// Subscribe a listener to a channel
    pub fn on(&mut self, channel: impl Into<String>, listener: Box<H>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.channels
            .entry(channel.into())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener; returns whether it was subscribed to `channel`
    pub fn off(&mut self, channel: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.channels.get_mut(channel) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    /// Whether anything listens on `channel`
    pub fn has_listeners(&self, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|listeners| !listeners.is_empty())
    }

    /// Number of listeners on `channel`
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Invoke every listener of `channel` in subscription order
    pub fn fire(&mut self, channel: &str, mut invoke: impl FnMut(&mut H)) {
        if let Some(listeners) = self.channels.get_mut(channel) {
            for (_, listener) in listeners.iter_mut() {
                invoke(listener.as_mut());
            }
        }
    }
}

impl<H: ?Sized> Default for EventEmitter<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for EventEmitter<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels: Vec<(&str, usize)> = self
            .channels
            .iter()
            .map(|(name, listeners)| (name.as_str(), listeners.len()))
            .collect();
        channels.sort_unstable();
        f.debug_struct("EventEmitter")
            .field("channels", &channels)
            .finish()
    }
}
