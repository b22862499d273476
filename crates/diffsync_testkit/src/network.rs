//! Simulated links that lose messages.

use std::collections::VecDeque;

/// A one-way link that drops messages according to a script.
///
/// Each transmission consumes one script entry; `true` drops the message.
/// Once the script runs out the link is reliable.
#[derive(Debug, Clone, Default)]
pub struct LossyLink {
    script: VecDeque<bool>,
    delivered: usize,
    dropped: usize,
}

impl LossyLink {
    /// Creates a link that never drops.
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Creates a link that follows `drops` and then becomes reliable.
    pub fn scripted(drops: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: drops.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sends `message` across the link, returning it if it arrives.
    pub fn transmit<T>(&mut self, message: T) -> Option<T> {
        if self.script.pop_front().unwrap_or(false) {
            self.dropped += 1;
            tracing::debug!(dropped = self.dropped, "link dropped a message");
            None
        } else {
            self.delivered += 1;
            Some(message)
        }
    }

    /// Drops the next message regardless of the script.
    pub fn fail_next(&mut self) {
        self.script.push_front(true);
    }

    /// Returns the number of messages that arrived.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Returns the number of messages that were lost.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
