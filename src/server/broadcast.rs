//! Fan-out of status updates to subscribed connections.

use std::collections::VecDeque;

use crate::protocol::SubscriberUpdate;

use super::IoBuffer;

/// Updates queued for every subscriber.
#[derive(Debug, Default)]
pub struct SubscriberBroadcast {
    pending: VecDeque<SubscriberUpdate>,
}

impl SubscriberBroadcast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a tagged message.
    pub fn push(&mut self, tag: &str, message: impl Into<String>) {
        self.push_update(SubscriberUpdate::new(tag, message));
    }

    pub fn push_update(&mut self, update: SubscriberUpdate) {
        tracing::debug!(tag = %update.tag, "Queued broadcast");
        self.pending.push_back(update);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Encode every queued update and append it to each target, in order.
    ///
    /// The queue is emptied even when there are no targets.
    pub fn flush_into<'a>(&mut self, targets: impl IntoIterator<Item = &'a mut IoBuffer>) {
        let mut encoded = Vec::new();
        for update in self.pending.drain(..) {
            match update.to_packet() {
                Ok(packet) => encoded.extend(packet),
                Err(e) => tracing::warn!(tag = %update.tag, error = %e, "Dropping unencodable update"),
            }
        }
        if encoded.is_empty() {
            return;
        }
        for target in targets {
            target.append(&encoded);
        }
    }
}
