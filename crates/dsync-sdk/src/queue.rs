//! Outbound queue for work produced while disconnected.
//!
//! Entries are drained first-in-first-out on reconnect, whatever their kind,
//! so a document's registration always reaches the peer before its edits.
//!
//! Edits for a document whose latest queued entry is already a patch from
//! the same client are folded into that entry instead of being appended:
//!
//! ```text
//! sync(a) offline   [Patch a {d1}]
//! sync(a) offline   [Patch a {d1 ∘ d2}]
//! add(b)  offline   [Patch a {d1 ∘ d2}, Add b]
//! ```

use dsync_core::{DocumentId, Message, PatchMessage, Strategy};
use std::collections::VecDeque;

/// Pending outbound messages.
#[derive(Debug, Clone)]
pub struct SendQueue<C, D> {
    entries: VecDeque<Message<C, D>>,
}

impl<C, D> Default for SendQueue<C, D> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<C, D> SendQueue<C, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry without coalescing.
    pub fn push(&mut self, message: Message<C, D>) {
        self.entries.push_back(message);
    }

    /// Queue an edit, coalescing it into the latest entry for the same
    /// document when that entry is a patch from the same client.
    ///
    /// Returns `true` when the edit was coalesced.
    pub fn push_patch<S>(&mut self, msg: PatchMessage<D>, strategy: &S) -> bool
    where
        S: Strategy<Content = C, Diff = D>,
    {
        let latest = self
            .entries
            .iter_mut()
            .rev()
            .find(|entry| entry.id() == &msg.id);

        if let Some(Message::Patch(queued)) = latest {
            if queued.client_id == msg.client_id {
                for edit in msg.edits {
                    match queued.edits.last_mut() {
                        Some(last) => {
                            let diffs = std::mem::take(&mut last.diffs);
                            last.diffs = strategy.compose(diffs, edit.diffs);
                        }
                        None => queued.edits.push(edit),
                    }
                }
                return true;
            }
        }

        self.entries.push_back(Message::Patch(msg));
        false
    }

    pub fn pop_front(&mut self) -> Option<Message<C, D>> {
        self.entries.pop_front()
    }

    /// Put an entry back at the head, e.g. after a failed send.
    pub fn push_front(&mut self, message: Message<C, D>) {
        self.entries.push_front(message);
    }

    /// Drop every queued entry for a document, registrations included.
    pub fn remove_document(&mut self, id: &DocumentId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id() != id);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message<C, D>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
