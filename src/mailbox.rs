//! Per-connection mailbox snapshot
//!
//! Captured once right after a successful PASS: the ordered inbox
//! listing plus the raw body of every listed message. All later reads
//! are served from this copy. Message N on the wire is entry N-1
//! here, and the numbering never shifts — deletions mark the remote
//! message gone but never shrink the snapshot.

use sha2::{Digest, Sha256};

/// One message in the snapshot.
#[derive(Debug, Clone)]
pub struct MessageEntry {
    id: String,
    body: String,
    delete_requested: bool,
}

impl MessageEntry {
    /// Backend message identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw message source as fetched from the backend.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Message size in octets, as reported by STAT and LIST.
    #[must_use]
    pub const fn octets(&self) -> usize {
        self.body.len()
    }

    /// Whether a deletion request was already issued for this entry.
    #[must_use]
    pub const fn delete_requested(&self) -> bool {
        self.delete_requested
    }

    /// Persistent identifier reported by UIDL: hex of the first 8
    /// bytes of SHA-256 over the backend message id. Stable across
    /// connections and safely within POP3's printable 70-char token
    /// limit, whatever the backend puts in its ids.
    #[must_use]
    pub fn uidl(&self) -> String {
        let digest = Sha256::digest(self.id.as_bytes());
        let head: [u8; 8] = digest[..8].try_into().unwrap_or_default();
        format!("{:016x}", u64::from_be_bytes(head))
    }
}

/// The per-connection message cache backing STAT, LIST, UIDL and
/// RETR.
#[derive(Debug, Clone, Default)]
pub struct MailboxSnapshot {
    entries: Vec<MessageEntry>,
}

impl MailboxSnapshot {
    /// Build a snapshot from `(backend id, raw body)` pairs, in inbox
    /// order.
    #[must_use]
    pub fn new(messages: Vec<(String, String)>) -> Self {
        let entries = messages
            .into_iter()
            .map(|(id, body)| MessageEntry {
                id,
                body,
                delete_requested: false,
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all message sizes, for STAT.
    #[must_use]
    pub fn total_octets(&self) -> usize {
        self.entries.iter().map(MessageEntry::octets).sum()
    }

    /// Entry for a 1-based message number.
    #[must_use]
    pub fn get(&self, number: usize) -> Option<&MessageEntry> {
        number
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }

    /// Latch the delete flag on a message. Returns `true` only the
    /// first time, so a repeated RETR never re-triggers a backend
    /// deletion.
    pub fn mark_delete_requested(&mut self, number: usize) -> bool {
        let Some(entry) = number
            .checked_sub(1)
            .and_then(|index| self.entries.get_mut(index))
        else {
            return false;
        };
        if entry.delete_requested {
            false
        } else {
            entry.delete_requested = true;
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter()
    }
}
