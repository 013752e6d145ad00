//! Bounded, mutation-ordered conversation history.
//!
//! One mutex covers every read and write: trimming has to observe a
//! consistent view of the whole sequence, so there is no per-field
//! locking. Callers only ever receive cloned snapshots, never a live
//! reference into the history.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use colloquy_types::{ColloquyError, Result};
use uuid::Uuid;

use crate::types::{Message, Role};

/// Capacity used by [`Conversation::default`].
pub const DEFAULT_MAX_MESSAGES: usize = 50;

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Cloneable handle to one shared conversation. Cloning yields another
/// handle to the **same** history.
#[derive(Clone, Debug)]
pub struct Conversation {
    inner: Arc<Mutex<ConversationInner>>,
}

#[derive(Debug)]
struct ConversationInner {
    id: Uuid,
    max_messages: usize,
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation holding at most `max_messages` entries.
    pub fn new(max_messages: usize) -> Result<Self> {
        if max_messages == 0 {
            return Err(ColloquyError::InvalidArgument(
                "max_messages must be positive".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(ConversationInner {
                id: Uuid::new_v4(),
                max_messages,
                messages: Vec::new(),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConversationInner> {
        // A poisoned lock means another thread panicked mid-mutation; the
        // Vec itself is still structurally valid, so keep serving it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.lock().id
    }

    pub fn max_messages(&self) -> usize {
        self.lock().max_messages
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Append a message, then trim if the history exceeds capacity.
    /// A message with no content items is rejected.
    pub fn append(&self, message: Message) -> Result<()> {
        if message.content.is_empty() {
            return Err(ColloquyError::InvalidArgument(
                "message has no content items".into(),
            ));
        }
        let mut inner = self.lock();
        inner.messages.push(message);
        trim(&mut inner);
        Ok(())
    }

    /// Validate `role` against the closed role set, build a plain-text
    /// message, and append it.
    pub fn append_role(&self, role: &str, text: impl Into<String>) -> Result<()> {
        let role: Role = role.parse()?;
        self.append(Message::from_text(role, text))
    }

    /// Immutable copy of the current ordered history. Later mutation of
    /// the conversation does not affect a snapshot already taken.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Remove all messages; capacity is preserved.
    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    /// Remove all messages, then reseed with a single system message.
    pub fn clear_with_system(&self, text: impl Into<String>) {
        let mut inner = self.lock();
        inner.messages.clear();
        inner.messages.push(Message::system(text));
    }

    /// Update capacity and re-trim immediately. May shrink history.
    pub fn set_max_messages(&self, max_messages: usize) -> Result<()> {
        if max_messages == 0 {
            return Err(ColloquyError::InvalidArgument(
                "max_messages must be positive".into(),
            ));
        }
        let mut inner = self.lock();
        inner.max_messages = max_messages;
        trim(&mut inner);
        Ok(())
    }

    /// Drop image content items from every message. Text is kept.
    pub fn strip_images(&self) {
        let mut inner = self.lock();
        for message in &mut inner.messages {
            message.strip_images();
        }
    }

    /// Human-readable `"{role}: {text}"` per message, separated by a
    /// blank line. Empty string for an empty conversation.
    pub fn formatted(&self) -> String {
        self.lock()
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConversationInner {
                id: Uuid::new_v4(),
                max_messages: DEFAULT_MAX_MESSAGES,
                messages: Vec::new(),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Trimming
// ---------------------------------------------------------------------------

/// Keep the history within capacity: retain every system message, then the
/// most recent `max - system_count` non-system messages by timestamp,
/// re-sorted back into chronological order.
///
/// When system messages alone meet or exceed capacity, all of them are
/// kept and every non-system message is dropped; in that pathological
/// configuration the `len <= max_messages` invariant is soft.
fn trim(inner: &mut ConversationInner) {
    if inner.messages.len() <= inner.max_messages {
        return;
    }

    let (system, mut rest): (Vec<Message>, Vec<Message>) = inner
        .messages
        .drain(..)
        .partition(|m| m.role == Role::System);

    let keep = inner.max_messages.saturating_sub(system.len());
    rest.sort_by_key(|m| m.timestamp);
    let retained = rest.split_off(rest.len().saturating_sub(keep));

    inner.messages = system.into_iter().chain(retained).collect();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
