//! In-memory conversation store with FIFO pruning.
//!
//! One [`Conversation`] per id, each an ordered, append-only sequence of
//! [`Entry`] records. Appends beyond the configured bound prune from the
//! front so the most recent turns always survive. Lifecycle is
//! process-local: nothing is persisted.
//!
//! Concurrency: requests touch only their own conversation id, but the
//! store itself is safe for concurrent distinct-id access. A single mutex
//! over the map is sufficient at this scale; per-entry work is cheap.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::Role;

/// One recorded turn in a conversation.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Who authored the turn
    pub role: Role,

    /// Textual content
    pub content: String,

    /// Wall-clock append time
    pub timestamp: DateTime<Utc>,

    /// Ids of tool calls executed while producing this turn
    pub tool_call_ids: Vec<String>,
}

impl Entry {
    /// Creates an entry stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_call_ids: Vec::new(),
        }
    }

    /// Attaches tool-call references to the entry.
    pub fn with_tool_calls(mut self, ids: Vec<String>) -> Self {
        self.tool_call_ids = ids;
        self
    }
}

#[derive(Debug, Default)]
struct Conversation {
    entries: Vec<Entry>,
    last_activity: Option<DateTime<Utc>>,
}

/// Per-conversation turn history with a bounded length.
#[derive(Debug)]
pub struct ConversationStore {
    inner: Mutex<HashMap<String, Conversation>>,
    max_entries: usize,
}

impl ConversationStore {
    /// Creates a store pruning each conversation to `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// Appends an entry, creating the conversation if absent, then prunes
    /// from the front until the length bound holds.
    pub fn append(&self, id: &str, entry: Entry) {
        let mut map = self.inner.lock().expect("conversation store poisoned");
        let conversation = map.entry(id.to_string()).or_default();

        conversation.last_activity = Some(entry.timestamp);
        conversation.entries.push(entry);

        if conversation.entries.len() > self.max_entries {
            let excess = conversation.entries.len() - self.max_entries;
            conversation.entries.drain(0..excess);
            log::debug!("Pruned {} entries from conversation {}", excess, id);
        }
    }

    /// Returns the last `n` entries (fewer if the conversation is shorter).
    pub fn recent(&self, id: &str, n: usize) -> Vec<Entry> {
        let map = self.inner.lock().expect("conversation store poisoned");
        match map.get(id) {
            Some(conversation) => {
                let start = conversation.entries.len().saturating_sub(n);
                conversation.entries[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Returns the full ordered entry list.
    pub fn all(&self, id: &str) -> Vec<Entry> {
        let map = self.inner.lock().expect("conversation store poisoned");
        map.get(id)
            .map(|c| c.entries.clone())
            .unwrap_or_default()
    }

    /// When the conversation last received an entry.
    pub fn last_activity(&self, id: &str) -> Option<DateTime<Utc>> {
        let map = self.inner.lock().expect("conversation store poisoned");
        map.get(id).and_then(|c| c.last_activity)
    }

    /// Number of entries currently held for `id`.
    pub fn len(&self, id: &str) -> usize {
        let map = self.inner.lock().expect("conversation store poisoned");
        map.get(id).map(|c| c.entries.len()).unwrap_or(0)
    }

    /// Whether the conversation is absent or empty.
    pub fn is_empty(&self, id: &str) -> bool {
        self.len(id) == 0
    }

    /// Removes one conversation.
    pub fn clear(&self, id: &str) {
        let mut map = self.inner.lock().expect("conversation store poisoned");
        map.remove(id);
    }

    /// Removes every conversation.
    pub fn clear_all(&self) {
        let mut map = self.inner.lock().expect("conversation store poisoned");
        map.clear();
    }

    /// Advisory token estimate for a conversation (1 token ≈ 4 characters).
    ///
    /// Never used to gate pruning; the length bound alone governs that.
    pub fn estimate_tokens(&self, id: &str) -> usize {
        let map = self.inner.lock().expect("conversation store poisoned");
        let Some(conversation) = map.get(id) else {
            return 0;
        };
        let chars: usize = conversation
            .entries
            .iter()
            .map(|e| e.content.len() + 8)
            .sum();
        (chars + 3) / 4
    }
}
