//! Conversation context cache
//!
//! In-process map from conversation id to its recent turns. Two eviction
//! mechanisms apply independently:
//!
//! - **Expiry**: a record idle for longer than the TTL is dropped. Expiry is
//!   checked on every access instead of by a sweeper task, so an expired record
//!   is never handed out and an idle cache does no work.
//! - **Capacity**: inserting a new conversation into a full cache evicts the
//!   least recently updated records until exactly one slot is free. Recency
//!   is a per-cache sequence number, not the wall clock.
//!
//! All operations take a single lock, so turns within a conversation are
//! appended in arrival order and readers never see a half-applied update.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use voice_dialogue_config::ConversationConfig;
use voice_dialogue_core::{ConversationRecord, TurnRole};

/// A record plus the cache's own bookkeeping
///
/// `touched` drives expiry and `sequence` drives eviction order. Both come
/// from monotonic sources, so a wall-clock step cannot reorder conversations.
struct Entry {
    record: ConversationRecord,
    touched: Instant,
    sequence: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    next_sequence: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

/// Bounded, lazily expiring conversation store
pub struct ConversationCache {
    state: Mutex<CacheState>,
    max_turns: usize,
    max_conversations: usize,
    ttl: Duration,
}

impl ConversationCache {
    /// Create a cache
    ///
    /// `max_turns` and `max_conversations` are clamped to at least 1.
    pub fn new(max_turns: usize, max_conversations: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_turns: max_turns.max(1),
            max_conversations: max_conversations.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(config.max_turns, config.max_conversations, config.ttl())
    }

    /// Return the live record for `id`, creating an empty one if absent or expired
    pub fn get_or_create(&self, id: &str) -> ConversationRecord {
        let mut state = self.state.lock();
        self.purge_expired(&mut state, Instant::now());
        self.entry(&mut state, id).record.clone()
    }

    /// Look up a live record without creating one
    pub fn get(&self, id: &str) -> Option<ConversationRecord> {
        let mut state = self.state.lock();
        self.purge_expired(&mut state, Instant::now());
        state.entries.get(id).map(|entry| entry.record.clone())
    }

    /// Append a turn, creating the conversation if needed
    ///
    /// Oldest turns beyond `max_turns` are dropped and the conversation
    /// becomes the most recently updated one. Returns a snapshot of the
    /// record after the append.
    pub fn append_turn(&self, id: &str, role: TurnRole, content: &str) -> ConversationRecord {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.purge_expired(&mut state, now);

        let sequence = state.tick();
        let max_turns = self.max_turns;
        let entry = self.entry(&mut state, id);
        entry.record.push_turn(role, content, max_turns);
        entry.touched = now;
        entry.sequence = sequence;
        entry.record.clone()
    }

    /// Remove a conversation; true if a live record was removed
    pub fn clear(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        self.purge_expired(&mut state, Instant::now());
        let removed = state.entries.remove(id).is_some();
        if removed {
            tracing::debug!(conversation_id = %id, "Conversation cleared");
        }
        removed
    }

    /// Number of live conversations
    pub fn count(&self) -> usize {
        let mut state = self.state.lock();
        self.purge_expired(&mut state, Instant::now());
        state.entries.len()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn max_conversations(&self) -> usize {
        self.max_conversations
    }

    fn entry<'a>(&self, state: &'a mut CacheState, id: &str) -> &'a mut Entry {
        if !state.entries.contains_key(id) {
            self.evict_for_insert(state);
            tracing::debug!(conversation_id = %id, "Conversation created");
        }

        let CacheState { entries, next_sequence } = state;
        entries.entry(id.to_string()).or_insert_with(|| {
            *next_sequence += 1;
            Entry {
                record: ConversationRecord::new(id),
                touched: Instant::now(),
                sequence: *next_sequence,
            }
        })
    }

    fn purge_expired(&self, state: &mut CacheState, now: Instant) {
        let before = state.entries.len();
        let ttl = self.ttl;
        state
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.touched) <= ttl);

        let expired = before - state.entries.len();
        if expired > 0 {
            tracing::debug!(expired, remaining = state.entries.len(), "Expired conversations dropped");
        }
    }

    /// Make room for exactly one insertion
    fn evict_for_insert(&self, state: &mut CacheState) {
        if state.entries.len() < self.max_conversations {
            return;
        }

        let excess = state.entries.len() - self.max_conversations + 1;
        let mut by_age: Vec<(u64, String)> = state
            .entries
            .iter()
            .map(|(id, entry)| (entry.sequence, id.clone()))
            .collect();
        by_age.sort();

        for (_, id) in by_age.into_iter().take(excess) {
            state.entries.remove(&id);
            tracing::debug!(conversation_id = %id, "Evicted least recently updated conversation");
        }
    }
}
