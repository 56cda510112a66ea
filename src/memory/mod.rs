//! Per-user answer memory.
//!
//! A question is reduced to a lookup key made of its first `key_chars`
//! characters. A stored entry matches when its full question text contains
//! that key, so a short new question can hit an older, longer one. Among
//! several matches the oldest entry (lowest id) wins.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::database::{MemoryEntry, ShapiroDatabase};

pub const DEFAULT_KEY_CHARS: usize = 20;

/// First `key_chars` characters of `question`, counted as Unicode scalars.
pub fn memory_key(question: &str, key_chars: usize) -> &str {
    match question.char_indices().nth(key_chars) {
        Some((byte_idx, _)) => &question[..byte_idx],
        None => question,
    }
}

#[derive(Clone)]
pub struct AnswerStore {
    db: Arc<ShapiroDatabase>,
    key_chars: usize,
}

impl AnswerStore {
    pub fn new(db: Arc<ShapiroDatabase>, key_chars: usize) -> Self {
        Self { db, key_chars }
    }

    /// Remembered entry for this user whose question contains the key of `question`.
    pub fn lookup(&self, user_id: i64, question: &str) -> Result<Option<MemoryEntry>> {
        let key = memory_key(question, self.key_chars);
        self.db.find_memory_containing(user_id, key)
    }

    /// Store a fresh answer. Entries are never merged, so several rows may
    /// share a key.
    pub fn record(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.db.insert_memory(user_id, question, answer, now)
    }

    pub fn count_for_user(&self, user_id: i64) -> Result<usize> {
        self.db.count_memories(user_id)
    }
}
