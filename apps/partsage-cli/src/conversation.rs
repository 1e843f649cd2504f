//! Per-thread conversation history owned by the CLI. The assistant only ever
//! sees a borrowed slice of it.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use partsage_core::types::{Role, ThreadId, Turn};

#[derive(Debug, Clone)]
struct Conversation {
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Conversation {
    fn started(now: DateTime<Utc>) -> Self { Self { turns: Vec::new(), created_at: now, updated_at: now } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationStats {
    pub thread_id: ThreadId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub user_messages: usize,
    pub assistant_messages: usize,
    /// Rough token count, 1.3 per whitespace-separated word.
    pub estimated_tokens: usize,
}

impl ConversationStats {
    pub fn total_messages(&self) -> usize { self.user_messages + self.assistant_messages }
}

pub struct ConversationStore {
    threads: HashMap<ThreadId, Conversation>,
    max_age: Duration,
    next_id: u64,
}

impl ConversationStore {
    pub fn new(max_age_hours: i64) -> Self { Self { threads: HashMap::new(), max_age: Duration::hours(max_age_hours), next_id: 0 } }

    pub fn create(&mut self) -> ThreadId {
        self.next_id += 1;
        let id = format!("thread-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), self.next_id);
        self.threads.insert(id.clone(), Conversation::started(Utc::now()));
        id
    }

    /// Oldest first. Unknown threads have no history.
    pub fn history(&self, thread_id: &str) -> &[Turn] { self.threads.get(thread_id).map(|c| c.turns.as_slice()).unwrap_or(&[]) }

    pub fn append_exchange(&mut self, thread_id: &str, user: &str, assistant: &str) {
        let conversation = self
            .threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Conversation::started(Utc::now()));
        conversation.turns.push(Turn::user(user));
        conversation.turns.push(Turn::assistant(assistant));
        conversation.updated_at = Utc::now();
    }

    /// Drops the last user/assistant pair and returns the user message so it
    /// can be asked again.
    pub fn remove_last_exchange(&mut self, thread_id: &str) -> Option<String> {
        let conversation = self.threads.get_mut(thread_id)?;
        let n = conversation.turns.len();
        if n < 2 || conversation.turns[n - 2].role != Role::User || conversation.turns[n - 1].role != Role::Assistant {
            return None;
        }
        conversation.turns.pop();
        let user = conversation.turns.pop().map(|t| t.content);
        conversation.updated_at = Utc::now();
        user
    }

    pub fn reset(&mut self, thread_id: &str) -> bool {
        match self.threads.get_mut(thread_id) {
            Some(conversation) => {
                conversation.turns.clear();
                conversation.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Removes threads idle for longer than the configured age.
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.threads.len();
        let max_age = self.max_age;
        self.threads.retain(|_, c| now - c.updated_at <= max_age);
        before - self.threads.len()
    }

    pub fn stats(&self, thread_id: &str) -> Option<ConversationStats> {
        let conversation = self.threads.get(thread_id)?;
        let user_messages = conversation.turns.iter().filter(|t| t.role == Role::User).count();
        let words: usize = conversation.turns.iter().map(|t| t.content.split_whitespace().count()).sum();
        Some(ConversationStats {
            thread_id: thread_id.to_string(),
            created_at: conversation.created_at,
            last_activity: conversation.updated_at,
            user_messages,
            assistant_messages: conversation.turns.len() - user_messages,
            estimated_tokens: words * 13 / 10,
        })
    }

    /// Every live thread, most recently active first.
    pub fn threads(&self) -> Vec<ConversationStats> {
        let mut all: Vec<ConversationStats> = self.threads.keys().filter_map(|id| self.stats(id)).collect();
        all.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then_with(|| b.thread_id.cmp(&a.thread_id)));
        all
    }

    pub fn len(&self) -> usize { self.threads.len() }
    pub fn is_empty(&self) -> bool { self.threads.is_empty() }
}
