pub mod bootstrap;
pub mod conversation;
pub mod repl;

pub use conversation::{ConversationStats, ConversationStore};
