//! OpenAI-compatible chat-completions client.
pub mod client;
pub mod wire;

pub use client::ChatClient;
