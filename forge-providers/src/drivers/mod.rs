pub mod anthropic;
pub mod chat_completions;
pub mod ollama;
