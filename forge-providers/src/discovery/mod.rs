pub mod ollama;
pub mod owiseman;
