//! Generator provider implementations.

pub mod extractive;
pub mod ollama;

pub use extractive::ExtractiveClient;
pub use ollama::OllamaClient;
