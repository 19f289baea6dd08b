//! Generator integration for citewise.
//!
//! This crate provides a provider-agnostic abstraction over the text
//! generators the answer pipeline talks to.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Extractive**: Offline and deterministic; quotes the first excerpt of the prompt
//!
//! # Example
//! ```no_run
//! use citewise_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{ExtractiveClient, OllamaClient};
pub use types::ProviderType;
