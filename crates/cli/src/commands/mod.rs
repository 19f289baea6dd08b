//! Command handlers for the citewise CLI.

pub mod ask;
pub mod batch;
pub mod index;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use batch::BatchCommand;
pub use index::IndexCommand;
