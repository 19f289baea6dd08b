//! Rerank provider implementations.

pub mod http;
pub mod lexical;

pub use http::HttpReranker;
pub use lexical::LexicalReranker;
