//! Token estimation module
//!
//! Provides input token estimates for routing using tiktoken-rs.

pub mod counter;

pub use counter::{heuristic_token_estimate, SharedTokenCounter, TokenCounter};
