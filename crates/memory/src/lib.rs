//! Chat memory implementations and history truncation for deliberate.

pub mod in_memory;
pub mod truncate;

pub use in_memory::InMemoryChatMemory;
pub use truncate::{CharHeuristicEstimator, TokenEstimator, estimate_tokens, truncate};
