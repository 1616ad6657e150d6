//! # Deliberate Core
//!
//! Domain types, traits, and error definitions for the deliberate reasoning layer.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the reasoning pipeline talks to is a trait here:
//! - [`Provider`]: the language-model invocation
//! - [`Tool`]: one externally provided callable capability
//! - [`ChatMemory`]: per-conversation message history
//!
//! Implementations live in their respective crates, so the advisor chain can
//! be exercised against scripted stand-ins in tests.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{CapabilityError, Error, MemoryError, ProviderError, Result, ToolError};
pub use memory::ChatMemory;
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{Tool, ToolCall, ToolDescriptor, ToolRegistry, ToolResult};
