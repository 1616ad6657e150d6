//! Tool capabilities for deliberate.
//!
//! Tools are not built in. Each configured capability is an external
//! tool-provider process spoken to over line-delimited JSON-RPC on its
//! stdin/stdout; the runtime discovers the tools it offers and adapts each
//! one into a [`deliberate_core::Tool`] the reasoning layer can call.

pub mod adapter;
pub mod launch;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod stdio;

pub use adapter::CapabilityTool;
pub use launch::{KNOWN_TYPES, LaunchSpec, capability_name, launch_spec};
pub use runtime::{CapabilityRuntime, ShutdownFailure};
pub use session::{CallOutcome, SessionError, SessionLauncher, SharedSession, ToolSession};
pub use stdio::{StdioLauncher, StdioSession};
