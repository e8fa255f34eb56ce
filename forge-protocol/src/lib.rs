//! Shared data model for the assistant runtime core.
//!
//! Every type here is a plain data record with no I/O and no behavior beyond
//! construction/validation helpers. The subsystem crates (credentials,
//! oauth, mcp, models, providers, pty, events) all depend on this crate
//! rather than redefining their own copies of these shapes.

pub mod config;
pub mod events;
pub mod mcp;
pub mod model;
pub mod pty;
pub mod stream;

pub use config::RuntimeConfig;
pub use events::RuntimeEvent;
pub use mcp::{McpAuthRecord, McpConnectionStatus, McpEntry, McpOAuthConfig};
pub use model::{Capabilities, Cost, Limits, Model, ModelStatus, Provider, ProviderSource};
pub use pty::{PtySessionInfo, PtyStatus};
pub use stream::{ContentPart, FinishReason, GenerateResult, StreamPart, Usage};
