//! Top-level wiring for the assistant runtime core: a credential store
//! (C1), OAuth-capable MCP manager (C2/C3), model registry (C4), provider
//! adapter (C5), PTY multiplexer (C6), and the event bus (C7) connecting
//! them, assembled behind a single [`Runtime`] handle.

mod error;
pub mod logging;
mod runtime;

pub use error::RuntimeError;
pub use runtime::{RegistryInputs, Runtime};
