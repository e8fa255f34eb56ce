//! PTY multiplexer (C6): spawns and owns pseudo-terminal child processes,
//! buffers their output with bounded memory, and fans each stream out to an
//! arbitrary number of live subscribers with late-join replay.

mod error;
mod multiplexer;
mod process;
mod session;
pub mod shell;

pub use error::PtyError;
pub use multiplexer::PtyMultiplexer;
