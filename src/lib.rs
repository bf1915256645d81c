//! toolhost - tool loading and session wiring for agent hosts
//!
//! Tool configs are discovered from JSON/YAML files and turned into callable
//! tool handles by type-specific adapters (in-process native functions, or
//! remote tool servers over stdio or HTTP). Everything an adapter opens is
//! registered with a `ResourceStack` and released in reverse order. A
//! `SessionProxy` persists conversation messages only once it is bound to a
//! context and a real session is active.

pub mod error;
pub mod id;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod resources;
pub mod session;
pub mod tools;

pub use error::{Result, ToolhostError};
