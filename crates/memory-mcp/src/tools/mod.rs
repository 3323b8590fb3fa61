//! MCP Tools
//!
//! Tool implementations exposed by the server, one module per unified tool.

pub mod analyzer;
pub mod lifecycle;
pub mod memory;
