//! Tool abstraction for agent capabilities.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use registry::{ToolRegistry, ToolSet, dispatch, register_builtin_tools};
pub use tool::*;
