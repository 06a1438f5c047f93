//! Tools the agent can call
//!
//! - [`arithmetic`](crate::tools::arithmetic) - `add`, `subtract`, `multiply` over integers
//! - [`registry`](crate::tools::registry) - registration, schema validation, dispatch
//!
//! ```ignore
//! let registry = ToolRegistry::with_arithmetic_tools();
//! let result = registry.execute("add", json!({"a": 40, "b": 12})).await?; // 52
//! ```

/// Integer arithmetic tools.
pub mod arithmetic;
/// Tool registry for managing available tools.
pub mod registry;

pub use registry::{Tool, ToolRegistry};
