//! # NoteFabric Tools
//!
//! Capability registry: maps tool names to a compiled input schema and an
//! invocation, and dispatches validated calls. Built-in capabilities live in
//! [`builtin`]; anything implementing [`Tool`] can be registered alongside.

pub mod builtin;
pub mod registry;

pub use notefabric_core::traits::{Tool, ToolContext};
pub use registry::ToolRegistry;

#[cfg(test)]
pub(crate) mod test_support;
