//! Tool registry: schema-validated dispatch by name.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::JSONSchema;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::Value;

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: JSONSchema,
}

/// Registry of every capability the engine can dispatch to.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in tools.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for tool in crate::builtin::default_tools() {
            let name = tool.name().to_string();
            if let Err(e) = registry.register(tool) {
                tracing::warn!("⚠️ Built-in tool '{name}' rejected: {e}");
            }
        }
        registry
    }

    /// Register a capability, compiling its input schema up front.
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let definition = tool.definition();
        let schema = JSONSchema::compile(&definition.input_schema).map_err(|e| {
            FabricError::CodeValidation(format!(
                "schema of tool '{}' does not compile: {e}",
                definition.name
            ))
        })?;
        tracing::debug!("🔧 Registered tool: {}", definition.name);
        self.tools
            .insert(tool.name().to_string(), RegisteredTool { tool, schema });
        Ok(())
    }

    /// Register several tools, stopping at the first rejected one.
    pub fn register_many(&mut self, tools: Vec<Arc<dyn Tool>>) -> Result<()> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Capability catalog, sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.tool.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate `input` against the tool's schema, collecting every violation.
    pub fn validate(&self, name: &str, input: &Value) -> Result<()> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| FabricError::ToolNotFound(name.to_string()))?;
        Self::check(name, &registered.schema, input)
    }

    fn check(name: &str, schema: &JSONSchema, input: &Value) -> Result<()> {
        if let Err(errors) = schema.validate(input) {
            let violations: Vec<String> = errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{path}: {err}")
                    }
                })
                .collect();
            return Err(FabricError::ToolInputInvalid {
                tool: name.to_string(),
                violations,
            });
        }
        Ok(())
    }

    /// Resolve, validate and invoke a tool.
    ///
    /// Any failure raised by the tool itself comes back as
    /// `ToolExecution` carrying the original message.
    pub async fn execute(&self, name: &str, raw_input: Value, ctx: &ToolContext) -> Result<Value> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| FabricError::ToolNotFound(name.to_string()))?;
        Self::check(name, &registered.schema, &raw_input)?;

        registered
            .tool
            .execute(raw_input, ctx)
            .await
            .map_err(|e| match e {
                FabricError::ToolExecution { .. } => e,
                other => FabricError::ToolExecution {
                    tool: name.to_string(),
                    message: other.message(),
                },
            })
    }
}
