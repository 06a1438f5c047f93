use crate::types::{AppError, Result, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the argument object
    fn parameters_schema(&self) -> Value;
    /// Run with arguments already checked against [`Tool::parameters_schema`].
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// JSON schema for an argument struct, trimmed to what function-calling APIs accept.
pub fn schema_for_args<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry holding `add`, `subtract` and `multiply`.
    pub fn with_arithmetic_tools() -> Self {
        let mut registry = Self::new();
        for tool in crate::tools::arithmetic::all() {
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Declarations for every tool, sorted by name.
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Look up `name`, validate `args` against its schema, then execute.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AppError::Tool(format!("Unknown tool '{}'", name)))?;

        let args = validate_arguments(name, &tool.parameters_schema(), args)?;
        debug!(tool = name, %args, "Executing tool");
        tool.execute(args).await
    }

    /// Get a sorted list of all registered tool names
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

/// Check required fields and primitive types. Integral floats such as `52.0`
/// are accepted for integer parameters and normalized to integers.
pub fn validate_arguments(tool: &str, schema: &Value, args: Value) -> Result<Value> {
    let mut args = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(AppError::Tool(format!(
                "Arguments for '{}' must be an object, got {}",
                tool, other
            )))
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if args.get(field).map_or(true, Value::is_null) {
                return Err(AppError::Tool(format!(
                    "Missing required argument '{}' for '{}'",
                    field, tool
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, prop) in properties {
            let Some(value) = args.get_mut(field) else {
                continue;
            };
            let types: Vec<&str> = match prop.get("type") {
                Some(Value::String(t)) => vec![t.as_str()],
                Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
                _ => continue,
            };

            match coerce(value, &types) {
                Some(coerced) => *value = coerced,
                None => {
                    return Err(AppError::Tool(format!(
                        "Argument '{}' for '{}' must be {}, got {}",
                        field,
                        tool,
                        types.join(" or "),
                        value
                    )))
                }
            }
        }
    }

    Ok(Value::Object(args))
}

fn coerce(value: &Value, types: &[&str]) -> Option<Value> {
    types.iter().find_map(|ty| match (*ty, value) {
        ("integer", Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
        ("integer", Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| json!(f as i64)),
        ("number", Value::Number(_))
        | ("string", Value::String(_))
        | ("boolean", Value::Bool(_))
        | ("object", Value::Object(_))
        | ("array", Value::Array(_))
        | ("null", Value::Null) => Some(value.clone()),
        _ => None,
    })
}
