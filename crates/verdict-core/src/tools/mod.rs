//! Tool trait, registry and the built-in tools.
//!
//! Tools are pure functions of their arguments. Each one may also report a
//! severity signal for its output, which fallback synthesis uses when the
//! agent loop does not converge.

mod calculator;
mod sanctions;
mod thresholds;

pub use calculator::{evaluate_expression, CalculateTool};
pub use sanctions::{PepStatusTool, SanctionsListTool};
pub use thresholds::{reporting_threshold, AmountThresholdTool};

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    Execution { tool: String, reason: String },
}

impl ToolError {
    pub fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

/// Severity implied by a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeveritySignal {
    pub score: u8,
    pub factor: String,
}

impl SeveritySignal {
    pub fn new(score: u8, factor: impl Into<String>) -> Self {
        Self {
            score,
            factor: factor.into(),
        }
    }
}

/// A deterministic, side-effect-free tool.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema of the argument object.
    fn parameters(&self) -> Value;

    fn execute(&self, args: &Value) -> Result<Value, ToolError>;

    /// Severity implied by an output of this tool, if any.
    fn severity(&self, _output: &Value) -> Option<SeveritySignal> {
        None
    }
}

/// Tool description offered to a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Function-calling format: `{"type": "function", "function": {...}}`.
    pub fn to_function_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Name-keyed tool registry.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in screening tools and the calculator.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SanctionsListTool));
        registry.register(Arc::new(PepStatusTool));
        registry.register(Arc::new(AmountThresholdTool));
        registry.register(Arc::new(CalculateTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Dispatch by exact name and return the structured result.
    pub fn execute_value(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args)
    }

    /// Dispatch by exact name and return the result as JSON text.
    pub fn execute(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let value = self.execute_value(name, args)?;
        serde_json::to_string(&value).map_err(|e| ToolError::Execution {
            tool: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Severity the named tool assigns to one of its outputs.
    pub fn severity(&self, name: &str, output: &Value) -> Option<SeveritySignal> {
        self.tools.get(name).and_then(|tool| tool.severity(output))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

pub(crate) fn required_str<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid(tool, format!("missing string argument '{}'", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_contents() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "calculate",
                "check_pep_status",
                "check_sanctions_list",
                "validate_amount_threshold"
            ]
        );
    }

    #[test]
    fn test_definitions_are_function_shaped() {
        let registry = ToolRegistry::with_defaults();
        for definition in registry.definitions() {
            let value = definition.to_function_json();
            assert_eq!(value["type"], "function");
            assert_eq!(value["function"]["parameters"]["type"], "object");
        }
    }

    #[test]
    fn test_unknown_tool_errors() {
        let registry = ToolRegistry::with_defaults();
        let err = registry.execute("wire_money", &json!({})).unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("wire_money".to_string()));
    }

    #[test]
    fn test_execute_returns_json_text() {
        let registry = ToolRegistry::with_defaults();
        let text = registry
            .execute("check_sanctions_list", &json!({"entity_name": "Ahmed Ivanov"}))
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["is_sanctioned"], true);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.definitions().is_empty());
    }
}
