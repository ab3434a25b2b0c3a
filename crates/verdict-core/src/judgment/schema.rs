//! JSON Schema validation for judgments.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded judgment schema (loaded at compile time).
const JUDGMENT_SCHEMA_JSON: &str = include_str!("../../../../schemas/judgment.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(JUDGMENT_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a decoded judgment against the schema.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_judgment_schema(value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn is_valid_judgment(value: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(value))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_judgment_passes() {
        let value = json!({"score": 10, "categories": [], "reasoning": "ok"});
        assert!(validate_judgment_schema(&value).is_ok());
    }

    #[test]
    fn test_missing_reasoning_fails() {
        let value = json!({"score": 10, "categories": []});
        let errors = validate_judgment_schema(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_score_out_of_range_fails() {
        assert!(!is_valid_judgment(&json!({"score": 101, "reasoning": "x"})));
        assert!(!is_valid_judgment(&json!({"score": -1, "reasoning": "x"})));
        assert!(is_valid_judgment(&json!({"score": null, "reasoning": "x"})));
    }

    #[test]
    fn test_categories_must_be_strings() {
        let value = json!({"score": 40, "categories": [1, 2], "reasoning": "x"});
        let errors = validate_judgment_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("/categories")));
    }
}
