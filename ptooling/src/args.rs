//! Typed accessors over normalized tool-call arguments.
//!
//! ```rust
//! use ptooling::{optional_u32, required_string};
//! use serde_json::{Map, json};
//!
//! let mut args = Map::new();
//! args.insert("prompt".to_string(), json!("a red fox"));
//! args.insert("count".to_string(), json!(2));
//!
//! assert_eq!(required_string(&args, "prompt").expect("present"), "a red fox");
//! assert_eq!(optional_u32(&args, "count").expect("valid"), Some(2));
//! ```

use pprovider::ToolArguments;
use serde_json::Value;

use crate::ToolError;

pub fn required_string(args: &ToolArguments, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| ToolError::invalid_arguments(format!("missing required string: '{key}'")))
}

pub fn optional_string(args: &ToolArguments, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ToolError::invalid_arguments(format!(
            "'{key}' must be a string"
        ))),
    }
}

/// Accepts integers and integer-valued strings; models emit both.
pub fn optional_u32(args: &ToolArguments, key: &str) -> Result<Option<u32>, ToolError> {
    let invalid = || ToolError::invalid_arguments(format!("'{key}' must be a non-negative integer"));

    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .and_then(|value| u32::try_from(value).ok())
            .map(Some)
            .ok_or_else(invalid),
        Some(Value::String(text)) => text.trim().parse::<u32>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

pub fn required_u32(args: &ToolArguments, key: &str) -> Result<u32, ToolError> {
    optional_u32(args, key)?
        .ok_or_else(|| ToolError::invalid_arguments(format!("missing required integer: '{key}'")))
}
