//! Bulk-import document flattening.
//!
//! A nested JSON object like `{"a": {"b": "v1", "c": "v2"}}` flattens to the
//! leaf pairs `a/b = v1` and `a/c = v2`, ready to converge as individual KV
//! entries.

use crate::error::ConvergeError;
use serde_json::Value;

/// Flattens a nested JSON object into `(key, value)` leaf pairs with
/// `/`-joined key paths. Leaf values keep their JSON rendering except for
/// strings, which are stored bare.
pub fn flatten_document(document: &Value) -> Result<Vec<(String, String)>, ConvergeError> {
    let Value::Object(map) = document else {
        return Err(ConvergeError::Validation(
            "import document must be a JSON object".into(),
        ));
    };
    let mut pairs = Vec::new();
    for (key, value) in map {
        flatten_into(key.clone(), value, &mut pairs)?;
    }
    Ok(pairs)
}

fn flatten_into(
    path: String,
    value: &Value,
    pairs: &mut Vec<(String, String)>,
) -> Result<(), ConvergeError> {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(format!("{path}/{key}"), nested, pairs)?;
            }
            Ok(())
        }
        Value::Array(_) => Err(ConvergeError::Validation(format!(
            "import document contains an array at '{path}'; only objects and scalars are supported"
        ))),
        Value::String(s) => {
            pairs.push((path, s.clone()));
            Ok(())
        }
        other => {
            pairs.push((path, other.to_string()));
            Ok(())
        }
    }
}
