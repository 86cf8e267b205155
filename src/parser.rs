// bucket_ingestor/src/parser.rs
// Turns fetched object bytes into a single JSON document.

use serde_json::{Map, Value};

use crate::error::{IngestorError, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parses one fetched object as a single JSON document.
///
/// The root must be an object; arrays and scalars cannot be inserted as a
/// single document and are rejected.
pub fn parse_document(bytes: &[u8],) -> Result<Map<String, Value,>,> {
    let bytes = bytes.strip_prefix(UTF8_BOM,).unwrap_or(bytes,);

    if bytes.iter().all(u8::is_ascii_whitespace,) {
        return Err(IngestorError::ParseError("document is empty".to_string(),),);
    }

    match serde_json::from_slice::<Value,>(bytes,) {
        Ok(Value::Object(map,),) => Ok(map,),
        Ok(other,) => Err(IngestorError::ParseError(format!(
            "expected a JSON object at the root, found {}",
            json_kind(&other,)
        ),),),
        Err(e,) => Err(IngestorError::ParseError(e.to_string(),),),
    }
}

fn json_kind(value: &Value,) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_,) => "a boolean",
        Value::Number(_,) => "a number",
        Value::String(_,) => "a string",
        Value::Array(_,) => "an array",
        Value::Object(_,) => "an object",
    }
}
