use thiserror::Error;

/// Errors raised while decoding an untyped analysis payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload document is not a JSON object.
    #[error("payload must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// A record collection is present but not list-shaped.
    #[error("payload field `{field}` must be a list, found {found}")]
    NotAList {
        field: &'static str,
        found: &'static str,
    },

    /// A record inside a collection could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Short name of a JSON value's type, used in diagnostics.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
