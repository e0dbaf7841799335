use bson::Bson;

use crate::document::Document;
use crate::errors::{MappingError, Result};

/// Parses a JSON criteria document. Extended JSON (`{"$oid": ..}`, `{"$date": ..}`) is decoded
/// into native values.
///
/// # Errors
/// Returns `Json` for invalid JSON and `MalformedInput` when the root is not an object.
pub fn parse_criteria_json(json: &str) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let bson = Bson::try_from(value).map_err(|e| MappingError::InvalidArgument(e.to_string()))?;
    match bson {
        Bson::Document(d) => Ok(Document::from(d)),
        other => Err(MappingError::malformed("<root>", "document", &format!("{:?}", other.element_type()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;

    #[test]
    fn parses_object() {
        let d = parse_criteria_json(r#"{"name": "x", "age": {"$gt": 3}}"#).unwrap();
        assert_eq!(d.get("name"), Some(&Value::from("x")));
        assert!(d.get("age").and_then(Value::as_document).is_some());
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(parse_criteria_json("[1]"), Err(MappingError::MalformedInput { .. })));
        assert!(matches!(parse_criteria_json("{"), Err(MappingError::Json(_))));
    }
}
