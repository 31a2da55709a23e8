//! Request validation
//!
//! Checks run before any registry state changes.

use ics_common::{Error, Result};
use serde_json::Value;

/// Require `uri` to parse as an absolute URI
pub fn validate_absolute_uri(uri: &str) -> Result<()> {
    match url::Url::parse(uri) {
        Ok(_) => Ok(()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Err(Error::BadRequest(format!("URI: {} is not absolute", uri)))
        }
        Err(e) => Err(Error::BadRequest(format!("Could not parse URI: {}: {}", uri, e))),
    }
}

/// Same as [`validate_absolute_uri`] but an absent or empty URI is fine
pub fn validate_optional_uri(uri: Option<&str>) -> Result<()> {
    match uri {
        Some(uri) if !uri.is_empty() => validate_absolute_uri(uri),
        _ => Ok(()),
    }
}

/// Validate job data against a type's JSON Schema
pub fn validate_json_object(schema: &Value, document: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::BadRequest(format!("Invalid json schema: {}", e)))?;

    let messages: Vec<String> = validator.iter_errors(document).map(|e| e.to_string()).collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(Error::BadRequest(format!("Json validation failure: {}", messages.join("; "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absolute_uri() {
        assert!(validate_absolute_uri("http://alice/sink").is_ok());
        assert!(validate_absolute_uri("https://example.com:8443/a?b=c").is_ok());
        assert!(matches!(validate_absolute_uri("/relative/path"), Err(Error::BadRequest(_))));
        assert!(matches!(validate_absolute_uri("http://"), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_optional_uri() {
        assert!(validate_optional_uri(None).is_ok());
        assert!(validate_optional_uri(Some("")).is_ok());
        assert!(validate_optional_uri(Some("sink")).is_err());
    }

    #[test]
    fn test_schema_validation() {
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        });

        assert!(validate_json_object(&schema, &json!({"city": "Oslo"})).is_ok());
        assert!(matches!(
            validate_json_object(&schema, &json!({"city": 7})),
            Err(Error::BadRequest(_))
        ));
        assert!(validate_json_object(&schema, &json!({})).is_err());
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let schema = json!({"type": 12});
        assert!(validate_json_object(&schema, &json!({})).is_err());
    }
}
