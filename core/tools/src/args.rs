//! Argument extraction from JSON tool input.

use serde_json::Value;

use drivetool_common::{Error, FolderId, Result};

/// View `args` as an object; `null` counts as no arguments.
fn field<'a>(args: &'a Value, key: &str) -> Result<Option<&'a Value>> {
    match args {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(map.get(key).filter(|v| !v.is_null())),
        _ => Err(Error::InvalidInput(
            "Tool arguments must be a JSON object".to_string(),
        )),
    }
}

/// A required string that must not be blank.
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    match field(args, key)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(Error::InvalidInput(format!("'{}' must not be empty", key))),
        Some(_) => Err(Error::InvalidInput(format!("'{}' must be a string", key))),
        None => Err(Error::InvalidInput(format!("'{}' is required", key))),
    }
}

/// An optional folder identifier; missing or empty means the root.
pub fn optional_folder(args: &Value, key: &str) -> Result<Option<FolderId>> {
    match field(args, key)? {
        Some(Value::String(s)) => Ok(FolderId::optional(s)),
        Some(_) => Err(Error::InvalidInput(format!("'{}' must be a string", key))),
        None => Ok(None),
    }
}

/// An optional integer with a default.
pub fn optional_int(args: &Value, key: &str, default: i64) -> Result<i64> {
    match field(args, key)? {
        Some(v) => v
            .as_i64()
            .ok_or_else(|| Error::InvalidInput(format!("'{}' must be an integer", key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let args = json!({"name": "a", "blank": "  ", "num": 3});

        assert_eq!(required_str(&args, "name").unwrap(), "a");
        assert!(matches!(required_str(&args, "blank"), Err(Error::InvalidInput(_))));
        assert!(matches!(required_str(&args, "num"), Err(Error::InvalidInput(_))));
        assert!(matches!(required_str(&args, "missing"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_optional_folder() {
        let args = json!({"empty": "", "set": "abc", "null": null});

        assert_eq!(optional_folder(&args, "empty").unwrap(), None);
        assert_eq!(optional_folder(&args, "null").unwrap(), None);
        assert_eq!(
            optional_folder(&args, "set").unwrap(),
            Some(FolderId::new("abc").unwrap())
        );
    }

    #[test]
    fn test_optional_int() {
        assert_eq!(optional_int(&Value::Null, "n", 10).unwrap(), 10);
        assert_eq!(optional_int(&json!({"n": 4}), "n", 10).unwrap(), 4);
        assert!(optional_int(&json!({"n": "4"}), "n", 10).is_err());
        assert!(optional_int(&json!({"n": 2.5}), "n", 10).is_err());
    }

    #[test]
    fn test_non_object_arguments() {
        assert!(required_str(&json!([1, 2]), "x").is_err());
    }
}
