//! Typed field access over a flat event record.

use crate::error::TransformError;
use crate::event::EventRecord;
use crate::value::Value;

/// Read-only view of an event that reports failures under a transformer name.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    transformer: &'static str,
    record: &'a EventRecord,
}

impl<'a> Fields<'a> {
    pub fn new(transformer: &'static str, record: &'a EventRecord) -> Self {
        Self {
            transformer,
            record,
        }
    }

    /// Field value; null counts as absent.
    pub fn value(&self, name: &str) -> Option<&'a Value> {
        self.record.get(name).filter(|v| !v.is_null())
    }

    pub fn has(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    pub fn str(&self, name: &str) -> Result<String, TransformError> {
        self.opt_str(name)?.ok_or_else(|| self.missing(name))
    }

    /// Scalar rendered as text. Integers and booleans are accepted.
    pub fn opt_str(&self, name: &str) -> Result<Option<String>, TransformError> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(v) if matches!(v, Value::Int(_) | Value::Bool(_)) => Ok(Some(v.to_string())),
            Some(v) => Err(self.invalid(name, v)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, TransformError> {
        self.opt_int(name)?.ok_or_else(|| self.missing(name))
    }

    /// Integer field; numeric strings are parsed.
    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, TransformError> {
        match self.value(name) {
            None => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or_else(|| self.invalid(name, v)),
        }
    }

    /// Truthy flag: `true`, a non-zero integer, or `"true"`/`"1"`.
    pub fn flag(&self, name: &str) -> bool {
        match self.value(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            Some(Value::Str(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            _ => false,
        }
    }

    fn missing(&self, name: &str) -> TransformError {
        TransformError::MissingField {
            transformer: self.transformer,
            field: name.to_string(),
        }
    }

    fn invalid(&self, name: &str, value: &Value) -> TransformError {
        TransformError::InvalidField {
            transformer: self.transformer,
            field: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;

    #[test]
    fn typed_access() {
        let event = record([
            ("pid", Value::from("3144")),
            ("port", Value::Int(80)),
            ("name", Value::from("cmd.exe")),
            ("alerted_on", Value::Bool(true)),
        ]);
        let f = Fields::new("test", &event);
        assert_eq!(f.int("pid").unwrap(), 3144);
        assert_eq!(f.str("port").unwrap(), "80");
        assert_eq!(f.str("name").unwrap(), "cmd.exe");
        assert!(f.flag("alerted_on"));
        assert!(!f.flag("missing"));
        assert_eq!(f.opt_int("missing").unwrap(), None);
    }

    #[test]
    fn missing_and_invalid_fields() {
        let event = record([("pid", "abc")]);
        let f = Fields::new("test", &event);
        assert!(matches!(
            f.int("pid"),
            Err(TransformError::InvalidField { .. })
        ));
        assert!(matches!(
            f.str("image"),
            Err(TransformError::MissingField { transformer: "test", .. })
        ));
    }
}
