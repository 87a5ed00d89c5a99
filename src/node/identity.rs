//! Identity keys: the projection of a node onto its variant's identity fields.

use crate::value::Value;

use super::variant::Variant;

/// `(variant, identity values)` of a node.
///
/// Two nodes denote the same entity exactly when their identity keys are
/// equal. Keys are what the adjacency tables and the accumulator's index store,
/// so they never hold references to other nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    variant: Variant,
    values: Vec<Value>,
}

impl IdentityKey {
    /// Build a key from explicit values, one per identity field in declaration
    /// order. Missing trailing values are padded with `null`; extra values are
    /// dropped.
    pub fn new(variant: &Variant, values: impl IntoIterator<Item = Value>) -> Self {
        let arity = variant.identity_fields().len();
        let mut values: Vec<Value> = values.into_iter().take(arity).collect();
        values.resize(arity, Value::Null);
        Self {
            variant: variant.clone(),
            values,
        }
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Names of required identity fields that are unset in this key. A key
    /// with no identity value at all reports every identity field.
    pub fn missing_fields(&self) -> Vec<String> {
        let fields = self.variant.identity_fields().iter().zip(&self.values);
        if self.values.iter().all(Value::is_null) {
            return fields.map(|(field, _)| field.name.clone()).collect();
        }
        fields
            .filter(|(field, value)| field.required && value.is_null())
            .map(|(field, _)| field.name.clone())
            .collect()
    }

    /// Whether every required identity field is set and at least one
    /// identity value is non-null.
    pub fn is_complete(&self) -> bool {
        self.values.iter().any(|value| !value.is_null())
            && self
                .variant
                .identity_fields()
                .iter()
                .zip(&self.values)
                .all(|(field, value)| !field.required || !value.is_null())
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.variant)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::variant::{IdentityField, VariantSpec};

    fn process() -> Variant {
        VariantSpec::new("Process")
            .identity(IdentityField::optional("host"))
            .identity(IdentityField::required("process_id"))
            .identity(IdentityField::required("process_image"))
            .build()
            .unwrap()
    }

    #[test]
    fn pads_missing_values_with_null() {
        let key = IdentityKey::new(&process(), [Value::Null, Value::Int(4)]);
        assert_eq!(key.values().len(), 3);
        assert!(key.values()[2].is_null());
    }

    #[test]
    fn optional_fields_do_not_make_key_incomplete() {
        let key = IdentityKey::new(
            &process(),
            [Value::Null, Value::Int(4), Value::from("cmd.exe")],
        );
        assert!(key.is_complete());
        assert!(key.missing_fields().is_empty());
    }

    #[test]
    fn required_fields_are_reported() {
        let key = IdentityKey::new(&process(), [Value::from("host1")]);
        assert!(!key.is_complete());
        assert_eq!(key.missing_fields(), vec!["process_id", "process_image"]);
    }

    #[test]
    fn key_without_any_value_is_incomplete() {
        let user = VariantSpec::new("User")
            .identity(IdentityField::optional("user_name"))
            .identity(IdentityField::optional("sid"))
            .build()
            .unwrap();
        let empty = IdentityKey::new(&user, []);
        assert!(!empty.is_complete());
        assert_eq!(empty.missing_fields(), vec!["user_name", "sid"]);

        let named = IdentityKey::new(&user, [Value::from("alice")]);
        assert!(named.is_complete());
        assert!(named.missing_fields().is_empty());
    }

    #[test]
    fn display_lists_values() {
        let key = IdentityKey::new(
            &process(),
            [Value::Null, Value::Int(4), Value::from("cmd.exe")],
        );
        assert_eq!(key.to_string(), "Process(null, 4, cmd.exe)");
    }
}
