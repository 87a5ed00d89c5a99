//! Node variants: the schema half of the identity model.
//!
//! A [`Variant`] names an entity kind (Process, IPAddress, ...) and declares
//! which attributes identify an instance. Definitions are validated once, when
//! the variant is built from its [`VariantSpec`]; a [`Variant`] value is proof
//! that the declaration is well formed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// One entry of a variant's identity declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityField {
    /// Attribute name.
    pub name: String,
    /// Whether an identity can be computed without this field.
    ///
    /// Optional fields contribute `null` to the identity key when unset.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl IdentityField {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Declarative description of a variant, as written in code or in the
/// `[[variants]]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub name: String,
    #[serde(default)]
    pub identity_fields: Vec<IdentityField>,
    /// Attribute used as the human-readable label. Defaults to the first
    /// identity field.
    #[serde(default)]
    pub display_field: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#FFFFFF".into()
}

impl VariantSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_fields: Vec::new(),
            display_field: None,
            color: default_color(),
        }
    }

    pub fn identity(mut self, field: IdentityField) -> Self {
        self.identity_fields.push(field);
        self
    }

    pub fn display(mut self, field: impl Into<String>) -> Self {
        self.display_field = Some(field.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Validate the declaration and produce a usable [`Variant`].
    pub fn build(self) -> Result<Variant, DefinitionError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        if self.identity_fields.is_empty() {
            return Err(DefinitionError::MissingIdentity { variant: name });
        }

        {
            let mut seen = HashSet::new();
            for field in &self.identity_fields {
                if field.name.is_empty() {
                    return Err(DefinitionError::EmptyField { variant: name });
                }
                if !seen.insert(field.name.as_str()) {
                    return Err(DefinitionError::DuplicateIdentityField {
                        variant: name,
                        field: field.name.clone(),
                    });
                }
            }
        }

        let display_field = match self.display_field {
            Some(f) if f.is_empty() => return Err(DefinitionError::EmptyField { variant: name }),
            Some(f) => f,
            None => self.identity_fields[0].name.clone(),
        };

        Ok(Variant(Arc::new(VariantDef {
            name,
            identity_fields: self.identity_fields,
            display_field,
            color: self.color,
        })))
    }
}

#[derive(Debug)]
struct VariantDef {
    name: String,
    identity_fields: Vec<IdentityField>,
    display_field: String,
    color: String,
}

/// A validated node variant. Cheap to clone.
///
/// Equality, ordering and hashing use the variant name only; names are unique
/// within a [`VariantCatalog`](super::catalog::VariantCatalog).
#[derive(Clone)]
pub struct Variant(Arc<VariantDef>);

impl Variant {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The ordered identity declaration. Never empty.
    pub fn identity_fields(&self) -> &[IdentityField] {
        &self.0.identity_fields
    }

    pub fn is_identity_field(&self, name: &str) -> bool {
        self.0.identity_fields.iter().any(|f| f.name == name)
    }

    pub fn display_field(&self) -> &str {
        &self.0.display_field
    }

    pub fn color(&self) -> &str {
        &self.0.color
    }

    /// Reconstruct the spec this variant was built from.
    pub fn spec(&self) -> VariantSpec {
        VariantSpec {
            name: self.0.name.clone(),
            identity_fields: self.0.identity_fields.clone(),
            display_field: Some(self.0.display_field.clone()),
            color: self.0.color.clone(),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name == other.0.name
    }
}

impl Eq for Variant {}

impl std::hash::Hash for Variant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl PartialOrd for Variant {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variant {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant")
            .field("name", &self.0.name)
            .field("identity", &self.0.identity_fields.len())
            .finish()
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.name)
    }
}
