//! Variant catalog: the registered set of node variants.
//!
//! The built-in forensic variants are validated once when the catalog is
//! created, which doubles as the startup self-check for the shipped schema.
//! Additional variants (declared in configuration) are validated on
//! registration. Lookups go through a `DashMap` so transformers running on
//! the rayon pool can share one catalog.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::DefinitionError;

use super::variant::{IdentityField, Variant, VariantSpec};

/// The variants every catalog starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinVariant {
    Process,
    File,
    IpAddress,
    Domain,
    Uri,
    RegistryKey,
    Alert,
}

impl BuiltinVariant {
    pub const ALL: [BuiltinVariant; 7] = [
        BuiltinVariant::Process,
        BuiltinVariant::File,
        BuiltinVariant::IpAddress,
        BuiltinVariant::Domain,
        BuiltinVariant::Uri,
        BuiltinVariant::RegistryKey,
        BuiltinVariant::Alert,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinVariant::Process => "Process",
            BuiltinVariant::File => "File",
            BuiltinVariant::IpAddress => "IPAddress",
            BuiltinVariant::Domain => "Domain",
            BuiltinVariant::Uri => "URI",
            BuiltinVariant::RegistryKey => "RegistryKey",
            BuiltinVariant::Alert => "Alert",
        }
    }

    /// The identity declaration shipped for this variant.
    pub fn spec(self) -> VariantSpec {
        let spec = VariantSpec::new(self.name());
        match self {
            BuiltinVariant::Process => spec
                .identity(IdentityField::optional("host"))
                .identity(IdentityField::required("process_id"))
                .identity(IdentityField::required("process_image"))
                .display("process_image")
                .color("#FF0000"),
            BuiltinVariant::File => spec
                .identity(IdentityField::optional("host"))
                .identity(IdentityField::required("full_path"))
                .display("file_name")
                .color("#3CB371"),
            BuiltinVariant::IpAddress => spec
                .identity(IdentityField::required("ip_address"))
                .display("ip_address")
                .color("#87CEFA"),
            BuiltinVariant::Domain => spec
                .identity(IdentityField::required("domain"))
                .display("domain")
                .color("#A020F0"),
            BuiltinVariant::Uri => spec
                .identity(IdentityField::required("uri"))
                .display("uri")
                .color("#FFA500"),
            BuiltinVariant::RegistryKey => spec
                .identity(IdentityField::required("hive"))
                .identity(IdentityField::required("key_path"))
                .identity(IdentityField::required("key"))
                .display("key")
                .color("#68A0B0"),
            BuiltinVariant::Alert => spec
                .identity(IdentityField::required("alert_name"))
                .display("alert_name")
                .color("#FF8C00"),
        }
    }
}

impl std::fmt::Display for BuiltinVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Registered node variants, keyed by name.
pub struct VariantCatalog {
    /// Built-ins in `BuiltinVariant::ALL` order, for infallible access.
    builtins: Vec<Variant>,
    by_name: DashMap<String, Variant>,
}

impl VariantCatalog {
    /// Create a catalog holding the built-in variants.
    ///
    /// Fails if any built-in declaration is malformed.
    pub fn new() -> Result<Self, DefinitionError> {
        let by_name = DashMap::new();
        let mut builtins = Vec::with_capacity(BuiltinVariant::ALL.len());
        for builtin in BuiltinVariant::ALL {
            let variant = builtin.spec().build()?;
            by_name.insert(variant.name().to_string(), variant.clone());
            builtins.push(variant);
        }
        Ok(Self { builtins, by_name })
    }

    /// Create a catalog and register additional variant declarations.
    pub fn with_specs(
        specs: impl IntoIterator<Item = VariantSpec>,
    ) -> Result<Self, DefinitionError> {
        let catalog = Self::new()?;
        for spec in specs {
            catalog.register(spec)?;
        }
        Ok(catalog)
    }

    pub fn builtin(&self, variant: BuiltinVariant) -> &Variant {
        &self.builtins[variant as usize]
    }

    /// Validate and register a variant. Names are unique.
    pub fn register(&self, spec: VariantSpec) -> Result<Variant, DefinitionError> {
        let variant = spec.build()?;
        match self.by_name.entry(variant.name().to_string()) {
            Entry::Occupied(e) => Err(DefinitionError::DuplicateVariant {
                name: e.key().clone(),
            }),
            Entry::Vacant(e) => {
                tracing::debug!(variant = %variant, "registered node variant");
                e.insert(variant.clone());
                Ok(variant)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Variant> {
        self.by_name.get(name).map(|r| r.value().clone())
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn resolve(&self, name: &str) -> Result<Variant, DefinitionError> {
        self.get(name).ok_or_else(|| DefinitionError::UnknownVariant {
            name: name.to_string(),
        })
    }

    /// All registered variants, sorted by name.
    pub fn all(&self) -> Vec<Variant> {
        let mut all: Vec<Variant> = self.by_name.iter().map(|r| r.value().clone()).collect();
        all.sort();
        all
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl std::fmt::Debug for VariantCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantCatalog")
            .field("count", &self.len())
            .finish()
    }
}
