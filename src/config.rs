//! Run configuration, persisted as TOML.
//!
//! ```toml
//! [accumulator]
//! on_malformed = "skip"          # or "abort"
//! field_policy = "first_writer_wins"
//!
//! [pipeline]
//! chunk_size = 1024
//! parallel = true
//!
//! [export]
//! consolidate_edges = false
//!
//! [[variants]]
//! name = "User"
//! display_field = "user_name"
//! identity_fields = [{ name = "domain", required = false }, { name = "user_name" }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DefinitionError};
use crate::export::ExportOptions;
use crate::graph::AccumulatorConfig;
use crate::node::{VariantCatalog, VariantSpec};
use crate::pipeline::PipelineConfig;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Every tunable of a run. All sections are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeagleConfig {
    #[serde(default)]
    pub accumulator: AccumulatorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub export: ExportOptions,
    /// Node variants registered on top of the built-in set.
    #[serde(default)]
    pub variants: Vec<VariantSpec>,
}

impl BeagleConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.pipeline.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.chunk_size must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Built-in variants plus every `[[variants]]` entry.
    pub fn catalog(&self) -> Result<VariantCatalog, DefinitionError> {
        VariantCatalog::with_specs(self.variants.iter().cloned())
    }
}
