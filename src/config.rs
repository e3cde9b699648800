//! Model registry loaded from a JSON file.
//!
//! ```json
//! {
//!   "v_test": {
//!     "primary_key": "id",
//!     "fields": { "ID": "id", "content": "content" },
//!     "embedded": [ { "fields": { "author": "author_name" } } ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::fields::FieldMap;

/// Errors raised while loading or querying the registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse model registry: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown request target - {0}")]
    UnknownTarget(String),
}

/// One data model: its own fields plus flattened sub-models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(flatten)]
    pub base: FieldMap,
    #[serde(default)]
    pub embedded: Vec<FieldMap>,
}

impl ModelConfig {
    /// The resolver for this model. Embedded models are merged in order, so
    /// on a name collision the last one wins.
    pub fn field_map(&self) -> FieldMap {
        let mut map = self.base.clone();
        for embedded in &self.embedded {
            map.merge(embedded);
        }
        map
    }
}

/// Request target name to model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelRegistry {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&content)?;
        debug!(path = %path.display(), models = registry.len(), "loaded model registry");
        Ok(registry)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn insert(&mut self, target: impl Into<String>, model: ModelConfig) {
        self.models.insert(target.into(), model);
    }

    pub fn model(&self, target: &str) -> Option<&ModelConfig> {
        self.models.get(target)
    }

    /// The flattened resolver of `target`.
    pub fn field_map(&self, target: &str) -> Result<FieldMap, ConfigError> {
        self.model(target)
            .map(ModelConfig::field_map)
            .ok_or_else(|| ConfigError::UnknownTarget(target.to_string()))
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// A single `v_test` model, used when no registry file is available.
    pub fn demo() -> Self {
        let base: FieldMap = [
            ("ID", "id"),
            ("content", "content"),
            ("count", "count"),
            ("isBool", "is_bool"),
        ]
        .into_iter()
        .collect();
        let mut registry = Self::default();
        registry.insert(
            "v_test",
            ModelConfig {
                base,
                embedded: Vec::new(),
            },
        );
        registry
    }
}
