//! JSON5 loader for memory configuration.
//!
//! Reads one or more config layers, validates each against the schema,
//! merges them in order and produces a validated `MemoryConfig`.

mod merge;
mod schema;

#[cfg(test)]
mod tests;

use crate::{CONVERSATION_PLACEHOLDER, ConfigError, MemoryConfig};
use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::path::Path;

impl MemoryConfig {
    /// Load a single config from a path.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let value = read_layer(path.as_ref())?;
        config_from_value(value, "config")
    }

    /// Load a single config from JSON5 contents.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load and merge config layers; later paths override earlier ones.
    ///
    /// Missing files are skipped. Every present layer is schema-checked on its own
    /// before merging, so errors name the layer they came from.
    pub fn load_layered<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = Value::Object(serde_json::Map::new());
        let mut loaded = 0usize;
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                debug!("skipping missing layer (path={})", path.display());
                continue;
            }
            let value = read_layer(path)?;
            schema::validate_layer_schema(&value, &path.display().to_string())?;
            merge::merge_json_values(&mut merged, &value);
            debug!("loaded layer (path={})", path.display());
            loaded += 1;
        }
        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={loaded})");
        Ok(config)
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.unique_name.trim().is_empty() {
            return Err(invalid("namespace.unique_name", "must not be empty"));
        }
        if self.namespace.memory_type.trim().is_empty() {
            return Err(invalid("namespace.memory_type", "must not be empty"));
        }
        if self.search.index_prefix.trim().is_empty() {
            return Err(invalid("search.index_prefix", "must not be empty"));
        }
        if self.search.max_results == 0 {
            return Err(invalid("search.max_results", "must be greater than 0"));
        }
        if self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions", "must be greater than 0"));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be greater than 0"));
        }
        let text = self.retrieval.text_score_threshold;
        if !(0.0..=1.0).contains(&text) {
            return Err(invalid(
                "retrieval.text_score_threshold",
                "must be within [0, 1]",
            ));
        }
        let embedding = self.retrieval.embedding_score_threshold;
        if !(-1.0..=1.0).contains(&embedding) {
            return Err(invalid(
                "retrieval.embedding_score_threshold",
                "must be within [-1, 1]",
            ));
        }
        if self.summary.split_n == 0 {
            return Err(invalid("summary.split_n", "must be greater than 0"));
        }
        let template = self.summary.prompt_template.as_deref();
        if template.is_some_and(|template| !template.contains(CONVERSATION_PLACEHOLDER)) {
            return Err(invalid(
                "summary.prompt_template",
                "must contain the {conversation} placeholder",
            ));
        }
        Ok(())
    }
}

fn read_layer(path: &Path) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path)?;
    Ok(json5::from_str(&contents)?)
}

fn config_from_value(value: Value, label: &str) -> Result<MemoryConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: MemoryConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

fn invalid(path: &str, message: &str) -> ConfigError {
    schema::invalid_field("config", path, message)
}
