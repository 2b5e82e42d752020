use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-operation latency budgets, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create_component_ms: u64,
    pub create_interface_ms: u64,
    pub list_components_ms: u64,
    pub struct_descriptors_ms: u64,
    pub copy_buffer_ms: u64,
    pub create_input_surface_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create_component_ms: 1000,
            create_interface_ms: 500,
            list_components_ms: 200,
            struct_descriptors_ms: 200,
            copy_buffer_ms: 500,
            create_input_surface_ms: 500,
        }
    }
}

impl Timeouts {
    pub fn create_component(&self) -> Duration {
        Duration::from_millis(self.create_component_ms)
    }

    pub fn create_interface(&self) -> Duration {
        Duration::from_millis(self.create_interface_ms)
    }

    pub fn list_components(&self) -> Duration {
        Duration::from_millis(self.list_components_ms)
    }

    pub fn struct_descriptors(&self) -> Duration {
        Duration::from_millis(self.struct_descriptors_ms)
    }

    pub fn copy_buffer(&self) -> Duration {
        Duration::from_millis(self.copy_buffer_ms)
    }

    pub fn create_input_surface(&self) -> Duration {
        Duration::from_millis(self.create_input_surface_ms)
    }

    /// Same budget for every operation. Mostly for tests.
    pub fn uniform(ms: u64) -> Self {
        Self {
            create_component_ms: ms,
            create_interface_ms: ms,
            list_components_ms: ms,
            struct_descriptors_ms: ms,
            copy_buffer_ms: ms,
            create_input_surface_ms: ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub timeouts: Timeouts,
    /// Expose an in-process pool manager when no external one is supplied.
    pub pooled_buffers: bool,
    /// Frames an input surface buffers per reader.
    pub surface_queue_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "codec.store".to_string(),
            timeouts: Timeouts::default(),
            pooled_buffers: true,
            surface_queue_depth: 16,
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("store name must not be empty"));
        }
        if self.surface_queue_depth == 0 {
            return Err(anyhow::anyhow!("surface_queue_depth must be at least 1"));
        }
        let t = &self.timeouts;
        for (op, ms) in [
            ("create_component", t.create_component_ms),
            ("create_interface", t.create_interface_ms),
            ("list_components", t.list_components_ms),
            ("struct_descriptors", t.struct_descriptors_ms),
            ("copy_buffer", t.copy_buffer_ms),
            ("create_input_surface", t.create_input_surface_ms),
        ] {
            if ms == 0 {
                return Err(anyhow::anyhow!("timeout for {} must be non-zero", op));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() -> anyhow::Result<()> {
        let config = StoreConfig::from_json_str(
            r#"{"name": "vendor.store", "timeouts": {"create_component_ms": 250}}"#,
        )?;
        assert_eq!(config.name, "vendor.store");
        assert_eq!(config.timeouts.create_component(), Duration::from_millis(250));
        assert_eq!(config.timeouts.create_interface_ms, 500);
        assert!(config.pooled_buffers);
        Ok(())
    }

    #[test]
    fn test_rejects_zero_budget() {
        assert!(StoreConfig::from_json_str(r#"{"timeouts": {"copy_buffer_ms": 0}}"#).is_err());
        assert!(StoreConfig::from_json_str(r#"{"surface_queue_depth": 0}"#).is_err());
        assert!(StoreConfig::from_json_str("not json").is_err());
    }
}
