/// Settings
///
/// Layered configuration for pipeline hosts: built-in defaults, an optional
/// `brightchain.toml`, then `BRIGHTCHAIN_*` environment overrides. Loading
/// returns a value for the host to inject; the library keeps no global
/// configuration state.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::block::BlockSize;
use crate::constants::{OFFS_CACHE_PERCENTAGE, RANDOM_BLOCKS_PER_TUPLE, TUPLE_DEFAULT_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Blocks per tuple, including the brightened source.
    pub tuple_size: usize,
    /// Fresh random blocks per tuple; the rest come from the whitener cache.
    pub random_blocks_per_tuple: usize,
    /// Whitener cache capacity per block size.
    pub whitener_cache_capacity: usize,
    /// Probability that a whitener draw is served from the cache.
    pub cache_percentage: f64,
    /// Default block size label: message, tiny, small, medium, large, huge.
    pub block_size: String,
}

impl Settings {
    /// Load with the default layer stack.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load, optionally pointing at an explicit config file.
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("tuple_size", TUPLE_DEFAULT_SIZE as i64)?
            .set_default("random_blocks_per_tuple", RANDOM_BLOCKS_PER_TUPLE as i64)?
            .set_default("whitener_cache_capacity", 1024i64)?
            .set_default("cache_percentage", OFFS_CACHE_PERCENTAGE)?
            .set_default("block_size", "medium")?;

        builder = match path {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("brightchain").required(false)),
        };

        builder
            .add_source(Environment::with_prefix("BRIGHTCHAIN"))
            .build()?
            .try_deserialize()
    }

    /// Resolve the configured block-size label.
    pub fn default_block_size(&self) -> Result<BlockSize, ConfigError> {
        match self.block_size.to_ascii_lowercase().as_str() {
            "message" => Ok(BlockSize::Message),
            "tiny" => Ok(BlockSize::Tiny),
            "small" => Ok(BlockSize::Small),
            "medium" => Ok(BlockSize::Medium),
            "large" => Ok(BlockSize::Large),
            "huge" => Ok(BlockSize::Huge),
            other => Err(ConfigError::Message(format!("unknown block size: {}", other))),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tuple_size: TUPLE_DEFAULT_SIZE,
            random_blocks_per_tuple: RANDOM_BLOCKS_PER_TUPLE,
            whitener_cache_capacity: 1024,
            cache_percentage: OFFS_CACHE_PERCENTAGE,
            block_size: "medium".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.tuple_size, 3);
        assert_eq!(settings.random_blocks_per_tuple, 1);
        assert!((settings.cache_percentage - 0.7).abs() < f64::EPSILON);
        assert_eq!(settings.default_block_size().unwrap(), BlockSize::Medium);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightchain.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "tuple_size = 5").unwrap();
        writeln!(file, "block_size = \"small\"").unwrap();

        let settings = Settings::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.tuple_size, 5);
        assert_eq!(settings.default_block_size().unwrap(), BlockSize::Small);
        // untouched keys keep their defaults
        assert_eq!(settings.random_blocks_per_tuple, 1);
    }

    #[test]
    fn test_unknown_block_size_label() {
        let settings = Settings { block_size: "enormous".into(), ..Settings::default() };
        assert!(settings.default_block_size().is_err());
    }
}
