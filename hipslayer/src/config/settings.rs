//! Configuration data types and defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::default_lock_dir;
use crate::codec::TileFormat;
use crate::resample::ResamplingMode;

/// Tile width used when a layer does not set `tile_width`.
pub const DEFAULT_TILE_WIDTH: u32 = 512;

/// Upstream and lock timeout used when `[service]` does not set `timeout`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `hips_tile_format` advertised when a layer does not set one.
pub const DEFAULT_TILE_FORMATS: &str = "png jpeg";

/// The `[service]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    /// Root of generated tiles and Allsky files.
    pub cache_dir: PathBuf,
    /// Directory for tile lock files.
    pub lock_dir: PathBuf,
    /// Bound on upstream requests and lock waits.
    pub timeout: Duration,
    /// Whether generated tiles are written to the cache.
    pub populate_cache: bool,
    pub resampling: ResamplingMode,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let cache_dir = default_cache_dir();
        Self {
            lock_dir: default_lock_dir(&cache_dir),
            cache_dir,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            populate_cache: true,
            resampling: ResamplingMode::default(),
        }
    }
}

/// Default cache root (`<user cache dir>/hipslayer`).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hipslayer")
}

/// A `[source.NAME]` section.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    /// WMS 1.1.1 `GetMap` endpoint.
    Wms {
        url: String,
        layers: Vec<String>,
        transparent: bool,
    },
    /// Upstream HiPS survey.
    Hips {
        url: String,
        resampling: ResamplingMode,
        cache_tiles: bool,
    },
}

/// A `[layer.NAME]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    pub name: String,
    pub title: String,
    /// Source names, bottom to top.
    pub sources: Vec<String>,
    pub enabled: bool,
    /// Tile side in pixels; a power of two.
    pub tile_width: u32,
    pub passthrough: bool,
    pub passthrough_properties: bool,
    /// Remaining keys, in file order, copied to the properties document.
    pub metadata: Vec<(String, String)>,
}

impl LayerConfig {
    /// log2 of the tile width.
    pub fn shift(&self) -> u8 {
        self.tile_width.trailing_zeros() as u8
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Advertised `hips_tile_format` value.
    pub fn tile_format_list(&self) -> &str {
        self.metadata("hips_tile_format")
            .unwrap_or(DEFAULT_TILE_FORMATS)
    }

    /// Formats listed in `hips_tile_format`, in [`TileFormat::ALL`] order.
    pub fn tile_formats(&self) -> Vec<TileFormat> {
        let listed: Vec<&str> = self.tile_format_list().split_whitespace().collect();
        TileFormat::ALL
            .into_iter()
            .filter(|format| listed.contains(&format.name()))
            .collect()
    }
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    /// Sources in file order.
    pub sources: Vec<(String, SourceConfig)>,
    /// Layers in file order.
    pub layers: Vec<LayerConfig>,
}

impl ServiceConfig {
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|l| l.name == name)
    }
}
