//! INI configuration for the HiPS service.
//!
//! A configuration file declares one `[service]` section, any number of
//! `[source.NAME]` render sources and `[layer.NAME]` HiPS layers:
//!
//! ```ini
//! [service]
//! cache_dir = /var/cache/hipslayer
//! resampling_method = bicubic
//!
//! [source.osm]
//! type = wms
//! url = http://localhost:8080/service
//! layers = osm
//!
//! [layer.direct]
//! title = Direct Layer
//! sources = osm
//! hips_order = 5
//! ```
//!
//! The file is parsed once into an immutable [`ServiceConfig`].

mod file;
mod parser;
mod settings;

pub use file::{config_file_path, ConfigError};
pub use settings::{
    default_cache_dir, LayerConfig, ServiceConfig, ServiceSettings, SourceConfig,
    DEFAULT_TILE_FORMATS, DEFAULT_TILE_WIDTH, DEFAULT_TIMEOUT_SECS,
};
