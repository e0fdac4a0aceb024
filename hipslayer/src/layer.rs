//! Runtime HiPS layers built from configuration.
//!
//! Each configured layer is resolved once into a [`LayerSource`] variant, so
//! request handling never has to inspect what kind of renderer backs it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheMode, TileCache};
use crate::config::{ConfigError, LayerConfig, ServiceConfig, SourceConfig};
use crate::healpix::{check_pixel, AxisTables};
use crate::projector::{ProjectionError, TileProjector};
use crate::provider::{CompositeRenderer, HttpClient, RasterRenderer, WmsRenderer};
use crate::raster::Raster;
use crate::source::HipsSource;

/// A configured render source, shared between the layers using it.
#[derive(Clone)]
pub enum SourceHandle {
    Wms(Arc<WmsRenderer>),
    Hips(Arc<HipsSource>),
}

impl SourceHandle {
    pub fn renderer(&self) -> Arc<dyn RasterRenderer> {
        match self {
            SourceHandle::Wms(r) => r.clone(),
            SourceHandle::Hips(s) => s.clone(),
        }
    }
}

/// How a layer produces its imagery.
#[derive(Clone)]
pub enum LayerSource {
    /// One planar renderer sampled by the projector.
    Direct(Arc<dyn RasterRenderer>),
    /// An upstream HiPS survey; tiles, `properties` and `Allsky` are relayed.
    Passthrough(Arc<HipsSource>),
    /// Several renderers composited bottom to top.
    Composite(Arc<CompositeRenderer>),
}

impl LayerSource {
    pub fn renderer(&self) -> Arc<dyn RasterRenderer> {
        match self {
            LayerSource::Direct(r) => r.clone(),
            LayerSource::Passthrough(s) => s.clone(),
            LayerSource::Composite(c) => c.clone(),
        }
    }

    /// The upstream survey of a passthrough layer.
    pub fn passthrough(&self) -> Option<&HipsSource> {
        match self {
            LayerSource::Passthrough(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LayerSource::Direct(_) => "direct",
            LayerSource::Passthrough(_) => "passthrough",
            LayerSource::Composite(_) => "composite",
        }
    }
}

/// A servable HiPS layer.
pub struct Layer {
    config: LayerConfig,
    source: LayerSource,
    projector: TileProjector,
}

impl Layer {
    pub fn new(config: LayerConfig, source: LayerSource, projector: TileProjector) -> Self {
        Self {
            config,
            source,
            projector,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn source(&self) -> &LayerSource {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// log2 of the tile width.
    pub fn shift(&self) -> u8 {
        self.config.shift()
    }

    pub fn tile_width(&self) -> u32 {
        self.config.tile_width
    }

    /// Upstream survey when `properties` should be relayed verbatim.
    pub fn relayed_properties(&self) -> Option<&HipsSource> {
        self.source
            .passthrough()
            .filter(|_| self.config.passthrough_properties)
    }

    /// Tile `pixel` at `order`.
    ///
    /// Passthrough layers return the upstream tile at the same index as is.
    /// Other layers project their renderer at the layer's tile width.
    pub fn tile(&self, order: u8, pixel: u64) -> Result<Raster, ProjectionError> {
        match &self.source {
            LayerSource::Passthrough(upstream) => {
                check_pixel(order, pixel, 0)?;
                Ok(upstream.fetch_tile(order, pixel)?)
            }
            LayerSource::Direct(_) | LayerSource::Composite(_) => {
                self.projector.project(order, pixel, self.shift())
            }
        }
    }

    /// Generates tile `pixel` at `order` with side `2^shift`.
    pub fn project_with_shift(
        &self,
        order: u8,
        pixel: u64,
        shift: u8,
    ) -> Result<Raster, ProjectionError> {
        self.projector.project(order, pixel, shift)
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.config.name)
            .field("kind", &self.source.kind())
            .field("tile_width", &self.config.tile_width)
            .finish()
    }
}

/// Builds the render sources declared in `config`.
pub fn build_sources(
    config: &ServiceConfig,
    client: Arc<dyn HttpClient>,
) -> BTreeMap<String, SourceHandle> {
    let settings = &config.service;
    config
        .sources
        .iter()
        .map(|(name, source)| {
            let handle = match source {
                SourceConfig::Wms {
                    url,
                    layers,
                    transparent,
                } => SourceHandle::Wms(Arc::new(
                    WmsRenderer::new(client.clone(), url.clone(), layers.clone())
                        .with_transparent(*transparent),
                )),
                SourceConfig::Hips {
                    url,
                    resampling,
                    cache_tiles,
                } => {
                    let mut hips = HipsSource::new(client.clone(), url.clone(), *resampling);
                    if *cache_tiles {
                        hips = hips.with_tile_cache(TileCache::on_disk(
                            settings.cache_dir.join("sources").join(name),
                            settings.lock_dir.clone(),
                            settings.timeout,
                            CacheMode::ReadWrite,
                        ));
                    }
                    SourceHandle::Hips(Arc::new(hips))
                }
            };
            (name.clone(), handle)
        })
        .collect()
}

/// Resolves the kind of `layer` from its sources.
pub fn resolve_layer_source(
    layer: &LayerConfig,
    sources: &BTreeMap<String, SourceHandle>,
) -> Result<LayerSource, ConfigError> {
    let mut handles = Vec::with_capacity(layer.sources.len());
    for name in &layer.sources {
        let handle = sources.get(name).ok_or_else(|| ConfigError::UnknownSource {
            layer: layer.name.clone(),
            source_name: name.clone(),
        })?;
        handles.push(handle.clone());
    }

    match handles.as_slice() {
        [] => Err(ConfigError::NoSources(layer.name.clone())),
        [SourceHandle::Hips(hips)] if layer.passthrough => Ok(LayerSource::Passthrough(hips.clone())),
        [single] => Ok(LayerSource::Direct(single.renderer())),
        many => Ok(LayerSource::Composite(Arc::new(CompositeRenderer::new(
            many.iter().map(SourceHandle::renderer).collect(),
        )))),
    }
}

/// Builds every configured layer, in file order.
pub fn build_layers(
    config: &ServiceConfig,
    client: Arc<dyn HttpClient>,
) -> Result<Vec<Layer>, ConfigError> {
    let sources = build_sources(config, client);
    let tables = AxisTables::new();
    config
        .layers
        .iter()
        .map(|layer_config| {
            let source = resolve_layer_source(layer_config, &sources)?;
            info!(
                layer = %layer_config.name,
                kind = source.kind(),
                tile_width = layer_config.tile_width,
                "Configured HiPS layer"
            );
            let projector = TileProjector::with_axis_tables(
                source.renderer(),
                config.service.resampling,
                tables.clone(),
            );
            Ok(Layer::new(layer_config.clone(), source, projector))
        })
        .collect()
}
