//! Render collaborators producing planar rasters for a [`MapQuery`].

use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

use super::http::HttpClient;
use super::types::{MapQuery, RenderError};
use crate::raster::Raster;

/// Produces an RGBA raster covering a query.
///
/// Implementations must return exactly `query.width × query.height` pixels.
pub trait RasterRenderer: Send + Sync {
    fn render(&self, query: &MapQuery) -> Result<Raster, RenderError>;
}

/// Renders through a WMS 1.1.1 `GetMap` endpoint.
pub struct WmsRenderer {
    client: Arc<dyn HttpClient>,
    url: String,
    layers: Vec<String>,
    transparent: bool,
}

impl WmsRenderer {
    /// # Arguments
    ///
    /// * `client` - HTTP client used for requests
    /// * `url` - Service endpoint, without query string
    /// * `layers` - WMS layer names, drawn bottom to top
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>, layers: Vec<String>) -> Self {
        Self {
            client,
            url: url.into(),
            layers,
            transparent: false,
        }
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Builds the `GetMap` URL for `query`.
    pub fn request_url(&self, query: &MapQuery) -> Result<String, RenderError> {
        let bbox = query
            .bbox
            .iter()
            .map(|v| format!("{:?}", v))
            .collect::<Vec<_>>()
            .join(",");
        let width = query.width.to_string();
        let height = query.height.to_string();
        let layers = self.layers.join(",");
        let mut params = vec![
            ("layers", layers.as_str()),
            ("bbox", bbox.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("srs", query.srs.code()),
            ("format", "image/png"),
            ("request", "GetMap"),
            ("version", "1.1.1"),
            ("service", "WMS"),
            ("styles", ""),
        ];
        if self.transparent {
            params.push(("transparent", "true"));
        }
        Url::parse_with_params(&self.url, &params)
            .map(|u| u.to_string())
            .map_err(|e| RenderError::InvalidSource(format!("Invalid WMS url {}: {}", self.url, e)))
    }
}

impl RasterRenderer for WmsRenderer {
    fn render(&self, query: &MapQuery) -> Result<Raster, RenderError> {
        let url = self.request_url(query)?;
        debug!(url = %url, "Requesting source raster");
        let raster = self.client.get_image(&url)?;
        if raster.width() != query.width || raster.height() != query.height {
            return Err(RenderError::InvalidSource(format!(
                "expected {}x{} image from {}, got {}x{}",
                query.width,
                query.height,
                self.url,
                raster.width(),
                raster.height()
            )));
        }
        Ok(raster.to_rgba())
    }
}

/// Alpha-composites several renderers, first one at the bottom.
pub struct CompositeRenderer {
    layers: Vec<Arc<dyn RasterRenderer>>,
}

impl CompositeRenderer {
    pub fn new(layers: Vec<Arc<dyn RasterRenderer>>) -> Self {
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl RasterRenderer for CompositeRenderer {
    fn render(&self, query: &MapQuery) -> Result<Raster, RenderError> {
        let mut canvas = Raster::new(query.width, query.height, 4);
        for layer in &self.layers {
            let top = layer.render(query)?;
            if top.width() != query.width || top.height() != query.height {
                return Err(RenderError::InvalidSource(format!(
                    "layer returned {}x{} for a {}x{} query",
                    top.width(),
                    top.height(),
                    query.width,
                    query.height
                )));
            }
            canvas.composite_over(&top.to_rgba());
        }
        Ok(canvas)
    }
}
