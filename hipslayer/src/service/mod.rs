//! The `/hips` endpoint: path validation, properties, Allsky and tiles.
//!
//! [`HipsService::handle`] answers one request synchronously. It is
//! transport-agnostic; the CLI's `serve` command adapts it to HTTP.
//!
//! ```text
//! /hips/{layer}/properties
//! /hips/{layer}/Norder{K}/Allsky.{png,jpg}
//! /hips/{layer}/Norder{K}/Dir{D}/Npix{N}[.{png,jpg}]
//! ```
//!
//! Malformed paths never produce an error: they are answered with a 404
//! whose body explains what is wrong.

mod properties;
mod request;

pub use properties::{
    properties_document, DEFAULT_CREATOR_DID, DEFAULT_HIPS_FRAME, DEFAULT_HIPS_ORDER,
    DEFAULT_HIPS_STATUS,
};
pub use request::{HipsRequest, HipsResponse, Method, RequestError, TEXT_PLAIN};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::{CacheMode, TileCache, TileKey};
use crate::codec::{CodecError, TileFormat};
use crate::config::{ConfigError, ServiceConfig};
use crate::layer::{build_layers, Layer};
use crate::projector::ProjectionError;
use crate::provider::{FetchError, HttpClient, RenderError, ReqwestClient};
use crate::source::HipsSource;

use request::{parse_target, split_path, Target};

/// Failure generating one encoded tile.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl GenerateError {
    /// HTTP status reported for this failure.
    pub fn status(&self) -> u16 {
        match self {
            GenerateError::Projection(ProjectionError::Render(_)) => 502,
            _ => 500,
        }
    }
}

/// A layer together with the cache its tiles are served from.
#[derive(Debug)]
pub struct ServedLayer {
    layer: Layer,
    cache: TileCache,
}

impl ServedLayer {
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Generates and encodes tile `pixel` at `order`, bypassing the cache.
    ///
    /// Passthrough tiles are the upstream tile re-encoded to `format`.
    pub fn generate_tile(
        &self,
        order: u8,
        pixel: u64,
        format: TileFormat,
    ) -> Result<Vec<u8>, GenerateError> {
        let raster = self.layer.tile(order, pixel)?;
        Ok(format.encode(&raster)?)
    }
}

/// Serves the configured HiPS layers.
#[derive(Debug)]
pub struct HipsService {
    config: Arc<ServiceConfig>,
    layers: Vec<ServedLayer>,
}

impl HipsService {
    /// Builds the service with an HTTP client honouring the configured timeout.
    pub fn from_config(config: Arc<ServiceConfig>) -> Result<Self, ConfigError> {
        let client = ReqwestClient::with_timeout(config.service.timeout.as_secs())?;
        Self::new(config, Arc::new(client))
    }

    /// Builds the service over `client`, used by every upstream source.
    pub fn new(config: Arc<ServiceConfig>, client: Arc<dyn HttpClient>) -> Result<Self, ConfigError> {
        let settings = &config.service;
        let mode = if settings.populate_cache {
            CacheMode::ReadWrite
        } else {
            CacheMode::ReadOnly
        };

        let layers = build_layers(&config, client)?
            .into_iter()
            .map(|layer| {
                let cache = TileCache::on_disk(
                    settings.cache_dir.join(layer.name()),
                    settings.lock_dir.clone(),
                    settings.timeout,
                    mode,
                );
                ServedLayer { layer, cache }
            })
            .collect();

        Ok(Self { config, layers })
    }

    pub fn config(&self) -> &Arc<ServiceConfig> {
        &self.config
    }

    /// Layers in configuration order.
    pub fn layers(&self) -> impl Iterator<Item = &ServedLayer> {
        self.layers.iter()
    }

    pub fn layer(&self, name: &str) -> Option<&ServedLayer> {
        self.layers.iter().find(|served| served.layer.name() == name)
    }

    /// Looks up a layer that may be served over `/hips`.
    pub fn enabled_layer(&self, name: &str) -> Result<&ServedLayer, RequestError> {
        let served = self
            .layer(name)
            .ok_or_else(|| RequestError::UnknownLayer(name.to_string()))?;
        if !served.layer.is_enabled() {
            return Err(RequestError::LayerDisabled(name.to_string()));
        }
        Ok(served)
    }

    /// Location of a pre-generated Allsky file.
    pub fn allsky_path(&self, layer: &str, order: u8, format: TileFormat) -> PathBuf {
        self.config
            .service
            .cache_dir
            .join(layer)
            .join(format!("Norder{}", order))
            .join(format!("Allsky.{}", format.extension()))
    }

    /// Answers one request.
    pub fn handle(&self, request: &HipsRequest) -> HipsResponse {
        info!(method = ?request.method, path = %request.path, "Handle HiPS request");
        let response = self
            .dispatch(request)
            .unwrap_or_else(|e| HipsResponse::not_found(e.to_string()));
        response.for_method(request.method)
    }

    fn dispatch(&self, request: &HipsRequest) -> Result<HipsResponse, RequestError> {
        let (layer_name, components) = split_path(&request.path)?;
        let served = self.enabled_layer(layer_name)?;

        match parse_target(&components, served.layer.shift())? {
            Target::Properties => Ok(self.properties(served)),
            Target::Allsky { order, format } => self.allsky(served, order, format, request.method),
            Target::Tile(key) => Ok(self.tile(served, key)),
        }
    }

    fn properties(&self, served: &ServedLayer) -> HipsResponse {
        let Some(upstream) = served.layer.relayed_properties() else {
            let document = properties_document(served.layer.config(), Utc::now());
            return HipsResponse::ok(TEXT_PLAIN, document.into_bytes());
        };
        match upstream.properties_document() {
            Ok(body) => HipsResponse::ok(TEXT_PLAIN, body),
            Err(e) => {
                warn!(layer = %served.layer.name(), error = %e, "Upstream properties unavailable");
                HipsResponse::text(502, format!("Upstream properties unavailable: {}", e))
            }
        }
    }

    fn allsky(
        &self,
        served: &ServedLayer,
        order: u8,
        format: TileFormat,
        method: Method,
    ) -> Result<HipsResponse, RequestError> {
        if let Some(upstream) = served.layer.source().passthrough() {
            return Ok(relay_allsky(upstream, order, method));
        }

        let path = self.allsky_path(served.layer.name(), order, format);
        if !path.is_file() {
            return Err(RequestError::AllskyNotGenerated);
        }
        if method == Method::Head {
            return Ok(HipsResponse::ok(format.mime_type(), Vec::new()));
        }
        match std::fs::read(&path) {
            Ok(body) => Ok(HipsResponse::ok(format.mime_type(), body)),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read Allsky file");
                Ok(HipsResponse::text(500, format!("Failed to read Allsky file: {}", e)))
            }
        }
    }

    fn tile(&self, served: &ServedLayer, key: TileKey) -> HipsResponse {
        let result = served.cache.get_or_populate(&key, || {
            served.generate_tile(key.order, key.pixel, key.format)
        });
        match result {
            Ok(tile) => HipsResponse::ok(key.format.mime_type(), tile.bytes),
            Err(e) => {
                error!(layer = %served.layer.name(), tile = %key, error = %e, "Tile generation failed");
                HipsResponse::text(e.status(), format!("Failed to generate {}: {}", key, e))
            }
        }
    }
}

/// Relays the upstream Allsky of a passthrough layer in the upstream format.
fn relay_allsky(upstream: &HipsSource, order: u8, method: Method) -> HipsResponse {
    let result = if method == Method::Head {
        upstream
            .properties()
            .map(|props| (props.format, Vec::new()))
    } else {
        upstream.load_allsky(order)
    };
    match result {
        Ok((format, body)) => HipsResponse::ok(format.mime_type(), body),
        Err(e) => {
            warn!(url = %upstream.url(), order, error = %e, "Upstream Allsky unavailable");
            let status = match e {
                RenderError::Fetch(FetchError::NotFound(_)) => 404,
                _ => 502,
            };
            HipsResponse::text(status, format!("Upstream Allsky unavailable: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::healpix::HealPixError;
    use crate::raster::Raster;
    use crate::provider::RoutedHttpClient;
    use tempfile::TempDir;

    const UPSTREAM: &str = "http://localhost:42423/hips_source";

    fn config(temp: &TempDir, populate: bool) -> Arc<ServiceConfig> {
        let text = format!(
            r#"
[service]
cache_dir = {}
populate_cache = {}
resampling_method = nearest_neighbour

[source.osm]
type = wms
url = http://localhost:42423/service
layers = bar

[source.sky]
type = hips
url = {}
cache_hips_tiles = false

[layer.osm]
sources = osm
tile_width = 8
hips_order = 3

[layer.sky]
title = Upstream sky
sources = sky

[layer.hidden]
sources = osm
enabled = false
"#,
            temp.path().display(),
            populate,
            UPSTREAM
        );
        Arc::new(ServiceConfig::from_ini_str(&text).unwrap())
    }

    fn service(temp: &TempDir, client: RoutedHttpClient) -> HipsService {
        HipsService::new(config(temp, true), Arc::new(client)).unwrap()
    }

    fn upstream_client() -> RoutedHttpClient {
        RoutedHttpClient::default()
            .with_route(
                &format!("{}/properties", UPSTREAM),
                b"hips_order = 3\nhips_tile_format = png\n".to_vec(),
            )
            .with_route(&format!("{}/Norder0/Allsky.png", UPSTREAM), b"allsky".to_vec())
    }

    #[test]
    fn test_layer_checks() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, RoutedHttpClient::default());

        let response = service.handle(&HipsRequest::get("/hips/nope/properties"));
        assert_eq!(response.status, 404);
        assert_eq!(response.text_body(), "Unhandled layer name nope");

        let response = service.handle(&HipsRequest::get("/hips/hidden/properties"));
        assert_eq!(response.text_body(), "HIPS not enabled for layer hidden");

        let response = service.handle(&HipsRequest::get("/hips/osm"));
        assert_eq!(response.text_body(), "Bad path for /hips. Should be /hips/layer/...");
    }

    #[test]
    fn test_generated_properties() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, RoutedHttpClient::default());

        let response = service.handle(&HipsRequest::get("/hips/osm/properties"));
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/plain");
        let body = response.text_body();
        assert!(body.starts_with("creator_did=ivo://example.com/unknown_resource_FIXME\nobs_title=osm\n"));
        assert!(body.contains("hips_order=3\n"));
        assert!(body.contains("hips_tile_width=8\n"));
    }

    #[test]
    fn test_relayed_properties_and_allsky() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, upstream_client());

        let response = service.handle(&HipsRequest::get("/hips/sky/properties"));
        assert_eq!(response.text_body(), "hips_order = 3\nhips_tile_format = png\n");

        let response = service.handle(&HipsRequest::get("/hips/sky/Norder0/Allsky.jpg"));
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "image/png");
        assert_eq!(response.body, b"allsky");

        let response = service.handle(&HipsRequest::head("/hips/sky/Norder0/Allsky.png"));
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());

        let response = service.handle(&HipsRequest::get("/hips/sky/Norder1/Allsky.png"));
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_allsky_must_be_pregenerated() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, RoutedHttpClient::default());

        let response = service.handle(&HipsRequest::get("/hips/osm/Norder0/Allsky.png"));
        assert_eq!(response.status, 404);
        assert_eq!(
            response.text_body(),
            "Allsky requests should be pre-generated with hipslayer allsky"
        );

        let path = service.allsky_path("osm", 0, TileFormat::Png);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"png bytes").unwrap();

        let response = service.handle(&HipsRequest::get("/hips/osm/Norder0/Allsky.png"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"png bytes");

        let response = service.handle(&HipsRequest::head("/hips/osm/Norder0/Allsky.png"));
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_upstream_failure_is_bad_gateway() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, RoutedHttpClient::default());

        let response = service.handle(&HipsRequest::get("/hips/osm/Norder0/Dir0/Npix0.png"));
        assert_eq!(response.status, 502);
        assert!(!service
            .layer("osm")
            .unwrap()
            .cache()
            .is_cached(&TileKey::new(0, 0, TileFormat::Png)));
    }

    #[test]
    fn test_passthrough_tile_relays_upstream_tile() {
        let mut gradient = Raster::new(64, 64, 4);
        for y in 0..64 {
            for x in 0..64 {
                gradient
                    .pixel_mut(x, y)
                    .copy_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128, 255]);
            }
        }
        let tile_url = format!("{}/Norder1/Dir0/Npix5.png", UPSTREAM);
        let client = Arc::new(
            upstream_client().with_route(&tile_url, TileFormat::Png.encode(&gradient).unwrap()),
        );
        let temp = TempDir::new().unwrap();
        let service = HipsService::new(config(&temp, true), client.clone()).unwrap();

        let response = service.handle(&HipsRequest::get("/hips/sky/Norder1/Dir0/Npix5.png"));
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "image/png");
        assert_eq!(decode(&response.body).unwrap(), gradient);

        let tile_fetches = client
            .requested()
            .iter()
            .filter(|url| url.contains("/Norder"))
            .count();
        assert_eq!(tile_fetches, 1);
        assert!(client.requested().contains(&tile_url));
    }

    #[test]
    fn test_passthrough_tile_missing_upstream() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, upstream_client());

        let response = service.handle(&HipsRequest::get("/hips/sky/Norder1/Dir0/Npix5.png"));
        assert_eq!(response.status, 502);
    }

    #[test]
    fn test_generate_error_status() {
        let render = GenerateError::Projection(ProjectionError::Render(RenderError::InvalidSource(
            "bad".to_string(),
        )));
        assert_eq!(render.status(), 502);
        let invalid = GenerateError::Projection(ProjectionError::HealPix(
            HealPixError::InvalidPixel { order: 0, pixel: 12 },
        ));
        assert_eq!(invalid.status(), 500);
    }
}
