//! Collaborators that fetch bytes and render source rasters.
//!
//! - [`HttpClient`] fetches upstream HiPS documents and tiles
//! - [`RasterRenderer`] produces planar rasters for a [`MapQuery`]; the
//!   WMS and composite renderers live here, the HiPS assembler in
//!   [`crate::source`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hipslayer::provider::{MapQuery, RasterRenderer, ReqwestClient, WmsRenderer};
//!
//! let client = Arc::new(ReqwestClient::with_timeout(30)?);
//! let wms = WmsRenderer::new(client, "http://localhost:8080/service", vec!["osm".into()]);
//! let raster = wms.render(&MapQuery::geodetic([0.0, 0.0, 90.0, 90.0], 785, 785))?;
//! ```

mod http;
mod render;
mod types;

pub use http::{HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use render::{CompositeRenderer, RasterRenderer, WmsRenderer};
pub use types::{FetchError, MapQuery, RenderError};

#[cfg(test)]
pub use http::tests::{MockHttpClient, RoutedHttpClient};
#[cfg(test)]
pub use render::tests::MockRenderer;
