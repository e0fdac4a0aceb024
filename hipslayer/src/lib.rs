//! HipsLayer - HEALPix/HiPS tile generation from planar raster sources
//!
//! This library turns planar (longitude/latitude) imagery into HiPS tile
//! pyramids, and in the other direction renders planar images from an
//! existing HiPS survey.
//!
//! # High-Level API
//!
//! The [`service`] module answers `/hips` requests for configured layers,
//! and [`mosaic`] seeds whole orders or builds Allsky previews:
//!
//! ```ignore
//! use std::sync::Arc;
//! use hipslayer::config::ServiceConfig;
//! use hipslayer::service::{HipsRequest, HipsService};
//!
//! let config = Arc::new(ServiceConfig::load_from(&config_path)?);
//! let service = HipsService::from_config(config)?;
//!
//! let response = service.handle(&HipsRequest::get("/hips/osm/Norder3/Dir0/Npix42.png"));
//! hipslayer::mosaic::seed(&service, "osm", 3, 8, None)?;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod healpix;
pub mod layer;
pub mod logging;
pub mod mosaic;
pub mod projector;
pub mod provider;
pub mod raster;
pub mod resample;
pub mod service;
pub mod source;
pub mod srs;

/// Version of the HipsLayer library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
