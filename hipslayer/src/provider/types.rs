//! Shared types for the fetch and render collaborators.

use thiserror::Error;

use crate::srs::Srs;

/// Failure talking to an upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request exceeded the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure or non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The body could not be decoded as an image.
    #[error("Failed to decode image from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Failure producing a raster for a map query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The source returned something unusable (wrong size, bad metadata).
    #[error("Invalid source response: {0}")]
    InvalidSource(String),
}

/// A planar render request: bounding box, SRS and output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapQuery {
    /// `[min_x, min_y, max_x, max_y]` in `srs` units.
    pub bbox: [f64; 4],
    pub srs: Srs,
    pub width: u32,
    pub height: u32,
}

impl MapQuery {
    pub fn new(bbox: [f64; 4], srs: Srs, width: u32, height: u32) -> Self {
        Self {
            bbox,
            srs,
            width,
            height,
        }
    }

    /// Geodetic query, the common case for tile projection.
    pub fn geodetic(bbox: [f64; 4], width: u32, height: u32) -> Self {
        Self::new(bbox, Srs::Geodetic, width, height)
    }

    /// Horizontal size of one output pixel in `srs` units.
    pub fn res_x(&self) -> f64 {
        (self.bbox[2] - self.bbox[0]) / self.width as f64
    }

    /// Vertical size of one output pixel in `srs` units.
    pub fn res_y(&self) -> f64 {
        (self.bbox[3] - self.bbox[1]) / self.height as f64
    }
}
