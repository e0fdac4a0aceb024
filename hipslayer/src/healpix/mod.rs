//! HEALPix NESTED-scheme index math.
//!
//! Pure functions over the sphere: conversion between pixel indices and axis
//! coordinates, pixel footprints, and the angle to pixel mapping used by the
//! projector (tile ⇐ raster) and the assembler (raster ⇐ tiles).
//!
//! # Conventions
//!
//! - `order` is the subdivision depth, `nside = 2^order`, `12·nside²` pixels
//! - Pixels use NESTED numbering: `face << 2·order | subpixel`
//! - Angles are degrees; longitude east-positive, latitude north-positive
//!
//! # Example
//!
//! ```ignore
//! use hipslayer::healpix::{angle_to_pixel, pixel_boundaries, resolution_degrees};
//!
//! let pixel = angle_to_pixel(2, 2.0, 49.0);        // 10
//! let footprint = pixel_boundaries(2, pixel);      // N, W, S, E corners
//! let res = resolution_degrees(0, 512);            // ~0.1145°
//! ```

mod nested;
mod sphere;
mod tables;

use std::f64::consts::PI;

use thiserror::Error;

pub use nested::{axis_table, axis_to_subpixel, subpixel_to_axis, AxisCoord};
pub use sphere::{angle_to_pixel, angle_to_pixel_with_offsets, pixel_boundaries, pixel_center};
pub use tables::AxisTables;

/// Finest order whose pixel ids fit comfortably in 64 bits.
pub const MAX_ORDER: u8 = 29;

/// Extent slack used when deciding whether a footprint crosses the antimeridian.
const STRADDLE_EPSILON: f64 = 1e-5;

/// Invalid HEALPix indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HealPixError {
    #[error("Order {order} with tile shift {shift} exceeds maximum order {}", MAX_ORDER)]
    OrderTooLarge { order: u8, shift: u8 },

    #[error("Invalid pixel {pixel} for order {order}")]
    InvalidPixel { order: u8, pixel: u64 },
}

/// Checks that `pixel` exists at `order` and that its tiles of side
/// `2^shift` stay within [`MAX_ORDER`].
pub fn check_pixel(order: u8, pixel: u64, shift: u8) -> Result<(), HealPixError> {
    if order as u32 + shift as u32 > MAX_ORDER as u32 {
        return Err(HealPixError::OrderTooLarge { order, shift });
    }
    if pixel >= pixel_count(order) {
        return Err(HealPixError::InvalidPixel { order, pixel });
    }
    Ok(())
}

/// Returns `2^order`.
pub fn nside(order: u8) -> u64 {
    1u64 << order
}

/// Returns the number of pixels at `order` (`12·nside²`).
pub fn pixel_count(order: u8) -> u64 {
    12u64 << (2 * order as u32)
}

/// Angular size in degrees of one image pixel of a tile at `order`.
///
/// `deg(sqrt(4π / (12·(tile_size·2^order)²)))`
pub fn resolution_degrees(order: u8, tile_size: u32) -> f64 {
    let n = tile_size as f64 * 2f64.powi(order as i32);
    (4.0 * PI / (12.0 * n * n)).sqrt().to_degrees()
}

/// Continuous inverse of [`resolution_degrees`]; callers round as needed.
pub fn order_for_resolution(res_deg: f64, tile_size: u32) -> f64 {
    let res = res_deg.to_radians();
    ((4.0 * PI / (res * res) / 12.0).sqrt() / tile_size as f64).log2()
}

/// A sky position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// True for the two poles, where longitude is undefined.
    pub fn is_pole(&self) -> bool {
        self.lat.abs() == 90.0
    }
}

/// The four corners of a pixel, ordered north, west, south, east.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFootprint {
    corners: [LonLat; 4],
}

/// Longitude/latitude bounds of a footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintExtent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    /// The footprint crosses ±180° and must be treated as two pieces.
    pub straddles_antimeridian: bool,
}

impl FootprintExtent {
    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

impl GeoFootprint {
    pub fn new(corners: [LonLat; 4]) -> Self {
        Self { corners }
    }

    pub fn corners(&self) -> &[LonLat; 4] {
        &self.corners
    }

    pub fn north(&self) -> LonLat {
        self.corners[0]
    }

    pub fn west(&self) -> LonLat {
        self.corners[1]
    }

    pub fn south(&self) -> LonLat {
        self.corners[2]
    }

    pub fn east(&self) -> LonLat {
        self.corners[3]
    }

    /// Computes the lon/lat bounding box of the footprint.
    ///
    /// Pole corners are ignored for the longitude range. A corner sitting
    /// exactly on 180° is folded onto the side of the remaining corners; if
    /// the span still exceeds 90° the footprint straddles the antimeridian.
    pub fn extent(&self) -> FootprintExtent {
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut found_180 = false;

        for corner in self.corners.iter().filter(|c| !c.is_pole()) {
            min_lon = min_lon.min(corner.lon);
            if corner.lon == 180.0 {
                found_180 = true;
            } else {
                max_lon = max_lon.max(corner.lon);
            }
        }

        if found_180 {
            if max_lon < 0.0 {
                min_lon = -180.0;
            } else {
                max_lon = 180.0;
            }
        }

        let min_lat = self.corners.iter().map(|c| c.lat).fold(f64::INFINITY, f64::min);
        let max_lat = self
            .corners
            .iter()
            .map(|c| c.lat)
            .fold(f64::NEG_INFINITY, f64::max);

        FootprintExtent {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
            straddles_antimeridian: max_lon - min_lon > 90.0 + STRADDLE_EPSILON,
        }
    }
}
