//! The two spatial reference systems understood by the engine.
//!
//! Only the inverse projection to geodetic lon/lat is needed: render queries
//! arrive in a planar SRS and are sampled on the sphere.

use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// WGS84 semi-major axis used by spherical Web Mercator.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported SRS '{0}': expected EPSG:4326 or EPSG:3857")]
pub struct UnsupportedSrs(pub String);

/// Spatial reference system of a render query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Srs {
    /// Longitude/latitude degrees (EPSG:4326, CRS:84).
    #[default]
    Geodetic,
    /// Spherical Mercator metres (EPSG:3857, EPSG:900913).
    WebMercator,
}

impl Srs {
    pub fn code(self) -> &'static str {
        match self {
            Srs::Geodetic => "EPSG:4326",
            Srs::WebMercator => "EPSG:3857",
        }
    }

    pub fn is_geodetic(self) -> bool {
        self == Srs::Geodetic
    }

    /// Planar units per degree of longitude at the equator.
    pub fn units_per_degree(self) -> f64 {
        match self {
            Srs::Geodetic => 1.0,
            Srs::WebMercator => EARTH_RADIUS_M.to_radians(),
        }
    }

    /// Converts a planar coordinate to `(lon, lat)` degrees.
    pub fn to_lonlat(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Srs::Geodetic => (x, y),
            Srs::WebMercator => {
                let lon = (x / EARTH_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees();
                (lon, lat)
            }
        }
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Srs {
    type Err = UnsupportedSrs;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" | "EPSG:4258" => Ok(Srs::Geodetic),
            "EPSG:3857" | "EPSG:900913" | "EPSG:102100" | "EPSG:102113" => Ok(Srs::WebMercator),
            _ => Err(UnsupportedSrs(s.to_string())),
        }
    }
}
