//! HEALPix tile generation from a planar geodetic source.
//!
//! For one tile `(order, pixel)` of side `2^shift`:
//!
//! 1. The pixel footprint gives the lon/lat box to render; footprints
//!    crossing the antimeridian are rendered as two boxes joined side by side.
//! 2. The source raster is oversampled relative to the tile resolution
//!    (capped at 2× for interpolating modes, to bound blow-up near the poles).
//! 3. Every tile pixel is mapped back to the source through the sky position
//!    of its centre at order `order + shift`, then sampled (nearest or
//!    convolution).

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::healpix::{
    check_pixel, pixel_boundaries, pixel_center, resolution_degrees, AxisTables, HealPixError,
};
use crate::provider::{MapQuery, RasterRenderer, RenderError};
use crate::raster::Raster;
use crate::resample::{Kernel, ResamplingMode, Resampler};

/// Cap on the oversampling ratio for interpolating modes.
const MAX_OVERSAMPLING: f64 = 2.0;

/// Errors raised while projecting a tile.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Failed to render source raster: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    HealPix(#[from] HealPixError),
}

/// Source requests and georeferencing for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePlan {
    /// One query, or two (west then east part) for antimeridian tiles.
    pub queries: Vec<MapQuery>,
    /// West edge of the joined source raster; may be > 180 when joined.
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    /// Joined source size in pixels.
    pub width: u32,
    pub height: u32,
    /// Whether tile longitudes must be folded to `(-180, 180]`.
    pub wrap_longitudes: bool,
    /// Source-to-target scales handed to the resampler.
    pub x_scale: f64,
    pub y_scale: f64,
}

impl SourcePlan {
    /// Plans the source rendering for `(order, pixel)` with tiles of side
    /// `tile_size`.
    ///
    /// Every query is at least one pixel on each side, so antimeridian
    /// tiles at very small sizes still sample both halves.
    pub fn new(order: u8, pixel: u64, tile_size: u32, mode: ResamplingMode) -> SourcePlan {
        let footprint = pixel_boundaries(order, pixel);
        let extent = footprint.extent();
        let tile = tile_size as f64;
        let tile_span = tile * resolution_degrees(order, tile_size);

        let ratio_lat = extent.lat_span() / tile_span;
        let ratio_lon = if extent.straddles_antimeridian {
            (footprint.east().lon + 360.0 - footprint.west().lon) / tile_span
        } else {
            extent.lon_span() / tile_span
        };

        let interpolating = mode.kernel().is_some();
        let unsaturated = ratio_lat.max(ratio_lon);
        let ratio = if interpolating {
            unsaturated.min(MAX_OVERSAMPLING)
        } else {
            ratio_lat.min(ratio_lon)
        };

        let height = ((tile * ratio) as u32).max(1);
        let (queries, left, right, width, wrap_longitudes) =
            if !extent.straddles_antimeridian {
                let query = MapQuery::geodetic(
                    [extent.min_lon, extent.min_lat, extent.max_lon, extent.max_lat],
                    height,
                    height,
                );
                (vec![query], extent.min_lon, extent.max_lon, height, true)
            } else {
                // The footprint crosses the antimeridian through its north
                // and south corners; west and east corners lie on either side.
                debug_assert!((footprint.north().lon - 180.0).abs() < 1e-10);
                debug_assert!((footprint.south().lon - 180.0).abs() < 1e-10);
                debug_assert!(footprint.west().lon > 0.0);
                debug_assert!(footprint.east().lon < 0.0);
                let left = footprint.west().lon;
                let right = footprint.east().lon;
                let left_extent = 180.0 - left;
                let right_extent = right + 180.0;
                let total = left_extent + right_extent;
                let width_left = ((tile * left_extent / total * ratio) as u32).max(1);
                let width_right = ((tile * right_extent / total * ratio) as u32).max(1);
                let queries = vec![
                    MapQuery::geodetic(
                        [left, extent.min_lat, 180.0, extent.max_lat],
                        width_left,
                        height,
                    ),
                    MapQuery::geodetic(
                        [-180.0, extent.min_lat, right, extent.max_lat],
                        width_right,
                        height,
                    ),
                ];
                (queries, left, right + 360.0, width_left + width_right, false)
            };

        // Anisotropic correction for non-square source pixels.
        let (x_scale, y_scale) = if !interpolating {
            (1.0, 1.0)
        } else if ratio_lon > ratio_lat {
            (ratio / ratio_lat, ratio / unsaturated)
        } else {
            (ratio / unsaturated, ratio / ratio_lon)
        };

        SourcePlan {
            queries,
            left,
            right,
            top: extent.max_lat,
            bottom: extent.min_lat,
            width,
            height,
            wrap_longitudes,
            x_scale,
            y_scale,
        }
    }

    pub fn x_res(&self) -> f64 {
        (self.right - self.left) / self.width as f64
    }

    pub fn y_res(&self) -> f64 {
        (self.top - self.bottom) / self.height as f64
    }
}

/// Builds HEALPix tiles by sampling a [`RasterRenderer`].
pub struct TileProjector {
    renderer: Arc<dyn RasterRenderer>,
    mode: ResamplingMode,
    axis_tables: AxisTables,
}

impl TileProjector {
    pub fn new(renderer: Arc<dyn RasterRenderer>, mode: ResamplingMode) -> Self {
        Self::with_axis_tables(renderer, mode, AxisTables::new())
    }

    /// Creates a projector sharing an existing axis-table memo.
    pub fn with_axis_tables(
        renderer: Arc<dyn RasterRenderer>,
        mode: ResamplingMode,
        axis_tables: AxisTables,
    ) -> Self {
        Self {
            renderer,
            mode,
            axis_tables,
        }
    }

    pub fn mode(&self) -> ResamplingMode {
        self.mode
    }

    /// Generates tile `pixel` at `order` with side `2^shift`.
    ///
    /// The tile has the channel count of the rendered source. Pixels whose
    /// centre falls outside the source stay zero (transparent); pixels that
    /// receive a sample are opaque.
    ///
    /// # Errors
    ///
    /// Fails on invalid indices and when the renderer fails.
    pub fn project(&self, order: u8, pixel: u64, shift: u8) -> Result<Raster, ProjectionError> {
        check_pixel(order, pixel, shift)?;

        let tile_size = 1u32 << shift;
        let plan = SourcePlan::new(order, pixel, tile_size, self.mode);
        debug!(
            order,
            pixel,
            width = plan.width,
            height = plan.height,
            parts = plan.queries.len(),
            "Rendering source for tile"
        );

        let source = self.render_source(&plan)?;
        Ok(self.sample_tile(order, pixel, shift, &plan, &source))
    }

    fn render_source(&self, plan: &SourcePlan) -> Result<Raster, ProjectionError> {
        let mut parts = Vec::with_capacity(plan.queries.len());
        for query in &plan.queries {
            parts.push(self.renderer.render(query)?);
        }
        match parts.len() {
            1 => Ok(parts.remove(0)),
            _ => Raster::hconcat(&parts[0], &parts[1]).ok_or_else(|| {
                RenderError::InvalidSource(
                    "antimeridian halves differ in height or channels".to_string(),
                )
                .into()
            }),
        }
    }

    fn sample_tile(
        &self,
        order: u8,
        pixel: u64,
        shift: u8,
        plan: &SourcePlan,
        source: &Raster,
    ) -> Raster {
        let tile_size = 1u32 << shift;
        let channels = source.channels();
        let mut tile = Raster::new(tile_size, tile_size, channels);
        let table = self.axis_tables.get(shift);
        let first = pixel << (2 * shift as u32);
        let fine_order = order + shift;

        let x_res = plan.x_res();
        let y_res = plan.y_res();
        let width = plan.width as f64;
        let height = plan.height as f64;

        let mut resampler = self
            .mode
            .kernel()
            .map(|k: Kernel| Resampler::new(k, plan.x_scale, plan.y_scale));
        let mut values = [0.0f64; 4];

        for (i, axis) in table.iter().enumerate() {
            let centre = pixel_center(fine_order, first + i as u64);
            let lon = if plan.wrap_longitudes && centre.lon > 180.0 {
                centre.lon - 360.0
            } else {
                centre.lon
            };
            let sx = (lon - plan.left) / x_res;
            let sy = (centre.lat - plan.top) / -y_res;

            // Image rows follow the HEALPix x axis, columns the y axis.
            let (col, row) = (axis.y, axis.x);

            match resampler.as_mut() {
                None => {
                    let (ix, iy) = (sx as i64, sy as i64);
                    if ix >= 0 && ix < plan.width as i64 && iy >= 0 && iy < plan.height as i64 {
                        let src = source.pixel(ix as u32, iy as u32);
                        let dst = tile.pixel_mut(col, row);
                        dst.copy_from_slice(src);
                        if channels == 4 {
                            dst[3] = 255;
                        }
                    }
                }
                Some(resampler) => {
                    // Pixel centres sit at integer source coordinates.
                    let (sx, sy) = (sx - 0.5, sy - 0.5);
                    if sx >= 0.0 && sx < width && sy >= 0.0 && sy < height {
                        if !resampler.resample_into(source, sx, sy, &mut values) {
                            continue;
                        }
                        let dst = tile.pixel_mut(col, row);
                        for (d, v) in dst.iter_mut().zip(values.iter()) {
                            *d = ((v + 0.5) as i64).clamp(0, 255) as u8;
                        }
                        if channels == 4 {
                            dst[3] = 255;
                        }
                    }
                }
            }
        }
        tile
    }
}
