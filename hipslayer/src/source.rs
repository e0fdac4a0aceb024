//! Planar rasters assembled from an upstream HiPS survey.
//!
//! [`HipsSource`] is the inverse of the projector: given a planar query it
//! finds, for every output pixel, the upstream HEALPix tile and the fractional
//! position inside it, fetches the tiles involved (through an optional
//! [`TileCache`]) and samples them. It implements [`RasterRenderer`], so a
//! HiPS upstream can back any layer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{hips_dir, TileCache, TileKey};
use crate::codec::{self, TileFormat};
use crate::healpix::{
    angle_to_pixel_with_offsets, order_for_resolution, resolution_degrees, subpixel_to_axis,
    AxisTables, MAX_ORDER,
};
use crate::provider::{FetchError, HttpClient, MapQuery, RasterRenderer, RenderError};
use crate::raster::Raster;
use crate::resample::{ResamplingMode, Resampler};

/// `hips_order` assumed when the upstream document omits it.
pub const DEFAULT_UPSTREAM_ORDER: u8 = 5;

/// `hips_tile_width` assumed when the upstream document omits it.
pub const DEFAULT_UPSTREAM_TILE_WIDTH: u32 = 512;

/// Interior points of the query grid sampled for the resolution estimate.
const RESOLUTION_SAMPLES: [(f64, f64); 4] = [(0.25, 0.25), (0.25, 0.75), (0.75, 0.25), (0.75, 0.75)];

/// Parses a HiPS `properties` document into key/value pairs.
///
/// Comment lines (`#`) and lines without `=` are skipped; keys and values
/// are trimmed. Later duplicates win.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Upstream survey parameters read from its `properties` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamProperties {
    /// Deepest order served upstream.
    pub order_max: u8,
    pub format: TileFormat,
    /// log2 of the upstream tile width.
    pub shift: u8,
}

impl UpstreamProperties {
    /// Interprets a parsed `properties` document.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, RenderError> {
        let order_max = match properties.get("hips_order") {
            Some(v) => v.parse::<u8>().map_err(|_| {
                RenderError::InvalidSource(format!("hips_order = {} is not a valid order", v))
            })?,
            None => DEFAULT_UPSTREAM_ORDER,
        };

        let format = match properties.get("hips_tile_format") {
            Some(v) => v
                .split_whitespace()
                .find_map(|f| match f {
                    "jpeg" => Some(TileFormat::Jpeg),
                    "png" => Some(TileFormat::Png),
                    _ => None,
                })
                .ok_or_else(|| {
                    RenderError::InvalidSource(format!(
                        "hips_tile_format = {} does not contain jpeg or png",
                        v
                    ))
                })?,
            None => TileFormat::Jpeg,
        };

        let width = match properties.get("hips_tile_width") {
            Some(v) => v.parse::<u32>().map_err(|_| {
                RenderError::InvalidSource(format!("hips_tile_width = {} is not an integer", v))
            })?,
            None => DEFAULT_UPSTREAM_TILE_WIDTH,
        };
        if !width.is_power_of_two() {
            return Err(RenderError::InvalidSource(format!(
                "hips_tile_width = {} is not a power of two",
                width
            )));
        }

        Ok(Self {
            order_max,
            format,
            shift: width.trailing_zeros() as u8,
        })
    }

    pub fn tile_width(&self) -> u32 {
        1 << self.shift
    }
}

/// SourceTileAssembler over an upstream HiPS root URL.
pub struct HipsSource {
    client: Arc<dyn HttpClient>,
    url: String,
    mode: ResamplingMode,
    cache: Option<TileCache>,
    properties: Mutex<Option<UpstreamProperties>>,
    axis_tables: AxisTables,
}

impl HipsSource {
    /// # Arguments
    ///
    /// * `client` - HTTP client used for upstream requests
    /// * `url` - Root of the upstream survey (where `properties` lives)
    /// * `mode` - Resampling applied when sampling upstream tiles
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>, mode: ResamplingMode) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            client,
            url,
            mode,
            cache: None,
            properties: Mutex::new(None),
            axis_tables: AxisTables::new(),
        }
    }

    /// Caches upstream tiles in `cache`.
    pub fn with_tile_cache(mut self, cache: TileCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mode(&self) -> ResamplingMode {
        self.mode
    }

    /// Upstream parameters, fetched on first use.
    pub fn properties(&self) -> Result<UpstreamProperties, RenderError> {
        let mut slot = self.properties.lock();
        if let Some(props) = *slot {
            return Ok(props);
        }
        let bytes = self.properties_document()?;
        let text = String::from_utf8_lossy(&bytes);
        let props = UpstreamProperties::from_properties(&parse_properties(&text))?;
        info!(
            url = %self.url,
            order_max = props.order_max,
            format = %props.format,
            tile_width = props.tile_width(),
            "Loaded upstream HiPS properties"
        );
        *slot = Some(props);
        Ok(props)
    }

    /// Raw upstream `properties` document.
    pub fn properties_document(&self) -> Result<Vec<u8>, FetchError> {
        self.client.get(&format!("{}/properties", self.url))
    }

    /// Upstream `Allsky` file for `order`, in the upstream tile format.
    pub fn load_allsky(&self, order: u8) -> Result<(TileFormat, Vec<u8>), RenderError> {
        let props = self.properties()?;
        let url = format!("{}/Norder{}/Allsky.{}", self.url, order, props.format.extension());
        info!(url = %url, "Loading upstream Allsky");
        Ok((props.format, self.client.get(&url)?))
    }

    pub fn tile_url(&self, order: u8, pixel: u64, format: TileFormat) -> String {
        format!(
            "{}/Norder{}/Dir{}/Npix{}.{}",
            self.url,
            order,
            hips_dir(pixel),
            pixel,
            format.extension()
        )
    }

    /// Encoded upstream tile, from the cache when configured.
    pub fn load_tile_bytes(&self, order: u8, pixel: u64) -> Result<Vec<u8>, RenderError> {
        let props = self.properties()?;
        let url = self.tile_url(order, pixel, props.format);
        let fetch = || {
            debug!(url = %url, "Fetching upstream tile");
            self.client.get(&url)
        };
        let bytes = match &self.cache {
            Some(cache) => {
                cache
                    .get_or_populate(&TileKey::new(order, pixel, props.format), fetch)?
                    .bytes
            }
            None => fetch()?,
        };
        Ok(bytes)
    }

    /// Decoded upstream tile.
    pub fn fetch_tile(&self, order: u8, pixel: u64) -> Result<Raster, RenderError> {
        let bytes = self.load_tile_bytes(order, pixel)?;
        codec::decode(&bytes).map_err(|e| RenderError::InvalidSource(e.to_string()))
    }

    /// Decoded upstream tile; failures are logged and yield `None`.
    pub fn load_tile(&self, order: u8, pixel: u64) -> Option<Raster> {
        match self.fetch_tile(order, pixel) {
            Ok(raster) => Some(raster),
            Err(e) => {
                warn!(order, pixel, error = %e, "Could not retrieve upstream tile");
                None
            }
        }
    }

    /// Renders `query` from upstream tiles.
    ///
    /// Pixels outside the valid latitude range or falling in tiles that
    /// could not be fetched stay transparent; every other pixel is opaque.
    pub fn get_map(&self, query: &MapQuery) -> Result<Raster, RenderError> {
        let props = self.properties()?;
        let shift = props.shift;
        let tile_size = props.tile_width();
        let (width, height) = (query.width as usize, query.height as usize);
        let res_x = query.res_x();
        let res_y = query.res_y();

        let res = if query.srs.is_geodetic() {
            res_x
        } else {
            estimate_resolution(query)
        };
        let order_max = props.order_max.min(MAX_ORDER.saturating_sub(shift));
        let order = select_order(res, tile_size, order_max);
        let scaling = resolution_degrees(order, tile_size) / res;
        debug!(order, res, scaling, "Selected upstream order");

        // Fine pixel and in-pixel offsets for each output pixel centre.
        let mut samples = Vec::with_capacity(width * height);
        for j in 0..height {
            let y = query.bbox[3] - (j as f64 + 0.5) * res_y;
            for i in 0..width {
                let x = query.bbox[0] + (i as f64 + 0.5) * res_x;
                let (lon, lat) = query.srs.to_lonlat(x, y);
                if (-90.0..=90.0).contains(&lat) {
                    samples.push(Some(angle_to_pixel_with_offsets(order + shift, lon, lat)));
                } else {
                    samples.push(None);
                }
            }
        }

        let tile_shift = 2 * shift as u32;
        let tile_ids: BTreeSet<u64> = samples.iter().flatten().map(|s| s.0 >> tile_shift).collect();

        let mut tiles = HashMap::with_capacity(tile_ids.len());
        let mut full_size = true;
        for &id in &tile_ids {
            if let Some(tile) = self.load_tile(order, id) {
                if tile.width() != tile_size || tile.height() != tile_size {
                    warn!(order, pixel = id, "Upstream tile has unexpected shape");
                    full_size = false;
                }
                tiles.insert(id, tile);
            }
        }

        let merged = if full_size {
            merge_block(order, shift, &tile_ids, &tiles)
        } else {
            None
        };

        // Tile id -> (raster, row offset, column offset).
        let placements: HashMap<u64, (&Raster, u32, u32)> = match &merged {
            Some((canvas, offsets)) => offsets
                .iter()
                .map(|(id, &(row, col))| (*id, (canvas, row, col)))
                .collect(),
            None => tiles.iter().map(|(id, t)| (*id, (t, 0, 0))).collect(),
        };

        let table = self.axis_tables.get(shift);
        let subpixel_mask = (1u64 << tile_shift) - 1;
        let mut resampler = self
            .mode
            .kernel()
            .map(|k| Resampler::new(k, scaling, scaling));
        let mut values = [0.0f64; 4];
        let mut out = Raster::new(query.width, query.height, 4);

        for (idx, sample) in samples.iter().enumerate() {
            let Some((pixel, dx, dy)) = *sample else {
                continue;
            };
            let Some(&(source, row0, col0)) = placements.get(&(pixel >> tile_shift)) else {
                continue;
            };
            // Image rows follow the HEALPix x axis, columns the y axis.
            let axis = table[(pixel & subpixel_mask) as usize];
            let (row, col) = (axis.x + row0, axis.y + col0);
            if row >= source.height() || col >= source.width() {
                continue;
            }

            let channels = source.channels() as usize;
            let dst = out.pixel_mut((idx % width) as u32, (idx / width) as u32);
            match resampler.as_mut() {
                None => dst[..channels].copy_from_slice(source.pixel(col, row)),
                Some(resampler) => {
                    if !resampler.resample_into(source, col as f64 + dy, row as f64 + dx, &mut values)
                    {
                        continue;
                    }
                    for (d, v) in dst.iter_mut().zip(values.iter()).take(channels) {
                        *d = ((v + 0.5) as i64).clamp(0, 255) as u8;
                    }
                }
            }
            dst[3] = 255;
        }

        Ok(out)
    }
}

impl RasterRenderer for HipsSource {
    fn render(&self, query: &MapQuery) -> Result<Raster, RenderError> {
        self.get_map(query)
    }
}

impl std::fmt::Debug for HipsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HipsSource")
            .field("url", &self.url)
            .field("mode", &self.mode)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Upstream order whose resolution is at least as fine as `res`.
fn select_order(res: f64, tile_size: u32, order_max: u8) -> u8 {
    let order = order_for_resolution(res, tile_size).ceil();
    if order.is_nan() || order <= 0.0 {
        0
    } else {
        order.min(order_max as f64) as u8
    }
}

/// Representative resolution in degrees of a non-geodetic query.
///
/// Projects a one-pixel cell at four interior points, scales longitudes by
/// the cosine of the latitude and takes the square root of the cell area.
/// Cells crossing the antimeridian are ignored.
fn estimate_resolution(query: &MapQuery) -> f64 {
    let res_x = query.res_x();
    let res_y = query.res_y();

    let cell_resolution = |ci: f64, cj: f64| -> Option<f64> {
        let corner = |di: f64, dj: f64| {
            query.srs.to_lonlat(
                query.bbox[0] + res_x * (ci + di),
                query.bbox[1] + res_y * (cj + dj),
            )
        };
        let corners = [corner(0.0, 0.0), corner(0.0, 1.0), corner(1.0, 1.0), corner(1.0, 0.0)];
        let (min_lon, max_lon) = corners
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.0), hi.max(c.0)));
        if max_lon - min_lon > 180.0 {
            return None;
        }
        let scaled: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(lon, lat)| (lon * lat.to_radians().cos(), lat))
            .collect();
        let n = scaled.len();
        let twice_area: f64 = (0..n)
            .map(|i| scaled[i].0 * (scaled[(i + 1) % n].1 - scaled[(i + n - 1) % n].1))
            .sum();
        Some((0.5 * twice_area.abs()).sqrt())
    };

    let estimates: Vec<f64> = RESOLUTION_SAMPLES
        .iter()
        .filter_map(|&(fx, fy)| {
            cell_resolution(fx * query.width as f64, fy * query.height as f64)
        })
        .collect();
    if estimates.is_empty() {
        return res_x / query.srs.units_per_degree();
    }
    estimates.iter().sum::<f64>() / estimates.len() as f64
}

/// Joins up to 2×2 full-size tiles of one base face into a single canvas so
/// interpolation can cross tile seams.
///
/// Returns the RGBA canvas and each loaded tile's `(row, col)` offset in it.
fn merge_block(
    order: u8,
    shift: u8,
    tile_ids: &BTreeSet<u64>,
    tiles: &HashMap<u64, Raster>,
) -> Option<(Raster, HashMap<u64, (u32, u32)>)> {
    let face_shift = 2 * order as u32;
    let faces: BTreeSet<u64> = tile_ids.iter().map(|id| id >> face_shift).collect();
    if faces.len() != 1 {
        return None;
    }

    let face_mask = (1u64 << face_shift) - 1;
    // Image axes are swapped relative to HEALPix axes.
    let position = |id: u64| {
        let axis = subpixel_to_axis(order, id & face_mask);
        (axis.x, axis.y)
    };
    let (mut min_row, mut min_col) = (u32::MAX, u32::MAX);
    let (mut max_row, mut max_col) = (0u32, 0u32);
    for &id in tile_ids {
        let (row, col) = position(id);
        min_row = min_row.min(row);
        min_col = min_col.min(col);
        max_row = max_row.max(row);
        max_col = max_col.max(col);
    }
    if max_row - min_row > 1 || max_col - min_col > 1 {
        return None;
    }

    let mut canvas = Raster::new(
        (max_col - min_col + 1) << shift,
        (max_row - min_row + 1) << shift,
        4,
    );
    let mut offsets = HashMap::with_capacity(tiles.len());
    for (&id, tile) in tiles {
        let (row, col) = position(id);
        let row_offset = (row - min_row) << shift;
        let col_offset = (col - min_col) << shift;
        canvas.blit(tile, col_offset, row_offset);
        offsets.insert(id, (row_offset, col_offset));
    }
    Some((canvas, offsets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheMode, TileCache};
    use crate::provider::RoutedHttpClient;
    use crate::srs::Srs;

    const ROOT: &str = "http://localhost:42423/hips_source";

    fn red_jpeg(size: u32) -> Vec<u8> {
        TileFormat::Jpeg
            .encode(&Raster::filled(size, size, &[255, 0, 0]))
            .unwrap()
    }

    fn upstream(properties: &str) -> RoutedHttpClient {
        RoutedHttpClient::default().with_route(
            &format!("{}/properties", ROOT),
            properties.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_properties("# comment\nhips_order = 3\nno equals\n\nhips_frame=planet\n");
        assert_eq!(props.len(), 2);
        assert_eq!(props["hips_order"], "3");
        assert_eq!(props["hips_frame"], "planet");
    }

    #[test]
    fn test_upstream_properties_defaults_and_errors() {
        let props = UpstreamProperties::from_properties(&BTreeMap::new()).unwrap();
        assert_eq!(props.order_max, 5);
        assert_eq!(props.format, TileFormat::Jpeg);
        assert_eq!(props.tile_width(), 512);

        let props = UpstreamProperties::from_properties(&parse_properties(
            "hips_tile_format=fits png\nhips_tile_width=256",
        ))
        .unwrap();
        assert_eq!(props.format, TileFormat::Png);
        assert_eq!(props.shift, 8);

        assert!(UpstreamProperties::from_properties(&parse_properties("hips_tile_format=fits"))
            .is_err());
        assert!(UpstreamProperties::from_properties(&parse_properties("hips_tile_width=300"))
            .is_err());
    }

    #[test]
    fn test_select_order() {
        assert_eq!(select_order(0.703125, 512, 5), 0);
        assert_eq!(select_order(resolution_degrees(3, 512), 512, 5), 3);
        assert_eq!(select_order(resolution_degrees(3, 512) * 0.9, 512, 5), 4);
        assert_eq!(select_order(1e-9, 512, 5), 5);
    }

    #[test]
    fn test_properties_are_loaded_once() {
        let client = Arc::new(upstream("hips_tile_format=png\nhips_order=2\nhips_tile_width=64"));
        let source = HipsSource::new(client.clone(), format!("{}/", ROOT), ResamplingMode::Bicubic);
        assert_eq!(source.properties().unwrap().order_max, 2);
        assert_eq!(source.properties().unwrap().tile_width(), 64);
        assert_eq!(client.requested().len(), 1);
        assert_eq!(
            source.tile_url(0, 2, TileFormat::Png),
            format!("{}/Norder0/Dir0/Npix2.png", ROOT)
        );
    }

    #[test]
    fn test_geodetic_query_inside_one_face() {
        let client = Arc::new(
            upstream("hips_tile_format=jpeg\nhips_order=5\nhips_tile_width=512")
                .with_route(&format!("{}/Norder0/Dir0/Npix2.jpg", ROOT), red_jpeg(512)),
        );
        let source = HipsSource::new(client.clone(), ROOT, ResamplingMode::Bicubic);
        let query = MapQuery::geodetic([-150.0, 60.0, -120.0, 80.0], 32, 32);
        let raster = source.render(&query).unwrap();

        assert_eq!((raster.width(), raster.height(), raster.channels()), (32, 32, 4));
        let px = raster.pixel(16, 16);
        assert!(px[0] > 240 && px[1] < 15 && px[2] < 15, "{:?}", px);
        assert_eq!(px[3], 255);
        assert_eq!(
            client.requested(),
            vec![
                format!("{}/properties", ROOT),
                format!("{}/Norder0/Dir0/Npix2.jpg", ROOT)
            ]
        );
    }

    #[test]
    fn test_missing_tiles_stay_transparent() {
        let client = Arc::new(upstream("hips_tile_format=jpeg\nhips_order=0\nhips_tile_width=64"));
        let source = HipsSource::new(client, ROOT, ResamplingMode::NearestNeighbour);
        let query = MapQuery::geodetic([-180.0, -90.0, 180.0, 90.0], 16, 8);
        let raster = source.render(&query).unwrap();
        assert!(raster.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_latitudes_outside_globe_are_skipped() {
        let client = Arc::new(
            upstream("hips_tile_format=png\nhips_order=0\nhips_tile_width=64").with_route(
                &format!("{}/Norder0/Dir0/Npix0.png", ROOT),
                TileFormat::Png
                    .encode(&Raster::filled(64, 64, &[0, 0, 255, 255]))
                    .unwrap(),
            ),
        );
        let source = HipsSource::new(client, ROOT, ResamplingMode::NearestNeighbour);
        // Upper half lies above the north pole.
        let query = MapQuery::geodetic([10.0, 80.0, 20.0, 100.0], 4, 4);
        let raster = source.render(&query).unwrap();
        assert_eq!(raster.pixel(1, 0)[3], 0);
        assert_eq!(raster.pixel(1, 3), &[0, 0, 255, 255]);
    }

    #[test]
    fn test_merged_block_interpolates_across_seam() {
        let mut client = upstream("hips_tile_format=png\nhips_order=1\nhips_tile_width=64");
        let green = TileFormat::Png
            .encode(&Raster::filled(64, 64, &[0, 200, 0]))
            .unwrap();
        for pixel in 8..12 {
            client = client.with_route(
                &format!("{}/Norder1/Dir0/Npix{}.png", ROOT, pixel),
                green.clone(),
            );
        }
        let source = HipsSource::new(Arc::new(client), ROOT, ResamplingMode::Bilinear);
        // Above 41.8° north, longitudes 180..270 belong to face 2 only; its
        // children at order 1 form one 2×2 block.
        let query = MapQuery::geodetic([-170.0, 45.0, -100.0, 85.0], 64, 64);
        let raster = source.render(&query).unwrap();
        let green = raster
            .data()
            .chunks_exact(4)
            .filter(|p| *p == [0, 200, 0, 255])
            .count();
        assert!(green > 64 * 64 * 9 / 10, "green {}", green);
    }

    #[test]
    fn test_upstream_tiles_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            upstream("hips_tile_format=jpeg\nhips_order=0\nhips_tile_width=16")
                .with_route(&format!("{}/Norder0/Dir0/Npix2.jpg", ROOT), red_jpeg(16)),
        );
        let cache = TileCache::on_disk(
            dir.path().join("tiles"),
            dir.path().join("locks"),
            std::time::Duration::from_secs(5),
            CacheMode::ReadWrite,
        );
        let source =
            HipsSource::new(client.clone(), ROOT, ResamplingMode::Bicubic).with_tile_cache(cache);

        assert!(source.load_tile(0, 2).is_some());
        assert!(source.load_tile(0, 2).is_some());
        let fetches = client
            .requested()
            .iter()
            .filter(|u| u.ends_with("Npix2.jpg"))
            .count();
        assert_eq!(fetches, 1);
        assert!(dir.path().join("tiles/Norder0/Dir0/Npix2.jpg").exists());
    }

    #[test]
    fn test_web_mercator_resolution_estimate() {
        let half = 20_037_508.342789244;
        let query = MapQuery::new([-half, -half, half, half], Srs::WebMercator, 256, 256);
        let res = estimate_resolution(&query);
        // Equatorial pixel size is 360/256 degrees; interior samples sit at
        // higher latitudes where cells shrink in true angle.
        assert!(res > 0.3 && res < 360.0 / 256.0, "res {}", res);
    }

    #[test]
    fn test_load_allsky_uses_upstream_format() {
        let client = Arc::new(
            upstream("hips_tile_format=png jpeg").with_route(
                &format!("{}/Norder3/Allsky.png", ROOT),
                b"allsky".to_vec(),
            ),
        );
        let source = HipsSource::new(client, ROOT, ResamplingMode::Bicubic);
        let (format, bytes) = source.load_allsky(3).unwrap();
        assert_eq!(format, TileFormat::Png);
        assert_eq!(bytes, b"allsky");
    }
}
