//! Convolution resampling of raster samples at fractional positions.
//!
//! Kernel semantics of the classic raster-warp cubic/bilinear
//! resamplers: separable weights, a support window widened when
//! downsampling, and normalisation by the product of the horizontal and
//! vertical weight sums over the in-bounds window.
//!
//! Pixel centres are at integer coordinates. A scale is the source-to-target
//! size ratio along one axis and is clamped to at most 1, so upsampling never
//! narrows the support below the native kernel radius.

use std::fmt;
use std::str::FromStr;

/// Read access to a grid of samples with one or more channels.
pub trait SampleGrid {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn channels(&self) -> usize;
    fn sample(&self, x: usize, y: usize, channel: usize) -> f64;
}

/// Interpolation requested for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResamplingMode {
    NearestNeighbour,
    Bilinear,
    #[default]
    Bicubic,
}

/// Error for an unknown resampling method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid resampling method '{0}': expected nearest_neighbour, bilinear or bicubic")]
pub struct UnknownResamplingMode(pub String);

impl ResamplingMode {
    /// Returns the convolution kernel, or `None` for nearest neighbour.
    pub fn kernel(self) -> Option<Kernel> {
        match self {
            ResamplingMode::NearestNeighbour => None,
            ResamplingMode::Bilinear => Some(Kernel::Bilinear),
            ResamplingMode::Bicubic => Some(Kernel::Bicubic),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResamplingMode::NearestNeighbour => "nearest_neighbour",
            ResamplingMode::Bilinear => "bilinear",
            ResamplingMode::Bicubic => "bicubic",
        }
    }
}

impl fmt::Display for ResamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResamplingMode {
    type Err = UnknownResamplingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest_neighbour" | "nearest" => Ok(ResamplingMode::NearestNeighbour),
            "bilinear" => Ok(ResamplingMode::Bilinear),
            "bicubic" => Ok(ResamplingMode::Bicubic),
            _ => Err(UnknownResamplingMode(s.to_string())),
        }
    }
}

/// Separable convolution kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Bilinear,
    Bicubic,
}

impl Kernel {
    /// Filter radius in source pixels at scale 1.
    pub fn radius(self) -> i64 {
        match self {
            Kernel::Bilinear => 1,
            Kernel::Bicubic => 2,
        }
    }

    #[inline]
    pub fn weight(self, d: f64) -> f64 {
        match self {
            Kernel::Bilinear => bilinear_weight(d),
            Kernel::Bicubic => cubic_weight(d),
        }
    }
}

/// Triangle filter: `max(0, 1 - |d|)`.
#[inline]
pub fn bilinear_weight(d: f64) -> f64 {
    let abs = d.abs();
    if abs <= 1.0 {
        1.0 - abs
    } else {
        0.0
    }
}

/// Catmull-Rom cubic (a = -0.5).
#[inline]
pub fn cubic_weight(d: f64) -> f64 {
    let abs = d.abs();
    if abs <= 1.0 {
        d * d * (1.5 * abs - 2.5) + 1.0
    } else if abs <= 2.0 {
        d * d * (-0.5 * abs + 2.5) - 4.0 * abs + 2.0
    } else {
        0.0
    }
}

/// Reusable resampler for one kernel and scale pair.
///
/// Holds the horizontal weight buffer so that per-pixel calls do not
/// allocate. Weights are computed once per call and shared by all channels.
#[derive(Debug, Clone)]
pub struct Resampler {
    kernel: Kernel,
    x_scale: f64,
    y_scale: f64,
    x_radius: i64,
    y_radius: i64,
    weights_x: Vec<f64>,
}

impl Resampler {
    /// Creates a resampler; scales above 1 are clamped to 1.
    pub fn new(kernel: Kernel, x_scale: f64, y_scale: f64) -> Self {
        let x_scale = x_scale.min(1.0);
        let y_scale = y_scale.min(1.0);
        let radius = kernel.radius() as f64;
        let x_radius = (radius / x_scale).ceil() as i64;
        let y_radius = (radius / y_scale).ceil() as i64;
        Self {
            kernel,
            x_scale,
            y_scale,
            x_radius,
            y_radius,
            weights_x: Vec::with_capacity((2 * x_radius + 1) as usize),
        }
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Resamples every channel of `grid` at `(x, y)` into `out`.
    ///
    /// `out` must hold at least `grid.channels()` values. Returns `false`
    /// (and leaves `out` untouched) when the window is empty or carries no
    /// weight, which only happens for positions outside the grid.
    pub fn resample_into<G: SampleGrid + ?Sized>(
        &mut self,
        grid: &G,
        x: f64,
        y: f64,
        out: &mut [f64],
    ) -> bool {
        let width = grid.width() as i64;
        let height = grid.height() as i64;
        let ix = x.floor() as i64;
        let iy = y.floor() as i64;
        let delta_x = x - ix as f64;
        let delta_y = y - iy as f64;

        // Window offset depends on the parity of the kernel radius.
        let parity = (self.kernel.radius() + 1) % 2;
        let mut j_min = parity - self.y_radius;
        let mut j_max = self.y_radius;
        if iy + j_min < 0 {
            j_min = -iy;
        }
        if iy + j_max >= height {
            j_max = height - iy - 1;
        }
        let mut i_min = parity - self.x_radius;
        let mut i_max = self.x_radius;
        if ix + i_min < 0 {
            i_min = -ix;
        }
        if ix + i_max >= width {
            i_max = width - ix - 1;
        }
        if i_min > i_max || j_min > j_max {
            return false;
        }

        self.weights_x.clear();
        for i in i_min..=i_max {
            self.weights_x
                .push(self.kernel.weight((i as f64 - delta_x) * self.x_scale));
        }
        let sum_x: f64 = self.weights_x.iter().sum();

        let channels = grid.channels();
        for value in out.iter_mut().take(channels) {
            *value = 0.0;
        }
        let mut sum_y = 0.0;
        for j in j_min..=j_max {
            let row = (iy + j) as usize;
            let weight_y = self.kernel.weight((j as f64 - delta_y) * self.y_scale);
            for (c, value) in out.iter_mut().enumerate().take(channels) {
                let mut local = 0.0;
                for (k, weight_x) in self.weights_x.iter().enumerate() {
                    local += grid.sample((ix + i_min) as usize + k, row, c) * weight_x;
                }
                *value += local * weight_y;
            }
            sum_y += weight_y;
        }

        let total = sum_y * sum_x;
        if total == 0.0 {
            return false;
        }
        for value in out.iter_mut().take(channels) {
            *value /= total;
        }
        true
    }

    /// Resamples a single channel at `(x, y)`.
    pub fn resample_channel<G: SampleGrid + ?Sized>(
        &mut self,
        grid: &G,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64 {
        let view = ChannelOf { grid, channel };
        let mut out = [0.0];
        self.resample_into(&view, x, y, &mut out);
        out[0]
    }
}

/// Single-channel view over a multi-channel grid.
struct ChannelOf<'a, G: ?Sized> {
    grid: &'a G,
    channel: usize,
}

impl<G: SampleGrid + ?Sized> SampleGrid for ChannelOf<'_, G> {
    fn width(&self) -> usize {
        self.grid.width()
    }

    fn height(&self) -> usize {
        self.grid.height()
    }

    fn channels(&self) -> usize {
        1
    }

    fn sample(&self, x: usize, y: usize, _channel: usize) -> f64 {
        self.grid.sample(x, y, self.channel)
    }
}

/// One-shot convenience around [`Resampler::resample_channel`].
pub fn resample<G: SampleGrid + ?Sized>(
    grid: &G,
    kernel: Kernel,
    x: f64,
    y: f64,
    x_scale: f64,
    y_scale: f64,
    channel: usize,
) -> f64 {
    Resampler::new(kernel, x_scale, y_scale).resample_channel(grid, x, y, channel)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Row-major single-channel grid for tests.
    pub struct ArrayGrid {
        pub width: usize,
        pub height: usize,
        pub data: Vec<f64>,
    }

    impl ArrayGrid {
        pub fn arange(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                data: (0..width * height).map(|v| v as f64).collect(),
            }
        }
    }

    impl SampleGrid for ArrayGrid {
        fn width(&self) -> usize {
            self.width
        }
        fn height(&self) -> usize {
            self.height
        }
        fn channels(&self) -> usize {
            1
        }
        fn sample(&self, x: usize, y: usize, _channel: usize) -> f64 {
            self.data[y * self.width + x]
        }
    }

    #[test]
    fn test_bilinear_weight_values() {
        assert_eq!(bilinear_weight(0.0), 1.0);
        assert_eq!(bilinear_weight(1.0), 0.0);
        assert_eq!(bilinear_weight(-1.0), 0.0);
        assert_eq!(bilinear_weight(0.5), 0.5);
        assert_eq!(bilinear_weight(-0.5), 0.5);
        assert_eq!(bilinear_weight(3.0), 0.0);
    }

    #[test]
    fn test_cubic_weight_values() {
        assert_eq!(cubic_weight(0.0), 1.0);
        assert_eq!(cubic_weight(1.0), 0.0);
        assert_eq!(cubic_weight(-1.0), 0.0);
        assert_eq!(cubic_weight(0.5), 0.5625);
        assert_eq!(cubic_weight(-0.5), 0.5625);
        assert_eq!(cubic_weight(1.5), -0.0625);
        assert_eq!(cubic_weight(-1.5), -0.0625);
        assert_eq!(cubic_weight(2.5), 0.0);
    }

    #[test]
    fn test_bilinear_reproduces_grid_nodes() {
        let grid = ArrayGrid::arange(8, 12);
        for y in 0..12 {
            for x in 0..8 {
                let v = resample(&grid, Kernel::Bilinear, x as f64, y as f64, 1.0, 1.0, 0);
                assert_eq!(v, (y * 8 + x) as f64);
            }
        }
    }

    #[test]
    fn test_bicubic_reproduces_grid_nodes() {
        let grid = ArrayGrid {
            width: 5,
            height: 4,
            data: vec![
                3.0, 7.0, 1.0, 9.0, 4.0, 0.0, 2.0, 8.0, 6.0, 5.0, 11.0, 13.0, 2.5, 7.5, 1.0,
                4.0, 4.0, 0.0, 3.0, 10.0,
            ],
        };
        for y in 0..4 {
            for x in 0..5 {
                let v = resample(&grid, Kernel::Bicubic, x as f64, y as f64, 1.0, 1.0, 0);
                assert!((v - grid.data[y * 5 + x]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_bilinear_midpoint() {
        let grid = ArrayGrid::arange(8, 12);
        let v = resample(&grid, Kernel::Bilinear, 2.5, 3.5, 1.0, 1.0, 0);
        assert!((v - (3.5 * 8.0 + 2.5)).abs() < 1e-12);
    }

    #[test]
    fn test_scale_above_one_is_clamped() {
        let grid = ArrayGrid::arange(8, 12);
        let a = resample(&grid, Kernel::Bicubic, 3.3, 4.7, 1.0, 1.0, 0);
        let b = resample(&grid, Kernel::Bicubic, 3.3, 4.7, 4.0, 2.5, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_downsampling_widens_support() {
        let mut grid = ArrayGrid::arange(9, 9);
        grid.data.iter_mut().for_each(|v| *v = 0.0);
        grid.data[4 * 9 + 7] = 90.0;
        let narrow = resample(&grid, Kernel::Bilinear, 4.0, 4.0, 1.0, 1.0, 0);
        let wide = resample(&grid, Kernel::Bilinear, 4.0, 4.0, 0.25, 1.0, 0);
        assert_eq!(narrow, 0.0);
        assert!(wide > 0.0);
    }

    #[test]
    fn test_linear_ramp_preserved_at_edges() {
        let grid = ArrayGrid::arange(8, 12);
        let v = resample(&grid, Kernel::Bilinear, 0.25, 0.0, 1.0, 1.0, 0);
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_outside_grid_yields_false() {
        let grid = ArrayGrid::arange(4, 4);
        let mut resampler = Resampler::new(Kernel::Bilinear, 1.0, 1.0);
        let mut out = [0.0];
        assert!(!resampler.resample_into(&grid, 10.0, 1.0, &mut out));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "bicubic".parse::<ResamplingMode>(),
            Ok(ResamplingMode::Bicubic)
        );
        assert_eq!(
            "bilinear".parse::<ResamplingMode>(),
            Ok(ResamplingMode::Bilinear)
        );
        assert_eq!(
            "nearest_neighbour".parse::<ResamplingMode>(),
            Ok(ResamplingMode::NearestNeighbour)
        );
        assert!("lanczos".parse::<ResamplingMode>().is_err());
        assert_eq!(ResamplingMode::default(), ResamplingMode::Bicubic);
        assert!(ResamplingMode::NearestNeighbour.kernel().is_none());
    }
}

#[cfg(test)]
mod property_tests {
    use super::tests::ArrayGrid;
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_grid_nodes_exact(
            data in prop::collection::vec(-1000.0f64..1000.0, 30),
            x in 0usize..6,
            y in 0usize..5,
        ) {
            let grid = ArrayGrid { width: 6, height: 5, data };
            for kernel in [Kernel::Bilinear, Kernel::Bicubic] {
                let v = resample(&grid, kernel, x as f64, y as f64, 1.0, 1.0, 0);
                prop_assert!((v - grid.data[y * 6 + x]).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_constant_grid_stays_constant(
            value in 0.0f64..255.0,
            x in 0.0f64..7.0,
            y in 0.0f64..7.0,
            scale in 0.1f64..2.0,
        ) {
            let grid = ArrayGrid { width: 8, height: 8, data: vec![value; 64] };
            let v = resample(&grid, Kernel::Bicubic, x, y, scale, scale, 0);
            prop_assert!((v - value).abs() < 1e-9);
        }
    }
}
