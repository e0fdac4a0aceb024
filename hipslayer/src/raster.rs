//! In-memory 8-bit raster used for tiles and rendered source images.

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::codec::CodecError;
use crate::resample::SampleGrid;

/// Row-major interleaved 8-bit raster with 3 (RGB) or 4 (RGBA) channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Raster {
    /// Creates a zero-filled (black, transparent) raster.
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        debug_assert!(channels == 3 || channels == 4);
        Self {
            width,
            height,
            channels,
            data: vec![0; width as usize * height as usize * channels as usize],
        }
    }

    /// Creates a raster where every pixel equals `pixel`.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Self {
        let channels = pixel.len() as u8;
        let mut raster = Self::new(width, height, channels);
        for chunk in raster.data.chunks_exact_mut(channels as usize) {
            chunk.copy_from_slice(pixel);
        }
        raster
    }

    /// Wraps an existing buffer, checking its length.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let expected = width as usize * height as usize * channels as usize;
        if !(channels == 3 || channels == 4) || data.len() != expected {
            return Err(CodecError::InvalidBuffer {
                width,
                height,
                channels,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Converts a decoded image, keeping RGB images as 3 channels.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        if image.color().has_alpha() {
            let rgba = image.into_rgba8();
            let (width, height) = rgba.dimensions();
            Self {
                width,
                height,
                channels: 4,
                data: rgba.into_raw(),
            }
        } else {
            let rgb = image.into_rgb8();
            let (width, height) = rgb.dimensions();
            Self {
                width,
                height,
                channels: 3,
                data: rgb.into_raw(),
            }
        }
    }

    pub fn to_dynamic(&self) -> Result<DynamicImage, CodecError> {
        let invalid = || CodecError::InvalidBuffer {
            width: self.width,
            height: self.height,
            channels: self.channels,
        };
        match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid),
            4 => RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.channels as usize]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let start = self.offset(x, y);
        let channels = self.channels as usize;
        &mut self.data[start..start + channels]
    }

    /// Returns a 4-channel copy; RGB pixels become opaque.
    pub fn to_rgba(&self) -> Raster {
        if self.channels == 4 {
            return self.clone();
        }
        let mut out = Raster::new(self.width, self.height, 4);
        for (src, dst) in self
            .data
            .chunks_exact(3)
            .zip(out.data.chunks_exact_mut(4))
        {
            dst[..3].copy_from_slice(src);
            dst[3] = 255;
        }
        out
    }

    /// Copies `src` into `self` with its top-left corner at `(x0, y0)`.
    ///
    /// Pixels falling outside `self` are dropped. Copying RGB into RGBA
    /// writes an opaque alpha.
    pub fn blit(&mut self, src: &Raster, x0: u32, y0: u32) {
        let shared = self.channels.min(src.channels) as usize;
        let opaque = self.channels == 4 && src.channels == 3;
        let w = src.width.min(self.width.saturating_sub(x0));
        let h = src.height.min(self.height.saturating_sub(y0));
        for y in 0..h {
            for x in 0..w {
                let s = src.offset(x, y);
                let d = self.offset(x0 + x, y0 + y);
                self.data[d..d + shared].copy_from_slice(&src.data[s..s + shared]);
                if opaque {
                    self.data[d + 3] = 255;
                }
            }
        }
    }

    /// Draws `top` over `self` using source-over alpha compositing.
    ///
    /// Both rasters must be RGBA and of the same size; otherwise nothing
    /// is drawn.
    pub fn composite_over(&mut self, top: &Raster) {
        if self.channels != 4
            || top.channels != 4
            || self.width != top.width
            || self.height != top.height
        {
            return;
        }
        for (dst, src) in self.data.chunks_exact_mut(4).zip(top.data.chunks_exact(4)) {
            let sa = src[3] as f32 / 255.0;
            if sa == 0.0 {
                continue;
            }
            let da = dst[3] as f32 / 255.0;
            let out_a = sa + da * (1.0 - sa);
            for c in 0..3 {
                let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
                dst[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            dst[3] = (out_a * 255.0).round() as u8;
        }
    }

    /// Places `left` and `right` side by side.
    ///
    /// Returns `None` if heights or channel counts differ.
    pub fn hconcat(left: &Raster, right: &Raster) -> Option<Raster> {
        if left.height != right.height || left.channels != right.channels {
            return None;
        }
        let mut out = Raster::new(left.width + right.width, left.height, left.channels);
        out.blit(left, 0, 0);
        out.blit(right, left.width, 0);
        Some(out)
    }
}

impl SampleGrid for Raster {
    fn width(&self) -> usize {
        self.width as usize
    }

    fn height(&self) -> usize {
        self.height as usize
    }

    fn channels(&self) -> usize {
        self.channels as usize
    }

    #[inline]
    fn sample(&self, x: usize, y: usize, channel: usize) -> f64 {
        self.data[(y * self.width as usize + x) * self.channels as usize + channel] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_raster() {
        let r = Raster::filled(3, 2, &[255, 0, 0, 255]);
        assert_eq!(r.channels(), 4);
        assert_eq!(r.pixel(2, 1), &[255, 0, 0, 255]);
        assert_eq!(r.data().len(), 24);
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(Raster::from_raw(2, 2, 3, vec![0; 12]).is_ok());
        assert!(Raster::from_raw(2, 2, 3, vec![0; 11]).is_err());
        assert!(Raster::from_raw(2, 2, 2, vec![0; 8]).is_err());
    }

    #[test]
    fn test_to_rgba_adds_opaque_alpha() {
        let r = Raster::filled(2, 2, &[1, 2, 3]).to_rgba();
        assert_eq!(r.channels(), 4);
        assert_eq!(r.pixel(1, 1), &[1, 2, 3, 255]);
    }

    #[test]
    fn test_hconcat() {
        let left = Raster::filled(2, 3, &[10, 10, 10, 255]);
        let right = Raster::filled(1, 3, &[20, 20, 20, 255]);
        let joined = Raster::hconcat(&left, &right).unwrap();
        assert_eq!(joined.width(), 3);
        assert_eq!(joined.pixel(1, 2)[0], 10);
        assert_eq!(joined.pixel(2, 0)[0], 20);
        assert!(Raster::hconcat(&left, &Raster::new(1, 2, 4)).is_none());
    }

    #[test]
    fn test_composite_over() {
        let mut bottom = Raster::filled(1, 1, &[0, 0, 200, 255]);
        bottom.composite_over(&Raster::filled(1, 1, &[100, 0, 0, 0]));
        assert_eq!(bottom.pixel(0, 0), &[0, 0, 200, 255]);
        bottom.composite_over(&Raster::filled(1, 1, &[100, 0, 0, 255]));
        assert_eq!(bottom.pixel(0, 0), &[100, 0, 0, 255]);

        let mut empty = Raster::new(1, 1, 4);
        empty.composite_over(&Raster::filled(1, 1, &[10, 20, 30, 51]));
        assert_eq!(empty.pixel(0, 0), &[10, 20, 30, 51]);
    }

    #[test]
    fn test_blit_clips_to_destination() {
        let mut dst = Raster::new(4, 4, 4);
        let src = Raster::filled(3, 3, &[7, 8, 9]);
        dst.blit(&src, 2, 2);
        assert_eq!(dst.pixel(3, 3), &[7, 8, 9, 255]);
        assert_eq!(dst.pixel(1, 1), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_dynamic_round_trip_keeps_channels() {
        let rgb = Raster::filled(4, 4, &[1, 2, 3]);
        let back = Raster::from_dynamic(rgb.to_dynamic().unwrap());
        assert_eq!(back, rgb);
    }

    #[test]
    fn test_sample_grid_access() {
        let mut r = Raster::new(2, 2, 3);
        r.pixel_mut(1, 0).copy_from_slice(&[4, 5, 6]);
        assert_eq!(SampleGrid::sample(&r, 1, 0, 2), 6.0);
        assert_eq!(SampleGrid::channels(&r), 3);
    }
}
