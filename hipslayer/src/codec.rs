//! PNG/JPEG tile encoding on top of the `image` crate.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::DynamicImage;
use thiserror::Error;

use crate::raster::Raster;

/// JPEG quality used for encoded tiles.
pub const JPEG_QUALITY: u8 = 90;

/// Errors raised while encoding or decoding tiles.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid raster buffer for {width}x{height} with {channels} channels")]
    InvalidBuffer { width: u32, height: u32, channels: u8 },
}

/// Encoded tile format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    Png,
    Jpeg,
}

impl TileFormat {
    /// All formats in the order they are advertised.
    pub const ALL: [TileFormat; 2] = [TileFormat::Png, TileFormat::Jpeg];

    /// File extension used in tile paths.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }

    /// Name used in `hips_tile_format`.
    pub fn name(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
        }
    }

    /// Parses a path extension (`png`, `jpg` or `jpeg`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(TileFormat::Png),
            "jpg" | "jpeg" => Some(TileFormat::Jpeg),
            _ => None,
        }
    }

    /// Encodes `raster`. JPEG output drops the alpha channel.
    pub fn encode(self, raster: &Raster) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        match self {
            TileFormat::Png => {
                raster
                    .to_dynamic()?
                    .write_with_encoder(PngEncoder::new(&mut buf))?;
            }
            TileFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(raster.to_dynamic()?.into_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
            }
        }
        Ok(buf)
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TileFormat::from_extension(s.trim().to_lowercase().as_str())
            .ok_or_else(|| format!("unknown tile format '{}'", s))
    }
}

/// Decodes PNG or JPEG bytes, guessing the format from the content.
pub fn decode(bytes: &[u8]) -> Result<Raster, CodecError> {
    let image = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;
    Ok(Raster::from_dynamic(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_round_trip_keeps_alpha() {
        let raster = Raster::filled(8, 8, &[255, 0, 0, 128]);
        let bytes = TileFormat::Png.encode(&raster).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, raster);
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let raster = Raster::filled(16, 16, &[0, 0, 255, 255]);
        let bytes = TileFormat::Jpeg.encode(&raster).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.channels(), 3);
        assert_eq!(decoded.width(), 16);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(TileFormat::from_extension("jpg"), Some(TileFormat::Jpeg));
        assert_eq!(TileFormat::from_extension("png"), Some(TileFormat::Png));
        assert_eq!(TileFormat::from_extension("gif"), None);
        assert_eq!(TileFormat::Jpeg.extension(), "jpg");
        assert_eq!(TileFormat::Jpeg.name(), "jpeg");
        assert_eq!("JPEG".parse::<TileFormat>(), Ok(TileFormat::Jpeg));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(b"definitely not an image").is_err());
    }
}
