//! Request and response types of the `/hips` endpoint, and path parsing.

use thiserror::Error;

use crate::cache::{hips_dir, TileKey};
use crate::codec::TileFormat;
use crate::healpix::{pixel_count, MAX_ORDER};

pub const TEXT_PLAIN: &str = "text/plain";

/// HTTP method of a HiPS request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A request against `/hips/{layer}/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HipsRequest {
    pub method: Method,
    pub path: String,
}

impl HipsRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
        }
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            path: path.into(),
        }
    }
}

/// Response to a [`HipsRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HipsResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HipsResponse {
    pub fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    /// Plain-text response carrying `message`.
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN,
            body: message.into().into_bytes(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::text(404, message)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for plain-text responses.
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn for_method(mut self, method: Method) -> Self {
        if method == Method::Head {
            self.body.clear();
        }
        self
    }
}

/// A malformed or unserviceable request path. Always answered with 404.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Bad path for /hips. Should be /hips/layer/...")]
    TooShort,

    #[error("Unhandled layer name {0}")]
    UnknownLayer(String),

    #[error("HIPS not enabled for layer {0}")]
    LayerDisabled(String),

    #[error("Bad path for /hips. Component {0} should start with Norder")]
    MissingNorder(String),

    #[error("Allsky requests should be pre-generated with hipslayer allsky")]
    AllskyNotGenerated,

    #[error("Bad path for /hips. Should be /hips/layer/NorderK/DirD/NpixN.ext")]
    IncompleteTilePath,

    #[error("Bad path for /hips. Invalid norder={0}")]
    InvalidOrder(String),

    #[error("Bad path for /hips. Component {0} should start with Dir")]
    MissingDir(String),

    #[error("Bad path for /hips. Component {0} should start with Npix")]
    MissingNpix(String),

    #[error("Bad path for /hips. Unhandled extension={0}")]
    UnhandledExtension(String),

    #[error("Bad path for /hips. Invalid npix={0}")]
    InvalidPixel(String),

    #[error("Bad path for /hips. Inconsistent Dir and Npix")]
    InconsistentDir,
}

/// What a request path designates, below `/hips/{layer}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Properties,
    Allsky { order: u8, format: TileFormat },
    Tile(TileKey),
}

/// Splits `/hips/{layer}/...` into the layer name and the remaining
/// components.
pub(crate) fn split_path(path: &str) -> Result<(&str, Vec<&str>), RequestError> {
    let components: Vec<&str> = path.split('/').collect();
    match components.as_slice() {
        ["", "hips", layer, rest @ ..] if !rest.is_empty() => Ok((*layer, rest.to_vec())),
        _ => Err(RequestError::TooShort),
    }
}

/// Parses the components following the layer name.
///
/// `shift` is the layer's tile shift; orders beyond `MAX_ORDER - shift`
/// cannot be generated and are rejected.
pub(crate) fn parse_target(components: &[&str], shift: u8) -> Result<Target, RequestError> {
    if components == ["properties"] {
        return Ok(Target::Properties);
    }

    let Some(norder) = components.first() else {
        return Err(RequestError::TooShort);
    };
    let order_text = norder
        .strip_prefix("Norder")
        .ok_or_else(|| RequestError::MissingNorder(norder.to_string()))?;

    if let [_, name @ ("Allsky.png" | "Allsky.jpg")] = components {
        let order = order_text
            .parse::<u8>()
            .map_err(|_| RequestError::InvalidOrder(order_text.to_string()))?;
        let format = if *name == "Allsky.png" {
            TileFormat::Png
        } else {
            TileFormat::Jpeg
        };
        return Ok(Target::Allsky { order, format });
    }

    let [_, dir, npix, ..] = components else {
        return Err(RequestError::IncompleteTilePath);
    };

    let order = order_text
        .parse::<u8>()
        .ok()
        .filter(|order| *order <= MAX_ORDER.saturating_sub(shift))
        .ok_or_else(|| RequestError::InvalidOrder(order_text.to_string()))?;

    let dir_text = dir
        .strip_prefix("Dir")
        .ok_or_else(|| RequestError::MissingDir(dir.to_string()))?;
    let pixel_and_ext = npix
        .strip_prefix("Npix")
        .ok_or_else(|| RequestError::MissingNpix(npix.to_string()))?;

    let (pixel_text, ext) = pixel_and_ext
        .split_once('.')
        .unwrap_or((pixel_and_ext, "png"));
    let format = match ext {
        "png" => TileFormat::Png,
        "jpg" => TileFormat::Jpeg,
        other => return Err(RequestError::UnhandledExtension(other.to_string())),
    };

    let pixel = pixel_text
        .parse::<u64>()
        .ok()
        .filter(|pixel| *pixel < pixel_count(order))
        .ok_or_else(|| RequestError::InvalidPixel(pixel_text.to_string()))?;

    if dir_text.parse::<u64>().ok() != Some(hips_dir(pixel)) {
        return Err(RequestError::InconsistentDir);
    }

    Ok(Target::Tile(TileKey::new(order, pixel, format)))
}
