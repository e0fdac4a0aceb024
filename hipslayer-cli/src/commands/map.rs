//! Map command - render a planar image from a layer's render source.

use std::path::Path;

use hipslayer::codec::TileFormat;
use hipslayer::provider::MapQuery;
use hipslayer::srs::Srs;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the map command.
pub struct MapArgs {
    pub layer: String,
    pub bbox: String,
    pub srs: String,
    pub size: String,
    pub output: std::path::PathBuf,
}

/// Run the map command.
pub fn run(runner: &CliRunner, args: MapArgs) -> Result<(), CliError> {
    runner.log_startup("map");

    let served = runner
        .service()
        .layer(&args.layer)
        .ok_or_else(|| CliError::InvalidArgument(format!("unknown layer '{}'", args.layer)))?;
    let srs: Srs = args
        .srs
        .parse()
        .map_err(|e: hipslayer::srs::UnsupportedSrs| CliError::InvalidArgument(e.to_string()))?;
    let bbox = parse_bbox(&args.bbox)?;
    let (width, height) = parse_size(&args.size)?;
    let format = output_format(&args.output)?;

    let query = MapQuery::new(bbox, srs, width, height);
    info!(layer = %args.layer, bbox = ?bbox, srs = %srs, width, height, "Rendering map");
    let raster = served.layer().source().renderer().render(&query)?;
    let bytes = format.encode(&raster)?;
    runner.write_output(&args.output, &bytes)?;

    println!(
        "Saved {}x{} {} map of layer '{}' to {}",
        width,
        height,
        srs,
        args.layer,
        args.output.display()
    );
    Ok(())
}

/// Parses `MINX,MINY,MAXX,MAXY`.
fn parse_bbox(text: &str) -> Result<[f64; 4], CliError> {
    let values: Vec<f64> = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| CliError::InvalidArgument(format!("bbox '{}' is not numeric", text)))?;
    match values.as_slice() {
        [min_x, min_y, max_x, max_y] if min_x < max_x && min_y < max_y => {
            Ok([*min_x, *min_y, *max_x, *max_y])
        }
        _ => Err(CliError::InvalidArgument(format!(
            "bbox '{}' should be MINX,MINY,MAXX,MAXY",
            text
        ))),
    }
}

/// Parses `WIDTHxHEIGHT`.
fn parse_size(text: &str) -> Result<(u32, u32), CliError> {
    let invalid = || CliError::InvalidArgument(format!("size '{}' should be WIDTHxHEIGHT", text));
    let (w, h) = text.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
    let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn output_format(path: &Path) -> Result<TileFormat, CliError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| TileFormat::from_extension(&ext.to_lowercase()))
        .ok_or_else(|| {
            CliError::InvalidArgument(format!(
                "cannot infer image format from '{}' (use .png or .jpg)",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_bbox() {
        assert_eq!(parse_bbox("-180,-90,180,90").unwrap(), [-180.0, -90.0, 180.0, 90.0]);
        assert!(parse_bbox("0,0,1").is_err());
        assert!(parse_bbox("1,0,0,1").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("256x128").unwrap(), (256, 128));
        assert_eq!(parse_size("64X64").unwrap(), (64, 64));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("256").is_err());
    }

    #[test]
    fn test_output_format() {
        assert_eq!(output_format(Path::new("out.PNG")).unwrap(), TileFormat::Png);
        assert_eq!(output_format(Path::new("out.jpeg")).unwrap(), TileFormat::Jpeg);
        assert!(output_format(Path::new("out.tif")).is_err());
    }

    proptest! {
        #[test]
        fn prop_size_accepts_any_positive_pair(w in 1u32..100_000, h in 1u32..100_000) {
            prop_assert_eq!(parse_size(&format!("{}x{}", w, h)).unwrap(), (w, h));
        }
    }
}
