//! INI parsing logic for converting `Ini` → `ServiceConfig`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::ConfigError;
use super::settings::{LayerConfig, ServiceConfig, ServiceSettings, SourceConfig, DEFAULT_TILE_WIDTH};
use crate::cache::default_lock_dir;
use crate::resample::ResamplingMode;

const SOURCE_PREFIX: &str = "source.";
const LAYER_PREFIX: &str = "layer.";

/// Layer keys that configure the layer rather than describe it.
const LAYER_KEYS: [&str; 7] = [
    "title",
    "sources",
    "enabled",
    "tile_width",
    "hips_tile_width",
    "passthrough",
    "passthrough_properties",
];

/// Parse an `Ini` object into a `ServiceConfig`.
pub(super) fn parse_ini(ini: &Ini) -> Result<ServiceConfig, ConfigError> {
    let service = match ini.section(Some("service")) {
        Some(section) => parse_service(section)?,
        None => ServiceSettings::default(),
    };

    let mut sources = Vec::new();
    let mut layers = Vec::new();
    for (name, section) in ini.iter() {
        let Some(name) = name else { continue };
        if let Some(source_name) = name.strip_prefix(SOURCE_PREFIX) {
            sources.push((source_name.to_string(), parse_source(name, section)?));
        } else if let Some(layer_name) = name.strip_prefix(LAYER_PREFIX) {
            layers.push(parse_layer(name, layer_name, section)?);
        }
    }

    for layer in &layers {
        if layer.sources.is_empty() {
            return Err(ConfigError::NoSources(layer.name.clone()));
        }
        for source_name in &layer.sources {
            if !sources.iter().any(|(n, _)| n == source_name) {
                return Err(ConfigError::UnknownSource {
                    layer: layer.name.clone(),
                    source_name: source_name.clone(),
                });
            }
        }
    }

    Ok(ServiceConfig {
        service,
        sources,
        layers,
    })
}

fn parse_service(section: &Properties) -> Result<ServiceSettings, ConfigError> {
    let mut settings = ServiceSettings::default();

    if let Some(v) = section.get("cache_dir") {
        let v = v.trim();
        if !v.is_empty() {
            settings.cache_dir = expand_tilde(v);
        }
    }
    settings.lock_dir = match section.get("lock_dir").map(str::trim) {
        Some(v) if !v.is_empty() => expand_tilde(v),
        _ => default_lock_dir(&settings.cache_dir),
    };
    if let Some(v) = section.get("timeout") {
        let secs = v
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|&secs| secs > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                section: "service".to_string(),
                key: "timeout".to_string(),
                value: v.to_string(),
                reason: "must be a positive integer (seconds)".to_string(),
            })?;
        settings.timeout = Duration::from_secs(secs);
    }
    if let Some(v) = section.get("populate_cache") {
        settings.populate_cache = parse_bool(v);
    }
    if let Some(v) = section.get("resampling_method") {
        settings.resampling = parse_resampling("service", v)?;
    }

    Ok(settings)
}

fn parse_source(section_name: &str, section: &Properties) -> Result<SourceConfig, ConfigError> {
    let url = required(section_name, section, "url")?;
    let kind = required(section_name, section, "type")?.to_lowercase();

    match kind.as_str() {
        "wms" => {
            let layers = split_list(&required(section_name, section, "layers")?);
            let transparent = section.get("transparent").map(parse_bool).unwrap_or(false);
            Ok(SourceConfig::Wms {
                url,
                layers,
                transparent,
            })
        }
        "hips" => {
            let resampling = match section.get("resampling_method") {
                Some(v) => parse_resampling(section_name, v)?,
                None => ResamplingMode::default(),
            };
            let cache_tiles = section.get("cache_hips_tiles").map(parse_bool).unwrap_or(true);
            Ok(SourceConfig::Hips {
                url,
                resampling,
                cache_tiles,
            })
        }
        _ => Err(ConfigError::InvalidValue {
            section: section_name.to_string(),
            key: "type".to_string(),
            value: kind,
            reason: "must be 'wms' or 'hips'".to_string(),
        }),
    }
}

fn parse_layer(
    section_name: &str,
    name: &str,
    section: &Properties,
) -> Result<LayerConfig, ConfigError> {
    let tile_width = match section.get("tile_width").or_else(|| section.get("hips_tile_width")) {
        Some(v) => {
            let invalid = || ConfigError::InvalidValue {
                section: section_name.to_string(),
                key: "tile_width".to_string(),
                value: v.to_string(),
                reason: "must be a power of two".to_string(),
            };
            let width: u32 = v.trim().parse().map_err(|_| invalid())?;
            if !width.is_power_of_two() {
                return Err(invalid());
            }
            width
        }
        None => DEFAULT_TILE_WIDTH,
    };

    let metadata = section
        .iter()
        .filter(|(k, _)| !LAYER_KEYS.contains(k))
        .map(|(k, v)| (k.to_string(), v.trim().to_string()))
        .collect();

    Ok(LayerConfig {
        name: name.to_string(),
        title: section
            .get("title")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| name.to_string()),
        sources: section.get("sources").map(split_list).unwrap_or_default(),
        enabled: section.get("enabled").map(parse_bool).unwrap_or(true),
        tile_width,
        passthrough: section.get("passthrough").map(parse_bool).unwrap_or(true),
        passthrough_properties: section
            .get("passthrough_properties")
            .map(parse_bool)
            .unwrap_or(true),
        metadata,
    })
}

fn required(section_name: &str, section: &Properties, key: &str) -> Result<String, ConfigError> {
    match section.get(key).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingKey {
            section: section_name.to_string(),
            key: key.to_string(),
        }),
    }
}

fn parse_resampling(section_name: &str, value: &str) -> Result<ResamplingMode, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        section: section_name.to_string(),
        key: "resampling_method".to_string(),
        value: value.to_string(),
        reason: "must be one of: nearest_neighbour, bilinear, bicubic".to_string(),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse boolean from string (true/false, 1/0, yes/no, on/off).
fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TileFormat;

    const FULL: &str = r#"
[service]
cache_dir = /data/hips
timeout = 12
populate_cache = false
resampling_method = bilinear

[source.osm]
type = wms
url = http://localhost:42423/service
layers = bar, baz

[source.upstream]
type = hips
url = http://localhost:42423/hips_source
resampling_method = nearest_neighbour
cache_hips_tiles = no

[layer.direct]
title = Direct Layer
sources = osm
hips_order = 3
creator_did = ivo://example/direct

[layer.mixed]
sources = osm, upstream
tile_width = 256
enabled = false
"#;

    fn parse(text: &str) -> Result<ServiceConfig, ConfigError> {
        ServiceConfig::from_ini_str(text)
    }

    #[test]
    fn test_full_configuration() {
        let config = parse(FULL).unwrap();

        assert_eq!(config.service.cache_dir, PathBuf::from("/data/hips"));
        assert_eq!(config.service.lock_dir, PathBuf::from("/data/hips/tile_locks"));
        assert_eq!(config.service.timeout, Duration::from_secs(12));
        assert!(!config.service.populate_cache);
        assert_eq!(config.service.resampling, ResamplingMode::Bilinear);

        assert_eq!(
            config.source("osm"),
            Some(&SourceConfig::Wms {
                url: "http://localhost:42423/service".to_string(),
                layers: vec!["bar".to_string(), "baz".to_string()],
                transparent: false,
            })
        );
        assert_eq!(
            config.source("upstream"),
            Some(&SourceConfig::Hips {
                url: "http://localhost:42423/hips_source".to_string(),
                resampling: ResamplingMode::NearestNeighbour,
                cache_tiles: false,
            })
        );

        let direct = config.layer("direct").unwrap();
        assert_eq!(direct.title, "Direct Layer");
        assert_eq!(direct.tile_width, 512);
        assert_eq!(direct.shift(), 9);
        assert!(direct.enabled && direct.passthrough && direct.passthrough_properties);
        assert_eq!(
            direct.metadata,
            vec![
                ("hips_order".to_string(), "3".to_string()),
                ("creator_did".to_string(), "ivo://example/direct".to_string()),
            ]
        );

        let mixed = config.layer("mixed").unwrap();
        assert_eq!(mixed.title, "mixed");
        assert_eq!(mixed.sources, vec!["osm", "upstream"]);
        assert_eq!(mixed.tile_width, 256);
        assert!(!mixed.enabled);
        assert!(mixed.metadata.is_empty());
    }

    #[test]
    fn test_tile_formats_from_metadata() {
        let config = parse(FULL).unwrap();
        let mut layer = config.layer("direct").unwrap().clone();
        assert_eq!(layer.tile_format_list(), "png jpeg");
        assert_eq!(layer.tile_formats(), vec![TileFormat::Png, TileFormat::Jpeg]);

        layer
            .metadata
            .push(("hips_tile_format".to_string(), "jpeg".to_string()));
        assert_eq!(layer.tile_formats(), vec![TileFormat::Jpeg]);
    }

    #[test]
    fn test_defaults_without_service_section() {
        let config = parse("[source.s]\ntype = wms\nurl = http://h/\nlayers = a\n").unwrap();
        assert_eq!(config.service.timeout, Duration::from_secs(30));
        assert!(config.service.populate_cache);
        assert_eq!(config.service.resampling, ResamplingMode::Bicubic);
        assert!(config.layers.is_empty());
    }

    #[test]
    fn test_timeout_must_be_positive() {
        for value in ["0", "-5", "soon"] {
            let err = parse(&format!("[service]\ntimeout = {}\n", value)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { key, .. } if key == "timeout"),
                "{}: {}",
                value,
                err
            );
        }
        let config = parse("[service]\ntimeout = 5\n").unwrap();
        assert_eq!(config.service.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_resampling_method() {
        let err = parse("[service]\nresampling_method = lanczos\n").unwrap_err();
        assert!(err.to_string().contains("resampling_method"));
        assert!(err.to_string().contains("lanczos"));
    }

    #[test]
    fn test_tile_width_must_be_power_of_two() {
        let text = "[source.s]\ntype = wms\nurl = http://h/\nlayers = a\n[layer.l]\nsources = s\ntile_width = 300\n";
        assert!(matches!(
            parse(text),
            Err(ConfigError::InvalidValue { key, .. }) if key == "tile_width"
        ));
    }

    #[test]
    fn test_unknown_source_reference() {
        let text = "[layer.l]\nsources = nowhere\n";
        assert!(matches!(
            parse(text),
            Err(ConfigError::UnknownSource { layer, source_name }) if layer == "l" && source_name == "nowhere"
        ));
    }

    #[test]
    fn test_layer_without_sources() {
        assert!(matches!(parse("[layer.l]\ntitle = x\n"), Err(ConfigError::NoSources(l)) if l == "l"));
    }

    #[test]
    fn test_source_errors() {
        assert!(matches!(
            parse("[source.s]\ntype = wmts\nurl = http://h/\n"),
            Err(ConfigError::InvalidValue { key, .. }) if key == "type"
        ));
        assert!(matches!(
            parse("[source.s]\ntype = wms\nlayers = a\n"),
            Err(ConfigError::MissingKey { key, .. }) if key == "url"
        ));
    }

    #[test]
    fn test_parse_bool_values() {
        for v in ["true", "1", "yes", "On"] {
            assert!(parse_bool(v));
        }
        for v in ["false", "0", "no", "off", ""] {
            assert!(!parse_bool(v));
        }
    }
}
