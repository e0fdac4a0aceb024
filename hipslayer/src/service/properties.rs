//! The HiPS `properties` document of a generated layer.

use chrono::{DateTime, Utc};

use crate::config::LayerConfig;

/// Fallback `creator_did` for layers without one.
pub const DEFAULT_CREATOR_DID: &str = "ivo://example.com/unknown_resource_FIXME";
pub const DEFAULT_HIPS_STATUS: &str = "public master clonableOnce";
pub const DEFAULT_HIPS_ORDER: &str = "5";
pub const DEFAULT_HIPS_FRAME: &str = "planet";

/// Builds the `key=value` properties document of `layer`.
///
/// Required keys come first in a fixed order, configured metadata
/// overriding the defaults; the layer's remaining metadata follows in file
/// order. `now` stamps `hips_release_date` when the layer does not set one.
pub fn properties_document(layer: &LayerConfig, now: DateTime<Utc>) -> String {
    let md = |key: &str, default: &str| layer.metadata(key).unwrap_or(default).to_string();

    let required = [
        ("creator_did", md("creator_did", DEFAULT_CREATOR_DID)),
        ("obs_title", md("obs_title", &layer.title)),
        ("dataproduct_type", "image".to_string()),
        ("hips_version", "1.4".to_string()),
        (
            "hips_release_date",
            md(
                "hips_release_date",
                &now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
        ),
        ("hips_status", md("hips_status", DEFAULT_HIPS_STATUS)),
        ("hips_tile_format", layer.tile_format_list().to_string()),
        ("hips_order", md("hips_order", DEFAULT_HIPS_ORDER)),
        ("hips_tile_width", layer.tile_width.to_string()),
        ("hips_frame", md("hips_frame", DEFAULT_HIPS_FRAME)),
        // Aladin needs this to display in colour.
        ("dataproduct_subtype", "color".to_string()),
    ];

    let mut document = String::new();
    for (key, value) in &required {
        document.push_str(&format!("{}={}\n", key, value));
    }
    for (key, value) in &layer.metadata {
        if required.iter().all(|(k, _)| k != key) {
            document.push_str(&format!("{}={}\n", key, value));
        }
    }
    document
}
