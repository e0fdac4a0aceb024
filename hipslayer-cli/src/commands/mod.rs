//! CLI command implementations.
//!
//! Each subcommand has its own module with its handler.
//!
//! # Command Modules
//!
//! - [`seed`] - Generate and cache every tile of one order
//! - [`allsky`] - Build the Allsky preview of one order
//! - [`properties`] - Print a layer's properties document
//! - [`tile`] - Render one `/hips` request to a file
//! - [`map`] - Render a planar image from a layer's source
//! - [`serve`] - Serve `/hips` over HTTP

pub mod allsky;
pub mod map;
pub mod properties;
pub mod seed;
pub mod serve;
pub mod tile;

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use hipslayer::mosaic::{MosaicProgress, ProgressCallback};

/// Progress bar over `total` pixels and the callback that drives it.
pub(crate) fn pixel_progress(total: u64) -> (ProgressBar, ProgressCallback) {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let bar = pb.clone();
    let callback: ProgressCallback = Arc::new(move |progress: MosaicProgress| {
        bar.set_position(progress.completed);
        bar.set_message(format!("{:.2} %", progress.percent()));
    });
    (pb, callback)
}
