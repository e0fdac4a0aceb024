//! Tile command - answer one `/hips` request and save the body.

use std::path::Path;

use hipslayer::service::{HipsRequest, HipsResponse};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the tile command.
pub fn run(runner: &CliRunner, path: &str, output: &Path) -> Result<(), CliError> {
    runner.log_startup("tile");

    let response = checked(path, runner.service().handle(&HipsRequest::get(path)))?;
    runner.write_output(output, &response.body)?;
    println!(
        "Saved {} ({}, {} bytes) to {}",
        path,
        response.content_type,
        response.body.len(),
        output.display()
    );
    Ok(())
}

/// Turns an error status into a [`CliError`].
pub(crate) fn checked(path: &str, response: HipsResponse) -> Result<HipsResponse, CliError> {
    if response.is_success() {
        return Ok(response);
    }
    Err(CliError::Request {
        path: path.to_string(),
        status: response.status,
        message: response.text_body(),
    })
}
