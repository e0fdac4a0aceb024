//! Properties command - print a layer's properties document.

use hipslayer::service::HipsRequest;

use super::tile::checked;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the properties command.
pub fn run(runner: &CliRunner, layer: &str) -> Result<(), CliError> {
    runner.log_startup("properties");

    let path = format!("/hips/{}/properties", layer);
    let response = checked(&path, runner.service().handle(&HipsRequest::get(&path)))?;
    print!("{}", response.text_body());
    Ok(())
}
