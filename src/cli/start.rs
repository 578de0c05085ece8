use super::{commands, dispatch, telemetry};
use anyhow::Result;
use clap::ArgMatches;

/// Parse, set up logging, dispatch and execute
///
/// # Errors
///
/// Returns an error if any step in the flow fails
pub async fn start() -> Result<()> {
    let matches = commands::new().get_matches();

    telemetry::init(extract_verbosity(&matches))?;

    let action = dispatch::dispatch(&matches)?;

    action.execute().await?;

    Ok(())
}

fn extract_verbosity(matches: &ArgMatches) -> u8 {
    matches.get_count("verbose")
}
