//! `swell config`: print the effective configuration.

use crate::cli_error::{CliError, CliResult};
use crate::runtime::Runtime;

pub(crate) fn run(rt: &Runtime) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(rt.config())
        .map_err(|e| CliError::msg(format!("serializing config: {e}")))?;
    println!("{rendered}");
    Ok(())
}
