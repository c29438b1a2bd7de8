use anyhow::Result;
use console::style;

use lacuna_core::Settings;

/// Print the effective settings as TOML.
pub fn print_settings(settings: &Settings) -> Result<()> {
    println!("{}", style("Completion settings").bold());
    println!("{}", toml::to_string(settings)?);
    Ok(())
}
