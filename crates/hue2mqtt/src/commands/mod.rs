//! Command dispatch: CLI args -> config -> handlers.

pub mod catalog;
pub mod check;
pub mod discover;
pub mod run;

use hue2mqtt_config::{Config, load_config};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed subcommand. Everything except `catalog` needs config.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Catalog => catalog::handle(global),
        Command::Check(args) => check::handle(&config(global)?, &args, global),
        Command::Discover => discover::handle(&config(global)?, global).await,
        Command::Run => run::handle(&config(global)?).await,
    }
}

fn config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config(global.config.as_deref())?)
}
