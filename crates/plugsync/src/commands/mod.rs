//! Command dispatch: bridges CLI args -> manager operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod entities;
pub mod run;
pub mod switch;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        // Config commands never touch the account
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Run(args) => run::handle(args, global).await,
        Command::Devices(args) => devices::handle(args, global).await,
        Command::Entities(args) => entities::handle(args, global).await,
        Command::Switch(args) => switch::handle(args, global).await,
    }
}
