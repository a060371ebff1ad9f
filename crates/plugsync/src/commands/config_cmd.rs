//! Config subcommand handlers.

use std::io::BufRead;

use plugsync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

const REDACTED: &str = "****";

/// Copy of `cfg` with secrets masked.
fn redacted(cfg: &Config) -> Config {
    Config {
        password: cfg.password.as_ref().map(|_| REDACTED.to_owned()),
        ..cfg.clone()
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => init(global, force),
        ConfigCommand::Show => show(global),
        ConfigCommand::Path => {
            output::print_output(&util::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::SetPassword => set_password(global),
    }
}

fn init(global: &GlobalOpts, force: bool) -> Result<(), CliError> {
    let path = util::config_file(global);
    if path.exists() && !force {
        return Err(CliError::ConfigExists {
            path: path.display().to_string(),
        });
    }

    let username = global.username.clone().ok_or_else(|| CliError::Validation {
        field: "username".into(),
        reason: "pass --username (or set PLUGSYNC_USERNAME)".into(),
    })?;
    let cfg = Config {
        username: Some(username),
        fixture: global.fixture.clone(),
        ..Config::default()
    };

    plugsync_config::save_config_to(&cfg, &path)?;
    tracing::info!(path = %path.display(), "config written");
    output::print_output(&format!("Wrote {}", path.display()), global.quiet);
    Ok(())
}

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = redacted(&util::load_config(global)?);
    let out = match global.output {
        OutputFormat::Json => output::render_json(&cfg, false)?,
        OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
        OutputFormat::Table | OutputFormat::Plain => {
            toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn set_password(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let username = cfg.username.ok_or_else(|| CliError::Validation {
        field: "username".into(),
        reason: "configure a username before storing its password".into(),
    })?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "empty password on stdin".into(),
        });
    }

    plugsync_config::store_password(&username, password)?;
    output::print_output(&format!("Password stored for {username}"), global.quiet);
    Ok(())
}
