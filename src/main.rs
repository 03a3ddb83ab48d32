//! Main entry point: parse arguments and dispatch.
//!
//! - No command: run the controller through the `Bugler` builder
//! - `set-time`, `sunset`, `simulate`: one-shot commands
//! - `--help`, `--version`: print and exit

use anyhow::Result;

use bugler::{
    Bugler,
    args::{CliAction, ParsedArgs},
    commands,
    common::constants::EXIT_FAILURE,
    config, log_error_exit,
};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    let config_dir = match &parsed_args.action {
        CliAction::Run { config_dir, .. }
        | CliAction::SetTime { config_dir, .. }
        | CliAction::Sunset { config_dir, .. }
        | CliAction::Simulate { config_dir, .. } => config_dir.clone(),
        _ => None,
    };
    config::set_config_dir(config_dir)?;

    let result = match parsed_args.action {
        CliAction::ShowVersion => {
            commands::help::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            commands::help::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            commands::help::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run { debug_enabled, .. } => Bugler::new(debug_enabled).run(),
        CliAction::SetTime { datetime, .. } => {
            commands::set_time::handle_set_time_command(&datetime)
        }
        CliAction::Sunset { date, .. } => commands::sunset::handle_sunset_command(date.as_deref()),
        CliAction::Simulate {
            debug_enabled,
            start_time,
            days,
            log_to_file,
            ..
        } => commands::simulate::handle_simulate_command(
            &start_time,
            days,
            log_to_file,
            debug_enabled,
        ),
    };

    if let Err(e) = result {
        log_error_exit!("{e}");
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(EXIT_FAILURE);
    }

    Ok(())
}
