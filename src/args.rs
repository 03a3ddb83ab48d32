//! Command-line argument parsing and processing.
//!
//! Arguments are parsed by hand into a [`CliAction`]. Global flags
//! (`--debug`, `--config DIR`, `--help`, `--version`) may appear anywhere; the
//! first bare word selects a subcommand.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the controller
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
    },
    /// Write an explicit UTC time to the hardware clock
    SetTime {
        datetime: String,
        config_dir: Option<String>,
    },
    /// Print the sunset entry and DST state for a date (today when omitted)
    Sunset {
        date: Option<String>,
        config_dir: Option<String>,
    },
    /// Fast-forward the controller over simulated time
    Simulate {
        debug_enabled: bool,
        start_time: String,
        days: u32,
        log_to_file: bool,
        config_dir: Option<String>,
    },

    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to bad arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

fn usage_error(message: &str) -> ParsedArgs {
    log_warning!("{message}");
    ParsedArgs {
        action: CliAction::ShowHelpDueToError,
    }
}

impl ParsedArgs {
    /// Parse command-line arguments (including the program name) into an action.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut log_to_file = false;
        let mut config_dir: Option<String> = None;
        let mut positionals: Vec<String> = Vec::new();

        let mut idx = 0;
        while idx < args_vec.len() {
            let arg = args_vec[idx].as_str();
            match arg {
                "--debug" | "-d" => debug_enabled = true,
                "--help" | "-h" => display_help = true,
                "--version" | "-V" | "-v" => display_version = true,
                "--log" | "-l" => log_to_file = true,
                "--config" | "-c" => {
                    let Some(dir) = args_vec.get(idx + 1) else {
                        return usage_error("Missing directory after --config");
                    };
                    config_dir = Some(dir.clone());
                    idx += 1;
                }
                _ if arg.starts_with('-') && arg.len() > 1 => {
                    return usage_error(&format!("Unknown option: {arg}"));
                }
                _ => positionals.push(arg.to_string()),
            }
            idx += 1;
        }

        // Version wins over help, help wins over everything else
        if display_version {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }
        if display_help {
            return ParsedArgs {
                action: CliAction::ShowHelp,
            };
        }

        let Some((command, rest)) = positionals.split_first() else {
            if log_to_file {
                return usage_error("--log is only valid with simulate");
            }
            return ParsedArgs {
                action: CliAction::Run {
                    debug_enabled,
                    config_dir,
                },
            };
        };

        if log_to_file && !matches!(command.as_str(), "simulate" | "S") {
            return usage_error("--log is only valid with simulate");
        }

        let action = match command.as_str() {
            "help" | "h" => CliAction::ShowHelp,
            "set-time" | "t" => match rest {
                [datetime] => CliAction::SetTime {
                    datetime: datetime.clone(),
                    config_dir,
                },
                _ => {
                    return usage_error(
                        "Usage: bugler set-time \"YYYY-MM-DD HH:MM:SS\" (UTC)",
                    );
                }
            },
            "sunset" | "s" => match rest {
                [] => CliAction::Sunset {
                    date: None,
                    config_dir,
                },
                [date] => CliAction::Sunset {
                    date: Some(date.clone()),
                    config_dir,
                },
                _ => return usage_error("Usage: bugler sunset [YYYY-MM-DD]"),
            },
            "simulate" | "S" => match rest {
                [start_time, days] => match days.parse::<u32>() {
                    Ok(days) if days > 0 => CliAction::Simulate {
                        debug_enabled,
                        start_time: start_time.clone(),
                        days,
                        log_to_file,
                        config_dir,
                    },
                    _ => return usage_error(&format!("Invalid day count: {days}")),
                },
                _ => {
                    return usage_error(
                        "Usage: bugler simulate \"YYYY-MM-DD HH:MM:SS\" DAYS [--log]",
                    );
                }
            },
            other => return usage_error(&format!("Unknown command: {other}")),
        };

        ParsedArgs { action }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}
