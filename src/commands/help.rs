//! Help and version output.

const OPTIONS: &[(&str, &str)] = &[
    ("-c, --config <dir>", "Use custom configuration directory"),
    ("-d, --debug", "Enable detailed debug output"),
    ("-h, --help", "Print help information"),
    ("-l, --log", "Write simulation output to a log file"),
    ("-V, --version", "Print version information"),
];

const COMMANDS: &[(&str, &str)] = &[
    ("(none)", "Run the controller"),
    ("set-time, t <utc>", "Set the hardware clock, \"YYYY-MM-DD HH:MM:SS\" UTC"),
    ("sunset, s [date]", "Show sunset and DST for a date (default today)"),
    ("simulate, S <start> <days>", "Fast-forward the controller from a local start time"),
    ("help, h", "Print this message"),
];

const COLUMN: usize = 22;

fn log_table(title: &str, rows: &[(&str, &str)]) {
    log_block_start!("{title}");
    for (usage, about) in rows {
        if usage.len() < COLUMN {
            log_indented!("{usage:<COLUMN$} {about}");
        } else {
            log_indented!("{usage}");
            log_indented!("{:<COLUMN$} {about}", "");
        }
    }
}

pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

pub fn display_help() {
    log_version!();
    log_block_start!("{}", env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("bugler [OPTIONS] [COMMAND]");
    log_table("Options:", OPTIONS);
    log_table("Commands:", COMMANDS);
    log_end!();
}
