//! Small formatting helpers shared by the loop and the commands.

use std::path::Path;

/// Format minutes past midnight as `HH:MM`.
pub fn format_minutes(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Format seconds past midnight as `HH:MM:SS`. Values outside the day are
/// shown with a sign and may exceed 24 hours (activation windows can spill).
pub fn format_seconds(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let s = seconds.unsigned_abs();
    format!("{sign}{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}

/// Replace the home directory prefix with `~` so paths can be logged without
/// leaking the user name.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        return format!("~/{}", stripped.display());
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "00:00");
        assert_eq!(format_minutes(1080), "18:00");
        assert_eq!(format_minutes(1439), "23:59");
    }

    #[test]
    fn test_format_seconds_handles_negative_and_overflow() {
        assert_eq!(format_seconds(64_490), "17:54:50");
        assert_eq!(format_seconds(-10), "-00:00:10");
        assert_eq!(format_seconds(86_430), "24:00:30");
    }

    #[test]
    fn test_private_path_outside_home() {
        assert_eq!(private_path(Path::new("/dev/rtc0")), "/dev/rtc0");
    }
}
