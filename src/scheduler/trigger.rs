//! Trigger definitions: what to send, and when during the day.

use std::fmt;
use std::ops::Range;

use crate::common::constants::*;
use crate::common::utils::format_minutes;

/// Opaque token sent to the actuator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionCode(String);

impl ActionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Fires at a fixed local minute of the day
    FixedClock { minute_of_day: u32 },
    /// Fires relative to today's sunset; skipped when sunset is unknown
    SunsetRelative { offset_minutes: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDefinition {
    pub id: String,
    pub kind: TriggerKind,
    pub action: ActionCode,
    /// Seconds before the target at which the window opens
    pub early_offset_seconds: u32,
    /// Seconds after the target at which the window closes (exclusive)
    pub window_length_seconds: u32,
}

impl TriggerDefinition {
    pub fn fixed(id: &str, minute_of_day: u32, action: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TriggerKind::FixedClock { minute_of_day },
            action: ActionCode::new(action),
            early_offset_seconds: SERIAL_EARLY_SECONDS,
            window_length_seconds: SERIAL_WINDOW_SECONDS,
        }
    }

    pub fn sunset(id: &str, offset_minutes: i32, action: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TriggerKind::SunsetRelative { offset_minutes },
            action: ActionCode::new(action),
            early_offset_seconds: SERIAL_EARLY_SECONDS,
            window_length_seconds: SERIAL_WINDOW_SECONDS,
        }
    }

    pub fn with_window(mut self, early_offset_seconds: u32, window_length_seconds: u32) -> Self {
        self.early_offset_seconds = early_offset_seconds;
        self.window_length_seconds = window_length_seconds;
        self
    }

    pub fn is_sunset_relative(&self) -> bool {
        matches!(self.kind, TriggerKind::SunsetRelative { .. })
    }

    /// Target instant in seconds past local midnight. `None` for a
    /// sunset-relative trigger when today's sunset is unknown.
    pub fn target_seconds(&self, sunset_minutes: Option<u32>) -> Option<i64> {
        match self.kind {
            TriggerKind::FixedClock { minute_of_day } => Some(minute_of_day as i64 * 60),
            TriggerKind::SunsetRelative { offset_minutes } => {
                sunset_minutes.map(|sunset| (sunset as i64 + offset_minutes as i64) * 60)
            }
        }
    }

    /// Half-open activation window `[target - early, target + window)`. The
    /// window is not wrapped around midnight.
    pub fn window(&self, sunset_minutes: Option<u32>) -> Option<Range<i64>> {
        let target = self.target_seconds(sunset_minutes)?;
        Some(
            target - self.early_offset_seconds as i64
                ..target + self.window_length_seconds as i64,
        )
    }

    pub fn describe(&self) -> String {
        match self.kind {
            TriggerKind::FixedClock { minute_of_day } => format_minutes(minute_of_day),
            TriggerKind::SunsetRelative { offset_minutes: 0 } => "sunset".to_string(),
            TriggerKind::SunsetRelative { offset_minutes } if offset_minutes < 0 => {
                format!("sunset{offset_minutes}m")
            }
            TriggerKind::SunsetRelative { offset_minutes } => format!("sunset+{offset_minutes}m"),
        }
    }
}

/// The controller's daily programme, with the given window applied to every
/// trigger.
pub fn default_triggers(early_offset_seconds: u32, window_length_seconds: u32) -> Vec<TriggerDefinition> {
    vec![
        TriggerDefinition::fixed("first-call-morning", 7 * 60 + 55, ACTION_PRE_EVENT),
        TriggerDefinition::fixed("colors", 8 * 60, ACTION_MORNING),
        TriggerDefinition::sunset("first-call-sunset", -5, ACTION_PRE_EVENT),
        TriggerDefinition::sunset("retreat", 0, ACTION_EVENT),
        TriggerDefinition::fixed("taps", 22 * 60, ACTION_NIGHT),
    ]
    .into_iter()
    .map(|t| t.with_window(early_offset_seconds, window_length_seconds))
    .collect()
}
