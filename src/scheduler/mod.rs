//! Day-scoped trigger state machine.
//!
//! Every calendar date gets a fresh [`DaySession`] in which each trigger starts
//! `Pending` and may become `Fired` exactly once. Moving forward to a new date
//! replaces the whole session; nothing is reset field by field. A clock stepped
//! back across midnight keeps the later session, so nothing fires twice on one
//! date. The transition itself is the
//! pure [`step`] function, and [`EventScheduler`] wraps it with the session
//! bookkeeping and sunset lookups.

pub mod trigger;

pub use trigger::{ActionCode, TriggerDefinition, TriggerKind, default_triggers};

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::common::constants::SECONDS_PER_DAY;
use crate::sunset::SunsetTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    Pending,
    Fired,
}

/// Per-trigger status for one day.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerState(BTreeMap<String, TriggerStatus>);

impl TriggerState {
    /// All triggers `Pending`.
    pub fn fresh(triggers: &[TriggerDefinition]) -> Self {
        Self(
            triggers
                .iter()
                .map(|t| (t.id.clone(), TriggerStatus::Pending))
                .collect(),
        )
    }

    pub fn status(&self, id: &str) -> Option<TriggerStatus> {
        self.0.get(id).copied()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.status(id) == Some(TriggerStatus::Pending)
    }

    fn mark_fired(&mut self, id: &str) {
        if let Some(status) = self.0.get_mut(id) {
            *status = TriggerStatus::Fired;
        }
    }

    /// True only when there is at least one trigger and every one has fired.
    pub fn all_fired(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|s| *s == TriggerStatus::Fired)
    }

    pub fn fired_count(&self) -> usize {
        self.0.values().filter(|s| **s == TriggerStatus::Fired).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySession {
    pub date: NaiveDate,
    pub sunset_minutes: Option<u32>,
    pub state: TriggerState,
}

impl DaySession {
    pub fn new(date: NaiveDate, sunset_minutes: Option<u32>, triggers: &[TriggerDefinition]) -> Self {
        Self {
            date,
            sunset_minutes,
            state: TriggerState::fresh(triggers),
        }
    }
}

/// One action handed to the actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub trigger_id: String,
    pub action: ActionCode,
}

/// Advance a session to `now_seconds` past local midnight.
///
/// Each pending trigger whose window contains `now` is marked fired and
/// returned for dispatch, in definition order. Sunset-relative triggers are
/// skipped while `sunset_enabled` is false or the session has no sunset.
pub fn step(
    triggers: &[TriggerDefinition],
    mut session: DaySession,
    now_seconds: u32,
    sunset_enabled: bool,
) -> (DaySession, Vec<Dispatch>) {
    let now = now_seconds as i64;
    let mut dispatches = Vec::new();

    for trigger in triggers {
        if !session.state.is_pending(&trigger.id) {
            continue;
        }
        if trigger.is_sunset_relative() && !sunset_enabled {
            continue;
        }
        let Some(window) = trigger.window(session.sunset_minutes) else {
            continue;
        };

        if window.contains(&now) {
            session.state.mark_fired(&trigger.id);
            dispatches.push(Dispatch {
                trigger_id: trigger.id.clone(),
                action: trigger.action.clone(),
            });
        }
    }

    (session, dispatches)
}

/// What one tick produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickOutcome {
    pub dispatched: Vec<Dispatch>,
    /// A new day session was started on this tick
    pub new_day: bool,
    /// Nothing more can fire today; the loop may poll slowly until midnight
    pub idle: bool,
    pub sunset_minutes: Option<u32>,
    /// Longest the loop may wait before the next tick without missing a
    /// window: until the earliest pending window opens, or one second past
    /// midnight. Always at least one second.
    pub wake_within: u32,
}

pub struct EventScheduler {
    triggers: Vec<TriggerDefinition>,
    table: SunsetTable,
    session: Option<DaySession>,
    sunset_enabled: bool,
    late_cutoff_seconds: u32,
}

impl EventScheduler {
    pub fn new(
        triggers: Vec<TriggerDefinition>,
        table: SunsetTable,
        sunset_enabled: bool,
        late_cutoff_seconds: u32,
    ) -> Self {
        Self {
            triggers,
            table,
            session: None,
            sunset_enabled,
            late_cutoff_seconds,
        }
    }

    /// Run one scheduling pass.
    ///
    /// On a later date (or the first tick) the session is replaced and the
    /// sunset is looked up for the new date, ignoring `today_sunset_minutes`.
    /// Within a day a caller-supplied sunset overrides the cached one. An
    /// earlier date than the session's dispatches nothing and keeps the
    /// session until the clock catches up.
    pub fn tick(
        &mut self,
        now_seconds_past_midnight: u32,
        today_sunset_minutes: Option<u32>,
        current_date: NaiveDate,
    ) -> TickOutcome {
        if let Some(session) = &self.session
            && current_date < session.date
        {
            return TickOutcome {
                sunset_minutes: session.sunset_minutes,
                wake_within: 1,
                ..TickOutcome::default()
            };
        }

        let (session, new_day) = match self.session.take() {
            Some(mut session) if session.date == current_date => {
                if today_sunset_minutes.is_some() {
                    session.sunset_minutes = today_sunset_minutes;
                }
                (session, false)
            }
            _ => {
                let sunset = self.table.sunset_for(current_date);
                (DaySession::new(current_date, sunset, &self.triggers), true)
            }
        };

        let (session, dispatched) = step(
            &self.triggers,
            session,
            now_seconds_past_midnight,
            self.sunset_enabled,
        );

        let idle = session.state.all_fired() || now_seconds_past_midnight >= self.late_cutoff_seconds;
        let sunset_minutes = session.sunset_minutes;
        let wake_within = self.wake_within(&session, now_seconds_past_midnight);
        self.session = Some(session);

        TickOutcome {
            dispatched,
            new_day,
            idle,
            sunset_minutes,
            wake_within,
        }
    }

    fn wake_within(&self, session: &DaySession, now_seconds: u32) -> u32 {
        let now = now_seconds as i64;
        let past_midnight = SECONDS_PER_DAY as i64 - now + 1;

        self.triggers
            .iter()
            .filter(|t| session.state.is_pending(&t.id))
            .filter_map(|t| t.window(session.sunset_minutes))
            .filter(|window| window.start > now)
            .map(|window| window.start - now)
            .fold(past_midnight, i64::min)
            .max(1) as u32
    }

    pub fn session(&self) -> Option<&DaySession> {
        self.session.as_ref()
    }

    pub fn triggers(&self) -> &[TriggerDefinition] {
        &self.triggers
    }

    pub fn table(&self) -> &SunsetTable {
        &self.table
    }

    pub fn sunset_enabled(&self) -> bool {
        self.sunset_enabled
    }

    pub fn set_sunset_enabled(&mut self, enabled: bool) {
        self.sunset_enabled = enabled;
    }

    /// Flip the sunset switch and return the new value.
    pub fn toggle_sunset(&mut self) -> bool {
        self.sunset_enabled = !self.sunset_enabled;
        self.sunset_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::test_constants::TEST_SUNSET_MINUTES;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn table() -> SunsetTable {
        let epoch = date(1);
        let (table, _) = SunsetTable::parse("day,minutes\n0,1080\n1,1081\n", epoch);
        table
    }

    fn scheduler() -> EventScheduler {
        EventScheduler::new(default_triggers(10, 60), table(), true, 23 * 3600 + 54 * 60)
    }

    #[test]
    fn test_repeated_ticks_in_window_fire_once() {
        let mut scheduler = scheduler();
        let mut fired = Vec::new();
        for now in (8 * 3600 - 10)..(8 * 3600 + 60) {
            fired.extend(scheduler.tick(now, None, date(1)).dispatched);
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger_id, "colors");
        assert_eq!(fired[0].action.as_str(), "0");
    }

    #[test]
    fn test_window_edges_are_half_open() {
        let triggers = vec![TriggerDefinition::fixed("t", 600, "1").with_window(10, 60)];
        let fresh = || DaySession::new(date(1), None, &triggers);

        let (_, d) = step(&triggers, fresh(), 36_000 - 11, true);
        assert!(d.is_empty());
        let (_, d) = step(&triggers, fresh(), 36_000 - 10, true);
        assert_eq!(d.len(), 1);
        let (_, d) = step(&triggers, fresh(), 36_000 + 59, true);
        assert_eq!(d.len(), 1);
        let (_, d) = step(&triggers, fresh(), 36_000 + 60, true);
        assert!(d.is_empty());
    }

    #[test]
    fn test_date_change_resets_and_relooks_up_sunset() {
        let mut scheduler = scheduler();
        let first = scheduler.tick(8 * 3600, None, date(1));
        assert!(first.new_day);
        assert_eq!(first.sunset_minutes, Some(1080));
        assert_eq!(scheduler.session().unwrap().state.fired_count(), 1);

        // Caller's stale value is ignored on the new date
        let second = scheduler.tick(60, Some(999), date(2));
        assert!(second.new_day);
        assert_eq!(second.sunset_minutes, Some(1081));
        let session = scheduler.session().unwrap();
        assert_eq!(session.state.fired_count(), 0);
        assert!(session.state.is_pending("colors"));
    }

    #[test]
    fn test_sunset_triggers_use_table_value() {
        let mut scheduler = scheduler();
        let open = (TEST_SUNSET_MINUTES - 5) * 60 - 10;
        assert!(scheduler.tick(open - 1, None, date(1)).dispatched.is_empty());
        let outcome = scheduler.tick(open, None, date(1));
        assert_eq!(outcome.dispatched.len(), 1);
        assert_eq!(outcome.dispatched[0].trigger_id, "first-call-sunset");
    }

    #[test]
    fn test_missing_sunset_skips_only_sunset_triggers() {
        let mut scheduler = scheduler();
        // Day 10 is outside the table
        let mut fired = Vec::new();
        for now in (0..86_400).step_by(5) {
            fired.extend(scheduler.tick(now, None, date(11)).dispatched);
        }
        let ids: Vec<_> = fired.iter().map(|d| d.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["first-call-morning", "colors", "taps"]);
    }

    #[test]
    fn test_disabled_sunset_triggers_stay_pending() {
        let mut scheduler = scheduler();
        scheduler.set_sunset_enabled(false);
        let outcome = scheduler.tick(1080 * 60, None, date(1));
        assert!(outcome.dispatched.is_empty());
        assert!(scheduler.session().unwrap().state.is_pending("retreat"));

        assert!(scheduler.toggle_sunset());
        // Both sunset windows are open at this point
        let outcome = scheduler.tick(1080 * 60 + 1, None, date(1));
        let ids: Vec<_> = outcome.dispatched.iter().map(|d| d.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["first-call-sunset", "retreat"]);
    }

    #[test]
    fn test_idle_after_all_fired_or_late_cutoff() {
        let triggers = vec![TriggerDefinition::fixed("only", 60, "0")];
        let mut scheduler = EventScheduler::new(triggers, table(), true, 86_000);
        assert!(!scheduler.tick(0, None, date(1)).idle);
        assert!(scheduler.tick(3600, None, date(1)).idle);

        let mut scheduler = self::scheduler();
        assert!(!scheduler.tick(23 * 3600 + 53 * 60, None, date(1)).idle);
        assert!(scheduler.tick(23 * 3600 + 54 * 60, None, date(1)).idle);
    }

    #[test]
    fn test_wake_bound_stops_at_next_window_or_midnight() {
        let triggers = vec![
            TriggerDefinition::fixed("late", 23 * 60 + 58, "1").with_window(0, 30),
        ];
        let mut scheduler = EventScheduler::new(triggers, table(), true, 23 * 3600 + 54 * 60);

        // Past the cutoff but the late trigger is still ahead
        let outcome = scheduler.tick(23 * 3600 + 54 * 60 + 30, None, date(1));
        assert!(outcome.idle);
        assert_eq!(outcome.wake_within, 210);

        let outcome = scheduler.tick(23 * 3600 + 58 * 60, None, date(1));
        assert_eq!(outcome.dispatched.len(), 1);
        assert_eq!(outcome.wake_within, 121);
    }

    #[test]
    fn test_earlier_date_keeps_session_and_dispatches_nothing() {
        let mut scheduler = scheduler();
        scheduler.tick(8 * 3600, None, date(2));
        let outcome = scheduler.tick(8 * 3600, None, date(1));
        assert!(outcome.dispatched.is_empty());
        assert!(!outcome.new_day);
        assert!(!outcome.idle);
        assert_eq!(scheduler.session().unwrap().date, date(2));
        assert_eq!(scheduler.session().unwrap().state.fired_count(), 1);
    }

    #[test]
    fn test_empty_trigger_set_is_never_idle_early() {
        let mut scheduler = EventScheduler::new(Vec::new(), table(), true, 86_000);
        let outcome = scheduler.tick(3600, None, date(1));
        assert!(outcome.dispatched.is_empty());
        assert!(!outcome.idle);
    }
}
