//! Workforce schedule and clock-event domain model (spec §3, §4.9).
//!
//! `ScheduleType` is modeled as a tagged union carrying its own payload
//! per spec §9's redesign note, rather than a flat struct with optional
//! fields for every variant.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Self::Mon,
            chrono::Weekday::Tue => Self::Tue,
            chrono::Weekday::Wed => Self::Wed,
            chrono::Weekday::Thu => Self::Thu,
            chrono::Weekday::Fri => Self::Fri,
            chrono::Weekday::Sat => Self::Sat,
            chrono::Weekday::Sun => Self::Sun,
        }
    }

    pub fn from_index(idx: u8) -> Option<Self> {
        match idx {
            0 => Some(Self::Mon),
            1 => Some(Self::Tue),
            2 => Some(Self::Wed),
            3 => Some(Self::Thu),
            4 => Some(Self::Fri),
            5 => Some(Self::Sat),
            6 => Some(Self::Sun),
            _ => None,
        }
    }
}

/// A single day's working window, e.g. 09:00-17:00.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    /// Whether `start > end`, i.e. the window wraps past midnight
    /// (spec §4.9: "shift pattern supports overnight shifts").
    pub fn is_overnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `local_time` falls within `[start - grace, end + grace]`,
    /// with overnight wraparound treated as `[start,24:00) ∪ [00:00,end)`.
    pub fn contains(&self, local_time: NaiveTime, grace_minutes: i64) -> bool {
        let grace = chrono::Duration::minutes(grace_minutes);
        if !self.is_overnight() {
            let start = (self.start - grace).max(NaiveTime::MIN);
            let end = add_time(self.end, grace);
            start <= local_time && local_time <= end
        } else {
            // window is [start,24:00) U [00:00,end]; grace applied at both true edges.
            let start = (self.start - grace).max(NaiveTime::MIN);
            let end = add_time(self.end, grace);
            local_time >= start || local_time <= end
        }
    }
}

fn add_time(t: NaiveTime, d: chrono::Duration) -> NaiveTime {
    // Saturating add within a single day; callers only ever add small grace windows.
    let secs = t.num_seconds_from_midnight() as i64 + d.num_seconds();
    let secs = secs.clamp(0, 24 * 3600 - 1);
    NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0).unwrap_or(t)
}

use chrono::Timelike;

/// Weekly pattern: a `DayWindow` for each day that is a working day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyPattern {
    pub days: Vec<(DayOfWeek, DayWindow)>,
}

impl WeeklyPattern {
    pub fn window_for(&self, day: DayOfWeek) -> Option<&DayWindow> {
        self.days.iter().find(|(d, _)| *d == day).map(|(_, w)| w)
    }
}

/// A shift pattern: a rotating or fixed single window applied every day
/// it's scheduled, distinct from the weekly pattern in that it supports
/// a single overnight window shared across the configured days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftPattern {
    pub days: Vec<DayOfWeek>,
    pub window: DayWindow,
}

/// An override for one specific calendar date, taking priority over the
/// weekly/shift pattern (spec §4.9 rule order: "(a) custom-date rule wins").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomDayRule {
    pub date: chrono::NaiveDate,
    /// `None` means "agent is off this day regardless of the base pattern".
    pub window: Option<DayWindow>,
}

/// Tagged union of the three schedule shapes a `WorkSchedule` can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    Standard { pattern: WeeklyPattern },
    Shift { pattern: ShiftPattern },
    Custom { pattern: WeeklyPattern, overrides: Vec<CustomDayRule> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffHoursAction {
    Pause,
    Stop,
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub id: String,
    pub agent_id: String,
    pub org_id: String,
    pub timezone: String, // IANA name
    pub kind: ScheduleKind,
    pub enforce_clock_in: bool,
    pub enforce_clock_out: bool,
    pub auto_wake_enabled: bool,
    pub off_hours_action: OffHoursAction,
    pub grace_period_minutes: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSchedule {
    /// Resolve the applicable `DayWindow`, if any, for `local_date`, honoring
    /// the rule order from spec §4.9: custom-date override beats the base
    /// weekly/shift pattern.
    pub fn window_for_date(&self, local_date: chrono::NaiveDate) -> Option<DayWindow> {
        match &self.kind {
            ScheduleKind::Custom { pattern, overrides } => {
                if let Some(rule) = overrides.iter().find(|r| r.date == local_date) {
                    return rule.window.clone();
                }
                pattern.window_for(DayOfWeek::from_chrono(local_date.weekday())).cloned()
            }
            ScheduleKind::Standard { pattern } => {
                pattern.window_for(DayOfWeek::from_chrono(local_date.weekday())).cloned()
            }
            ScheduleKind::Shift { pattern } => {
                let day = DayOfWeek::from_chrono(local_date.weekday());
                if pattern.days.contains(&day) {
                    Some(pattern.window.clone())
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockEventType {
    ClockIn,
    ClockOut,
    AutoPause,
    AutoWake,
    OvertimeStart,
    OvertimeEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockRecord {
    pub id: String,
    pub agent_id: String,
    pub org_id: String,
    pub event_type: ClockEventType,
    pub triggered_by: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub actual_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    ClockedIn,
    ClockedOut,
    NoSchedule,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn window(s: &str, e: &str) -> DayWindow {
        DayWindow {
            start: NaiveTime::parse_from_str(s, "%H:%M").unwrap(),
            end: NaiveTime::parse_from_str(e, "%H:%M").unwrap(),
        }
    }

    #[test]
    fn normal_window_contains_midday() {
        let w = window("09:00", "17:00");
        assert!(w.contains(NaiveTime::parse_from_str("12:00", "%H:%M").unwrap(), 0));
        assert!(!w.contains(NaiveTime::parse_from_str("18:00", "%H:%M").unwrap(), 0));
    }

    #[test]
    fn grace_period_extends_boundary() {
        let w = window("09:00", "17:00");
        assert!(!w.contains(NaiveTime::parse_from_str("17:05", "%H:%M").unwrap(), 0));
        assert!(w.contains(NaiveTime::parse_from_str("17:05", "%H:%M").unwrap(), 10));
    }

    #[test]
    fn overnight_shift_wraps_midnight() {
        let w = window("22:00", "06:00");
        assert!(w.is_overnight());
        assert!(w.contains(NaiveTime::parse_from_str("23:30", "%H:%M").unwrap(), 0));
        assert!(w.contains(NaiveTime::parse_from_str("02:00", "%H:%M").unwrap(), 0));
        assert!(!w.contains(NaiveTime::parse_from_str("12:00", "%H:%M").unwrap(), 0));
    }

    #[test]
    fn custom_day_rule_wins_over_pattern() {
        let mut pattern = WeeklyPattern::default();
        pattern.days.push((DayOfWeek::Mon, window("09:00", "17:00")));
        let sched = WorkSchedule {
            id: "s1".into(),
            agent_id: "a1".into(),
            org_id: "o1".into(),
            timezone: "UTC".into(),
            kind: ScheduleKind::Custom {
                pattern,
                overrides: vec![CustomDayRule {
                    date: chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(), // a Monday
                    window: None,
                }],
            },
            enforce_clock_in: true,
            enforce_clock_out: true,
            auto_wake_enabled: true,
            off_hours_action: OffHoursAction::Pause,
            grace_period_minutes: 0,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(sched
            .window_for_date(chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap())
            .is_none());
    }
}
