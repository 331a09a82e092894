//! Schedule data model

use crate::error::{ScheduleError, ScheduleResult};
use chrono::{Timelike, Weekday};
use cs_core::{EntityId, Mode};
use cs_storage::Storable;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Minutes in a day
pub const MINUTES_PER_DAY: u32 = 1440;

/// A minute of the day, written `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    pub fn new(hour: u32, minute: u32) -> ScheduleResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTime {
                value: format!("{}:{}", hour, minute),
            });
        }
        Ok(Self((hour * 60 + minute) as u16))
    }

    /// The minute containing `time`; seconds are dropped
    pub fn of<T: Timelike>(time: &T) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn minutes(&self) -> u32 {
        u32::from(self.0)
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    /// Accepts `HH:MM` and `HH:MM:SS` (seconds ignored)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTime {
            value: s.to_string(),
        };
        let mut parts = s.trim().split(':');
        let hour = parts.next().ok_or_else(invalid)?;
        let minute = parts.next().ok_or_else(invalid)?;
        let seconds = parts.next();
        if parts.next().is_some() || hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        if let Some(sec) = seconds {
            if sec.len() != 2 || !sec.parse::<u32>().is_ok_and(|s| s < 60) {
                return Err(invalid());
            }
        }

        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ScheduleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Day of the week, Monday first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        Self::ALL[day.num_days_from_monday() as usize]
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == lowered || d.as_str()[..3] == lowered)
            .ok_or_else(|| ScheduleError::InvalidDay {
                value: s.to_string(),
            })
    }
}

/// One time range of a day with its target setpoint
///
/// When `end_time` is not after `start_time` the slot runs past midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub target_value: f64,
    /// Inline buffer override, validated when a decision uses it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_override: Option<Value>,
}

impl ScheduleSlot {
    pub fn new(start_time: &str, end_time: &str, target_value: f64) -> ScheduleResult<Self> {
        let slot = Self {
            start_time: start_time.parse()?,
            end_time: end_time.parse()?,
            target_value,
            buffer_override: None,
        };
        slot.validate()?;
        Ok(slot)
    }

    pub fn with_buffer_override(mut self, buffer_override: Value) -> Self {
        self.buffer_override = Some(buffer_override);
        self
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if !self.target_value.is_finite() {
            return Err(ScheduleError::InvalidSlot {
                reason: format!("target value {} is not a finite number", self.target_value),
            });
        }
        Ok(())
    }

    /// Whether the slot runs past midnight
    pub fn wraps(&self) -> bool {
        self.start_time > self.end_time
    }

    /// Whether the slot covers `minute`, both ends inclusive
    pub fn contains(&self, minute: TimeOfDay) -> bool {
        if self.wraps() {
            minute >= self.start_time || minute <= self.end_time
        } else {
            self.start_time <= minute && minute <= self.end_time
        }
    }

    /// Length in minutes; an end at or before the start wraps to the next day
    pub fn duration_minutes(&self) -> u32 {
        let start = self.start_time.minutes();
        let end = self.end_time.minutes();
        if end <= start {
            end + MINUTES_PER_DAY - start
        } else {
            end - start
        }
    }

    /// `HH:MM-HH:MM`
    pub fn time_range(&self) -> String {
        format!("{}-{}", self.start_time, self.end_time)
    }
}

/// Slots per day for one mode, each day in stored order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekSchedule(BTreeMap<DayOfWeek, Vec<ScheduleSlot>>);

impl WeekSchedule {
    pub fn day(&self, day: DayOfWeek) -> &[ScheduleSlot] {
        self.0.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn day_mut(&mut self, day: DayOfWeek) -> &mut Vec<ScheduleSlot> {
        self.0.entry(day).or_default()
    }

    pub fn slot_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

/// Every schedule plus the entities it drives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredSchedule")]
pub struct ScheduleDocument {
    pub home_schedule: WeekSchedule,
    pub away_schedule: WeekSchedule,
    pub entities: BTreeSet<EntityId>,
}

impl Storable for ScheduleDocument {
    const KEY: &'static str = "climate_scheduler.schedule";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

impl ScheduleDocument {
    pub fn schedule(&self, mode: Mode) -> &WeekSchedule {
        match mode {
            Mode::Home => &self.home_schedule,
            Mode::Away => &self.away_schedule,
        }
    }

    pub fn schedule_mut(&mut self, mode: Mode) -> &mut WeekSchedule {
        match mode {
            Mode::Home => &mut self.home_schedule,
            Mode::Away => &mut self.away_schedule,
        }
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.entities.iter().any(|e| e.to_string() == entity_id)
    }

    /// First slot of `day` covering `minute`, in stored order
    pub fn slot_at(&self, mode: Mode, day: DayOfWeek, minute: TimeOfDay) -> Option<&ScheduleSlot> {
        self.schedule(mode)
            .day(day)
            .iter()
            .find(|slot| slot.contains(minute))
    }
}

/// Stored shape, read leniently: anything unreadable is dropped with a warning
#[derive(Deserialize)]
struct StoredSchedule {
    #[serde(default)]
    home_schedule: Option<Value>,
    #[serde(default)]
    away_schedule: Option<Value>,
    #[serde(default)]
    entities: Vec<Value>,
}

impl From<StoredSchedule> for ScheduleDocument {
    fn from(stored: StoredSchedule) -> Self {
        let entities = stored
            .entities
            .into_iter()
            .filter_map(|raw| match raw.as_str().map(str::parse::<EntityId>) {
                Some(Ok(id)) => Some(id),
                _ => {
                    warn!(entity_id = %raw, "Dropping invalid tracked entity");
                    None
                }
            })
            .collect();

        Self {
            home_schedule: read_week(Mode::Home, stored.home_schedule),
            away_schedule: read_week(Mode::Away, stored.away_schedule),
            entities,
        }
    }
}

fn read_week(mode: Mode, raw: Option<Value>) -> WeekSchedule {
    let days: Map<String, Value> = match raw {
        None | Some(Value::Null) => return WeekSchedule::default(),
        Some(Value::Object(days)) => days,
        Some(other) => {
            warn!(%mode, value = %other, "Schedule is not a mapping of days, ignoring");
            return WeekSchedule::default();
        }
    };

    let mut week = WeekSchedule::default();
    for (day_name, slots) in days {
        let Ok(day) = day_name.parse::<DayOfWeek>() else {
            warn!(%mode, day = %day_name, "Dropping unknown schedule day");
            continue;
        };
        let Value::Array(slots) = slots else {
            warn!(%mode, %day, "Schedule day is not a list, ignoring");
            continue;
        };

        let parsed = week.day_mut(day);
        for raw in slots {
            match serde_json::from_value::<ScheduleSlot>(raw.clone()) {
                Ok(slot) if slot.validate().is_ok() => parsed.push(slot),
                Ok(_) | Err(_) => warn!(%mode, %day, slot = %raw, "Dropping invalid schedule slot"),
            }
        }
    }
    week
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_time_of_day_parsing() {
        assert_eq!(t("07:30").minutes(), 450);
        assert_eq!(t("7:05").minutes(), 425);
        assert_eq!(t("23:59:30").minutes(), 1439);
        assert_eq!(t("00:00"), TimeOfDay::MIDNIGHT);
        for bad in ["24:00", "12:60", "12", "12:5", "ab:cd", "", "12:00:00:00", "12:00:61"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad} should be rejected");
        }
        assert_eq!(t("06:05").to_string(), "06:05");
    }

    #[test]
    fn test_minute_truncation() {
        let time = NaiveTime::from_hms_opt(23, 45, 59).unwrap();
        assert_eq!(TimeOfDay::of(&time), t("23:45"));
    }

    #[test]
    fn test_day_of_week() {
        assert_eq!(DayOfWeek::from(Weekday::Sun), DayOfWeek::Sunday);
        assert_eq!("Mon".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!("friday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Friday);
        assert!("funday".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn test_wrapping_slot() {
        let slot = ScheduleSlot::new("23:00", "01:00", 18.0).unwrap();
        assert!(slot.wraps());
        assert!(slot.contains(t("23:45")));
        assert!(slot.contains(t("00:15")));
        assert!(slot.contains(t("00:30")));
        assert!(slot.contains(t("01:00")));
        assert!(!slot.contains(t("12:00")));
        assert_eq!(slot.duration_minutes(), 120);
    }

    #[test]
    fn test_plain_slot_is_closed() {
        let slot = ScheduleSlot::new("06:00", "09:00", 21.0).unwrap();
        assert!(slot.contains(t("06:00")));
        assert!(slot.contains(t("09:00")));
        assert!(!slot.contains(t("09:01")));
        assert_eq!(slot.duration_minutes(), 180);
        assert_eq!(slot.time_range(), "06:00-09:00");
    }

    #[test]
    fn test_equal_start_and_end_is_a_full_day() {
        let slot = ScheduleSlot::new("08:00", "08:00", 20.0).unwrap();
        assert_eq!(slot.duration_minutes(), 1440);
    }

    #[test]
    fn test_lenient_document() {
        let doc: ScheduleDocument = serde_json::from_value(json!({
            "home_schedule": {
                "monday": [
                    {"start_time": "06:00", "end_time": "09:00", "target_value": 21.0},
                    {"start_time": "25:00", "end_time": "26:00", "target_value": 21.0},
                    {"start_time": "10:00", "end_time": "12:00"}
                ],
                "someday": [],
                "tuesday": "not a list"
            },
            "away_schedule": [1, 2, 3],
            "entities": ["climate.office", "broken", 7]
        }))
        .unwrap();

        assert_eq!(doc.home_schedule.day(DayOfWeek::Monday).len(), 1);
        assert!(doc.home_schedule.day(DayOfWeek::Tuesday).is_empty());
        assert_eq!(doc.away_schedule.slot_count(), 0);
        assert_eq!(doc.entities.len(), 1);
        assert!(doc.is_tracked("climate.office"));
    }

    #[test]
    fn test_missing_modes_default_to_empty() {
        let doc: ScheduleDocument = serde_json::from_value(json!({})).unwrap();
        assert_eq!(doc, ScheduleDocument::default());
    }

    #[test]
    fn test_slot_serialization_shape() {
        let slot = ScheduleSlot::new("22:00", "06:30", 17.5)
            .unwrap()
            .with_buffer_override(json!({"time_minutes": 30, "value_delta": 1.0}));
        let value = serde_json::to_value(&slot).unwrap();
        assert_eq!(value["start_time"], "22:00");
        assert_eq!(value["end_time"], "06:30");
        assert_eq!(value["buffer_override"]["time_minutes"], 30);
    }
}
