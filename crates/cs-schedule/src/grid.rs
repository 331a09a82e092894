//! Weekly grid view and coverage analysis

use crate::model::{DayOfWeek, ScheduleSlot, TimeOfDay, WeekSchedule, MINUTES_PER_DAY};
use cs_core::Mode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A day counts as fully covered when at most this many minutes are unscheduled
pub const FULL_DAY_TOLERANCE_MINUTES: u32 = 1;

/// A slot as shown in the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSlot {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub target_value: f64,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_override: Option<Value>,
}

impl From<&ScheduleSlot> for GridSlot {
    fn from(slot: &ScheduleSlot) -> Self {
        Self {
            start_time: slot.start_time,
            end_time: slot.end_time,
            target_value: slot.target_value,
            duration_minutes: slot.duration_minutes(),
            buffer_override: slot.buffer_override.clone(),
        }
    }
}

/// A half-open range of minutes within one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteRange {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl MinuteRange {
    pub fn minutes(&self) -> u32 {
        self.end_minute - self.start_minute
    }
}

/// Gaps and overlaps found in one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayCoverage {
    pub gaps: Vec<MinuteRange>,
    pub overlaps: Vec<MinuteRange>,
    pub covered_minutes: u32,
}

impl DayCoverage {
    pub fn gap_minutes(&self) -> u32 {
        self.gaps.iter().map(MinuteRange::minutes).sum()
    }

    pub fn is_full(&self) -> bool {
        self.covered_minutes + FULL_DAY_TOLERANCE_MINUTES >= MINUTES_PER_DAY
    }
}

/// One day of the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day: DayOfWeek,
    /// Slots sorted by start time
    pub slots: Vec<GridSlot>,
    pub coverage: DayCoverage,
}

/// Week-level coverage figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Covered minutes over the whole week, in percent
    pub total_coverage_percent: f64,
    /// Days with at least one slot
    pub days_with_schedules: usize,
    /// Days covered to within [`FULL_DAY_TOLERANCE_MINUTES`]
    pub fully_covered_days: usize,
}

/// A full week of one mode's schedule for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleGrid {
    pub entity_id: String,
    pub mode: Mode,
    /// Monday through Sunday
    pub days: Vec<DaySchedule>,
    pub summary: CoverageSummary,
}

impl ScheduleGrid {
    pub fn build(entity_id: impl Into<String>, mode: Mode, week: &WeekSchedule) -> Self {
        let days: Vec<DaySchedule> = DayOfWeek::ALL
            .into_iter()
            .map(|day| {
                let mut slots: Vec<GridSlot> = week.day(day).iter().map(GridSlot::from).collect();
                slots.sort_by_key(|s| s.start_time);
                let coverage = analyze_day(&slots);
                DaySchedule {
                    day,
                    slots,
                    coverage,
                }
            })
            .collect();

        let covered: u32 = days.iter().map(|d| d.coverage.covered_minutes).sum();
        let summary = CoverageSummary {
            total_coverage_percent: f64::from(covered) * 100.0 / f64::from(7 * MINUTES_PER_DAY),
            days_with_schedules: days.iter().filter(|d| !d.slots.is_empty()).count(),
            fully_covered_days: days.iter().filter(|d| d.coverage.is_full()).count(),
        };

        Self {
            entity_id: entity_id.into(),
            mode,
            days,
            summary,
        }
    }

    pub fn day(&self, day: DayOfWeek) -> Option<&DaySchedule> {
        self.days.iter().find(|d| d.day == day)
    }
}

/// Scan slots sorted by start with a running covered-until cursor
///
/// A slot running past midnight covers its day up to the end of the day.
pub fn analyze_day(sorted: &[GridSlot]) -> DayCoverage {
    let mut coverage = DayCoverage::default();
    let mut cursor = 0;

    for slot in sorted {
        let start = slot.start_time.minutes();
        let end = if slot.end_time <= slot.start_time {
            MINUTES_PER_DAY
        } else {
            slot.end_time.minutes()
        };

        if start > cursor {
            coverage.gaps.push(MinuteRange {
                start_minute: cursor,
                end_minute: start,
            });
        } else if start < cursor {
            coverage.overlaps.push(MinuteRange {
                start_minute: start,
                end_minute: cursor.min(end),
            });
        }
        cursor = cursor.max(end);
    }

    if cursor < MINUTES_PER_DAY {
        coverage.gaps.push(MinuteRange {
            start_minute: cursor,
            end_minute: MINUTES_PER_DAY,
        });
    }

    coverage.covered_minutes = MINUTES_PER_DAY - coverage.gap_minutes();
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(start: &str, end: &str) -> GridSlot {
        GridSlot::from(&ScheduleSlot::new(start, end, 20.0).unwrap())
    }

    #[test]
    fn test_empty_day() {
        let coverage = analyze_day(&[]);
        assert_eq!(
            coverage.gaps,
            vec![MinuteRange {
                start_minute: 0,
                end_minute: 1440
            }]
        );
        assert!(coverage.overlaps.is_empty());
        assert_eq!(coverage.covered_minutes, 0);
        assert!(!coverage.is_full());
    }

    #[test]
    fn test_gaps_and_overlaps() {
        let coverage = analyze_day(&[slot("06:00", "09:00"), slot("08:00", "12:00"), slot("13:00", "14:00")]);
        assert_eq!(
            coverage.gaps,
            vec![
                MinuteRange { start_minute: 0, end_minute: 360 },
                MinuteRange { start_minute: 720, end_minute: 780 },
                MinuteRange { start_minute: 840, end_minute: 1440 },
            ]
        );
        assert_eq!(coverage.overlaps, vec![MinuteRange { start_minute: 480, end_minute: 540 }]);
        assert_eq!(coverage.covered_minutes, 420);
    }

    #[test]
    fn test_contained_slot_overlap_is_its_length() {
        let coverage = analyze_day(&[slot("06:00", "12:00"), slot("07:00", "08:00")]);
        assert_eq!(coverage.overlaps, vec![MinuteRange { start_minute: 420, end_minute: 480 }]);
    }

    #[test]
    fn test_wrapping_slot_covers_to_end_of_day() {
        let coverage = analyze_day(&[slot("00:00", "06:00"), slot("06:00", "22:00"), slot("22:00", "06:00")]);
        assert!(coverage.gaps.is_empty());
        assert_eq!(coverage.covered_minutes, 1440);
        assert!(coverage.is_full());
    }

    #[test]
    fn test_nearly_full_day() {
        let coverage = analyze_day(&[slot("00:00", "23:59")]);
        assert_eq!(coverage.gap_minutes(), 1);
        assert!(coverage.is_full());

        let coverage = analyze_day(&[slot("00:00", "23:58")]);
        assert!(!coverage.is_full());
    }

    #[test]
    fn test_grid_sorts_and_summarizes() {
        let mut week = WeekSchedule::default();
        week.day_mut(DayOfWeek::Monday).extend([
            ScheduleSlot::new("18:00", "06:00", 17.0).unwrap(),
            ScheduleSlot::new("06:00", "18:00", 21.0).unwrap(),
            ScheduleSlot::new("00:00", "06:00", 17.0).unwrap(),
        ]);
        week.day_mut(DayOfWeek::Tuesday)
            .push(ScheduleSlot::new("06:00", "18:00", 21.0).unwrap());

        let grid = ScheduleGrid::build("climate.office", Mode::Home, &week);
        assert_eq!(grid.days.len(), 7);

        let monday = grid.day(DayOfWeek::Monday).unwrap();
        assert_eq!(monday.slots[0].start_time.to_string(), "00:00");
        assert_eq!(monday.slots[1].duration_minutes, 720);
        assert!(monday.coverage.is_full());

        assert_eq!(grid.summary.days_with_schedules, 2);
        assert_eq!(grid.summary.fully_covered_days, 1);
        let expected = (1440.0 + 720.0) * 100.0 / (7.0 * 1440.0);
        assert!((grid.summary.total_coverage_percent - expected).abs() < 1e-9);
    }
}
