//! Candidate slot generation from weekly base schedules.
//!
//! Expansion is pure and deterministic: for every date in the range, every
//! base schedule on that weekday contributes its working window minus
//! breaks as open intervals, each tiled with slots of the requested
//! appointment duration. Slots are emitted in ascending
//! `(start, practitioner_id)` order and that order is stable through
//! evaluation.

use crate::domain::dates::{local_instant, weekday_of};
use crate::types::{BaseSchedule, DateRange, Slot, SlotStatus, TimeOfDay};

/// Expands base schedules into the candidate slot grid for a date range.
///
/// `duration_minutes` comes from the requested appointment type. A zero
/// duration yields no slots.
pub fn generate_slots(
    range: &DateRange,
    schedules: &[BaseSchedule],
    duration_minutes: u32,
) -> Vec<Slot> {
    if duration_minutes == 0 {
        return Vec::new();
    }

    let mut slots = Vec::new();
    for date in range.iter_days() {
        let weekday = weekday_of(date);
        for schedule in schedules.iter().filter(|s| s.day_of_week == weekday) {
            for (open_start, open_end) in open_intervals(schedule) {
                tile_interval(
                    open_start,
                    open_end,
                    duration_minutes,
                    &mut |slot_start, slot_end| {
                        slots.push(Slot {
                            practitioner_id: schedule.practitioner_id.clone(),
                            location_id: schedule.location_id.clone(),
                            start: local_instant(date, slot_start),
                            end: local_instant(date, slot_end),
                            duration_minutes,
                            status: SlotStatus::Available,
                            blocked_by_rule_id: None,
                        });
                    },
                );
            }
        }
    }

    slots.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.practitioner_id.cmp(&b.practitioner_id))
    });
    slots
}

/// The working window minus breaks, as ordered open intervals.
///
/// Breaks are validated on write to lie inside the window and not overlap;
/// out-of-order input is still handled by sorting first.
fn open_intervals(schedule: &BaseSchedule) -> Vec<(TimeOfDay, TimeOfDay)> {
    let mut breaks: Vec<_> = schedule
        .break_times
        .iter()
        .filter(|b| b.start < b.end)
        .collect();
    breaks.sort_by_key(|b| b.start);

    let mut intervals = Vec::with_capacity(breaks.len() + 1);
    let mut cursor = schedule.start_time;
    for break_time in breaks {
        if break_time.start > cursor {
            intervals.push((cursor, break_time.start));
        }
        cursor = cursor.max(break_time.end);
    }
    if cursor < schedule.end_time {
        intervals.push((cursor, schedule.end_time));
    }
    intervals
}

/// Tiles one open interval with fixed-length slots anchored at its start,
/// stepping by the slot duration and discarding any trailing partial.
fn tile_interval(
    start: TimeOfDay,
    end: TimeOfDay,
    duration_minutes: u32,
    emit: &mut impl FnMut(TimeOfDay, TimeOfDay),
) {
    let mut slot_start = u32::from(start.minutes());
    let end = u32::from(end.minutes());
    while slot_start + duration_minutes <= end {
        let slot_end = slot_start + duration_minutes;
        if let (Some(s), Some(e)) = (
            TimeOfDay::from_minutes(slot_start as u16),
            TimeOfDay::from_minutes(slot_end as u16),
        ) {
            emit(s, e);
        }
        slot_start = slot_end;
    }
}
