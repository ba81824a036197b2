//! Property tests for the slot generator.
//!
//! The tiling invariants hold for arbitrary working windows and breaks:
//! every emitted slot lies inside the window, has the exact requested
//! duration, never straddles a break, and the output is sorted.

use chrono::NaiveDate;
use proptest::prelude::*;
use slotlens_core::domain::dates::{PRACTICE_TZ, local_date};
use slotlens_core::types::{
    BaseSchedule, BaseScheduleId, BreakTime, DateRange, LocationId, PracticeId, PractitionerId,
    RuleSetId, TimeOfDay,
};
use slotlens_core::generate_slots;

fn minutes(m: u16) -> TimeOfDay {
    TimeOfDay::from_minutes(m).unwrap()
}

prop_compose! {
    fn arbitrary_window()(start in 0u16..1380, len in 30u16..480) -> (u16, u16) {
        let end = (start + len).min(1439);
        (start, end)
    }
}

fn schedule_for(window: (u16, u16), breaks: Vec<BreakTime>) -> BaseSchedule {
    BaseSchedule {
        id: BaseScheduleId::new(),
        practice_id: PracticeId::from("practice"),
        rule_set_id: RuleSetId::from("rs"),
        parent_id: None,
        practitioner_id: PractitionerId::from("p1"),
        location_id: LocationId::from("main"),
        // 2026-01-05 is a Monday.
        day_of_week: 1,
        start_time: minutes(window.0),
        end_time: minutes(window.1),
        break_times: breaks,
    }
}

fn local_minutes(instant: chrono::DateTime<chrono::Utc>) -> u16 {
    use chrono::Timelike;
    let local = instant.with_timezone(&PRACTICE_TZ);
    (local.hour() * 60 + local.minute()) as u16
}

proptest! {
    #[test]
    fn slots_respect_window_breaks_and_duration(
        window in arbitrary_window(),
        duration in prop_oneof![Just(10u32), Just(15), Just(20), Just(30), Just(45), Just(60)],
        break_count in 0usize..3,
    ) {
        let breaks: Vec<BreakTime> = (0..break_count)
            .map(|i| {
                let start = window.0 + (i as u16 + 1) * 37 % (window.1 - window.0).max(1);
                let end = (start + 20).min(window.1);
                BreakTime { start: minutes(start.min(end)), end: minutes(end) }
            })
            .collect();
        let schedule = schedule_for(window, breaks.clone());
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let range = DateRange::new(day, day);

        let slots = generate_slots(&range, &[schedule], duration);

        for pair in slots.windows(2) {
            prop_assert!(pair[0].start <= pair[1].start, "slots must be sorted");
        }
        for slot in &slots {
            prop_assert_eq!(local_date(slot.start), day);
            let start = local_minutes(slot.start);
            let end = local_minutes(slot.end);
            prop_assert_eq!(u32::from(end - start), duration);
            prop_assert!(start >= window.0 && end <= window.1, "slot outside window");
            for break_time in &breaks {
                let overlap = start < break_time.end.minutes() && end > break_time.start.minutes();
                prop_assert!(!overlap, "slot {}..{} straddles break", start, end);
            }
        }
    }
}
