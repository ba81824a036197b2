//! End-to-end scenarios against a clean practice, exercising the public
//! store API the way a booking transport would.

use anyhow::Result;
use chrono::NaiveDate;
use slotlens_core::domain::validation::ConditionTreeInput;
use slotlens_core::types::{
    AppointmentId, AppointmentStatus, BookingContext, DateRange, PatientContext, SlotStatus,
};
use slotlens_store::{
    AppointmentTypeUpdates, BaseScheduleInput, ConfigStore, SlotQuery,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn condition(condition_type: &str, operator: &str, value_ids: &[&str]) -> ConditionTreeInput {
    ConditionTreeInput {
        node_type: Some("CONDITION".to_string()),
        condition_type: Some(condition_type.to_string()),
        operator: Some(operator.to_string()),
        value_ids: Some(value_ids.iter().map(|v| v.to_string()).collect()),
        ..ConditionTreeInput::default()
    }
}

fn and(children: Vec<ConditionTreeInput>) -> ConditionTreeInput {
    ConditionTreeInput {
        node_type: Some("AND".to_string()),
        children: Some(children),
        ..ConditionTreeInput::default()
    }
}

#[test]
fn initial_practice_has_one_saved_active_version() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;

    let sets = store.list_all_rule_sets(&practice.id)?;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].version, 1);
    assert!(sets[0].saved);
    assert_eq!(sets[0].parent_version, None);

    let active = store.get_active_rule_set(&practice.id)?;
    assert_eq!(active.id, sets[0].id);
    assert!(store.get_draft(&practice.id)?.is_none());
    assert!(store.list_practitioners(&active.id)?.is_empty());
    assert!(store.list_locations(&active.id)?.is_empty());
    assert!(store.list_appointment_types(&active.id)?.is_empty());
    assert!(store.list_base_schedules(&active.id)?.is_empty());
    Ok(())
}

#[test]
fn first_edit_forks_an_unsaved_draft() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;
    let v1 = store.get_active_rule_set(&practice.id)?;

    let created = store.create_location(&practice.id, &v1.id, "Main")?;

    let draft = store.get_draft(&practice.id)?.expect("a draft must exist");
    assert_eq!(draft.id, created.rule_set_id);
    assert_eq!(draft.version, 2);
    assert!(!draft.saved);
    assert_eq!(draft.parent_version, Some(v1.id.clone()));

    let locations = store.list_locations(&draft.id)?;
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].name, "Main");

    // v1 stays empty and saved.
    assert!(store.list_locations(&v1.id)?.is_empty());
    assert!(store.get_active_rule_set(&practice.id)?.saved);
    assert_eq!(store.get_active_rule_set(&practice.id)?.id, v1.id);
    Ok(())
}

#[test]
fn editing_a_saved_set_remaps_references_into_the_draft() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;
    let v1 = store.get_active_rule_set(&practice.id)?;

    let dr_a = store.create_practitioner(&practice.id, &v1.id, "Dr A", vec![])?;
    let check = store.create_appointment_type(
        &practice.id,
        &dr_a.rule_set_id,
        "Check",
        30,
        &[dr_a.entity_id.clone()],
    )?;
    let saved = store.save_draft(&practice.id, "baseline", true)?;

    let updated = store.update_appointment_type(
        &practice.id,
        &saved,
        &check.entity_id,
        AppointmentTypeUpdates {
            name: Some("Check2".to_string()),
            ..AppointmentTypeUpdates::default()
        },
    )?;

    let draft = store.get_draft(&practice.id)?.expect("a draft must exist");
    assert_eq!(draft.id, updated.rule_set_id);

    let practitioners = store.list_practitioners(&draft.id)?;
    assert_eq!(practitioners.len(), 1);
    assert_eq!(practitioners[0].parent_id, Some(dr_a.entity_id.clone()));

    let types = store.list_appointment_types(&draft.id)?;
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].parent_id, Some(check.entity_id.clone()));
    assert_eq!(types[0].name, "Check2");
    let allowed: Vec<_> = types[0].allowed_practitioner_ids.iter().cloned().collect();
    assert_eq!(allowed, vec![practitioners[0].id.clone()]);

    // The original saved set is unchanged.
    let original_types = store.list_appointment_types(&saved)?;
    assert_eq!(original_types.len(), 1);
    assert_eq!(original_types[0].name, "Check");
    assert_eq!(
        original_types[0].allowed_practitioner_ids.iter().next(),
        Some(&dr_a.entity_id)
    );
    Ok(())
}

#[test]
fn weekend_rule_blocks_weekend_slots_with_provenance() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;
    let v1 = store.get_active_rule_set(&practice.id)?;

    let practitioner = store.create_practitioner(&practice.id, &v1.id, "Dr A", vec![])?;
    let location = store.create_location(&practice.id, &v1.id, "Main")?;
    for day in 0..7 {
        store.create_base_schedule(
            &practice.id,
            &v1.id,
            BaseScheduleInput {
                practitioner_id: practitioner.entity_id.clone(),
                location_id: location.entity_id.clone(),
                day_of_week: day,
                start_time: "08:00".parse().unwrap(),
                end_time: "18:00".parse().unwrap(),
                break_times: vec![],
            },
        )?;
    }
    let appointment_type = store.create_appointment_type(
        &practice.id,
        &v1.id,
        "Checkup",
        30,
        &[practitioner.entity_id.clone()],
    )?;
    let weekend_rule = store.create_rule(
        &practice.id,
        &v1.id,
        &and(vec![condition("DAY_OF_WEEK", "IS", &["0", "6"])]),
        true,
    )?;
    store.save_draft(&practice.id, "weekend block", true)?;

    let query = SlotQuery {
        practice_id: practice.id.clone(),
        rule_set_id: None,
        context: BookingContext {
            patient: PatientContext { is_new: false },
            appointment_type_id: appointment_type.entity_id.clone(),
            location_id: None,
            is_simulation: false,
        },
        today: Some(date(2026, 1, 5)),
    };
    // Monday through Sunday.
    let range = DateRange::new(date(2026, 1, 5), date(2026, 1, 11));
    let result = store.list_available_slots(&query, &range)?;

    // 7 days x 20 half-hour slots between 08:00 and 18:00.
    assert_eq!(result.slots.len(), 140);
    for slot in &result.slots {
        let weekday = slotlens_core::domain::dates::local_weekday(slot.start);
        if weekday == 0 || weekday == 6 {
            assert_eq!(slot.status, SlotStatus::Blocked);
            assert_eq!(slot.blocked_by_rule_id, Some(weekend_rule.entity_id.clone()));
        } else {
            assert_eq!(slot.status, SlotStatus::Available);
            assert_eq!(slot.blocked_by_rule_id, None);
        }
    }

    let available_dates = store.list_available_dates(&query, &range)?;
    assert_eq!(
        available_dates,
        vec![
            date(2026, 1, 5),
            date(2026, 1, 6),
            date(2026, 1, 7),
            date(2026, 1, 8),
            date(2026, 1, 9)
        ]
    );
    Ok(())
}

#[test]
fn daily_capacity_rule_blocks_a_full_day() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;
    let v1 = store.get_active_rule_set(&practice.id)?;

    let practitioner = store.create_practitioner(&practice.id, &v1.id, "A", vec![])?;
    let location = store.create_location(&practice.id, &v1.id, "Main")?;
    // 2026-01-05 is a Monday.
    store.create_base_schedule(
        &practice.id,
        &v1.id,
        BaseScheduleInput {
            practitioner_id: practitioner.entity_id.clone(),
            location_id: location.entity_id.clone(),
            day_of_week: 1,
            start_time: "08:00".parse().unwrap(),
            end_time: "12:00".parse().unwrap(),
            break_times: vec![],
        },
    )?;
    let appointment_type = store.create_appointment_type(
        &practice.id,
        &v1.id,
        "Long consult",
        60,
        &[practitioner.entity_id.clone()],
    )?;

    let mut capacity = condition("DAILY_CAPACITY", "GREATER_THAN_OR_EQUAL", &[]);
    capacity.value_ids = None;
    capacity.value_number = Some(2);
    capacity.scope = Some("per-practitioner".to_string());
    store.create_rule(&practice.id, &v1.id, &capacity, true)?;
    store.save_draft(&practice.id, "capacity", true)?;

    // Two existing appointments for A on the Monday. Practitioner ids in
    // appointments refer to the active configuration's practitioner row.
    let active = store.get_active_rule_set(&practice.id)?;
    let active_practitioner = &store.list_practitioners(&active.id)?[0];
    for (start, end) in [("13:00", "13:45"), ("15:00", "15:45")] {
        let start_time: slotlens_core::types::TimeOfDay = start.parse().unwrap();
        let end_time: slotlens_core::types::TimeOfDay = end.parse().unwrap();
        store.put_appointment(slotlens_core::types::Appointment {
            id: AppointmentId::new(),
            practice_id: practice.id.clone(),
            practitioner_id: active_practitioner.id.clone(),
            location_id: None,
            appointment_type_id: None,
            start: slotlens_core::domain::dates::local_instant(date(2026, 1, 5), start_time),
            end: slotlens_core::domain::dates::local_instant(date(2026, 1, 5), end_time),
            status: AppointmentStatus::Scheduled,
            is_simulation: false,
        })?;
    }

    let query = SlotQuery {
        practice_id: practice.id.clone(),
        rule_set_id: None,
        context: BookingContext {
            patient: PatientContext { is_new: false },
            appointment_type_id: appointment_type.entity_id.clone(),
            location_id: None,
            is_simulation: false,
        },
        today: Some(date(2026, 1, 5)),
    };
    let result = store.list_slots_for_day(&query, date(2026, 1, 5))?;
    assert_eq!(result.slots.len(), 4);
    assert!(result.slots.iter().all(|s| s.status == SlotStatus::Blocked));
    assert_eq!(result.log.len(), 4);
    assert!(result.log[0].contains("cond=DAILY_CAPACITY"));
    Ok(())
}

#[test]
fn saving_a_draft_makes_the_next_edit_fork_again() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;
    let v1 = store.get_active_rule_set(&practice.id)?;

    let dr_a = store.create_practitioner(&practice.id, &v1.id, "Dr A", vec![])?;
    let check = store.create_appointment_type(
        &practice.id,
        &v1.id,
        "Check",
        30,
        &[dr_a.entity_id.clone()],
    )?;
    let v2 = store.save_draft(&practice.id, "baseline", true)?;

    // Edit after the save: fork v3 from v2.
    let renamed = store.update_appointment_type(
        &practice.id,
        &v2,
        &check.entity_id,
        AppointmentTypeUpdates {
            name: Some("Check2".to_string()),
            ..AppointmentTypeUpdates::default()
        },
    )?;
    let v2_set = store.list_all_rule_sets(&practice.id)?;
    assert_eq!(v2_set.len(), 3);

    let saved_v2 = store.save_draft(&practice.id, "rename", false)?;
    assert_eq!(saved_v2, renamed.rule_set_id);
    let saved = store
        .list_all_rule_sets(&practice.id)?
        .into_iter()
        .find(|rs| rs.id == saved_v2)
        .unwrap();
    assert_eq!(saved.version, 3);
    assert!(saved.saved);

    // The next edit forks a fresh draft whose parent is the newly saved set.
    let widened = store.update_appointment_type(
        &practice.id,
        &saved_v2,
        &renamed.entity_id,
        AppointmentTypeUpdates {
            duration_minutes: Some(45),
            ..AppointmentTypeUpdates::default()
        },
    )?;
    assert_ne!(widened.rule_set_id, saved_v2);
    let draft = store.get_draft(&practice.id)?.expect("a draft must exist");
    assert_eq!(draft.id, widened.rule_set_id);
    assert_eq!(draft.version, 4);
    assert_eq!(draft.parent_version, Some(saved_v2.clone()));

    // The saved set keeps its values.
    let saved_types = store.list_appointment_types(&saved_v2)?;
    assert_eq!(saved_types[0].duration_minutes, 30);
    assert_eq!(saved_types[0].name, "Check2");
    let draft_types = store.list_appointment_types(&draft.id)?;
    assert_eq!(draft_types[0].duration_minutes, 45);
    Ok(())
}

#[test]
fn version_history_reflects_the_dag() -> Result<()> {
    let store = ConfigStore::new();
    let practice = store.create_practice("P")?;
    let v1 = store.get_active_rule_set(&practice.id)?;
    store.create_location(&practice.id, &v1.id, "Main")?;
    let v2 = store.save_draft(&practice.id, "main location", true)?;
    store.create_location(&practice.id, &v2, "Annex")?;
    store.discard_draft(&practice.id)?;

    let history = store.version_history(&practice.id)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].parents, Vec::<slotlens_core::types::RuleSetId>::new());
    assert_eq!(history[1].parents, vec![v1.id.clone()]);
    assert!(history[1].is_active);
    Ok(())
}
