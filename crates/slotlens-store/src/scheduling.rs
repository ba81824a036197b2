//! Evaluation entry points: the booking-query pipeline.
//!
//! A query resolves its rule set (the practice's active set when omitted),
//! loads that set's entities plus the practice's appointments under the
//! lock, then runs the pure generate-and-evaluate pipeline from
//! `slotlens-core` outside it. The date listing runs the same pipeline and
//! projects dates, so it can never be less accurate than the slot listing.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use slotlens_core::domain::dates;
use slotlens_core::types::{
    BookingContext, DateRange, PracticeId, PractitionerId, RuleSetId, Slot, SlotStatus,
};
use slotlens_core::{EvaluationInput, Rule, evaluate_slots, generate_slots};

use crate::error::{Result, StoreError};
use crate::reads::{assemble_rule, ensure_rule_set};
use crate::store::ConfigStore;
use crate::tables::Tables;

/// Engine configuration. The practice-local zone is fixed (Europe/Berlin,
/// see `slotlens_core::domain::dates`); the horizon caps how far a
/// simulation request may look ahead.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub simulation_cutoff_horizon_days: Option<i64>,
}

/// A booking query. `today` overrides the DAYS_AHEAD reference date; when
/// absent it is computed in practice-local time at request receipt and
/// held constant for the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotQuery {
    pub practice_id: PracticeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_set_id: Option<RuleSetId>,
    pub context: BookingContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today: Option<NaiveDate>,
}

/// Slots in generation order plus the block log in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub slots: Vec<Slot>,
    pub log: Vec<String>,
}

impl ConfigStore {
    /// Labels every candidate slot in the range.
    pub fn list_available_slots(
        &self,
        query: &SlotQuery,
        range: &DateRange,
    ) -> Result<ScheduleResult> {
        let loaded = self.load_for_evaluation(query, range)?;
        Ok(loaded.evaluate())
    }

    /// Single-day variant of [`ConfigStore::list_available_slots`].
    pub fn list_slots_for_day(&self, query: &SlotQuery, date: NaiveDate) -> Result<ScheduleResult> {
        self.list_available_slots(query, &DateRange::new(date, date))
    }

    /// The sorted dates in the range that contain at least one AVAILABLE
    /// slot. Runs the full pipeline with a final date projection.
    pub fn list_available_dates(
        &self,
        query: &SlotQuery,
        range: &DateRange,
    ) -> Result<Vec<NaiveDate>> {
        let result = self.list_available_slots(query, range)?;
        let mut available: Vec<NaiveDate> = result
            .slots
            .iter()
            .filter(|slot| slot.status == SlotStatus::Available)
            .map(|slot| dates::local_date(slot.start))
            .collect();
        available.sort();
        available.dedup();
        Ok(available)
    }

    /// Loads everything the pure pipeline needs while holding the lock.
    fn load_for_evaluation(&self, query: &SlotQuery, range: &DateRange) -> Result<LoadedQuery> {
        let tables = self.lock();
        let rule_set_id = resolve_rule_set(&tables, &query.practice_id, query.rule_set_id.as_ref())?;

        // The appointment type is mandatory: it determines the slot length.
        let appointment_type = tables
            .appointment_types_in_set(&rule_set_id)
            .into_iter()
            .find(|t| t.id == query.context.appointment_type_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::invalid_field(
                    "UNKNOWN_APPOINTMENT_TYPE",
                    "context.appointmentTypeId",
                    format!(
                        "appointment type {} does not exist in rule set {rule_set_id}",
                        query.context.appointment_type_id
                    ),
                )
            })?;

        let rules = tables
            .rule_roots_in_set(&rule_set_id)
            .into_iter()
            .filter(|root| root.enabled.unwrap_or(true))
            .map(|root| assemble_rule(&tables, root))
            .collect::<Result<Vec<Rule>>>()?;

        let practitioners: HashMap<PractitionerId, _> = tables
            .practitioners_in_set(&rule_set_id)
            .into_iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();
        let schedules: Vec<_> = tables
            .base_schedules_in_set(&rule_set_id)
            .into_iter()
            .cloned()
            .collect();
        let appointments: Vec<_> = tables
            .appointments_of_practice(&query.practice_id)
            .into_iter()
            .cloned()
            .collect();

        Ok(LoadedQuery {
            range: self.clamp_range(range, &query.context),
            duration_minutes: appointment_type.duration_minutes,
            rules,
            practitioners,
            schedules,
            appointments,
            context: query.context.clone(),
            today: query.today.unwrap_or_else(|| dates::today_local(Utc::now())),
        })
    }

    /// Soft cap on how far ahead a simulation request may scan.
    fn clamp_range(&self, range: &DateRange, context: &BookingContext) -> DateRange {
        let Some(horizon) = self.config().simulation_cutoff_horizon_days else {
            return *range;
        };
        if !context.is_simulation {
            return *range;
        }
        let cap = range.start + chrono::Duration::days(horizon);
        DateRange::new(range.start, range.end.min(cap))
    }
}

/// Everything needed for evaluation, detached from the store lock: the
/// evaluator itself is pure computation and must not hold it.
struct LoadedQuery {
    range: DateRange,
    duration_minutes: u32,
    rules: Vec<Rule>,
    practitioners: HashMap<PractitionerId, slotlens_core::types::Practitioner>,
    schedules: Vec<slotlens_core::types::BaseSchedule>,
    appointments: Vec<slotlens_core::types::Appointment>,
    context: BookingContext,
    today: NaiveDate,
}

impl LoadedQuery {
    fn evaluate(self) -> ScheduleResult {
        let slots = generate_slots(&self.range, &self.schedules, self.duration_minutes);
        let outcome = evaluate_slots(
            slots,
            &EvaluationInput {
                rules: &self.rules,
                practitioners: &self.practitioners,
                appointments: &self.appointments,
                context: &self.context,
                today: self.today,
            },
        );
        ScheduleResult {
            slots: outcome.slots,
            log: outcome.log,
        }
    }
}

fn resolve_rule_set(
    tables: &Tables,
    practice_id: &PracticeId,
    rule_set_id: Option<&RuleSetId>,
) -> Result<RuleSetId> {
    if let Some(id) = rule_set_id {
        let rule_set = ensure_rule_set(tables, id)?;
        if &rule_set.practice_id != practice_id {
            return Err(StoreError::Mismatch {
                kind: "ruleSet",
                id: id.to_string(),
                expected_owner: format!("practice {practice_id}"),
            });
        }
        return Ok(id.clone());
    }
    let practice = tables
        .practices
        .get(practice_id)
        .ok_or_else(|| StoreError::NotFound {
            kind: "practice",
            id: practice_id.to_string(),
        })?;
    practice
        .current_active_rule_set_id
        .clone()
        .ok_or_else(|| StoreError::NotFound {
            kind: "ruleSet",
            id: format!("active set of practice {practice_id}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutations::BaseScheduleInput;
    use slotlens_core::domain::validation::ConditionTreeInput;
    use slotlens_core::types::{AppointmentTypeId, PatientContext};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A practice with one practitioner working every day 08:00-10:00 and
    /// a 30-minute appointment type.
    fn seeded(store: &ConfigStore) -> (PracticeId, AppointmentTypeId) {
        let practice = store.create_practice("Praxis West").unwrap();
        let initial = practice.current_active_rule_set_id.unwrap();
        let practitioner = store
            .create_practitioner(&practice.id, &initial, "Dr A", vec![])
            .unwrap();
        let location = store.create_location(&practice.id, &initial, "Main").unwrap();
        for day in 0..7 {
            store
                .create_base_schedule(
                    &practice.id,
                    &initial,
                    BaseScheduleInput {
                        practitioner_id: practitioner.entity_id.clone(),
                        location_id: location.entity_id.clone(),
                        day_of_week: day,
                        start_time: "08:00".parse().unwrap(),
                        end_time: "10:00".parse().unwrap(),
                        break_times: vec![],
                    },
                )
                .unwrap();
        }
        let appointment_type = store
            .create_appointment_type(
                &practice.id,
                &initial,
                "Checkup",
                30,
                &[practitioner.entity_id.clone()],
            )
            .unwrap();
        store.save_draft(&practice.id, "seeded", true).unwrap();
        // Ids submitted below are draft-set ids; after the save they live
        // in the now-active saved set.
        (practice.id, appointment_type.entity_id)
    }

    fn query(practice: &PracticeId, appointment_type: &AppointmentTypeId) -> SlotQuery {
        SlotQuery {
            practice_id: practice.clone(),
            rule_set_id: None,
            context: BookingContext {
                patient: PatientContext { is_new: false },
                appointment_type_id: appointment_type.clone(),
                location_id: None,
                is_simulation: false,
            },
            today: Some(date(2026, 1, 5)),
        }
    }

    #[test]
    fn pipeline_generates_and_blocks_slots() {
        let store = ConfigStore::new();
        let (practice, appointment_type) = seeded(&store);

        // Block weekends on the active set.
        let weekend = ConditionTreeInput {
            node_type: Some("AND".to_string()),
            children: Some(vec![ConditionTreeInput {
                node_type: Some("CONDITION".to_string()),
                condition_type: Some("DAY_OF_WEEK".to_string()),
                operator: Some("IS".to_string()),
                value_ids: Some(vec!["0".to_string(), "6".to_string()]),
                ..ConditionTreeInput::default()
            }]),
            ..ConditionTreeInput::default()
        };
        let active = store.get_active_rule_set(&practice).unwrap();
        let rule = store
            .create_rule(&practice, &active.id, &weekend, true)
            .unwrap();
        store.save_draft(&practice, "weekend rule", true).unwrap();

        let q = query(&practice, &appointment_type);
        let range = DateRange::new(date(2026, 1, 5), date(2026, 1, 11));
        let result = store.list_available_slots(&q, &range).unwrap();
        // 7 days x 4 half-hour slots.
        assert_eq!(result.slots.len(), 28);
        let blocked: Vec<_> = result
            .slots
            .iter()
            .filter(|s| s.status == SlotStatus::Blocked)
            .collect();
        assert_eq!(blocked.len(), 8);
        // The rule was authored in the draft that became the active set,
        // so provenance points straight at it.
        let blocking_rule_id = blocked[0].blocked_by_rule_id.clone().unwrap();
        assert_eq!(blocking_rule_id, rule.entity_id);
        assert!(store.get_rule(&blocking_rule_id).unwrap().enabled);
        assert_eq!(result.log.len(), 8);
    }

    #[test]
    fn available_dates_match_the_slot_listing() {
        let store = ConfigStore::new();
        let (practice, appointment_type) = seeded(&store);
        let q = query(&practice, &appointment_type);
        let range = DateRange::new(date(2026, 1, 5), date(2026, 1, 8));

        let dates = store.list_available_dates(&q, &range).unwrap();
        assert_eq!(
            dates,
            vec![
                date(2026, 1, 5),
                date(2026, 1, 6),
                date(2026, 1, 7),
                date(2026, 1, 8)
            ]
        );

        for day in dates {
            let per_day = store.list_slots_for_day(&q, day).unwrap();
            assert!(per_day
                .slots
                .iter()
                .any(|s| s.status == SlotStatus::Available));
        }
    }

    #[test]
    fn unknown_appointment_type_is_a_validation_error() {
        let store = ConfigStore::new();
        let (practice, _) = seeded(&store);
        let q = query(&practice, &AppointmentTypeId::from("ghost"));
        let err = store
            .list_slots_for_day(&q, date(2026, 1, 5))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn explicit_rule_set_must_belong_to_the_practice() {
        let store = ConfigStore::new();
        let (practice, appointment_type) = seeded(&store);
        let other = store.create_practice("Praxis Ost").unwrap();
        let foreign = other.current_active_rule_set_id.unwrap();

        let mut q = query(&practice, &appointment_type);
        q.rule_set_id = Some(foreign);
        let err = store.list_slots_for_day(&q, date(2026, 1, 5)).unwrap_err();
        assert!(matches!(err, StoreError::Mismatch { .. }));
    }

    #[test]
    fn simulation_horizon_caps_the_range() {
        let store = ConfigStore::with_config(EngineConfig {
            simulation_cutoff_horizon_days: Some(2),
        });
        let (practice, appointment_type) = seeded(&store);
        let mut q = query(&practice, &appointment_type);
        let range = DateRange::new(date(2026, 1, 5), date(2026, 1, 11));

        // Non-simulation requests see the full range.
        let result = store.list_available_slots(&q, &range).unwrap();
        assert_eq!(result.slots.len(), 28);

        q.context.is_simulation = true;
        let result = store.list_available_slots(&q, &range).unwrap();
        // Capped at start + 2 days: 3 days x 4 slots.
        assert_eq!(result.slots.len(), 12);
    }
}
