//! Per-slot rule evaluation.
//!
//! Rules are block-if-true predicates: the first enabled root whose tree
//! evaluates true for a slot blocks it and is recorded as provenance.
//! Everything here is pure computation over already-loaded data; the
//! appointment scans for the aggregate conditions run over the slice the
//! caller fetched.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::conditions::{ConditionLeaf, ConditionTree, Rule, descend_path, node_label};
use crate::domain::dates::{local_date, local_time_of_day, local_weekday};
use crate::types::{
    Appointment, AppointmentStatus, BookingContext, ConditionOperator, ConditionScope,
    ConditionType, Practitioner, PractitionerId, Slot, SlotStatus, TimeOfDay,
};

/// Everything the evaluator needs besides the slots themselves.
///
/// `rules` must already be filtered to enabled roots and sorted by
/// `(created_at, id)`; `today` is the practice-local date at request
/// receipt, held constant for the whole request.
pub struct EvaluationInput<'a> {
    pub rules: &'a [Rule],
    pub practitioners: &'a HashMap<PractitionerId, Practitioner>,
    pub appointments: &'a [Appointment],
    pub context: &'a BookingContext,
    pub today: NaiveDate,
}

/// The assembled result: slots in generation order, log in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub slots: Vec<Slot>,
    pub log: Vec<String>,
}

/// Labels every slot AVAILABLE or BLOCKED, attributing each block to the
/// first rule that produced it.
pub fn evaluate_slots(mut slots: Vec<Slot>, input: &EvaluationInput<'_>) -> EvaluationOutcome {
    let mut log = Vec::new();
    for slot in &mut slots {
        for rule in input.rules {
            if !evaluate_tree(&rule.tree, slot, input) {
                continue;
            }
            slot.status = SlotStatus::Blocked;
            slot.blocked_by_rule_id = Some(rule.id.clone());
            let path = blocking_path(&rule.tree, slot, input);
            let line = format!(
                "BLOCK slot={{{},{}}} by={} cond={}",
                slot.practitioner_id,
                slot.start.to_rfc3339(),
                rule.id,
                path
            );
            tracing::debug!(rule = %rule.id, practitioner = %slot.practitioner_id, %path, "slot blocked");
            log.push(line);
            break;
        }
    }
    EvaluationOutcome { slots, log }
}

fn evaluate_tree(tree: &ConditionTree, slot: &Slot, input: &EvaluationInput<'_>) -> bool {
    match tree {
        // An empty AND is vacuously true. The validator rejects empty AND
        // nodes before they can be persisted.
        ConditionTree::And { children } => {
            children.iter().all(|child| evaluate_tree(child, slot, input))
        }
        ConditionTree::Not { child } => !evaluate_tree(child, slot, input),
        ConditionTree::Condition(leaf) => evaluate_leaf(leaf, slot, input),
    }
}

fn evaluate_leaf(leaf: &ConditionLeaf, slot: &Slot, input: &EvaluationInput<'_>) -> bool {
    match leaf.condition_type {
        ConditionType::Practitioner => membership(
            leaf.operator,
            contains(&leaf.value_ids, slot.practitioner_id.as_str()),
        ),
        ConditionType::Location => membership(
            leaf.operator,
            contains(&leaf.value_ids, slot.location_id.as_str()),
        ),
        ConditionType::AppointmentType => membership(
            leaf.operator,
            contains(&leaf.value_ids, input.context.appointment_type_id.as_str()),
        ),
        ConditionType::PractitionerTag => {
            let any_tag = input
                .practitioners
                .get(&slot.practitioner_id)
                .is_some_and(|p| p.tags.iter().any(|tag| contains(&leaf.value_ids, tag)));
            membership(leaf.operator, any_tag)
        }
        ConditionType::ClientType => {
            let client = if input.context.patient.is_new {
                "new"
            } else {
                "existing"
            };
            membership(leaf.operator, contains(&leaf.value_ids, client))
        }
        ConditionType::DayOfWeek => {
            let weekday = local_weekday(slot.start).to_string();
            membership(leaf.operator, contains(&leaf.value_ids, &weekday))
        }
        ConditionType::DateRange => {
            if leaf.operator != ConditionOperator::Is {
                return false;
            }
            let (Some(start), Some(end)) = (
                parse_date(leaf.value_ids.first()),
                parse_date(leaf.value_ids.get(1)),
            ) else {
                return false;
            };
            let slot_date = local_date(slot.start);
            start <= slot_date && slot_date <= end
        }
        ConditionType::TimeRange => {
            if leaf.operator != ConditionOperator::Is {
                return false;
            }
            let (Some(start), Some(end)) = (
                parse_time(leaf.value_ids.first()),
                parse_time(leaf.value_ids.get(1)),
            ) else {
                return false;
            };
            let slot_time = local_time_of_day(slot.start);
            start <= slot_time && slot_time < end
        }
        ConditionType::DaysAhead => {
            let Some(threshold) = leaf.value_number else {
                return false;
            };
            let delta = (local_date(slot.start) - input.today).num_days();
            match leaf.operator {
                ConditionOperator::LessThanOrEqual => delta <= threshold,
                ConditionOperator::GreaterThanOrEqual => delta >= threshold,
                _ => false,
            }
        }
        ConditionType::ConcurrentCount => {
            let count = count_appointments(leaf, slot, input, |appointment| {
                appointment.start < slot.end && appointment.end > slot.start
            });
            compare(leaf.operator, count, leaf.value_number)
        }
        ConditionType::DailyCapacity => {
            let slot_date = local_date(slot.start);
            let count = count_appointments(leaf, slot, input, |appointment| {
                local_date(appointment.start) == slot_date
            });
            compare(leaf.operator, count, leaf.value_number)
        }
    }
}

fn contains(value_ids: &[String], needle: &str) -> bool {
    value_ids.iter().any(|v| v == needle)
}

fn membership(operator: ConditionOperator, contained: bool) -> bool {
    match operator {
        ConditionOperator::Is => contained,
        ConditionOperator::IsNot => !contained,
        _ => false,
    }
}

fn parse_date(value: Option<&String>) -> Option<NaiveDate> {
    value.and_then(|v| v.parse().ok())
}

fn parse_time(value: Option<&String>) -> Option<TimeOfDay> {
    value.and_then(|v| v.parse().ok())
}

/// Counts appointments matching the leaf's filters plus a window predicate.
///
/// Cancelled appointments never count; simulation appointments count only
/// when the request itself is a simulation.
fn count_appointments(
    leaf: &ConditionLeaf,
    slot: &Slot,
    input: &EvaluationInput<'_>,
    window: impl Fn(&Appointment) -> bool,
) -> i64 {
    input
        .appointments
        .iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .filter(|a| !a.is_simulation || input.context.is_simulation)
        .filter(|a| {
            leaf.value_ids.is_empty()
                || a.appointment_type_id
                    .as_ref()
                    .is_some_and(|t| contains(&leaf.value_ids, t.as_str()))
        })
        .filter(|a| match leaf.scope {
            Some(ConditionScope::PerPractitioner) => a.practitioner_id == slot.practitioner_id,
            Some(ConditionScope::Global) | None => true,
        })
        .filter(|a| window(a))
        .count() as i64
}

fn compare(operator: ConditionOperator, count: i64, threshold: Option<i64>) -> bool {
    let Some(threshold) = threshold else {
        return false;
    };
    match operator {
        ConditionOperator::Equals => count == threshold,
        ConditionOperator::LessThanOrEqual => count <= threshold,
        ConditionOperator::GreaterThanOrEqual => count >= threshold,
        _ => false,
    }
}

/// Root-relative path of the first CONDITION leaf that caused the tree to
/// evaluate true, left-to-right depth-first. Falls back to the first leaf
/// (or the root label) when no single leaf evaluates true on its own, e.g.
/// under negation.
fn blocking_path(tree: &ConditionTree, slot: &Slot, input: &EvaluationInput<'_>) -> String {
    let root_path = node_label(tree).to_string();
    let mut first_leaf = None;
    find_true_leaf(tree, &root_path, slot, input, &mut first_leaf)
        .or(first_leaf)
        .unwrap_or(root_path)
}

fn find_true_leaf(
    tree: &ConditionTree,
    path: &str,
    slot: &Slot,
    input: &EvaluationInput<'_>,
    first_leaf: &mut Option<String>,
) -> Option<String> {
    match tree {
        ConditionTree::Condition(leaf) => {
            if first_leaf.is_none() {
                *first_leaf = Some(path.to_string());
            }
            evaluate_leaf(leaf, slot, input).then(|| path.to_string())
        }
        ConditionTree::And { children } => children.iter().enumerate().find_map(|(index, child)| {
            let child_path = descend_path(path, Some(index), node_label(child));
            find_true_leaf(child, &child_path, slot, input, first_leaf)
        }),
        ConditionTree::Not { child } => {
            let child_path = descend_path(path, None, node_label(child));
            find_true_leaf(child, &child_path, slot, input, first_leaf)
        }
    }
}
