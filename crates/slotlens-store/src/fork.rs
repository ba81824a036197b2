//! Deep copy and reference remapping between rule sets.
//!
//! Forking a draft copies every entity of the source set into the target
//! set in dependency order (leaves first), building an id map per kind and
//! remapping every intra-set reference through it. The copy is staged in
//! memory and committed in one step so a failure never leaves a partially
//! populated draft. Any reference that cannot be mapped is a fatal
//! `CorruptMapping`; references are never silently dropped.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use slotlens_core::types::{
    AppointmentType, AppointmentTypeId, BaseSchedule, BaseScheduleId, ConditionType, Location,
    LocationId, Practitioner, PractitionerId, RuleNode, RuleNodeId, RuleSetId,
};

use crate::error::{Result, StoreError};
use crate::tables::Tables;

/// Entity kinds addressable by the cross-set mapping API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Practitioner,
    Location,
    AppointmentType,
    BaseSchedule,
}

/// All rows of a fork, staged before insertion.
#[derive(Debug, Default)]
pub(crate) struct StagedCopy {
    practitioners: Vec<Practitioner>,
    locations: Vec<Location>,
    appointment_types: Vec<AppointmentType>,
    base_schedules: Vec<BaseSchedule>,
    rule_nodes: Vec<RuleNode>,
}

impl StagedCopy {
    pub(crate) fn commit(self, tables: &mut Tables) {
        for row in self.practitioners {
            tables.practitioners.insert(row.id.clone(), row);
        }
        for row in self.locations {
            tables.locations.insert(row.id.clone(), row);
        }
        for row in self.appointment_types {
            tables.appointment_types.insert(row.id.clone(), row);
        }
        for row in self.base_schedules {
            tables.base_schedules.insert(row.id.clone(), row);
        }
        for row in self.rule_nodes {
            tables.rule_nodes.insert(row.id.clone(), row);
        }
    }
}

/// Deep-copies every entity of `source` into `target`.
///
/// Copy order is practitioners, locations, appointment types, base
/// schedules, then rule trees. Each later kind remaps through the id maps
/// the earlier kinds produced.
pub(crate) fn deep_copy_rule_set(
    tables: &Tables,
    source: &RuleSetId,
    target: &RuleSetId,
    now: DateTime<Utc>,
) -> Result<StagedCopy> {
    let mut staged = StagedCopy::default();

    // 1. Practitioners (no references).
    let mut practitioner_map: HashMap<PractitionerId, PractitionerId> = HashMap::new();
    for row in tables.practitioners_in_set(source) {
        let copy = Practitioner {
            id: PractitionerId::new(),
            rule_set_id: target.clone(),
            parent_id: Some(row.id.clone()),
            ..row.clone()
        };
        practitioner_map.insert(row.id.clone(), copy.id.clone());
        staged.practitioners.push(copy);
    }

    // 2. Locations (no references).
    let mut location_map: HashMap<LocationId, LocationId> = HashMap::new();
    for row in tables.locations_in_set(source) {
        let copy = Location {
            id: LocationId::new(),
            rule_set_id: target.clone(),
            parent_id: Some(row.id.clone()),
            ..row.clone()
        };
        location_map.insert(row.id.clone(), copy.id.clone());
        staged.locations.push(copy);
    }

    // 3. Appointment types: remap the allowed-practitioner set.
    let mut type_map: HashMap<AppointmentTypeId, AppointmentTypeId> = HashMap::new();
    for row in tables.appointment_types_in_set(source) {
        let mut allowed = BTreeSet::new();
        for practitioner_id in &row.allowed_practitioner_ids {
            let mapped = practitioner_map.get(practitioner_id).ok_or_else(|| {
                StoreError::CorruptMapping(format!(
                    "appointment type {} references practitioner {} outside rule set {}",
                    row.id, practitioner_id, source
                ))
            })?;
            allowed.insert(mapped.clone());
        }
        let copy = AppointmentType {
            id: AppointmentTypeId::new(),
            rule_set_id: target.clone(),
            parent_id: Some(row.id.clone()),
            allowed_practitioner_ids: allowed,
            ..row.clone()
        };
        type_map.insert(row.id.clone(), copy.id.clone());
        staged.appointment_types.push(copy);
    }

    // 4. Base schedules: remap practitioner and location.
    for row in tables.base_schedules_in_set(source) {
        let practitioner_id = practitioner_map.get(&row.practitioner_id).ok_or_else(|| {
            StoreError::CorruptMapping(format!(
                "base schedule {} references practitioner {} outside rule set {}",
                row.id, row.practitioner_id, source
            ))
        })?;
        let location_id = location_map.get(&row.location_id).ok_or_else(|| {
            StoreError::CorruptMapping(format!(
                "base schedule {} references location {} outside rule set {}",
                row.id, row.location_id, source
            ))
        })?;
        staged.base_schedules.push(BaseSchedule {
            id: BaseScheduleId::new(),
            rule_set_id: target.clone(),
            parent_id: Some(row.id.clone()),
            practitioner_id: practitioner_id.clone(),
            location_id: location_id.clone(),
            ..row.clone()
        });
    }

    // 5. Rule trees, root by root.
    let maps = IdMaps {
        practitioners: practitioner_map,
        locations: location_map,
        appointment_types: type_map,
    };
    for root in tables.rule_roots_in_set(source) {
        copy_rule_node(tables, root, None, target, &maps, now, &mut staged)?;
    }

    Ok(staged)
}

pub(crate) struct IdMaps {
    pub(crate) practitioners: HashMap<PractitionerId, PractitionerId>,
    pub(crate) locations: HashMap<LocationId, LocationId>,
    pub(crate) appointment_types: HashMap<AppointmentTypeId, AppointmentTypeId>,
}

fn copy_rule_node(
    tables: &Tables,
    node: &RuleNode,
    new_parent: Option<RuleNodeId>,
    target: &RuleSetId,
    maps: &IdMaps,
    now: DateTime<Utc>,
    staged: &mut StagedCopy,
) -> Result<RuleNodeId> {
    let new_id = RuleNodeId::new();
    let value_ids = remap_value_ids(node, maps)?;
    staged.rule_nodes.push(RuleNode {
        id: new_id.clone(),
        rule_set_id: target.clone(),
        parent_condition_id: new_parent,
        copy_from_id: Some(node.id.clone()),
        created_at: node.created_at,
        last_modified: now,
        value_ids,
        ..node.clone()
    });

    for child in tables.child_nodes_of(&node.id) {
        copy_rule_node(tables, child, Some(new_id.clone()), target, maps, now, staged)?;
    }
    Ok(new_id)
}

/// Remaps a node's `value_ids` according to its condition type. Types that
/// reference entities go through the id maps; everything else (tags, day
/// indices, dates, times, client types) carries verbatim.
fn remap_value_ids(node: &RuleNode, maps: &IdMaps) -> Result<Vec<String>> {
    let Some(condition_type) = node.condition_type else {
        return Ok(node.value_ids.clone());
    };
    let remap_one = |value: &String| -> Result<String> {
        let mapped = match condition_type {
            ConditionType::Practitioner => maps
                .practitioners
                .get(&PractitionerId::from(value.as_str()))
                .map(|id| id.as_str().to_string()),
            ConditionType::Location => maps
                .locations
                .get(&LocationId::from(value.as_str()))
                .map(|id| id.as_str().to_string()),
            ConditionType::AppointmentType
            | ConditionType::ConcurrentCount
            | ConditionType::DailyCapacity => maps
                .appointment_types
                .get(&AppointmentTypeId::from(value.as_str()))
                .map(|id| id.as_str().to_string()),
            _ => return Ok(value.clone()),
        };
        mapped.ok_or_else(|| {
            StoreError::CorruptMapping(format!(
                "rule node {} references unmapped {condition_type} value {value:?}",
                node.id
            ))
        })
    };
    node.value_ids.iter().map(remap_one).collect()
}

// Caller-id resolution -----------------------------------------------------
//
// Mutation endpoints may receive ids naming entities of the (now saved)
// source set. Each resolver accepts an id that already lives in the draft,
// or follows the `(parent_id, rule_set_id)` twin lookup into the draft.

pub(crate) fn resolve_practitioner(
    tables: &Tables,
    id: &PractitionerId,
    draft: &RuleSetId,
) -> Result<PractitionerId> {
    if let Some(row) = tables.practitioners.get(id) {
        if &row.rule_set_id == draft {
            return Ok(id.clone());
        }
        return tables
            .practitioner_twin(id, draft)
            .map(|twin| twin.id.clone())
            .ok_or_else(|| corrupt_twin("practitioner", id.as_str(), draft));
    }
    Err(StoreError::NotFound {
        kind: "practitioner",
        id: id.to_string(),
    })
}

pub(crate) fn resolve_location(
    tables: &Tables,
    id: &LocationId,
    draft: &RuleSetId,
) -> Result<LocationId> {
    if let Some(row) = tables.locations.get(id) {
        if &row.rule_set_id == draft {
            return Ok(id.clone());
        }
        return tables
            .location_twin(id, draft)
            .map(|twin| twin.id.clone())
            .ok_or_else(|| corrupt_twin("location", id.as_str(), draft));
    }
    Err(StoreError::NotFound {
        kind: "location",
        id: id.to_string(),
    })
}

pub(crate) fn resolve_appointment_type(
    tables: &Tables,
    id: &AppointmentTypeId,
    draft: &RuleSetId,
) -> Result<AppointmentTypeId> {
    if let Some(row) = tables.appointment_types.get(id) {
        if &row.rule_set_id == draft {
            return Ok(id.clone());
        }
        return tables
            .appointment_type_twin(id, draft)
            .map(|twin| twin.id.clone())
            .ok_or_else(|| corrupt_twin("appointment type", id.as_str(), draft));
    }
    Err(StoreError::NotFound {
        kind: "appointmentType",
        id: id.to_string(),
    })
}

pub(crate) fn resolve_base_schedule(
    tables: &Tables,
    id: &BaseScheduleId,
    draft: &RuleSetId,
) -> Result<BaseScheduleId> {
    if let Some(row) = tables.base_schedules.get(id) {
        if &row.rule_set_id == draft {
            return Ok(id.clone());
        }
        return tables
            .base_schedule_twin(id, draft)
            .map(|twin| twin.id.clone())
            .ok_or_else(|| corrupt_twin("base schedule", id.as_str(), draft));
    }
    Err(StoreError::NotFound {
        kind: "baseSchedule",
        id: id.to_string(),
    })
}

pub(crate) fn resolve_rule_root(
    tables: &Tables,
    id: &RuleNodeId,
    draft: &RuleSetId,
) -> Result<RuleNodeId> {
    if let Some(row) = tables.rule_nodes.get(id) {
        if &row.rule_set_id == draft {
            return Ok(id.clone());
        }
        return tables
            .rule_node_twin(id, draft)
            .map(|twin| twin.id.clone())
            .ok_or_else(|| corrupt_twin("rule", id.as_str(), draft));
    }
    Err(StoreError::NotFound {
        kind: "rule",
        id: id.to_string(),
    })
}

fn corrupt_twin(kind: &str, id: &str, draft: &RuleSetId) -> StoreError {
    StoreError::CorruptMapping(format!("{kind} {id} has no counterpart in rule set {draft}"))
}

/// Remaps a condition leaf value submitted by an authoring client into the
/// draft, matching by name when the id belongs to another rule set of the
/// same practice. Name uniqueness per set makes the match unambiguous; a
/// duplicate name is reported loudly instead of picking arbitrarily.
pub(crate) fn resolve_condition_value(
    tables: &Tables,
    condition_type: ConditionType,
    value: &str,
    draft: &RuleSetId,
) -> Result<String> {
    match condition_type {
        ConditionType::Practitioner => {
            let name = match tables.practitioners.get(&PractitionerId::from(value)) {
                Some(row) if &row.rule_set_id == draft => return Ok(value.to_string()),
                Some(row) => row.name.clone(),
                None => return Err(unknown_value(condition_type, value)),
            };
            let matches: Vec<_> = tables
                .practitioners_in_set(draft)
                .into_iter()
                .filter(|p| p.name == name)
                .collect();
            single_name_match(condition_type, value, &name, matches.len())?;
            Ok(matches[0].id.as_str().to_string())
        }
        ConditionType::Location => {
            let name = match tables.locations.get(&LocationId::from(value)) {
                Some(row) if &row.rule_set_id == draft => return Ok(value.to_string()),
                Some(row) => row.name.clone(),
                None => return Err(unknown_value(condition_type, value)),
            };
            let matches: Vec<_> = tables
                .locations_in_set(draft)
                .into_iter()
                .filter(|l| l.name == name)
                .collect();
            single_name_match(condition_type, value, &name, matches.len())?;
            Ok(matches[0].id.as_str().to_string())
        }
        ConditionType::AppointmentType
        | ConditionType::ConcurrentCount
        | ConditionType::DailyCapacity => {
            let name = match tables.appointment_types.get(&AppointmentTypeId::from(value)) {
                Some(row) if &row.rule_set_id == draft => return Ok(value.to_string()),
                Some(row) => row.name.clone(),
                None => return Err(unknown_value(condition_type, value)),
            };
            let matches: Vec<_> = tables
                .appointment_types_in_set(draft)
                .into_iter()
                .filter(|t| t.name == name)
                .collect();
            single_name_match(condition_type, value, &name, matches.len())?;
            Ok(matches[0].id.as_str().to_string())
        }
        _ => Ok(value.to_string()),
    }
}

fn unknown_value(condition_type: ConditionType, value: &str) -> StoreError {
    StoreError::CorruptMapping(format!(
        "{condition_type} condition references unknown entity {value:?}"
    ))
}

fn single_name_match(
    condition_type: ConditionType,
    value: &str,
    name: &str,
    count: usize,
) -> Result<()> {
    match count {
        1 => Ok(()),
        0 => Err(StoreError::CorruptMapping(format!(
            "{condition_type} value {value:?} ({name:?}) has no name match in the draft"
        ))),
        _ => Err(StoreError::DataIntegrity(format!(
            "{condition_type} value {value:?}: name {name:?} is ambiguous in the draft"
        ))),
    }
}

/// Read-only cross-set id mapping: resolves each entity of `source` to its
/// counterpart in `target` by walking `parent_id` downward (child in
/// target) or upward (parent row living in target). Entities without a
/// counterpart are omitted.
pub(crate) fn map_ids_between(
    tables: &Tables,
    source: &RuleSetId,
    target: &RuleSetId,
    kind: EntityKind,
) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    match kind {
        EntityKind::Practitioner => {
            for row in tables.practitioners_in_set(source) {
                let down = tables.practitioner_twin(&row.id, target).map(|t| t.id.clone());
                let up = row.parent_id.as_ref().and_then(|pid| {
                    tables
                        .practitioners
                        .get(pid)
                        .filter(|parent| &parent.rule_set_id == target)
                        .map(|parent| parent.id.clone())
                });
                if let Some(counterpart) = down.or(up) {
                    mapping.insert(row.id.as_str().to_string(), counterpart.as_str().to_string());
                }
            }
        }
        EntityKind::Location => {
            for row in tables.locations_in_set(source) {
                let down = tables.location_twin(&row.id, target).map(|t| t.id.clone());
                let up = row.parent_id.as_ref().and_then(|pid| {
                    tables
                        .locations
                        .get(pid)
                        .filter(|parent| &parent.rule_set_id == target)
                        .map(|parent| parent.id.clone())
                });
                if let Some(counterpart) = down.or(up) {
                    mapping.insert(row.id.as_str().to_string(), counterpart.as_str().to_string());
                }
            }
        }
        EntityKind::AppointmentType => {
            for row in tables.appointment_types_in_set(source) {
                let down = tables.appointment_type_twin(&row.id, target).map(|t| t.id.clone());
                let up = row.parent_id.as_ref().and_then(|pid| {
                    tables
                        .appointment_types
                        .get(pid)
                        .filter(|parent| &parent.rule_set_id == target)
                        .map(|parent| parent.id.clone())
                });
                if let Some(counterpart) = down.or(up) {
                    mapping.insert(row.id.as_str().to_string(), counterpart.as_str().to_string());
                }
            }
        }
        EntityKind::BaseSchedule => {
            for row in tables.base_schedules_in_set(source) {
                let down = tables.base_schedule_twin(&row.id, target).map(|t| t.id.clone());
                let up = row.parent_id.as_ref().and_then(|pid| {
                    tables
                        .base_schedules
                        .get(pid)
                        .filter(|parent| &parent.rule_set_id == target)
                        .map(|parent| parent.id.clone())
                });
                if let Some(counterpart) = down.or(up) {
                    mapping.insert(row.id.as_str().to_string(), counterpart.as_str().to_string());
                }
            }
        }
    }
    mapping
}
