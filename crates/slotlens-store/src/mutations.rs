//! Entity and rule mutations.
//!
//! Every write implicitly goes through `get_or_create_draft`: the caller
//! addresses entities of any saved set of the practice, the mutation
//! resolves them into the draft (forking it first if needed) and patches
//! the draft only. The `verify_entity_in_draft` gate runs before every
//! patch, insert and delete.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use slotlens_core::domain::conditions::ConditionTree;
use slotlens_core::domain::validation::{ConditionTreeInput, validate_condition_tree};
use slotlens_core::types::{
    AppointmentType, AppointmentTypeId, BaseSchedule, BaseScheduleId, BreakTime, Location,
    LocationId, NodeType, PracticeId, Practitioner, PractitionerId, RuleNode, RuleNodeId,
    RuleSetId, TimeOfDay,
};
use std::collections::BTreeSet;

use crate::error::{Result, StoreError};
use crate::fork::{
    resolve_appointment_type, resolve_base_schedule, resolve_condition_value, resolve_location,
    resolve_practitioner, resolve_rule_root,
};
use crate::rulesets::{get_or_create_draft_locked, verify_entity_in_draft};
use crate::store::ConfigStore;
use crate::tables::Tables;

/// Outcome of a write: the affected entity in the draft that was used or
/// created, plus that draft's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutated<Id> {
    pub entity_id: Id,
    pub rule_set_id: RuleSetId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerUpdates {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdates {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentTypeUpdates {
    pub name: Option<String>,
    pub duration_minutes: Option<u32>,
    pub allowed_practitioner_ids: Option<Vec<PractitionerId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseScheduleInput {
    pub practitioner_id: PractitionerId,
    pub location_id: LocationId,
    pub day_of_week: u8,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default)]
    pub break_times: Vec<BreakTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseScheduleUpdates {
    pub practitioner_id: Option<PractitionerId>,
    pub location_id: Option<LocationId>,
    pub day_of_week: Option<u8>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub break_times: Option<Vec<BreakTime>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdates {
    pub enabled: Option<bool>,
}

impl ConfigStore {
    // Practitioners --------------------------------------------------------

    pub fn create_practitioner(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        name: &str,
        tags: Vec<String>,
    ) -> Result<Mutated<PractitionerId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        ensure_unique_name(
            "practitioner",
            name,
            tables
                .practitioners_in_set(&draft)
                .iter()
                .map(|p| p.name.as_str()),
        )?;

        let row = Practitioner {
            id: PractitionerId::new(),
            practice_id: practice_id.clone(),
            rule_set_id: draft.clone(),
            parent_id: None,
            name: name.to_string(),
            tags,
        };
        let entity_id = row.id.clone();
        tables.practitioners.insert(entity_id.clone(), row);
        tracing::debug!(practice = %practice_id, %draft, practitioner = %entity_id, "practitioner created");
        Ok(Mutated {
            entity_id,
            rule_set_id: draft,
        })
    }

    pub fn update_practitioner(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        practitioner_id: &PractitionerId,
        updates: PractitionerUpdates,
    ) -> Result<Mutated<PractitionerId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_practitioner(&tables, practitioner_id, &draft)?;

        if let Some(name) = &updates.name {
            ensure_unique_name(
                "practitioner",
                name,
                tables
                    .practitioners_in_set(&draft)
                    .iter()
                    .filter(|p| p.id != target)
                    .map(|p| p.name.as_str()),
            )?;
        }
        let row = tables
            .practitioners
            .get_mut(&target)
            .ok_or_else(|| StoreError::DataIntegrity(format!("practitioner {target} vanished")))?;
        if let Some(name) = updates.name {
            row.name = name;
        }
        if let Some(tags) = updates.tags {
            row.tags = tags;
        }
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    pub fn delete_practitioner(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        practitioner_id: &PractitionerId,
    ) -> Result<Mutated<PractitionerId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_practitioner(&tables, practitioner_id, &draft)?;

        let referenced_by_schedule = tables
            .base_schedules_in_set(&draft)
            .iter()
            .any(|s| s.practitioner_id == target);
        let referenced_by_type = tables
            .appointment_types_in_set(&draft)
            .iter()
            .any(|t| t.allowed_practitioner_ids.contains(&target));
        if referenced_by_schedule || referenced_by_type {
            return Err(StoreError::invalid_field(
                "REFERENCED",
                "practitioner",
                format!("practitioner {target} is still referenced in the draft"),
            ));
        }

        tables.practitioners.remove(&target);
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    // Locations ------------------------------------------------------------

    pub fn create_location(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        name: &str,
    ) -> Result<Mutated<LocationId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        ensure_unique_name(
            "location",
            name,
            tables.locations_in_set(&draft).iter().map(|l| l.name.as_str()),
        )?;

        let row = Location {
            id: LocationId::new(),
            practice_id: practice_id.clone(),
            rule_set_id: draft.clone(),
            parent_id: None,
            name: name.to_string(),
        };
        let entity_id = row.id.clone();
        tables.locations.insert(entity_id.clone(), row);
        Ok(Mutated {
            entity_id,
            rule_set_id: draft,
        })
    }

    pub fn update_location(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        location_id: &LocationId,
        updates: LocationUpdates,
    ) -> Result<Mutated<LocationId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_location(&tables, location_id, &draft)?;

        if let Some(name) = &updates.name {
            ensure_unique_name(
                "location",
                name,
                tables
                    .locations_in_set(&draft)
                    .iter()
                    .filter(|l| l.id != target)
                    .map(|l| l.name.as_str()),
            )?;
        }
        let row = tables
            .locations
            .get_mut(&target)
            .ok_or_else(|| StoreError::DataIntegrity(format!("location {target} vanished")))?;
        if let Some(name) = updates.name {
            row.name = name;
        }
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    pub fn delete_location(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        location_id: &LocationId,
    ) -> Result<Mutated<LocationId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_location(&tables, location_id, &draft)?;

        if tables
            .base_schedules_in_set(&draft)
            .iter()
            .any(|s| s.location_id == target)
        {
            return Err(StoreError::invalid_field(
                "REFERENCED",
                "location",
                format!("location {target} is still referenced by a base schedule"),
            ));
        }
        tables.locations.remove(&target);
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    // Appointment types ----------------------------------------------------

    pub fn create_appointment_type(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        name: &str,
        duration_minutes: u32,
        allowed_practitioner_ids: &[PractitionerId],
    ) -> Result<Mutated<AppointmentTypeId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        ensure_unique_name(
            "appointmentType",
            name,
            tables
                .appointment_types_in_set(&draft)
                .iter()
                .map(|t| t.name.as_str()),
        )?;
        check_duration(duration_minutes)?;
        let allowed = resolve_allowed_set(&tables, allowed_practitioner_ids, &draft)?;

        let row = AppointmentType {
            id: AppointmentTypeId::new(),
            practice_id: practice_id.clone(),
            rule_set_id: draft.clone(),
            parent_id: None,
            name: name.to_string(),
            duration_minutes,
            allowed_practitioner_ids: allowed,
        };
        let entity_id = row.id.clone();
        tables.appointment_types.insert(entity_id.clone(), row);
        Ok(Mutated {
            entity_id,
            rule_set_id: draft,
        })
    }

    pub fn update_appointment_type(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        appointment_type_id: &AppointmentTypeId,
        updates: AppointmentTypeUpdates,
    ) -> Result<Mutated<AppointmentTypeId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_appointment_type(&tables, appointment_type_id, &draft)?;

        if let Some(name) = &updates.name {
            ensure_unique_name(
                "appointmentType",
                name,
                tables
                    .appointment_types_in_set(&draft)
                    .iter()
                    .filter(|t| t.id != target)
                    .map(|t| t.name.as_str()),
            )?;
        }
        if let Some(duration) = updates.duration_minutes {
            check_duration(duration)?;
        }
        let allowed = updates
            .allowed_practitioner_ids
            .map(|ids| resolve_allowed_set(&tables, &ids, &draft))
            .transpose()?;

        let row = tables
            .appointment_types
            .get_mut(&target)
            .ok_or_else(|| StoreError::DataIntegrity(format!("appointment type {target} vanished")))?;
        if let Some(name) = updates.name {
            row.name = name;
        }
        if let Some(duration) = updates.duration_minutes {
            row.duration_minutes = duration;
        }
        if let Some(allowed) = allowed {
            row.allowed_practitioner_ids = allowed;
        }
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    pub fn delete_appointment_type(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        appointment_type_id: &AppointmentTypeId,
    ) -> Result<Mutated<AppointmentTypeId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_appointment_type(&tables, appointment_type_id, &draft)?;
        tables.appointment_types.remove(&target);
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    // Base schedules -------------------------------------------------------

    pub fn create_base_schedule(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        input: BaseScheduleInput,
    ) -> Result<Mutated<BaseScheduleId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let practitioner_id = resolve_practitioner(&tables, &input.practitioner_id, &draft)?;
        let location_id = resolve_location(&tables, &input.location_id, &draft)?;
        check_schedule_window(
            input.day_of_week,
            input.start_time,
            input.end_time,
            &input.break_times,
        )?;

        let row = BaseSchedule {
            id: BaseScheduleId::new(),
            practice_id: practice_id.clone(),
            rule_set_id: draft.clone(),
            parent_id: None,
            practitioner_id,
            location_id,
            day_of_week: input.day_of_week,
            start_time: input.start_time,
            end_time: input.end_time,
            break_times: input.break_times,
        };
        let entity_id = row.id.clone();
        tables.base_schedules.insert(entity_id.clone(), row);
        Ok(Mutated {
            entity_id,
            rule_set_id: draft,
        })
    }

    pub fn update_base_schedule(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        base_schedule_id: &BaseScheduleId,
        updates: BaseScheduleUpdates,
    ) -> Result<Mutated<BaseScheduleId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_base_schedule(&tables, base_schedule_id, &draft)?;

        let practitioner_id = updates
            .practitioner_id
            .map(|id| resolve_practitioner(&tables, &id, &draft))
            .transpose()?;
        let location_id = updates
            .location_id
            .map(|id| resolve_location(&tables, &id, &draft))
            .transpose()?;

        let current = tables
            .base_schedules
            .get(&target)
            .ok_or_else(|| StoreError::DataIntegrity(format!("base schedule {target} vanished")))?;
        let day_of_week = updates.day_of_week.unwrap_or(current.day_of_week);
        let start_time = updates.start_time.unwrap_or(current.start_time);
        let end_time = updates.end_time.unwrap_or(current.end_time);
        let break_times = updates
            .break_times
            .clone()
            .unwrap_or_else(|| current.break_times.clone());
        check_schedule_window(day_of_week, start_time, end_time, &break_times)?;

        let row = tables
            .base_schedules
            .get_mut(&target)
            .ok_or_else(|| StoreError::DataIntegrity(format!("base schedule {target} vanished")))?;
        if let Some(practitioner_id) = practitioner_id {
            row.practitioner_id = practitioner_id;
        }
        if let Some(location_id) = location_id {
            row.location_id = location_id;
        }
        row.day_of_week = day_of_week;
        row.start_time = start_time;
        row.end_time = end_time;
        row.break_times = break_times;
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    pub fn delete_base_schedule(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        base_schedule_id: &BaseScheduleId,
    ) -> Result<Mutated<BaseScheduleId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_base_schedule(&tables, base_schedule_id, &draft)?;
        tables.base_schedules.remove(&target);
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    // Rules ----------------------------------------------------------------

    /// Validates, remaps and persists an authored condition tree as a new
    /// rule. The submitted tree may reference entities by their ids in the
    /// source set; leaves are remapped into the draft before insertion.
    pub fn create_rule(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        tree: &ConditionTreeInput,
        enabled: bool,
    ) -> Result<Mutated<RuleNodeId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;

        let validated =
            validate_condition_tree(tree, None).map_err(StoreError::Validation)?;
        let remapped = remap_tree(&tables, &validated, &draft)?;

        let now = Utc::now();
        let root = RuleNode {
            id: RuleNodeId::new(),
            practice_id: practice_id.clone(),
            rule_set_id: draft.clone(),
            parent_condition_id: None,
            child_order: 0,
            is_root: true,
            copy_from_id: None,
            created_at: now,
            last_modified: now,
            enabled: Some(enabled),
            node_type: None,
            condition_type: None,
            operator: None,
            value_ids: Vec::new(),
            value_number: None,
            scope: None,
        };
        let root_id = root.id.clone();
        tables.rule_nodes.insert(root_id.clone(), root);
        insert_tree_nodes(&mut tables, practice_id, &draft, &remapped, root_id.clone(), 0, now);
        tracing::debug!(practice = %practice_id, %draft, rule = %root_id, "rule created");
        Ok(Mutated {
            entity_id: root_id,
            rule_set_id: draft,
        })
    }

    pub fn update_rule(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        rule_id: &RuleNodeId,
        updates: RuleUpdates,
    ) -> Result<Mutated<RuleNodeId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_rule_root(&tables, rule_id, &draft)?;

        let row = tables
            .rule_nodes
            .get_mut(&target)
            .ok_or_else(|| StoreError::DataIntegrity(format!("rule node {target} vanished")))?;
        if !row.is_root {
            return Err(StoreError::Mismatch {
                kind: "rule",
                id: target.to_string(),
                expected_owner: "a root rule node".to_string(),
            });
        }
        if let Some(enabled) = updates.enabled {
            row.enabled = Some(enabled);
            row.last_modified = Utc::now();
        }
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }

    /// Deletes a rule: the root node and its whole subtree.
    pub fn delete_rule(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
        rule_id: &RuleNodeId,
    ) -> Result<Mutated<RuleNodeId>> {
        let mut tables = self.lock();
        let draft = get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)?;
        verify_entity_in_draft(&tables, &draft)?;
        let target = resolve_rule_root(&tables, rule_id, &draft)?;

        let mut to_remove = vec![target.clone()];
        let mut cursor = 0;
        while cursor < to_remove.len() {
            let parent = to_remove[cursor].clone();
            for child in tables.child_nodes_of(&parent) {
                to_remove.push(child.id.clone());
            }
            cursor += 1;
        }
        for id in &to_remove {
            tables.rule_nodes.remove(id);
        }
        Ok(Mutated {
            entity_id: target,
            rule_set_id: draft,
        })
    }
}

fn ensure_unique_name<'a>(
    kind: &str,
    name: &str,
    mut existing: impl Iterator<Item = &'a str>,
) -> Result<()> {
    if existing.any(|candidate| candidate == name) {
        return Err(StoreError::invalid_field(
            "DUPLICATE_NAME",
            kind,
            format!("{kind} name {name:?} already exists in this rule set"),
        ));
    }
    Ok(())
}

fn check_duration(duration_minutes: u32) -> Result<()> {
    if duration_minutes == 0 {
        return Err(StoreError::invalid_field(
            "INVALID_DURATION",
            "appointmentType.durationMinutes",
            "duration must be positive",
        ));
    }
    Ok(())
}

fn resolve_allowed_set(
    tables: &Tables,
    ids: &[PractitionerId],
    draft: &RuleSetId,
) -> Result<BTreeSet<PractitionerId>> {
    if ids.is_empty() {
        return Err(StoreError::invalid_field(
            "EMPTY_ALLOWED_SET",
            "appointmentType.allowedPractitionerIds",
            "an appointment type needs at least one allowed practitioner",
        ));
    }
    ids.iter()
        .map(|id| resolve_practitioner(tables, id, draft))
        .collect()
}

fn check_schedule_window(
    day_of_week: u8,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    break_times: &[BreakTime],
) -> Result<()> {
    if day_of_week > 6 {
        return Err(StoreError::invalid_field(
            "INVALID_DAY_OF_WEEK",
            "baseSchedule.dayOfWeek",
            format!("dayOfWeek must be 0..=6, got {day_of_week}"),
        ));
    }
    if start_time >= end_time {
        return Err(StoreError::invalid_field(
            "INVERTED_WINDOW",
            "baseSchedule",
            format!("startTime {start_time} is not before endTime {end_time}"),
        ));
    }
    let mut sorted: Vec<_> = break_times.to_vec();
    sorted.sort_by_key(|b| b.start);
    for break_time in &sorted {
        if break_time.start >= break_time.end {
            return Err(StoreError::invalid_field(
                "INVERTED_BREAK",
                "baseSchedule.breakTimes",
                format!("break {}-{} is empty or inverted", break_time.start, break_time.end),
            ));
        }
        if break_time.start < start_time || break_time.end > end_time {
            return Err(StoreError::invalid_field(
                "BREAK_OUTSIDE_WINDOW",
                "baseSchedule.breakTimes",
                format!(
                    "break {}-{} lies outside the working window {}-{}",
                    break_time.start, break_time.end, start_time, end_time
                ),
            ));
        }
    }
    for pair in sorted.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(StoreError::invalid_field(
                "OVERLAPPING_BREAKS",
                "baseSchedule.breakTimes",
                format!(
                    "breaks {}-{} and {}-{} overlap",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                ),
            ));
        }
    }
    Ok(())
}

/// Remaps every entity-referencing leaf value into the draft.
fn remap_tree(tables: &Tables, tree: &ConditionTree, draft: &RuleSetId) -> Result<ConditionTree> {
    match tree {
        ConditionTree::And { children } => Ok(ConditionTree::And {
            children: children
                .iter()
                .map(|child| remap_tree(tables, child, draft))
                .collect::<Result<_>>()?,
        }),
        ConditionTree::Not { child } => Ok(ConditionTree::Not {
            child: Box::new(remap_tree(tables, child, draft)?),
        }),
        ConditionTree::Condition(leaf) => {
            let mut remapped = leaf.clone();
            remapped.value_ids = leaf
                .value_ids
                .iter()
                .map(|value| resolve_condition_value(tables, leaf.condition_type, value, draft))
                .collect::<Result<_>>()?;
            Ok(ConditionTree::Condition(remapped))
        }
    }
}

/// Flattens a validated tree into stored rows under `parent`.
fn insert_tree_nodes(
    tables: &mut Tables,
    practice_id: &PracticeId,
    draft: &RuleSetId,
    tree: &ConditionTree,
    parent: RuleNodeId,
    child_order: u32,
    now: chrono::DateTime<Utc>,
) {
    let mut row = RuleNode {
        id: RuleNodeId::new(),
        practice_id: practice_id.clone(),
        rule_set_id: draft.clone(),
        parent_condition_id: Some(parent),
        child_order,
        is_root: false,
        copy_from_id: None,
        created_at: now,
        last_modified: now,
        enabled: None,
        node_type: None,
        condition_type: None,
        operator: None,
        value_ids: Vec::new(),
        value_number: None,
        scope: None,
    };
    match tree {
        ConditionTree::And { children } => {
            row.node_type = Some(NodeType::And);
            let id = row.id.clone();
            tables.rule_nodes.insert(id.clone(), row);
            for (index, child) in children.iter().enumerate() {
                insert_tree_nodes(tables, practice_id, draft, child, id.clone(), index as u32, now);
            }
        }
        ConditionTree::Not { child } => {
            row.node_type = Some(NodeType::Not);
            let id = row.id.clone();
            tables.rule_nodes.insert(id.clone(), row);
            insert_tree_nodes(tables, practice_id, draft, child, id, 0, now);
        }
        ConditionTree::Condition(leaf) => {
            row.node_type = Some(NodeType::Condition);
            row.condition_type = Some(leaf.condition_type);
            row.operator = Some(leaf.operator);
            row.value_ids = leaf.value_ids.clone();
            row.value_number = leaf.value_number;
            row.scope = leaf.scope;
            tables.rule_nodes.insert(row.id.clone(), row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn seeded_store() -> (ConfigStore, PracticeId, RuleSetId) {
        let store = ConfigStore::new();
        let practice = store.create_practice("Praxis am Park").unwrap();
        let initial = practice.current_active_rule_set_id.unwrap();
        (store, practice.id, initial)
    }

    #[test]
    fn first_edit_forks_a_draft() {
        let (store, practice, initial) = seeded_store();
        let result = store.create_location(&practice, &initial, "Main").unwrap();
        assert_ne!(result.rule_set_id, initial);

        let tables = store.lock();
        let draft = tables.rule_sets.get(&result.rule_set_id).unwrap();
        assert_eq!(draft.version, 2);
        assert!(!draft.saved);
        assert_eq!(draft.parent_version, Some(initial.clone()));
        let locations = tables.locations_in_set(&result.rule_set_id);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "Main");
        // The source set stays empty and saved.
        assert!(tables.locations_in_set(&initial).is_empty());
    }

    #[test]
    fn second_edit_reuses_the_draft() {
        let (store, practice, initial) = seeded_store();
        let first = store.create_location(&practice, &initial, "Main").unwrap();
        let second = store.create_location(&practice, &initial, "Annex").unwrap();
        assert_eq!(first.rule_set_id, second.rule_set_id);
    }

    #[test]
    fn duplicate_names_are_rejected_per_set() {
        let (store, practice, initial) = seeded_store();
        store.create_practitioner(&practice, &initial, "Dr A", vec![]).unwrap();
        let err = store
            .create_practitioner(&practice, &initial, "Dr A", vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn update_remaps_saved_set_ids_into_the_draft() {
        // A saved set with a practitioner and an appointment type
        // referencing it; updating the type forks and remaps.
        let (store, practice, initial) = seeded_store();
        let practitioner = store
            .create_practitioner(&practice, &initial, "Dr A", vec![])
            .unwrap();
        let appointment_type = store
            .create_appointment_type(
                &practice,
                &practitioner.rule_set_id,
                "Check",
                30,
                &[practitioner.entity_id.clone()],
            )
            .unwrap();
        let saved = store.save_draft(&practice, "baseline", true).unwrap();

        let updated = store
            .update_appointment_type(
                &practice,
                &saved,
                &appointment_type.entity_id,
                AppointmentTypeUpdates {
                    name: Some("Check2".to_string()),
                    ..AppointmentTypeUpdates::default()
                },
            )
            .unwrap();
        assert_ne!(updated.rule_set_id, saved);
        assert_ne!(updated.entity_id, appointment_type.entity_id);

        let tables = store.lock();
        let copy = tables.appointment_types.get(&updated.entity_id).unwrap();
        assert_eq!(copy.parent_id, Some(appointment_type.entity_id.clone()));
        assert_eq!(copy.name, "Check2");
        // The allowed set points at the draft's practitioner copy.
        let allowed: Vec<_> = copy.allowed_practitioner_ids.iter().collect();
        assert_eq!(allowed.len(), 1);
        let practitioner_copy = tables.practitioners.get(allowed[0]).unwrap();
        assert_eq!(practitioner_copy.rule_set_id, updated.rule_set_id);
        assert_eq!(practitioner_copy.parent_id, Some(practitioner.entity_id.clone()));
        // The original row is untouched.
        let original = tables
            .appointment_types
            .get(&appointment_type.entity_id)
            .unwrap();
        assert_eq!(original.name, "Check");
    }

    #[test]
    fn appointment_type_requires_allowed_practitioners() {
        let (store, practice, initial) = seeded_store();
        let err = store
            .create_appointment_type(&practice, &initial, "Check", 30, &[])
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn schedule_window_is_validated() {
        let (store, practice, initial) = seeded_store();
        let practitioner = store
            .create_practitioner(&practice, &initial, "Dr A", vec![])
            .unwrap();
        let location = store.create_location(&practice, &initial, "Main").unwrap();

        let bad_window = BaseScheduleInput {
            practitioner_id: practitioner.entity_id.clone(),
            location_id: location.entity_id.clone(),
            day_of_week: 1,
            start_time: "18:00".parse().unwrap(),
            end_time: "08:00".parse().unwrap(),
            break_times: vec![],
        };
        let err = store
            .create_base_schedule(&practice, &initial, bad_window)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let overlapping_breaks = BaseScheduleInput {
            practitioner_id: practitioner.entity_id.clone(),
            location_id: location.entity_id.clone(),
            day_of_week: 1,
            start_time: "08:00".parse().unwrap(),
            end_time: "18:00".parse().unwrap(),
            break_times: vec![
                BreakTime {
                    start: "12:00".parse().unwrap(),
                    end: "13:00".parse().unwrap(),
                },
                BreakTime {
                    start: "12:30".parse().unwrap(),
                    end: "14:00".parse().unwrap(),
                },
            ],
        };
        let err = store
            .create_base_schedule(&practice, &initial, overlapping_breaks)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn deleting_a_referenced_practitioner_fails() {
        let (store, practice, initial) = seeded_store();
        let practitioner = store
            .create_practitioner(&practice, &initial, "Dr A", vec![])
            .unwrap();
        store
            .create_appointment_type(
                &practice,
                &initial,
                "Check",
                30,
                &[practitioner.entity_id.clone()],
            )
            .unwrap();
        let err = store
            .delete_practitioner(&practice, &initial, &practitioner.entity_id)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn create_rule_rejects_invalid_trees() {
        let (store, practice, initial) = seeded_store();
        let empty_and = ConditionTreeInput {
            node_type: Some("AND".to_string()),
            children: Some(vec![]),
            ..ConditionTreeInput::default()
        };
        let err = store
            .create_rule(&practice, &initial, &empty_and, true)
            .unwrap_err();
        let StoreError::Validation(errors) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(errors[0].code, "EMPTY_AND");
    }

    #[test]
    fn create_rule_remaps_source_ids_by_name() {
        let (store, practice, initial) = seeded_store();
        let practitioner = store
            .create_practitioner(&practice, &initial, "Dr A", vec![])
            .unwrap();
        let saved = store.save_draft(&practice, "baseline", true).unwrap();

        // The authoring UI submits the practitioner id it saw in the saved set.
        let tree = ConditionTreeInput {
            node_type: Some("CONDITION".to_string()),
            condition_type: Some("PRACTITIONER".to_string()),
            operator: Some("IS".to_string()),
            value_ids: Some(vec![practitioner.entity_id.to_string()]),
            ..ConditionTreeInput::default()
        };
        let rule = store.create_rule(&practice, &saved, &tree, true).unwrap();

        let tables = store.lock();
        let children = tables.child_nodes_of(&rule.entity_id);
        assert_eq!(children.len(), 1);
        let leaf = children[0];
        assert_eq!(leaf.node_type, Some(NodeType::Condition));
        let mapped_id = PractitionerId::from(leaf.value_ids[0].as_str());
        let mapped = tables.practitioners.get(&mapped_id).unwrap();
        assert_eq!(mapped.rule_set_id, rule.rule_set_id);
        assert_eq!(mapped.parent_id, Some(practitioner.entity_id.clone()));
    }

    #[test]
    fn delete_rule_removes_the_whole_subtree() {
        let (store, practice, initial) = seeded_store();
        let tree = ConditionTreeInput {
            node_type: Some("AND".to_string()),
            children: Some(vec![ConditionTreeInput {
                node_type: Some("NOT".to_string()),
                child: Some(Box::new(ConditionTreeInput {
                    node_type: Some("CONDITION".to_string()),
                    condition_type: Some("DAY_OF_WEEK".to_string()),
                    operator: Some("IS".to_string()),
                    value_ids: Some(vec!["0".to_string()]),
                    ..ConditionTreeInput::default()
                })),
                ..ConditionTreeInput::default()
            }]),
            ..ConditionTreeInput::default()
        };
        let rule = store.create_rule(&practice, &initial, &tree, true).unwrap();
        assert_eq!(store.lock().rule_nodes.len(), 4);

        store.delete_rule(&practice, &initial, &rule.entity_id).unwrap();
        assert!(store.lock().rule_nodes.is_empty());
    }

    #[test]
    fn update_rule_toggles_enabled() {
        let (store, practice, initial) = seeded_store();
        let tree = ConditionTreeInput {
            node_type: Some("CONDITION".to_string()),
            condition_type: Some("CLIENT_TYPE".to_string()),
            operator: Some("IS".to_string()),
            value_ids: Some(vec!["new".to_string()]),
            ..ConditionTreeInput::default()
        };
        let rule = store.create_rule(&practice, &initial, &tree, true).unwrap();
        store
            .update_rule(
                &practice,
                &initial,
                &rule.entity_id,
                RuleUpdates {
                    enabled: Some(false),
                },
            )
            .unwrap();
        let tables = store.lock();
        assert_eq!(tables.rule_nodes.get(&rule.entity_id).unwrap().enabled, Some(false));
    }
}
