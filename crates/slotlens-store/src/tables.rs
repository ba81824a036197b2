//! In-memory table state.
//!
//! One map per entity kind plus the draft uniqueness index. The named
//! lookup helpers play the role of secondary indexes: callers never scan a
//! table directly, they go through `by_*` accessors so the access paths
//! stay auditable. Sort orders are deterministic everywhere so copies and
//! listings are reproducible.

use std::collections::HashMap;

use slotlens_core::types::{
    Appointment, AppointmentId, AppointmentType, AppointmentTypeId, BaseSchedule, BaseScheduleId,
    Location, LocationId, Practice, PracticeId, Practitioner, PractitionerId, RuleNode,
    RuleNodeId, RuleSet, RuleSetId,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Tables {
    pub(crate) practices: HashMap<PracticeId, Practice>,
    pub(crate) rule_sets: HashMap<RuleSetId, RuleSet>,
    pub(crate) practitioners: HashMap<PractitionerId, Practitioner>,
    pub(crate) locations: HashMap<LocationId, Location>,
    pub(crate) appointment_types: HashMap<AppointmentTypeId, AppointmentType>,
    pub(crate) base_schedules: HashMap<BaseScheduleId, BaseSchedule>,
    pub(crate) rule_nodes: HashMap<RuleNodeId, RuleNode>,
    pub(crate) appointments: HashMap<AppointmentId, Appointment>,
    /// Uniqueness index: at most one unsaved rule set per practice.
    pub(crate) draft_by_practice: HashMap<PracticeId, RuleSetId>,
}

impl Tables {
    // Rule sets ------------------------------------------------------------

    pub(crate) fn rule_sets_of_practice(&self, practice_id: &PracticeId) -> Vec<&RuleSet> {
        let mut sets: Vec<_> = self
            .rule_sets
            .values()
            .filter(|rs| &rs.practice_id == practice_id)
            .collect();
        sets.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.id.cmp(&b.id)));
        sets
    }

    // Entities by rule set -------------------------------------------------

    pub(crate) fn practitioners_in_set(&self, rule_set_id: &RuleSetId) -> Vec<&Practitioner> {
        let mut rows: Vec<_> = self
            .practitioners
            .values()
            .filter(|p| &p.rule_set_id == rule_set_id)
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub(crate) fn locations_in_set(&self, rule_set_id: &RuleSetId) -> Vec<&Location> {
        let mut rows: Vec<_> = self
            .locations
            .values()
            .filter(|l| &l.rule_set_id == rule_set_id)
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub(crate) fn appointment_types_in_set(
        &self,
        rule_set_id: &RuleSetId,
    ) -> Vec<&AppointmentType> {
        let mut rows: Vec<_> = self
            .appointment_types
            .values()
            .filter(|t| &t.rule_set_id == rule_set_id)
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub(crate) fn base_schedules_in_set(&self, rule_set_id: &RuleSetId) -> Vec<&BaseSchedule> {
        let mut rows: Vec<_> = self
            .base_schedules
            .values()
            .filter(|s| &s.rule_set_id == rule_set_id)
            .collect();
        rows.sort_by(|a, b| {
            (a.day_of_week, a.start_time, &a.id).cmp(&(b.day_of_week, b.start_time, &b.id))
        });
        rows
    }

    /// Enabled or not, every root node of the set, ordered
    /// `(created_at, id)` for deterministic evaluation.
    pub(crate) fn rule_roots_in_set(&self, rule_set_id: &RuleSetId) -> Vec<&RuleNode> {
        let mut roots: Vec<_> = self
            .rule_nodes
            .values()
            .filter(|n| &n.rule_set_id == rule_set_id && n.is_root)
            .collect();
        roots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        roots
    }

    /// Compound index `(parent_condition_id, child_order)`.
    pub(crate) fn child_nodes_of(&self, parent_id: &RuleNodeId) -> Vec<&RuleNode> {
        let mut children: Vec<_> = self
            .rule_nodes
            .values()
            .filter(|n| n.parent_condition_id.as_ref() == Some(parent_id))
            .collect();
        children.sort_by_key(|n| n.child_order);
        children
    }

    pub(crate) fn appointments_of_practice(&self, practice_id: &PracticeId) -> Vec<&Appointment> {
        let mut rows: Vec<_> = self
            .appointments
            .values()
            .filter(|a| &a.practice_id == practice_id)
            .collect();
        rows.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    // Twin lookups (`by_parent_id_rule_set_id`) ----------------------------

    pub(crate) fn practitioner_twin(
        &self,
        parent_id: &PractitionerId,
        rule_set_id: &RuleSetId,
    ) -> Option<&Practitioner> {
        self.practitioners
            .values()
            .find(|p| p.parent_id.as_ref() == Some(parent_id) && &p.rule_set_id == rule_set_id)
    }

    pub(crate) fn location_twin(
        &self,
        parent_id: &LocationId,
        rule_set_id: &RuleSetId,
    ) -> Option<&Location> {
        self.locations
            .values()
            .find(|l| l.parent_id.as_ref() == Some(parent_id) && &l.rule_set_id == rule_set_id)
    }

    pub(crate) fn appointment_type_twin(
        &self,
        parent_id: &AppointmentTypeId,
        rule_set_id: &RuleSetId,
    ) -> Option<&AppointmentType> {
        self.appointment_types
            .values()
            .find(|t| t.parent_id.as_ref() == Some(parent_id) && &t.rule_set_id == rule_set_id)
    }

    pub(crate) fn base_schedule_twin(
        &self,
        parent_id: &BaseScheduleId,
        rule_set_id: &RuleSetId,
    ) -> Option<&BaseSchedule> {
        self.base_schedules
            .values()
            .find(|s| s.parent_id.as_ref() == Some(parent_id) && &s.rule_set_id == rule_set_id)
    }

    pub(crate) fn rule_node_twin(
        &self,
        copy_from_id: &RuleNodeId,
        rule_set_id: &RuleSetId,
    ) -> Option<&RuleNode> {
        self.rule_nodes
            .values()
            .find(|n| n.copy_from_id.as_ref() == Some(copy_from_id) && &n.rule_set_id == rule_set_id)
    }

    // Deletion -------------------------------------------------------------

    /// Removes every entity owned by the rule set, then the set itself.
    pub(crate) fn purge_rule_set(&mut self, rule_set_id: &RuleSetId) {
        self.practitioners.retain(|_, p| &p.rule_set_id != rule_set_id);
        self.locations.retain(|_, l| &l.rule_set_id != rule_set_id);
        self.appointment_types.retain(|_, t| &t.rule_set_id != rule_set_id);
        self.base_schedules.retain(|_, s| &s.rule_set_id != rule_set_id);
        self.rule_nodes.retain(|_, n| &n.rule_set_id != rule_set_id);
        self.rule_sets.remove(rule_set_id);
        self.draft_by_practice.retain(|_, draft| draft != rule_set_id);
    }
}
