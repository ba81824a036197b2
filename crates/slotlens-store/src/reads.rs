//! Read operations: entity listings, rule assembly, version history.
//!
//! Reads clone rows out of the locked tables; callers never hold
//! references into the store. Tree assembly reconstructs the nested
//! condition value from stored rows via the `(parent_condition_id,
//! child_order)` index and reports malformed storage as `DataIntegrity`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotlens_core::domain::conditions::{ConditionLeaf, ConditionTree, Rule};
use slotlens_core::types::{
    AppointmentType, BaseSchedule, Location, NodeType, PracticeId, Practitioner, RuleNode,
    RuleNodeId, RuleSet, RuleSetId,
};

use crate::error::{Result, StoreError};
use crate::fork::{EntityKind, map_ids_between};
use crate::store::ConfigStore;
use crate::tables::Tables;

/// One entry of a practice's version history, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: RuleSetId,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub message: String,
    pub parents: Vec<RuleSetId>,
}

impl ConfigStore {
    pub fn list_practitioners(&self, rule_set_id: &RuleSetId) -> Result<Vec<Practitioner>> {
        let tables = self.lock();
        ensure_rule_set(&tables, rule_set_id)?;
        Ok(tables
            .practitioners_in_set(rule_set_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn list_locations(&self, rule_set_id: &RuleSetId) -> Result<Vec<Location>> {
        let tables = self.lock();
        ensure_rule_set(&tables, rule_set_id)?;
        Ok(tables
            .locations_in_set(rule_set_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn list_appointment_types(&self, rule_set_id: &RuleSetId) -> Result<Vec<AppointmentType>> {
        let tables = self.lock();
        ensure_rule_set(&tables, rule_set_id)?;
        Ok(tables
            .appointment_types_in_set(rule_set_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn list_base_schedules(&self, rule_set_id: &RuleSetId) -> Result<Vec<BaseSchedule>> {
        let tables = self.lock();
        ensure_rule_set(&tables, rule_set_id)?;
        Ok(tables
            .base_schedules_in_set(rule_set_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Every rule of the set, enabled or not, with fully assembled trees,
    /// in deterministic `(created_at, id)` order.
    pub fn list_rules(&self, rule_set_id: &RuleSetId) -> Result<Vec<Rule>> {
        let tables = self.lock();
        ensure_rule_set(&tables, rule_set_id)?;
        tables
            .rule_roots_in_set(rule_set_id)
            .into_iter()
            .map(|root| assemble_rule(&tables, root))
            .collect()
    }

    /// The root metadata plus the fully expanded nested condition tree.
    pub fn get_rule(&self, rule_id: &RuleNodeId) -> Result<Rule> {
        let tables = self.lock();
        let root = tables.rule_nodes.get(rule_id).ok_or_else(|| StoreError::NotFound {
            kind: "rule",
            id: rule_id.to_string(),
        })?;
        if !root.is_root {
            return Err(StoreError::NotFound {
                kind: "rule",
                id: rule_id.to_string(),
            });
        }
        assemble_rule(&tables, root)
    }

    pub fn get_active_rule_set(&self, practice_id: &PracticeId) -> Result<RuleSet> {
        let tables = self.lock();
        let practice = tables
            .practices
            .get(practice_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "practice",
                id: practice_id.to_string(),
            })?;
        let active = practice
            .current_active_rule_set_id
            .as_ref()
            .ok_or_else(|| StoreError::NotFound {
                kind: "ruleSet",
                id: format!("active set of practice {practice_id}"),
            })?;
        ensure_rule_set(&tables, active).cloned()
    }

    pub fn get_draft(&self, practice_id: &PracticeId) -> Result<Option<RuleSet>> {
        let tables = self.lock();
        if !tables.practices.contains_key(practice_id) {
            return Err(StoreError::NotFound {
                kind: "practice",
                id: practice_id.to_string(),
            });
        }
        Ok(tables
            .draft_by_practice
            .get(practice_id)
            .and_then(|id| tables.rule_sets.get(id))
            .cloned())
    }

    pub fn list_saved_rule_sets(&self, practice_id: &PracticeId) -> Result<Vec<RuleSet>> {
        let tables = self.lock();
        Ok(tables
            .rule_sets_of_practice(practice_id)
            .into_iter()
            .filter(|rs| rs.saved)
            .cloned()
            .collect())
    }

    pub fn list_all_rule_sets(&self, practice_id: &PracticeId) -> Result<Vec<RuleSet>> {
        let tables = self.lock();
        Ok(tables
            .rule_sets_of_practice(practice_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// The version DAG flattened oldest-first for display.
    pub fn version_history(&self, practice_id: &PracticeId) -> Result<Vec<VersionEntry>> {
        let tables = self.lock();
        let practice = tables
            .practices
            .get(practice_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "practice",
                id: practice_id.to_string(),
            })?;
        Ok(tables
            .rule_sets_of_practice(practice_id)
            .into_iter()
            .map(|rs| VersionEntry {
                id: rs.id.clone(),
                created_at: rs.created_at,
                is_active: practice.current_active_rule_set_id.as_ref() == Some(&rs.id),
                message: rs.description.clone(),
                parents: rs.parent_version.iter().cloned().collect(),
            })
            .collect())
    }

    /// Read-only cross-set id mapping for overlay displays; entities
    /// without a counterpart in `target` are omitted.
    pub fn map_ids_between(
        &self,
        source: &RuleSetId,
        target: &RuleSetId,
        kind: EntityKind,
    ) -> Result<HashMap<String, String>> {
        let tables = self.lock();
        ensure_rule_set(&tables, source)?;
        ensure_rule_set(&tables, target)?;
        Ok(map_ids_between(&tables, source, target, kind))
    }
}

pub(crate) fn ensure_rule_set<'t>(tables: &'t Tables, id: &RuleSetId) -> Result<&'t RuleSet> {
    tables.rule_sets.get(id).ok_or_else(|| StoreError::NotFound {
        kind: "ruleSet",
        id: id.to_string(),
    })
}

/// Assembles the rule under a root row. A root owns exactly one child.
pub(crate) fn assemble_rule(tables: &Tables, root: &RuleNode) -> Result<Rule> {
    let children = tables.child_nodes_of(&root.id);
    if children.len() != 1 {
        return Err(StoreError::DataIntegrity(format!(
            "rule root {} has {} children, expected exactly one",
            root.id,
            children.len()
        )));
    }
    Ok(Rule {
        id: root.id.clone(),
        enabled: root.enabled.unwrap_or(true),
        created_at: root.created_at,
        last_modified: root.last_modified,
        tree: assemble_tree(tables, children[0])?,
    })
}

fn assemble_tree(tables: &Tables, node: &RuleNode) -> Result<ConditionTree> {
    let children = tables.child_nodes_of(&node.id);
    match node.node_type {
        Some(NodeType::And) => {
            if children.is_empty() {
                return Err(StoreError::DataIntegrity(format!(
                    "AND node {} has no children",
                    node.id
                )));
            }
            Ok(ConditionTree::And {
                children: children
                    .into_iter()
                    .map(|child| assemble_tree(tables, child))
                    .collect::<Result<_>>()?,
            })
        }
        Some(NodeType::Not) => {
            if children.len() != 1 {
                return Err(StoreError::DataIntegrity(format!(
                    "NOT node {} has {} children, expected exactly one",
                    node.id,
                    children.len()
                )));
            }
            Ok(ConditionTree::Not {
                child: Box::new(assemble_tree(tables, children[0])?),
            })
        }
        Some(NodeType::Condition) => {
            if !children.is_empty() {
                return Err(StoreError::DataIntegrity(format!(
                    "CONDITION node {} has children",
                    node.id
                )));
            }
            let (Some(condition_type), Some(operator)) = (node.condition_type, node.operator)
            else {
                return Err(StoreError::DataIntegrity(format!(
                    "CONDITION node {} lacks conditionType or operator",
                    node.id
                )));
            };
            Ok(ConditionTree::Condition(ConditionLeaf {
                condition_type,
                operator,
                value_ids: node.value_ids.clone(),
                value_number: node.value_number,
                scope: node.scope,
            }))
        }
        None => Err(StoreError::DataIntegrity(format!(
            "node {} below a root has no nodeType",
            node.id
        ))),
    }
}
