//! The nested condition-tree value and its taxonomy rules.
//!
//! Rules are stored node-wise; this module defines the assembled value the
//! validator and evaluator work with, plus the per-condition-type operator
//! compatibility table and root-relative path rendering used by both
//! validation errors and block provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConditionOperator, ConditionScope, ConditionType, RuleNodeId};

/// Payload of a CONDITION leaf.
///
/// `value_ids` stays an untyped string sequence; its interpretation is a
/// single dispatch on `condition_type` at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionLeaf {
    pub condition_type: ConditionType,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ConditionScope>,
}

/// A validated condition tree: the AND/NOT/CONDITION body under a root rule.
///
/// Evaluates block-if-true against a candidate slot. OR is not a node type;
/// disjunctions are expressed as duplicate rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "nodeType")]
pub enum ConditionTree {
    #[serde(rename = "AND")]
    And { children: Vec<ConditionTree> },
    #[serde(rename = "NOT")]
    Not { child: Box<ConditionTree> },
    #[serde(rename = "CONDITION")]
    Condition(ConditionLeaf),
}

impl ConditionTree {
    /// Convenience constructor for a leaf.
    pub fn leaf(leaf: ConditionLeaf) -> Self {
        Self::Condition(leaf)
    }

    /// Number of nodes in the tree (root included).
    pub fn node_count(&self) -> usize {
        match self {
            Self::And { children } => 1 + children.iter().map(Self::node_count).sum::<usize>(),
            Self::Not { child } => 1 + child.node_count(),
            Self::Condition(_) => 1,
        }
    }
}

/// A rule: root metadata plus its assembled condition tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleNodeId,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub tree: ConditionTree,
}

/// Operators admitted for a condition type.
pub fn allowed_operators(condition_type: ConditionType) -> &'static [ConditionOperator] {
    use ConditionOperator::*;
    use ConditionType::*;
    match condition_type {
        Practitioner | Location | AppointmentType | PractitionerTag | ClientType | DayOfWeek => {
            &[Is, IsNot]
        }
        DateRange | TimeRange => &[Is],
        DaysAhead => &[LessThanOrEqual, GreaterThanOrEqual],
        ConcurrentCount | DailyCapacity => &[Equals, LessThanOrEqual, GreaterThanOrEqual],
    }
}

/// Whether the condition type carries a numeric threshold.
pub fn requires_value_number(condition_type: ConditionType) -> bool {
    matches!(
        condition_type,
        ConditionType::DaysAhead | ConditionType::ConcurrentCount | ConditionType::DailyCapacity
    )
}

/// Whether the condition type requires a non-empty `value_ids` sequence.
/// Aggregate filters (CONCURRENT_COUNT, DAILY_CAPACITY) may be empty,
/// meaning "count every appointment type".
pub fn requires_value_ids(condition_type: ConditionType) -> bool {
    use ConditionType::*;
    matches!(
        condition_type,
        Practitioner
            | Location
            | AppointmentType
            | PractitionerTag
            | ClientType
            | DayOfWeek
            | DateRange
            | TimeRange
    )
}

/// Condition types whose `value_ids` reference appointment types.
pub fn references_appointment_types(condition_type: ConditionType) -> bool {
    matches!(
        condition_type,
        ConditionType::AppointmentType
            | ConditionType::ConcurrentCount
            | ConditionType::DailyCapacity
    )
}

/// Root-relative node label used in paths: the node type, with CONDITION
/// leaves labelled by their condition type.
pub fn node_label(tree: &ConditionTree) -> &'static str {
    match tree {
        ConditionTree::And { .. } => "AND",
        ConditionTree::Not { .. } => "NOT",
        ConditionTree::Condition(leaf) => leaf.condition_type.as_str(),
    }
}

/// Extends a root-relative path like `AND[0].NOT` by one descent step.
///
/// `child_index` is set when the parent is an AND node; NOT has a single
/// unindexed child. The resulting paths read `AND[0].NOT.DAY_OF_WEEK`.
pub fn descend_path(parent_path: &str, child_index: Option<usize>, child_label: &str) -> String {
    match child_index {
        Some(index) => format!("{parent_path}[{index}].{child_label}"),
        None => format!("{parent_path}.{child_label}"),
    }
}
