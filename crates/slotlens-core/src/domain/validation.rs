//! Structural validation of authored condition trees.
//!
//! Authoring clients submit a permissive [`ConditionTreeInput`]; validation
//! walks it, collects every error it can find at each level (it does not
//! short-circuit on the first), stops descending into invalid nodes, and on
//! success narrows the input into the strict [`ConditionTree`].

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::conditions::{
    ConditionLeaf, ConditionTree, allowed_operators, descend_path, references_appointment_types,
    requires_value_ids, requires_value_number,
};
use crate::types::{ConditionOperator, ConditionScope, ConditionType, TimeOfDay};

/// A condition tree as submitted by an authoring client, before any
/// structural guarantee holds. Every field is optional so that validation
/// can report precisely what is missing or malformed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTreeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ConditionTreeInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<ConditionTreeInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<&ConditionTree> for ConditionTreeInput {
    fn from(tree: &ConditionTree) -> Self {
        match tree {
            ConditionTree::And { children } => Self {
                node_type: Some("AND".to_string()),
                children: Some(children.iter().map(Self::from).collect()),
                ..Self::default()
            },
            ConditionTree::Not { child } => Self {
                node_type: Some("NOT".to_string()),
                child: Some(Box::new(Self::from(child.as_ref()))),
                ..Self::default()
            },
            ConditionTree::Condition(leaf) => Self {
                node_type: Some("CONDITION".to_string()),
                condition_type: Some(leaf.condition_type.as_str().to_string()),
                operator: Some(leaf.operator.as_str().to_string()),
                value_ids: if leaf.value_ids.is_empty() {
                    None
                } else {
                    Some(leaf.value_ids.clone())
                },
                value_number: leaf.value_number,
                scope: leaf.scope.map(|s| s.as_str().to_string()),
                ..Self::default()
            },
        }
    }
}

/// A single structural failure, with the offending root-relative path and
/// enough structured detail for an authoring UI to point at the problem.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("{code} at {path}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub code: String,
    pub path: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ValidationError {
    fn new(code: &str, path: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: path.to_string(),
            message: message.into(),
            details: serde_json::json!({}),
            help: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Entity references the validator can check tree leaves against.
#[derive(Debug, Clone, Default)]
pub struct ValidationScope {
    /// Appointment-type ids of the target rule set, as raw strings.
    pub appointment_type_ids: BTreeSet<String>,
}

const NODE_TYPES: [&str; 3] = ["AND", "NOT", "CONDITION"];
const CLIENT_TYPES: [&str; 2] = ["new", "existing"];
const SCOPES: [&str; 2] = ["per-practitioner", "global"];

/// Validates an authored tree and narrows it into the strict value.
///
/// Returns every error found; the strict tree is only produced when the
/// input is fully valid. `scope`, when given, additionally checks that
/// appointment-type references name entities of the target rule set.
pub fn validate_condition_tree(
    input: &ConditionTreeInput,
    scope: Option<&ValidationScope>,
) -> Result<ConditionTree, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let root_label = input.node_type.as_deref().unwrap_or("?");
    let tree = validate_node(input, root_label, scope, &mut errors);
    match tree {
        Some(tree) if errors.is_empty() => Ok(tree),
        _ => Err(errors),
    }
}

fn validate_node(
    input: &ConditionTreeInput,
    path: &str,
    scope: Option<&ValidationScope>,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionTree> {
    let Some(node_type) = input.node_type.as_deref() else {
        errors.push(
            ValidationError::new("MISSING_NODE_TYPE", path, "node has no nodeType")
                .with_details(serde_json::json!({ "allowed": NODE_TYPES }))
                .with_help("every node must declare one of AND, NOT or CONDITION"),
        );
        return None;
    };

    match node_type {
        "AND" => validate_and(input, path, scope, errors),
        "NOT" => validate_not(input, path, scope, errors),
        "CONDITION" => validate_condition(input, path, scope, errors),
        other => {
            errors.push(
                ValidationError::new("UNKNOWN_NODE_TYPE", path, format!("unknown nodeType {other:?}"))
                    .with_details(serde_json::json!({ "observed": other, "allowed": NODE_TYPES }))
                    .with_help("OR is not supported; express disjunctions as separate rules"),
            );
            None
        }
    }
}

fn validate_and(
    input: &ConditionTreeInput,
    path: &str,
    scope: Option<&ValidationScope>,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionTree> {
    let children = input.children.as_deref().unwrap_or(&[]);
    if children.is_empty() {
        errors.push(
            ValidationError::new("EMPTY_AND", path, "AND node has no children")
                .with_help("an AND node needs at least one child condition"),
        );
        return None;
    }
    if input.child.is_some() {
        errors.push(ValidationError::new(
            "UNEXPECTED_CHILD",
            path,
            "AND node carries a single `child`; it takes ordered `children`",
        ));
    }

    let mut validated = Vec::with_capacity(children.len());
    for (index, child) in children.iter().enumerate() {
        let child_label = child.node_type.as_deref().unwrap_or("?");
        let child_path = descend_path(path, Some(index), child_label);
        if let Some(tree) = validate_node(child, &child_path, scope, errors) {
            validated.push(tree);
        }
    }
    // Only assemble when every child validated; errors are already recorded.
    (validated.len() == children.len() && input.child.is_none())
        .then_some(ConditionTree::And { children: validated })
}

fn validate_not(
    input: &ConditionTreeInput,
    path: &str,
    scope: Option<&ValidationScope>,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionTree> {
    if input.children.is_some() {
        errors.push(ValidationError::new(
            "UNEXPECTED_CHILDREN",
            path,
            "NOT node carries `children`; it takes exactly one `child`",
        ));
    }
    let Some(child) = input.child.as_deref() else {
        errors.push(
            ValidationError::new("MISSING_CHILD", path, "NOT node has no child")
                .with_help("a NOT node negates exactly one child condition"),
        );
        return None;
    };

    let child_label = child.node_type.as_deref().unwrap_or("?");
    let child_path = descend_path(path, None, child_label);
    let validated = validate_node(child, &child_path, scope, errors)?;
    input.children.is_none().then_some(ConditionTree::Not {
        child: Box::new(validated),
    })
}

fn validate_condition(
    input: &ConditionTreeInput,
    path: &str,
    scope: Option<&ValidationScope>,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionTree> {
    let before = errors.len();

    if input.children.is_some() || input.child.is_some() {
        errors.push(ValidationError::new(
            "UNEXPECTED_CHILDREN",
            path,
            "CONDITION node cannot have children",
        ));
    }

    let condition_type = parse_condition_type(input, path, errors);
    let operator = parse_operator(input, path, condition_type, errors);

    if let Some(condition_type) = condition_type {
        check_payload_shape(input, path, condition_type, errors);
        check_values(input, path, condition_type, scope, errors);
    }

    let leaf_scope = match input.scope.as_deref() {
        None => None,
        Some("per-practitioner") => Some(ConditionScope::PerPractitioner),
        Some("global") => Some(ConditionScope::Global),
        // Unknown scope strings were already reported by check_payload_shape.
        Some(_) => None,
    };

    if errors.len() > before {
        return None;
    }
    Some(ConditionTree::Condition(ConditionLeaf {
        condition_type: condition_type?,
        operator: operator?,
        value_ids: input.value_ids.clone().unwrap_or_default(),
        value_number: input.value_number,
        scope: leaf_scope,
    }))
}

fn parse_condition_type(
    input: &ConditionTreeInput,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionType> {
    let allowed: Vec<&str> = ConditionType::ALL.iter().map(|t| t.as_str()).collect();
    let Some(raw) = input.condition_type.as_deref() else {
        errors.push(
            ValidationError::new("MISSING_CONDITION_TYPE", path, "condition has no conditionType")
                .with_details(serde_json::json!({ "allowed": allowed })),
        );
        return None;
    };
    match ConditionType::ALL.iter().find(|t| t.as_str() == raw) {
        Some(found) => Some(*found),
        None => {
            errors.push(
                ValidationError::new(
                    "UNKNOWN_CONDITION_TYPE",
                    path,
                    format!("unknown conditionType {raw:?}"),
                )
                .with_details(serde_json::json!({ "observed": raw, "allowed": allowed })),
            );
            None
        }
    }
}

fn parse_operator(
    input: &ConditionTreeInput,
    path: &str,
    condition_type: Option<ConditionType>,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionOperator> {
    const OPERATORS: [ConditionOperator; 5] = [
        ConditionOperator::Is,
        ConditionOperator::IsNot,
        ConditionOperator::Equals,
        ConditionOperator::LessThanOrEqual,
        ConditionOperator::GreaterThanOrEqual,
    ];

    let Some(raw) = input.operator.as_deref() else {
        errors.push(ValidationError::new(
            "MISSING_OPERATOR",
            path,
            "condition has no operator",
        ));
        return None;
    };
    let Some(operator) = OPERATORS.iter().copied().find(|o| o.as_str() == raw) else {
        errors.push(
            ValidationError::new("UNKNOWN_OPERATOR", path, format!("unknown operator {raw:?}"))
                .with_details(serde_json::json!({
                    "observed": raw,
                    "allowed": OPERATORS.map(|o| o.as_str()),
                })),
        );
        return None;
    };

    if let Some(condition_type) = condition_type {
        let compatible = allowed_operators(condition_type);
        if !compatible.contains(&operator) {
            errors.push(
                ValidationError::new(
                    "INCOMPATIBLE_OPERATOR",
                    path,
                    format!("operator {operator} is not valid for {condition_type}"),
                )
                .with_details(serde_json::json!({
                    "observed": operator.as_str(),
                    "allowed": compatible.iter().map(|o| o.as_str()).collect::<Vec<_>>(),
                })),
            );
            return None;
        }
    }
    Some(operator)
}

/// Checks that the payload fields present match what the type requires.
fn check_payload_shape(
    input: &ConditionTreeInput,
    path: &str,
    condition_type: ConditionType,
    errors: &mut Vec<ValidationError>,
) {
    let value_ids = input.value_ids.as_deref().unwrap_or(&[]);
    if requires_value_ids(condition_type) && value_ids.is_empty() {
        errors.push(
            ValidationError::new(
                "MISSING_VALUE_IDS",
                path,
                format!("{condition_type} requires a non-empty valueIds list"),
            )
            .with_details(serde_json::json!({ "conditionType": condition_type.as_str() })),
        );
    }
    if condition_type == ConditionType::DaysAhead && !value_ids.is_empty() {
        errors.push(ValidationError::new(
            "UNEXPECTED_VALUE_IDS",
            path,
            "DAYS_AHEAD takes a numeric threshold, not valueIds",
        ));
    }

    if requires_value_number(condition_type) {
        match input.value_number {
            None => errors.push(ValidationError::new(
                "MISSING_VALUE_NUMBER",
                path,
                format!("{condition_type} requires valueNumber"),
            )),
            Some(n) if n < 0 => errors.push(
                ValidationError::new(
                    "NEGATIVE_VALUE_NUMBER",
                    path,
                    format!("{condition_type} requires valueNumber >= 0"),
                )
                .with_details(serde_json::json!({ "observed": n })),
            ),
            Some(_) => {}
        }
    } else if input.value_number.is_some() {
        errors.push(ValidationError::new(
            "UNEXPECTED_VALUE_NUMBER",
            path,
            format!("{condition_type} does not take valueNumber"),
        ));
    }

    let aggregate = matches!(
        condition_type,
        ConditionType::ConcurrentCount | ConditionType::DailyCapacity
    );
    match input.scope.as_deref() {
        None => {}
        Some(s) if !SCOPES.contains(&s) => {
            errors.push(
                ValidationError::new("UNKNOWN_SCOPE", path, format!("unknown scope {s:?}"))
                    .with_details(serde_json::json!({ "observed": s, "allowed": SCOPES })),
            );
        }
        Some(_) if !aggregate => {
            errors.push(ValidationError::new(
                "UNEXPECTED_SCOPE",
                path,
                format!("{condition_type} does not take a scope"),
            ));
        }
        Some(_) => {}
    }
}

/// Type-specific value checks (formats, ranges, allowed string sets).
fn check_values(
    input: &ConditionTreeInput,
    path: &str,
    condition_type: ConditionType,
    scope: Option<&ValidationScope>,
    errors: &mut Vec<ValidationError>,
) {
    let value_ids = input.value_ids.as_deref().unwrap_or(&[]);
    match condition_type {
        ConditionType::DateRange => {
            if value_ids.len() != 2 {
                errors.push(range_arity_error(path, condition_type, value_ids, "ISO dates"));
                return;
            }
            let parsed: Vec<Option<NaiveDate>> =
                value_ids.iter().map(|v| v.parse().ok()).collect();
            for (value, parsed) in value_ids.iter().zip(&parsed) {
                if parsed.is_none() {
                    errors.push(
                        ValidationError::new(
                            "INVALID_DATE",
                            path,
                            format!("{value:?} is not an ISO date"),
                        )
                        .with_details(serde_json::json!({ "observed": value }))
                        .with_help("use YYYY-MM-DD"),
                    );
                }
            }
            if let (Some(start), Some(end)) = (parsed[0], parsed[1])
                && start > end
            {
                errors.push(
                    ValidationError::new("INVERTED_RANGE", path, "date range start is after end")
                        .with_details(serde_json::json!({
                            "start": value_ids[0],
                            "end": value_ids[1],
                        })),
                );
            }
        }
        ConditionType::TimeRange => {
            if value_ids.len() != 2 {
                errors.push(range_arity_error(path, condition_type, value_ids, "HH:MM times"));
                return;
            }
            let parsed: Vec<Option<TimeOfDay>> =
                value_ids.iter().map(|v| v.parse().ok()).collect();
            for (value, parsed) in value_ids.iter().zip(&parsed) {
                if parsed.is_none() {
                    errors.push(
                        ValidationError::new(
                            "INVALID_TIME",
                            path,
                            format!("{value:?} is not an HH:MM time"),
                        )
                        .with_details(serde_json::json!({ "observed": value })),
                    );
                }
            }
            if let (Some(start), Some(end)) = (parsed[0], parsed[1])
                && start >= end
            {
                errors.push(
                    ValidationError::new("INVERTED_RANGE", path, "time range start is not before end")
                        .with_details(serde_json::json!({
                            "start": value_ids[0],
                            "end": value_ids[1],
                        })),
                );
            }
        }
        ConditionType::DayOfWeek => {
            for value in value_ids {
                if !matches!(value.as_str(), "0" | "1" | "2" | "3" | "4" | "5" | "6") {
                    errors.push(
                        ValidationError::new(
                            "INVALID_DAY_OF_WEEK",
                            path,
                            format!("{value:?} is not a weekday index"),
                        )
                        .with_details(serde_json::json!({ "observed": value }))
                        .with_help("weekdays are \"0\" (Sunday) through \"6\" (Saturday)"),
                    );
                }
            }
        }
        ConditionType::ClientType => {
            for value in value_ids {
                if !CLIENT_TYPES.contains(&value.as_str()) {
                    errors.push(
                        ValidationError::new(
                            "INVALID_CLIENT_TYPE",
                            path,
                            format!("{value:?} is not a client type"),
                        )
                        .with_details(serde_json::json!({
                            "observed": value,
                            "allowed": CLIENT_TYPES,
                        })),
                    );
                }
            }
        }
        _ => {}
    }

    if references_appointment_types(condition_type)
        && let Some(scope) = scope
    {
        for value in value_ids {
            if !scope.appointment_type_ids.contains(value) {
                errors.push(
                    ValidationError::new(
                        "UNKNOWN_REFERENCE",
                        path,
                        format!("{value:?} does not name an appointment type in this rule set"),
                    )
                    .with_details(serde_json::json!({ "observed": value })),
                );
            }
        }
    }
}

fn range_arity_error(
    path: &str,
    condition_type: ConditionType,
    value_ids: &[String],
    expected: &str,
) -> ValidationError {
    ValidationError::new(
        "INVALID_RANGE_ARITY",
        path,
        format!("{condition_type} requires exactly two {expected}"),
    )
    .with_details(serde_json::json!({ "observed": value_ids.len() }))
}
