//! The store's error taxonomy.
//!
//! One variant per error kind. Nothing here is ever recovered from
//! locally: every error is fatal for the enclosing request and surfaces to
//! the caller unchanged. Mutations either complete fully or leave no
//! observable change; evaluation never partially returns.

use slotlens_core::types::{PracticeId, RuleSetId};
use slotlens_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An entity belongs to a different practice or rule set than expected.
    #[error("{kind} {id} does not belong to {expected_owner}")]
    Mismatch {
        kind: &'static str,
        id: String,
        expected_owner: String,
    },

    /// A write reached a `saved = true` rule set. Indicates a logic bug in
    /// the caller; never retried.
    #[error("attempted write into saved rule set {rule_set_id}")]
    SavedSetWrite { rule_set_id: RuleSetId },

    /// Save or discard was called with no draft present.
    #[error("practice {practice_id} has no draft")]
    NoDraft { practice_id: PracticeId },

    /// The row found by the draft lookup is already saved.
    #[error("rule set {rule_set_id} is already saved")]
    AlreadySaved { rule_set_id: RuleSetId },

    /// Activation requires a saved rule set.
    #[error("rule set {rule_set_id} is not saved")]
    NotSaved { rule_set_id: RuleSetId },

    /// Structural or semantic failure in a condition tree or entity field.
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// An id reference could not be mapped between rule sets.
    #[error("corrupt mapping: {0}")]
    CorruptMapping(String),

    /// A stored invariant is violated; typically indicates a prior bug.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// The request was aborted at a suspension point.
    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Mismatch { .. } => "MISMATCH",
            Self::SavedSetWrite { .. } => "SAVED_SET_WRITE",
            Self::NoDraft { .. } => "NO_DRAFT",
            Self::AlreadySaved { .. } => "ALREADY_SAVED",
            Self::NotSaved { .. } => "NOT_SAVED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::CorruptMapping(_) => "CORRUPT_MAPPING",
            Self::DataIntegrity(_) => "DATA_INTEGRITY",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn help(&self) -> Option<&'static str> {
        match self {
            Self::NoDraft { .. } => {
                Some("edit any entity first; edits fork a draft automatically")
            }
            Self::NotSaved { .. } => Some("save the draft before activating it"),
            Self::SavedSetWrite { .. } | Self::CorruptMapping(_) | Self::DataIntegrity(_) => {
                Some("this indicates a bug; the affected rule set should be audited")
            }
            Self::Validation(_) => Some("see details for the offending tree paths"),
            _ => None,
        }
    }

    /// Structured details for transports and the log banner.
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::NotFound { kind, id } => serde_json::json!({ "kind": kind, "id": id }),
            Self::Mismatch {
                kind,
                id,
                expected_owner,
            } => serde_json::json!({ "kind": kind, "id": id, "expectedOwner": expected_owner }),
            Self::SavedSetWrite { rule_set_id } => {
                serde_json::json!({ "ruleSetId": rule_set_id })
            }
            Self::NoDraft { practice_id } => serde_json::json!({ "practiceId": practice_id }),
            Self::AlreadySaved { rule_set_id } | Self::NotSaved { rule_set_id } => {
                serde_json::json!({ "ruleSetId": rule_set_id })
            }
            Self::Validation(errors) => serde_json::json!({ "errors": errors }),
            Self::CorruptMapping(detail) | Self::DataIntegrity(detail) => {
                serde_json::json!({ "detail": detail })
            }
            Self::Cancelled => serde_json::json!({}),
        }
    }

    /// Renders the compact banner used when an error is written to logs.
    pub fn banner(&self) -> String {
        let mut out = format!("== {} {}\n", self.code(), "=".repeat(46 - self.code().len().min(40)));
        out.push_str(&format!("   {self}\n"));
        let details = self.details();
        if details.as_object().is_none_or(|m| !m.is_empty()) {
            out.push_str(&format!("   details: {details}\n"));
        }
        if let Some(help) = self.help() {
            out.push_str(&format!("   help: {help}\n"));
        }
        out
    }

    /// Wraps a single entity-field failure as a validation error.
    pub(crate) fn invalid_field(
        code: &str,
        path: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation(vec![ValidationError {
            code: code.to_string(),
            path: path.to_string(),
            message: message.into(),
            details: serde_json::json!({}),
            help: None,
        }])
    }
}
