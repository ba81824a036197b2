//! Rule-set lifecycle: the version DAG and the copy-on-write draft.
//!
//! Saved rule sets are immutable. Editing forks a single mutable draft per
//! practice by deep-copying the source set; saving promotes the draft,
//! discarding deletes it together with everything it owns. The fork is
//! staged and committed in one step under the store lock, so readers see
//! either no draft or a fully populated one.

use chrono::Utc;
use slotlens_core::types::{Practice, PracticeId, RuleSet, RuleSetId};

use crate::error::{Result, StoreError};
use crate::fork::deep_copy_rule_set;
use crate::store::ConfigStore;
use crate::tables::Tables;

impl ConfigStore {
    /// Creates a practice together with its initial rule set (version 1,
    /// saved, active).
    pub fn create_practice(&self, name: &str) -> Result<Practice> {
        let mut tables = self.lock();
        let rule_set = RuleSet {
            id: RuleSetId::new(),
            practice_id: PracticeId::new(),
            version: 1,
            saved: true,
            parent_version: None,
            description: "Initial".to_string(),
            created_at: Utc::now(),
        };
        let practice = Practice {
            id: rule_set.practice_id.clone(),
            name: name.to_string(),
            current_active_rule_set_id: Some(rule_set.id.clone()),
        };
        tracing::debug!(practice = %practice.id, rule_set = %rule_set.id, "practice created");
        tables.rule_sets.insert(rule_set.id.clone(), rule_set);
        tables.practices.insert(practice.id.clone(), practice.clone());
        Ok(practice)
    }

    /// Returns the practice's draft, forking one from `source_rule_set_id`
    /// if none exists. An existing draft wins regardless of the source
    /// argument; that is what keeps an editing session stable across
    /// mutations.
    pub fn get_or_create_draft(
        &self,
        practice_id: &PracticeId,
        source_rule_set_id: &RuleSetId,
    ) -> Result<RuleSetId> {
        let mut tables = self.lock();
        get_or_create_draft_locked(&mut tables, practice_id, source_rule_set_id)
    }

    /// Promotes the practice's draft to a saved, immutable rule set.
    pub fn save_draft(
        &self,
        practice_id: &PracticeId,
        description: &str,
        set_as_active: bool,
    ) -> Result<RuleSetId> {
        let mut tables = self.lock();
        let draft_id = tables
            .draft_by_practice
            .get(practice_id)
            .cloned()
            .ok_or_else(|| StoreError::NoDraft {
                practice_id: practice_id.clone(),
            })?;

        let draft = tables
            .rule_sets
            .get_mut(&draft_id)
            .ok_or_else(|| StoreError::DataIntegrity(format!("draft row {draft_id} is missing")))?;
        if draft.saved {
            // The uniqueness index pointed at a saved row; guard the data.
            return Err(StoreError::AlreadySaved {
                rule_set_id: draft_id,
            });
        }
        draft.description = description.to_string();
        draft.saved = true;

        tables.draft_by_practice.remove(practice_id);
        if set_as_active {
            let practice = tables.practices.get_mut(practice_id).ok_or_else(|| {
                StoreError::NotFound {
                    kind: "practice",
                    id: practice_id.to_string(),
                }
            })?;
            practice.current_active_rule_set_id = Some(draft_id.clone());
        }
        tracing::debug!(practice = %practice_id, rule_set = %draft_id, set_as_active, "draft saved");
        Ok(draft_id)
    }

    /// Deletes the draft and every entity it owns. No-op without a draft.
    pub fn discard_draft(&self, practice_id: &PracticeId) -> Result<()> {
        let mut tables = self.lock();
        let Some(draft_id) = tables.draft_by_practice.get(practice_id).cloned() else {
            return Ok(());
        };
        tables.purge_rule_set(&draft_id);
        tracing::debug!(practice = %practice_id, rule_set = %draft_id, "draft discarded");
        Ok(())
    }

    /// Points the practice's production configuration at a saved rule set.
    pub fn set_active_rule_set(
        &self,
        practice_id: &PracticeId,
        rule_set_id: &RuleSetId,
    ) -> Result<()> {
        let mut tables = self.lock();
        let rule_set = tables
            .rule_sets
            .get(rule_set_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "ruleSet",
                id: rule_set_id.to_string(),
            })?;
        if &rule_set.practice_id != practice_id {
            return Err(StoreError::Mismatch {
                kind: "ruleSet",
                id: rule_set_id.to_string(),
                expected_owner: format!("practice {practice_id}"),
            });
        }
        if !rule_set.saved {
            return Err(StoreError::NotSaved {
                rule_set_id: rule_set_id.clone(),
            });
        }
        let practice = tables
            .practices
            .get_mut(practice_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "practice",
                id: practice_id.to_string(),
            })?;
        practice.current_active_rule_set_id = Some(rule_set_id.clone());
        Ok(())
    }
}

/// The fork primitive, shared with the mutation endpoints (every write
/// implicitly goes through it).
pub(crate) fn get_or_create_draft_locked(
    tables: &mut Tables,
    practice_id: &PracticeId,
    source_rule_set_id: &RuleSetId,
) -> Result<RuleSetId> {
    if let Some(existing) = tables.draft_by_practice.get(practice_id) {
        return Ok(existing.clone());
    }

    let source = tables
        .rule_sets
        .get(source_rule_set_id)
        .ok_or_else(|| StoreError::NotFound {
            kind: "ruleSet",
            id: source_rule_set_id.to_string(),
        })?;
    if &source.practice_id != practice_id {
        return Err(StoreError::Mismatch {
            kind: "ruleSet",
            id: source_rule_set_id.to_string(),
            expected_owner: format!("practice {practice_id}"),
        });
    }

    let now = Utc::now();
    let draft = RuleSet {
        id: RuleSetId::new(),
        practice_id: practice_id.clone(),
        version: source.version + 1,
        saved: false,
        parent_version: Some(source.id.clone()),
        description: String::new(),
        created_at: now,
    };

    // Stage the whole copy first; nothing is inserted if any step fails.
    let staged = deep_copy_rule_set(tables, source_rule_set_id, &draft.id, now)?;
    let draft_id = draft.id.clone();
    tables.rule_sets.insert(draft_id.clone(), draft);
    staged.commit(tables);
    tables
        .draft_by_practice
        .insert(practice_id.clone(), draft_id.clone());
    tracing::debug!(
        practice = %practice_id,
        source = %source_rule_set_id,
        draft = %draft_id,
        "draft forked"
    );
    Ok(draft_id)
}

/// Gate executed before every entity write: the target rule set must exist
/// and be unsaved.
pub(crate) fn verify_entity_in_draft(tables: &Tables, rule_set_id: &RuleSetId) -> Result<()> {
    match tables.rule_sets.get(rule_set_id) {
        None => Err(StoreError::NotFound {
            kind: "ruleSet",
            id: rule_set_id.to_string(),
        }),
        Some(rule_set) if rule_set.saved => Err(StoreError::SavedSetWrite {
            rule_set_id: rule_set_id.clone(),
        }),
        Some(_) => Ok(()),
    }
}
