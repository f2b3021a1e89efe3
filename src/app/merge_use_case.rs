use crate::app::duplicates::{fetch_all_records, group_records, DuplicateGroup, DuplicateKey, ObjectFilter};
use crate::app::ports::{CrmApi, Prompter};
use crate::constants::{ATTR_DOMAINS, ATTR_EMAIL_ADDRESSES, COMPANIES, PEOPLE};
use crate::error::Result;
use crate::types::RecordId;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// How a merge run behaves
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Skip the per-group confirmation
    pub assume_yes: bool,
    /// Print the plan without touching the CRM
    pub dry_run: bool,
    pub delete_pause: Duration,
    /// Wait after the deletes before patching the kept record
    pub settle_pause: Duration,
    pub page_size: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            assume_yes: false,
            dry_run: false,
            delete_pause: Duration::from_millis(500),
            settle_pause: Duration::from_secs(1),
            page_size: crate::constants::ATTIO_QUERY_PAGE_SIZE,
        }
    }
}

impl MergeOptions {
    pub fn without_pauses(mut self) -> Self {
        self.delete_pause = Duration::ZERO;
        self.settle_pause = Duration::ZERO;
        self
    }
}

/// What happened to one duplicate group
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged { deleted: usize },
    Declined,
    /// Records deleted before the failure stay deleted; the kept record is not patched.
    DeleteFailed { deleted: usize, failed: RecordId, error: String },
    /// Every newer record is gone but the consolidated values were not written back.
    PatchFailed { deleted: usize, error: String },
    Planned,
}

impl MergeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MergeOutcome::Merged { .. } => "merged",
            MergeOutcome::Declined => "declined",
            MergeOutcome::DeleteFailed { .. } => "delete failed",
            MergeOutcome::PatchFailed { .. } => "patch failed",
            MergeOutcome::Planned => "planned",
        }
    }

    pub fn deleted(&self) -> usize {
        match self {
            MergeOutcome::Merged { deleted }
            | MergeOutcome::DeleteFailed { deleted, .. }
            | MergeOutcome::PatchFailed { deleted, .. } => *deleted,
            MergeOutcome::Declined | MergeOutcome::Planned => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MergeOutcome::DeleteFailed { .. } | MergeOutcome::PatchFailed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct GroupMergeResult {
    pub object: String,
    pub key: String,
    pub kept: RecordId,
    pub kept_name: String,
    pub removed: Vec<RecordId>,
    pub consolidated: Vec<String>,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    pub results: Vec<GroupMergeResult>,
}

impl MergeSummary {
    pub fn merged(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, MergeOutcome::Merged { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn deleted(&self) -> usize {
        self.results.iter().map(|r| r.outcome.deleted()).sum()
    }
}

/// List attribute folded onto the kept record
pub fn consolidated_attribute(object: &str) -> &'static str {
    if object == PEOPLE {
        ATTR_EMAIL_ADDRESSES
    } else {
        ATTR_DOMAINS
    }
}

/// Kept record's values first, then newer records' in age order, case-insensitively deduplicated.
pub fn union_values(group: &DuplicateGroup, attribute: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in &group.members {
        for value in record.list(attribute) {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_lowercase()) {
                out.push(trimmed.to_string());
            }
        }
    }
    out
}

/// Attio write shape for the consolidated attribute
pub fn patch_payload(attribute: &str, values: &[String]) -> Value {
    let entry_key = if attribute == ATTR_EMAIL_ADDRESSES {
        "email_address"
    } else if attribute == ATTR_DOMAINS {
        "domain"
    } else {
        "value"
    };
    let entries: Vec<Value> = values.iter().map(|v| json!({ entry_key: v })).collect();
    json!({ attribute: entries })
}

/// Merges duplicate groups into their oldest record
pub struct MergeUseCase<'a> {
    api: &'a dyn CrmApi,
    prompter: &'a dyn Prompter,
    options: MergeOptions,
}

impl<'a> MergeUseCase<'a> {
    pub fn new(api: &'a dyn CrmApi, prompter: &'a dyn Prompter, options: MergeOptions) -> Self {
        Self {
            api,
            prompter,
            options,
        }
    }

    /// Detect name duplicates for the selected objects and merge them.
    #[instrument(skip(self))]
    pub async fn run(&self, filter: ObjectFilter) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        for object in filter.objects() {
            let criterion = if object == COMPANIES {
                DuplicateKey::CompanyName
            } else {
                DuplicateKey::PersonName
            };
            let records = fetch_all_records(self.api, object, self.options.page_size).await?;
            let groups = group_records(&records, criterion);
            println!("Found {} duplicate {} groups by name", groups.len(), object);
            let partial = self.merge_groups(&groups).await?;
            summary.results.extend(partial.results);
        }
        Ok(summary)
    }

    pub async fn merge_groups(&self, groups: &[DuplicateGroup]) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        for (i, group) in groups.iter().enumerate() {
            println!();
            println!("[{}/{}] {}: {}", i + 1, groups.len(), group.criterion.section_title(), group.key);
            let result = self.merge_group(group).await?;
            summary.results.push(result);
        }
        Ok(summary)
    }

    /// Merge one group. Authentication errors abort; other failures are reported in the outcome.
    pub async fn merge_group(&self, group: &DuplicateGroup) -> Result<GroupMergeResult> {
        let object = group.criterion.object();
        let attribute = consolidated_attribute(object);
        let keep = group.oldest();
        let consolidated = union_values(group, attribute);
        let removed: Vec<RecordId> = group.newer().iter().map(|r| r.id.clone()).collect();

        print_plan(group, attribute, &consolidated);

        let mut result = GroupMergeResult {
            object: object.to_string(),
            key: group.key.clone(),
            kept: keep.id.clone(),
            kept_name: keep.display_name().to_string(),
            removed: removed.clone(),
            consolidated: consolidated.clone(),
            outcome: MergeOutcome::Planned,
        };

        if self.options.dry_run {
            return Ok(result);
        }

        if !self.options.assume_yes {
            let question = format!(
                "Delete {} record(s) and keep {}?",
                removed.len(),
                keep.id
            );
            if !self.prompter.confirm(&question, false)? {
                println!("  Skipped.");
                result.outcome = MergeOutcome::Declined;
                return Ok(result);
            }
        }

        // Deletes go first: Attio rejects a domain held by two companies.
        let mut deleted = 0;
        for (i, id) in removed.iter().enumerate() {
            if i > 0 && !self.options.delete_pause.is_zero() {
                tokio::time::sleep(self.options.delete_pause).await;
            }
            match self.api.delete_record(object, id).await {
                Ok(()) => {
                    deleted += 1;
                    println!("  Deleted {id}");
                }
                Err(e) if e.is_auth() => return Err(e),
                // A retried delete whose first attempt landed
                Err(e) if e.is_not_found() => {
                    warn!("{} {} is already gone: {}", object, id, e);
                    deleted += 1;
                    println!("  {id} was already deleted");
                }
                Err(e) => {
                    error!("Failed to delete {} {}: {}", object, id, e);
                    println!("  Failed to delete {id}: {e}. Stopping this group.");
                    result.outcome = MergeOutcome::DeleteFailed {
                        deleted,
                        failed: id.clone(),
                        error: e.to_string(),
                    };
                    return Ok(result);
                }
            }
        }

        let existing = keep.list(attribute);
        let unchanged = existing.len() == consolidated.len()
            && existing
                .iter()
                .zip(&consolidated)
                .all(|(a, b)| a.trim().eq_ignore_ascii_case(b));
        if consolidated.is_empty() || unchanged {
            info!("No new {} to write to {}", attribute, keep.id);
            result.outcome = MergeOutcome::Merged { deleted };
            return Ok(result);
        }

        if deleted > 0 && !self.options.settle_pause.is_zero() {
            tokio::time::sleep(self.options.settle_pause).await;
        }
        match self
            .api
            .update_record(object, &keep.id, &patch_payload(attribute, &consolidated))
            .await
        {
            Ok(()) => {
                println!("  Updated {} with {} {}", keep.id, consolidated.len(), attribute);
                result.outcome = MergeOutcome::Merged { deleted };
            }
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(
                    "Deleted duplicates of {} but could not write {}: {}",
                    keep.id, attribute, e
                );
                println!(
                    "  Could not update {}. Restore {} by hand: {}",
                    keep.id,
                    attribute,
                    consolidated.join(", ")
                );
                result.outcome = MergeOutcome::PatchFailed {
                    deleted,
                    error: e.to_string(),
                };
            }
        }
        Ok(result)
    }
}

fn print_plan(group: &DuplicateGroup, attribute: &str, consolidated: &[String]) {
    let keep = group.oldest();
    let created = |r: &crate::types::Record| {
        r.created_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    };
    println!("  Keep:   {} ({}, created {})", keep.id, keep.display_name(), created(keep));
    for record in group.newer() {
        println!("  Delete: {} ({}, created {})", record.id, record.display_name(), created(record));
    }
    println!("  {}: [{}]", attribute, consolidated.join(", "));
}
