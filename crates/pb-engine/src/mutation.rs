use chrono::{DateTime, Utc};
use pb_core::types::{Lead, UserSummary};
use uuid::Uuid;

use crate::store::{CacheState, StoreError};

/// The remote write a speculative mutation must be settled against.
///
/// The previous stage is captured here because the remote contract requires
/// it to be known before the call (the server keys its audit entry by it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    UpdateStage {
        lead_id: Uuid,
        dest_stage_id: Uuid,
        prev_stage_id: Uuid,
    },
    UpdateAssignment {
        lead_id: Uuid,
        user_id: Option<Uuid>,
    },
}

/// One optimistic edit against the cache, split into explicit phases:
///
/// - `apply` performs the speculative edit synchronously and describes the
///   remote call that will settle it
/// - `commit` merges the settled remote row back into every cached view
/// - rollback and delayed reconciliation are store concerns shared by all
///   mutations (the store snapshots before `apply` and restores verbatim on
///   failure)
///
/// Stage moves and assignment changes are the two shapes this system needs;
/// both flow through the same ticket/settlement machinery.
pub trait OptimisticMutation: Send + std::fmt::Debug {
    fn lead_id(&self) -> Uuid;

    /// Human-readable verb for notices and logs ("move", "assignment").
    fn label(&self) -> &'static str;

    fn apply(&self, cache: &mut CacheState, now: DateTime<Utc>) -> Result<RemoteCall, StoreError>;

    fn commit(&self, cache: &mut CacheState, settled: &Lead);
}

// ---------------------------------------------------------------------------
// StageMove
// ---------------------------------------------------------------------------

/// Relocate a lead to another stage column.
#[derive(Debug, Clone)]
pub struct StageMove {
    pub lead_id: Uuid,
    pub dest_stage_id: Uuid,
}

impl OptimisticMutation for StageMove {
    fn lead_id(&self) -> Uuid {
        self.lead_id
    }

    fn label(&self) -> &'static str {
        "move"
    }

    fn apply(&self, cache: &mut CacheState, now: DateTime<Utc>) -> Result<RemoteCall, StoreError> {
        let prev_stage_id = cache
            .by_stage
            .stage_of(self.lead_id)
            .ok_or(StoreError::UnknownLead(self.lead_id))?;

        let mut lead = cache
            .by_stage
            .remove(self.lead_id)
            .ok_or(StoreError::UnknownLead(self.lead_id))?;
        lead.stage_id = self.dest_stage_id;
        lead.updated_at = now;

        cache.by_stage.ensure_stage(self.dest_stage_id);
        cache.by_stage.prepend(self.dest_stage_id, lead.clone());
        cache.all_leads.insert(lead.id, lead);

        Ok(RemoteCall::UpdateStage {
            lead_id: self.lead_id,
            dest_stage_id: self.dest_stage_id,
            prev_stage_id,
        })
    }

    fn commit(&self, cache: &mut CacheState, settled: &Lead) {
        merge_settled(cache, settled);
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Assign or unassign a lead in place, without relocating it.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub lead_id: Uuid,
    pub user: Option<UserSummary>,
}

impl OptimisticMutation for Assignment {
    fn lead_id(&self) -> Uuid {
        self.lead_id
    }

    fn label(&self) -> &'static str {
        "assignment"
    }

    fn apply(&self, cache: &mut CacheState, now: DateTime<Utc>) -> Result<RemoteCall, StoreError> {
        let lead = cache
            .by_stage
            .find_mut(self.lead_id)
            .ok_or(StoreError::UnknownLead(self.lead_id))?;
        lead.assigned_user_id = self.user.as_ref().map(|u| u.id);
        lead.assigned_user = self.user.clone();
        lead.updated_at = now;

        // Keep the flat view of the same row in sync so other screens
        // reading it never show a stale assignee.
        let updated = lead.clone();
        cache.all_leads.insert(updated.id, updated);

        Ok(RemoteCall::UpdateAssignment {
            lead_id: self.lead_id,
            user_id: self.user.as_ref().map(|u| u.id),
        })
    }

    fn commit(&self, cache: &mut CacheState, settled: &Lead) {
        merge_settled(cache, settled);
    }
}

// ---------------------------------------------------------------------------
// Shared commit path
// ---------------------------------------------------------------------------

/// Overwrite every cached view of a lead with the settled remote row. If the
/// row drifted out of its settled stage (an unrelated rollback restored an
/// older grouping), it is relocated so the one-stage-per-lead invariant
/// holds.
fn merge_settled(cache: &mut CacheState, settled: &Lead) {
    match cache.by_stage.stage_of(settled.id) {
        Some(current) if current == settled.stage_id => {
            if let Some(slot) = cache.by_stage.find_mut(settled.id) {
                *slot = settled.clone();
            }
        }
        Some(_) => {
            cache.by_stage.remove(settled.id);
            cache.by_stage.ensure_stage(settled.stage_id);
            cache.by_stage.prepend(settled.stage_id, settled.clone());
        }
        None => {}
    }
    cache.all_leads.insert(settled.id, settled.clone());
}
