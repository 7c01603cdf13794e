use pb_core::types::{Lead, LeadsByStage, UserSummary};
use uuid::Uuid;

use crate::feed::ChangeSubscription;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors reported by the remote lead store.
///
/// These standardize transport- and data-level failures so the engine can
/// handle rollback uniformly regardless of the concrete transport behind the
/// trait.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("pipeline not found: {0}")]
    PipelineNotFound(Uuid),

    #[error("lead not found: {0}")]
    LeadNotFound(Uuid),

    #[error("stage not found: {0}")]
    StageNotFound(Uuid),

    #[error("user not found: {0}")]
    UserNotFound(Uuid),

    /// The transport failed (network, timeout, server error). The contained
    /// string carries whatever the transport reported.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

// ---------------------------------------------------------------------------
// RemoteLeadStore trait
// ---------------------------------------------------------------------------

/// The data-access surface the engine consumes.
///
/// Implementations persist leads grouped by stage and push change
/// notifications. Mutation calls settle asynchronously, off the interactive
/// gesture's critical path; the engine never blocks on them.
#[async_trait::async_trait]
pub trait RemoteLeadStore: Send + Sync {
    /// Fetch every active lead in the pipeline, grouped by stage, each list
    /// ordered by recency.
    async fn fetch_leads_by_stage(&self, pipeline_id: Uuid) -> RemoteResult<LeadsByStage>;

    /// Persist a stage change and write an audit entry keyed by the previous
    /// stage value, attributed to `acting_user`. Returns the settled lead.
    async fn update_lead_stage(
        &self,
        lead_id: Uuid,
        new_stage_id: Uuid,
        acting_user: &UserSummary,
    ) -> RemoteResult<Lead>;

    /// Persist an assignment change (`None` unassigns). Returns the settled
    /// lead with denormalized assignee display data, so the UI needs no
    /// second round trip.
    async fn update_lead_assignment(
        &self,
        lead_id: Uuid,
        user_id: Option<Uuid>,
    ) -> RemoteResult<Lead>;

    /// Subscribe to change notifications for a pipeline. The channel fires
    /// whenever *some* lead in the pipeline changes server-side, not
    /// necessarily via this client. Dropping the subscription unsubscribes.
    fn subscribe(&self, pipeline_id: Uuid) -> ChangeSubscription;
}
