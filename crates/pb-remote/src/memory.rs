use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pb_core::types::{Lead, LeadsByStage, Pipeline, UserSummary};
use tracing::debug;
use uuid::Uuid;

use crate::feed::{ChangeFeed, ChangeSubscription};
use crate::store::{RemoteError, RemoteLeadStore, RemoteResult};

/// Audit entry written on every stage change, keyed by the previous stage.
#[derive(Debug, Clone)]
pub struct StageChange {
    pub lead_id: Uuid,
    pub from_stage_id: Uuid,
    pub to_stage_id: Uuid,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    pipelines: HashMap<Uuid, Pipeline>,
    leads: HashMap<Uuid, Lead>,
    users: HashMap<Uuid, UserSummary>,
    history: Vec<StageChange>,
    fail_queue: VecDeque<RemoteError>,
}

/// In-memory reference implementation of [`RemoteLeadStore`].
///
/// Holds pipelines, leads, users and a stage-change audit log; publishes a
/// change notice on every external mutation. Supports scripted failure
/// injection and simulated latency, which is what tests and the offline demo
/// host run against.
pub struct MemoryLeadStore {
    inner: Mutex<Inner>,
    feed: ChangeFeed,
    latency: Option<Duration>,
}

impl Default for MemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            feed: ChangeFeed::new(),
            latency: None,
        }
    }

    /// Add a simulated round-trip delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    // -----------------------------------------------------------------------
    // Seeding / inspection (outside the trait; used by tests and the host)
    // -----------------------------------------------------------------------

    pub fn insert_pipeline(&self, pipeline: Pipeline) {
        self.lock().pipelines.insert(pipeline.id, pipeline);
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.lock().leads.insert(lead.id, lead);
    }

    pub fn insert_user(&self, user: UserSummary) {
        self.lock().users.insert(user.id, user);
    }

    /// All known pipelines, default first, then by name.
    pub fn pipelines(&self) -> Vec<Pipeline> {
        let mut out: Vec<Pipeline> = self.lock().pipelines.values().cloned().collect();
        out.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(a.name.cmp(&b.name)));
        out
    }

    pub fn lead(&self, lead_id: Uuid) -> Option<Lead> {
        self.lock().leads.get(&lead_id).cloned()
    }

    /// The stage-change audit log, oldest first.
    pub fn history(&self) -> Vec<StageChange> {
        self.lock().history.clone()
    }

    /// Queue an error to be returned by the next mutation call instead of
    /// applying it. Multiple queued errors are consumed in order.
    pub fn fail_next_update(&self, err: RemoteError) {
        self.lock().fail_queue.push_back(err);
    }

    /// Simulate a server-side edit from another client: bump the lead's
    /// recency and notify subscribers.
    pub fn simulate_external_update(&self, lead_id: Uuid) -> RemoteResult<()> {
        let pipeline_id = {
            let mut inner = self.lock();
            let lead = inner
                .leads
                .get_mut(&lead_id)
                .ok_or(RemoteError::LeadNotFound(lead_id))?;
            lead.touch();
            lead.pipeline_id
        };
        self.feed.publish(pipeline_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("MemoryLeadStore lock poisoned")
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_injected_failure(&self) -> Option<RemoteError> {
        self.lock().fail_queue.pop_front()
    }
}

#[async_trait::async_trait]
impl RemoteLeadStore for MemoryLeadStore {
    async fn fetch_leads_by_stage(&self, pipeline_id: Uuid) -> RemoteResult<LeadsByStage> {
        self.simulate_latency().await;
        let inner = self.lock();
        let pipeline = inner
            .pipelines
            .get(&pipeline_id)
            .ok_or(RemoteError::PipelineNotFound(pipeline_id))?;

        let mut grouping = LeadsByStage::with_stages(&pipeline.stage_ids());
        let mut leads: Vec<Lead> = inner
            .leads
            .values()
            .filter(|l| l.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        // Most recent interaction first, per column ordering contract.
        leads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        for lead in leads {
            grouping.push(lead.stage_id, lead);
        }
        Ok(grouping)
    }

    async fn update_lead_stage(
        &self,
        lead_id: Uuid,
        new_stage_id: Uuid,
        acting_user: &UserSummary,
    ) -> RemoteResult<Lead> {
        self.simulate_latency().await;
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }

        let (updated, pipeline_id) = {
            let mut inner = self.lock();
            let lead = inner
                .leads
                .get(&lead_id)
                .cloned()
                .ok_or(RemoteError::LeadNotFound(lead_id))?;
            let pipeline = inner
                .pipelines
                .get(&lead.pipeline_id)
                .ok_or(RemoteError::PipelineNotFound(lead.pipeline_id))?;
            if pipeline.stage(new_stage_id).is_none() {
                return Err(RemoteError::StageNotFound(new_stage_id));
            }

            // The audit entry is keyed by the stage the lead held before the
            // write; the client looks this value up before mutating.
            let entry = StageChange {
                lead_id,
                from_stage_id: lead.stage_id,
                to_stage_id: new_stage_id,
                changed_by: acting_user.id,
                changed_at: Utc::now(),
            };
            inner.history.push(entry);

            let lead = inner.leads.get_mut(&lead_id).expect("lead still present");
            lead.stage_id = new_stage_id;
            lead.touch();
            (lead.clone(), lead.pipeline_id)
        };

        debug!(%lead_id, stage = %new_stage_id, "stage change persisted");
        self.feed.publish(pipeline_id);
        Ok(updated)
    }

    async fn update_lead_assignment(
        &self,
        lead_id: Uuid,
        user_id: Option<Uuid>,
    ) -> RemoteResult<Lead> {
        self.simulate_latency().await;
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }

        let (updated, pipeline_id) = {
            let mut inner = self.lock();
            let assignee = match user_id {
                Some(id) => Some(
                    inner
                        .users
                        .get(&id)
                        .cloned()
                        .ok_or(RemoteError::UserNotFound(id))?,
                ),
                None => None,
            };
            let lead = inner
                .leads
                .get_mut(&lead_id)
                .ok_or(RemoteError::LeadNotFound(lead_id))?;
            lead.set_assignee(assignee);
            (lead.clone(), lead.pipeline_id)
        };

        debug!(%lead_id, assigned = ?user_id, "assignment persisted");
        self.feed.publish(pipeline_id);
        Ok(updated)
    }

    fn subscribe(&self, pipeline_id: Uuid) -> ChangeSubscription {
        self.feed.subscribe(pipeline_id)
    }
}
