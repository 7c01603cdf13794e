use std::collections::HashMap;

use chrono::Utc;
use pb_core::types::{Lead, LeadsByStage, UserSummary};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::mutation::{Assignment, OptimisticMutation, RemoteCall, StageMove};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lead {0} is not in the working set")]
    UnknownLead(Uuid),
    #[error("lead {0} already has a change in flight")]
    MutationInFlight(Uuid),
    #[error("unknown mutation ticket {0}")]
    UnknownTicket(Uuid),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// CacheState
// ---------------------------------------------------------------------------

/// Everything the client caches about the selected pipeline's leads: the
/// stage grouping the board renders, plus a flat by-id view other screens
/// read. Mutations keep both consistent; snapshots capture both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    pub by_stage: LeadsByStage,
    pub all_leads: HashMap<Uuid, Lead>,
}

impl CacheState {
    fn from_grouping(by_stage: LeadsByStage) -> Self {
        let all_leads = by_stage
            .iter()
            .flat_map(|(_, leads)| leads.iter().cloned())
            .map(|l| (l.id, l))
            .collect();
        Self { by_stage, all_leads }
    }
}

// ---------------------------------------------------------------------------
// OptimisticStore
// ---------------------------------------------------------------------------

/// Begin-result handed to the async driver: the ticket to settle later and
/// the remote call that settles it.
#[derive(Debug)]
pub struct BeginOutcome {
    pub ticket_id: Uuid,
    pub call: RemoteCall,
}

struct InFlight {
    lead_id: Uuid,
    snapshot: CacheState,
    mutation: Box<dyn OptimisticMutation>,
}

/// The single writable cache of leads grouped by stage.
///
/// Mutations are applied speculatively and synchronously; the remote call
/// settles later through [`settle_success`](Self::settle_success) /
/// [`settle_failure`](Self::settle_failure). Every unsettled mutation keeps
/// the full pre-mutation snapshot, so rollback restores state verbatim, never
/// a partial merge. A lead with an unsettled mutation rejects further
/// mutations until settlement.
#[derive(Default)]
pub struct OptimisticStore {
    state: CacheState,
    in_flight: HashMap<Uuid, InFlight>,
}

impl OptimisticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the working set from a fetch. Callers must not do this while
    /// mutations are in flight; the board defers refetches until settlement.
    pub fn replace(&mut self, by_stage: LeadsByStage) {
        if !self.in_flight.is_empty() {
            warn!(
                in_flight = self.in_flight.len(),
                "working set replaced with mutations in flight; pending rollbacks now refer to the old snapshot"
            );
        }
        self.state = CacheState::from_grouping(by_stage);
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn by_stage(&self) -> &LeadsByStage {
        &self.state.by_stage
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    pub fn lead(&self, lead_id: Uuid) -> Option<&Lead> {
        self.state.all_leads.get(&lead_id)
    }

    pub fn total_leads(&self) -> usize {
        self.state.by_stage.total_leads()
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_lead_in_flight(&self, lead_id: Uuid) -> bool {
        self.in_flight.values().any(|m| m.lead_id == lead_id)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Begin a speculative stage move. Returns `Ok(None)` when the lead is
    /// already in `dest_stage_id` — no state change, no remote call.
    pub fn begin_move(&mut self, lead_id: Uuid, dest_stage_id: Uuid) -> Result<Option<BeginOutcome>> {
        let source = self
            .state
            .by_stage
            .stage_of(lead_id)
            .ok_or(StoreError::UnknownLead(lead_id))?;
        if source == dest_stage_id {
            debug!(%lead_id, "move to current stage ignored");
            return Ok(None);
        }
        self.begin(Box::new(StageMove {
            lead_id,
            dest_stage_id,
        }))
        .map(Some)
    }

    /// Begin a speculative assignment change (`None` unassigns).
    pub fn begin_assign(&mut self, lead_id: Uuid, user: Option<UserSummary>) -> Result<BeginOutcome> {
        self.begin(Box::new(Assignment { lead_id, user }))
    }

    fn begin(&mut self, mutation: Box<dyn OptimisticMutation>) -> Result<BeginOutcome> {
        let lead_id = mutation.lead_id();
        if self.is_lead_in_flight(lead_id) {
            return Err(StoreError::MutationInFlight(lead_id));
        }

        // Snapshot before touching anything, so a failed settlement can
        // restore the exact pre-mutation state.
        let snapshot = self.state.clone();
        let call = mutation.apply(&mut self.state, Utc::now())?;

        let ticket_id = Uuid::new_v4();
        debug!(%ticket_id, %lead_id, label = mutation.label(), "speculative mutation applied");
        self.in_flight.insert(
            ticket_id,
            InFlight {
                lead_id,
                snapshot,
                mutation,
            },
        );
        Ok(BeginOutcome { ticket_id, call })
    }

    /// Settle a ticket with the remote's settled row: merge it into every
    /// cached view and drop the retained snapshot.
    pub fn settle_success(&mut self, ticket_id: Uuid, settled: &Lead) -> Result<&'static str> {
        let entry = self
            .in_flight
            .remove(&ticket_id)
            .ok_or(StoreError::UnknownTicket(ticket_id))?;
        entry.mutation.commit(&mut self.state, settled);
        debug!(%ticket_id, lead_id = %entry.lead_id, "mutation settled");
        Ok(entry.mutation.label())
    }

    /// Settle a ticket as failed: restore the retained snapshot verbatim.
    pub fn settle_failure(&mut self, ticket_id: Uuid) -> Result<&'static str> {
        let entry = self
            .in_flight
            .remove(&ticket_id)
            .ok_or(StoreError::UnknownTicket(ticket_id))?;
        self.state = entry.snapshot;
        debug!(%ticket_id, lead_id = %entry.lead_id, "mutation rolled back");
        Ok(entry.mutation.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb_core::types::{Lead, Pipeline, Stage};

    fn fixture() -> (OptimisticStore, Pipeline, Vec<Uuid>) {
        let mut pipeline = Pipeline::new("Sales");
        pipeline.add_stage(Stage::new("New", 0));
        pipeline.add_stage(Stage::new("Contacted", 1));
        pipeline.add_stage(Stage::new("Won", 2));

        let new_stage = pipeline.stages[0].id;
        let mut grouping = LeadsByStage::with_stages(&pipeline.stage_ids());
        let l1 = Lead::new(pipeline.id, new_stage, "L1");
        let l2 = Lead::new(pipeline.id, new_stage, "L2");
        let ids = vec![l1.id, l2.id];
        grouping.push(new_stage, l1);
        grouping.push(new_stage, l2);

        let mut store = OptimisticStore::new();
        store.replace(grouping);
        (store, pipeline, ids)
    }

    #[test]
    fn speculative_move_is_visible_immediately() {
        let (mut store, pipeline, ids) = fixture();
        let contacted = pipeline.stages[1].id;

        let outcome = store.begin_move(ids[0], contacted).unwrap().unwrap();

        let moved = &store.by_stage().stage(contacted)[0];
        assert_eq!(moved.id, ids[0]);
        assert_eq!(moved.stage_id, contacted);
        assert_eq!(store.by_stage().stage(pipeline.stages[0].id).len(), 1);
        assert!(matches!(
            outcome.call,
            RemoteCall::UpdateStage { prev_stage_id, .. } if prev_stage_id == pipeline.stages[0].id
        ));
    }

    #[test]
    fn no_op_move_returns_none_and_changes_nothing() {
        let (mut store, pipeline, ids) = fixture();
        let before = store.state().clone();

        let outcome = store.begin_move(ids[0], pipeline.stages[0].id).unwrap();

        assert!(outcome.is_none());
        assert!(!store.has_in_flight());
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn rollback_restores_the_exact_snapshot() {
        let (mut store, pipeline, ids) = fixture();
        let before = store.state().clone();

        let outcome = store.begin_move(ids[0], pipeline.stages[1].id).unwrap().unwrap();
        assert_ne!(store.state(), &before);

        store.settle_failure(outcome.ticket_id).unwrap();
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn success_merges_the_settled_row_and_frees_the_lead() {
        let (mut store, pipeline, ids) = fixture();
        let contacted = pipeline.stages[1].id;
        let outcome = store.begin_move(ids[0], contacted).unwrap().unwrap();

        let mut settled = store.lead(ids[0]).unwrap().clone();
        settled.score = 42;
        store.settle_success(outcome.ticket_id, &settled).unwrap();

        assert!(!store.is_lead_in_flight(ids[0]));
        assert_eq!(store.by_stage().stage(contacted)[0].score, 42);
        assert_eq!(store.lead(ids[0]).unwrap().score, 42);
    }

    #[test]
    fn conservation_over_a_sequence_of_moves() {
        let (mut store, pipeline, ids) = fixture();
        let total = store.total_leads();
        let stages = pipeline.stage_ids();

        let mut tickets = Vec::new();
        tickets.push(store.begin_move(ids[0], stages[1]).unwrap().unwrap());
        tickets.push(store.begin_move(ids[1], stages[2]).unwrap().unwrap());
        assert_eq!(store.total_leads(), total);

        let settled_0 = store.lead(ids[0]).unwrap().clone();
        store.settle_success(tickets[0].ticket_id, &settled_0).unwrap();
        store.settle_failure(tickets[1].ticket_id).unwrap();
        assert_eq!(store.total_leads(), total);

        // Move again after settlement; the count still holds.
        let t = store.begin_move(ids[0], stages[2]).unwrap().unwrap();
        let settled = store.lead(ids[0]).unwrap().clone();
        store.settle_success(t.ticket_id, &settled).unwrap();
        assert_eq!(store.total_leads(), total);
    }

    #[test]
    fn second_mutation_on_an_in_flight_lead_is_rejected() {
        let (mut store, pipeline, ids) = fixture();
        store.begin_move(ids[0], pipeline.stages[1].id).unwrap().unwrap();

        let err = store.begin_move(ids[0], pipeline.stages[2].id).unwrap_err();
        assert!(matches!(err, StoreError::MutationInFlight(id) if id == ids[0]));

        // A different lead is free to mutate concurrently.
        assert!(store.begin_move(ids[1], pipeline.stages[1].id).unwrap().is_some());
    }

    #[test]
    fn unknown_lead_is_an_error() {
        let (mut store, pipeline, _) = fixture();
        let err = store.begin_move(Uuid::new_v4(), pipeline.stages[1].id).unwrap_err();
        assert!(matches!(err, StoreError::UnknownLead(_)));
    }

    #[test]
    fn assignment_updates_grouping_and_flat_view() {
        let (mut store, _, ids) = fixture();
        let user = UserSummary::new("Sam Field", "sam@example.com");

        let outcome = store.begin_assign(ids[0], Some(user.clone())).unwrap();

        let in_grouping = store.by_stage().find(ids[0]).unwrap();
        assert_eq!(in_grouping.assigned_user_id, Some(user.id));
        let in_flat = store.lead(ids[0]).unwrap();
        assert_eq!(in_flat.assigned_user.as_ref().map(|u| u.id), Some(user.id));
        assert!(matches!(
            outcome.call,
            RemoteCall::UpdateAssignment { user_id: Some(id), .. } if id == user.id
        ));
    }

    #[test]
    fn assignment_rollback_restores_previous_assignee() {
        let (mut store, _, ids) = fixture();
        let before = store.state().clone();
        let user = UserSummary::new("Sam Field", "sam@example.com");

        let outcome = store.begin_assign(ids[0], Some(user)).unwrap();
        store.settle_failure(outcome.ticket_id).unwrap();

        assert_eq!(store.state(), &before);
    }

    #[test]
    fn settling_an_unknown_ticket_is_an_error() {
        let (mut store, _, _) = fixture();
        assert!(matches!(
            store.settle_failure(Uuid::new_v4()),
            Err(StoreError::UnknownTicket(_))
        ));
    }
}
