use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use pb_core::config::{BoardConfig, Config};
use pb_core::prefs::{PrefStore, LAST_PIPELINE_KEY};
use pb_core::types::{Lead, LeadsByStage, Pipeline, Stage, UserSummary};
use pb_remote::{ChangeSubscription, RemoteError, RemoteLeadStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::drag::{BoardView, DragCoordinator, DragEffect, DragSession, DragTuning};
use crate::filter::LeadFilter;
use crate::geom::{Point, Rect};
use crate::mutation::RemoteCall;
use crate::store::{BeginOutcome, OptimisticStore, StoreError};
use crate::window::StageWindow;

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing notification the host renders (e.g. as a toast).
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase & internal messages
// ---------------------------------------------------------------------------

/// Load state of the board, distinct from drag/mutation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardPhase {
    /// No pipeline selected yet.
    Idle,
    Loading,
    Ready,
    LoadFailed(String),
}

#[derive(Debug)]
enum EngineMsg {
    Settled {
        ticket_id: Uuid,
        label: &'static str,
        outcome: Result<Lead, RemoteError>,
    },
    ReconcileDue {
        pipeline_id: Uuid,
    },
    FetchDone {
        pipeline_id: Uuid,
        initial: bool,
        outcome: Result<LeadsByStage, RemoteError>,
    },
}

// ---------------------------------------------------------------------------
// BoardEngine
// ---------------------------------------------------------------------------

/// Facade a host drives: owns the optimistic cache and all read-side
/// transforms, dispatches remote calls off the gesture's critical path, and
/// drains their settlements plus reconcile timers and subscription
/// notifications one event-loop turn at a time via [`pump`](Self::pump).
///
/// The engine itself is single-owner state; only the spawned remote calls
/// run concurrently, and they communicate back exclusively through the
/// internal channel.
pub struct BoardEngine {
    remote: Arc<dyn RemoteLeadStore>,
    current_user: UserSummary,
    prefs: Option<PrefStore>,
    board_cfg: BoardConfig,

    store: OptimisticStore,
    window: StageWindow,
    pub filter: LeadFilter,
    drag: DragCoordinator,

    phase: BoardPhase,
    pipeline: Option<Pipeline>,
    subscription: Option<ChangeSubscription>,
    /// A refetch was requested while mutations were in flight; run it once
    /// they settle instead of stomping optimistic state.
    refetch_deferred: bool,

    tx: flume::Sender<EngineMsg>,
    rx: flume::Receiver<EngineMsg>,
    notices: Vec<Notice>,
}

impl BoardEngine {
    pub fn new(remote: Arc<dyn RemoteLeadStore>, current_user: UserSummary, config: &Config) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            remote,
            current_user,
            prefs: None,
            board_cfg: config.board.clone(),
            store: OptimisticStore::new(),
            window: StageWindow::new(crate::window::MAX_CAPACITY),
            filter: LeadFilter::default(),
            drag: DragCoordinator::new(DragTuning::from_config(&config.board)),
            phase: BoardPhase::Idle,
            pipeline: None,
            subscription: None,
            refetch_deferred: false,
            tx,
            rx,
            notices: Vec::new(),
        }
    }

    /// Attach a preference store; the last successfully loaded pipeline id
    /// is persisted through it.
    pub fn with_prefs(mut self, prefs: PrefStore) -> Self {
        self.prefs = Some(prefs);
        self
    }

    // -----------------------------------------------------------------------
    // Pipeline lifecycle
    // -----------------------------------------------------------------------

    /// Select a pipeline: discard the previous working set, subscribe to the
    /// pipeline's change feed and start the initial fetch.
    pub fn load_pipeline(&mut self, pipeline: Pipeline) {
        info!(pipeline_id = %pipeline.id, name = %pipeline.name, "loading pipeline");
        self.store = OptimisticStore::new();
        self.window = StageWindow::new(self.window.capacity());
        self.refetch_deferred = false;
        self.subscription = Some(self.remote.subscribe(pipeline.id));
        self.phase = BoardPhase::Loading;
        let pipeline_id = pipeline.id;
        self.pipeline = Some(pipeline);
        self.spawn_fetch(pipeline_id, true);
    }

    pub fn phase(&self) -> &BoardPhase {
        &self.phase
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// The pipeline id remembered from the previous run, if any.
    pub fn last_pipeline_pref(&self) -> Option<Uuid> {
        let raw = self.prefs.as_ref()?.get(LAST_PIPELINE_KEY)?;
        raw.parse().ok()
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn leads(&self) -> &LeadsByStage {
        self.store.by_stage()
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    pub fn window(&self) -> &StageWindow {
        &self.window
    }

    pub fn visible_stages(&self) -> &[Stage] {
        match &self.pipeline {
            Some(p) => self.window.visible(&p.stages),
            None => &[],
        }
    }

    pub fn stage_count(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.stages.len())
    }

    /// The filtered, disposable view the host renders this pass.
    pub fn filtered_view<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> LeadsByStage {
        self.filter.apply(self.store.by_stage(), now)
    }

    /// Per-stage lead counts over the filtered view, for column badges.
    pub fn badge_counts<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> HashMap<Uuid, usize> {
        self.filtered_view(now)
            .iter()
            .map(|(stage_id, leads)| (stage_id, leads.len()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Window control
    // -----------------------------------------------------------------------

    pub fn page_next(&mut self) {
        let count = self.stage_count();
        self.window.next(count);
    }

    pub fn page_prev(&mut self) {
        self.window.prev();
    }

    /// Recompute column capacity from a new viewport width. The slide index
    /// is re-clamped, never reset.
    pub fn set_viewport_width(&mut self, width: f32) {
        let capacity = StageWindow::capacity_for_width(width, &self.board_cfg.capacity_breakpoints);
        let count = self.stage_count();
        self.window.set_capacity(capacity, count);
    }

    // -----------------------------------------------------------------------
    // Drag passthrough
    // -----------------------------------------------------------------------

    pub fn pointer_down(&mut self, lead_id: Uuid, at: Point, card: Rect) {
        let Some(source_stage_id) = self.store.by_stage().stage_of(lead_id) else {
            return;
        };
        self.drag.pointer_down(lead_id, source_stage_id, at, card);
    }

    pub fn pointer_move(&mut self, at: Point, view: &BoardView) -> Vec<DragEffect> {
        self.drag.pointer_move(at, view)
    }

    /// Release: a valid drop emits exactly one move through the store.
    pub fn pointer_up(&mut self, at: Point, view: &BoardView) -> Vec<DragEffect> {
        let (intent, effects) = self.drag.pointer_up(at, view);
        if let Some(intent) = intent {
            self.move_lead(intent.lead_id, intent.dest_stage_id);
        }
        effects
    }

    pub fn cancel_drag(&mut self) -> Vec<DragEffect> {
        self.drag.cancel()
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        self.drag.session()
    }

    pub fn drop_target(&self, view: &BoardView) -> Option<Uuid> {
        self.drag.target_under(view)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Optimistically move a lead to another stage and dispatch the remote
    /// write. The speculative state is visible before the call is issued.
    pub fn move_lead(&mut self, lead_id: Uuid, dest_stage_id: Uuid) {
        match self.store.begin_move(lead_id, dest_stage_id) {
            Ok(Some(outcome)) => self.dispatch(outcome),
            Ok(None) => {}
            Err(err @ StoreError::MutationInFlight(_)) => {
                self.notices.push(Notice::warning(err.to_string()));
            }
            Err(err) => {
                warn!(%lead_id, error = %err, "move rejected");
                self.notices.push(Notice::error(err.to_string()));
            }
        }
    }

    /// Optimistically (un)assign a lead and dispatch the remote write.
    pub fn assign_lead(&mut self, lead_id: Uuid, user: Option<UserSummary>) {
        match self.store.begin_assign(lead_id, user) {
            Ok(outcome) => self.dispatch(outcome),
            Err(err @ StoreError::MutationInFlight(_)) => {
                self.notices.push(Notice::warning(err.to_string()));
            }
            Err(err) => {
                warn!(%lead_id, error = %err, "assignment rejected");
                self.notices.push(Notice::error(err.to_string()));
            }
        }
    }

    fn dispatch(&self, outcome: BeginOutcome) {
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        let user = self.current_user.clone();
        let BeginOutcome { ticket_id, call } = outcome;
        tokio::spawn(async move {
            let (label, result) = match call {
                RemoteCall::UpdateStage {
                    lead_id,
                    dest_stage_id,
                    // Looked up before the speculative edit; the server keys
                    // its history entry by it.
                    prev_stage_id: _,
                } => (
                    "move",
                    remote.update_lead_stage(lead_id, dest_stage_id, &user).await,
                ),
                RemoteCall::UpdateAssignment { lead_id, user_id } => (
                    "assignment",
                    remote.update_lead_assignment(lead_id, user_id).await,
                ),
            };
            let _ = tx.send(EngineMsg::Settled {
                ticket_id,
                label,
                outcome: result,
            });
        });
    }

    // -----------------------------------------------------------------------
    // Pumping
    // -----------------------------------------------------------------------

    /// Drain pending settlements, reconcile timers and change notifications.
    /// Call once per event-loop turn; never blocks. Returns the notices the
    /// host should surface.
    pub fn pump(&mut self) -> Vec<Notice> {
        self.poll_subscription();

        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
        }

        if self.refetch_deferred && !self.store.has_in_flight() {
            if let Some(pipeline_id) = self.pipeline.as_ref().map(|p| p.id) {
                self.refetch_deferred = false;
                self.spawn_fetch(pipeline_id, false);
            }
        }

        std::mem::take(&mut self.notices)
    }

    pub fn has_in_flight(&self) -> bool {
        self.store.has_in_flight()
    }

    fn poll_subscription(&mut self) {
        let Some(sub) = &self.subscription else {
            return;
        };
        // A disconnected feed is a silent degradation: the delayed
        // post-mutation refetch still covers divergence.
        if sub.drain() == 0 {
            return;
        }
        if let Some(pipeline_id) = self.pipeline.as_ref().map(|p| p.id) {
            if self.store.has_in_flight() {
                debug!("change notice during in-flight mutation; deferring refetch");
                self.refetch_deferred = true;
            } else {
                self.spawn_fetch(pipeline_id, false);
            }
        }
    }

    fn handle(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Settled {
                ticket_id,
                label,
                outcome,
            } => self.handle_settlement(ticket_id, label, outcome),
            EngineMsg::ReconcileDue { pipeline_id } => {
                if self.pipeline.as_ref().map(|p| p.id) != Some(pipeline_id) {
                    return;
                }
                if self.store.has_in_flight() {
                    self.refetch_deferred = true;
                } else {
                    self.spawn_fetch(pipeline_id, false);
                }
            }
            EngineMsg::FetchDone {
                pipeline_id,
                initial,
                outcome,
            } => self.handle_fetch(pipeline_id, initial, outcome),
        }
    }

    fn handle_settlement(
        &mut self,
        ticket_id: Uuid,
        label: &'static str,
        outcome: Result<Lead, RemoteError>,
    ) {
        match outcome {
            Ok(settled) => {
                if let Err(err) = self.store.settle_success(ticket_id, &settled) {
                    warn!(%ticket_id, error = %err, "success settlement dropped");
                    return;
                }
                let message = match label {
                    "move" => "Lead moved",
                    _ => "Lead assignment saved",
                };
                self.notices.push(Notice::success(message));
                // Re-validate lazily rather than refetching immediately, so
                // the settled card does not visually revert while derived
                // caches on the server side catch up.
                self.schedule_reconcile();
            }
            Err(err) => {
                if let Err(settle_err) = self.store.settle_failure(ticket_id) {
                    warn!(%ticket_id, error = %settle_err, "failure settlement dropped");
                    return;
                }
                warn!(error = %err, label, "mutation rejected by remote; rolled back");
                let verb = match label {
                    "move" => "Move",
                    _ => "Assignment",
                };
                self.notices
                    .push(Notice::error(format!("{verb} failed: {err}. Change undone.")));
            }
        }
    }

    fn handle_fetch(
        &mut self,
        pipeline_id: Uuid,
        initial: bool,
        outcome: Result<LeadsByStage, RemoteError>,
    ) {
        // A fetch for a pipeline the user has already navigated away from.
        if self.pipeline.as_ref().map(|p| p.id) != Some(pipeline_id) {
            return;
        }
        match outcome {
            Ok(grouping) => {
                if self.store.has_in_flight() {
                    // Applying now would stomp optimistic state; try again
                    // after settlement.
                    self.refetch_deferred = true;
                    return;
                }
                self.store.replace(grouping);
                if initial {
                    self.phase = BoardPhase::Ready;
                    self.persist_last_pipeline(pipeline_id);
                }
                debug!(%pipeline_id, initial, leads = self.store.total_leads(), "working set refreshed");
            }
            Err(err) => {
                if initial {
                    self.phase = BoardPhase::LoadFailed(err.to_string());
                    self.notices
                        .push(Notice::error(format!("Could not load pipeline: {err}")));
                } else {
                    // Background reconciliation is best-effort.
                    warn!(error = %err, "background refetch failed");
                }
            }
        }
    }

    fn spawn_fetch(&self, pipeline_id: Uuid, initial: bool) {
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = remote.fetch_leads_by_stage(pipeline_id).await;
            let _ = tx.send(EngineMsg::FetchDone {
                pipeline_id,
                initial,
                outcome,
            });
        });
    }

    fn schedule_reconcile(&self) {
        let Some(pipeline_id) = self.pipeline.as_ref().map(|p| p.id) else {
            return;
        };
        let tx = self.tx.clone();
        let delay = Duration::from_millis(self.board_cfg.reconcile_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineMsg::ReconcileDue { pipeline_id });
        });
    }

    fn persist_last_pipeline(&self, pipeline_id: Uuid) {
        if let Some(prefs) = &self.prefs {
            if let Err(err) = prefs.set(LAST_PIPELINE_KEY, &pipeline_id.to_string()) {
                warn!(error = %err, "failed to persist pipeline preference");
            }
        }
    }
}
