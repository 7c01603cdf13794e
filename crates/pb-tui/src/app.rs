use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use pb_core::config::{BoardConfig, Config};
use pb_core::prefs::PrefStore;
use pb_core::types::{Lead, Pipeline, Stage, UserSummary};
use pb_engine::{BoardEngine, BoardView, DragEffect, DropZone, Point, Rect};
use pb_remote::MemoryLeadStore;
use uuid::Uuid;

use crate::widgets::toast::ToastManager;

// ---------------------------------------------------------------------------
// Layout registry (rebuilt by the renderer each frame)
// ---------------------------------------------------------------------------

/// Geometry of the last rendered frame: the board area, one drop zone per
/// visible column, and every card's rect. Pointer events resolve against it.
#[derive(Default)]
pub struct BoardLayout {
    pub board_area: Rect,
    pub zones: Vec<DropZone>,
    pub cards: Vec<(Uuid, Rect)>,
}

impl BoardLayout {
    pub fn card_at(&self, at: Point) -> Option<(Uuid, Rect)> {
        self.cards.iter().copied().find(|(_, rect)| rect.contains(at))
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    pub engine: BoardEngine,
    pub remote: Arc<MemoryLeadStore>,
    pub pipelines: Vec<Pipeline>,
    pub users: Vec<UserSummary>,
    pub toasts: ToastManager,
    pub layout: BoardLayout,
    pub should_quit: bool,
    /// Editing the free-text filter query.
    pub input_mode: bool,
    /// Page-level scrolling is frozen while a drag is active.
    pub page_scroll_frozen: bool,
    pub scroll_x: f32,
    pub scroll_max: f32,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let (remote, pipelines, users) = demo_store();
        let current_user = users[0].clone();

        let mut tuned = config.clone();
        tuned.board = cell_tuning(&config.board);

        let mut engine = BoardEngine::new(remote.clone(), current_user, &tuned)
            .with_prefs(PrefStore::default_path());

        // Reopen the pipeline from the previous run when it still exists,
        // otherwise fall back to the default one.
        let initial = engine
            .last_pipeline_pref()
            .and_then(|id| pipelines.iter().find(|p| p.id == id))
            .or_else(|| pipelines.iter().find(|p| p.is_default))
            .or_else(|| pipelines.first())
            .cloned();
        if let Some(pipeline) = initial {
            engine.load_pipeline(pipeline);
        }

        Self {
            engine,
            remote,
            pipelines,
            users,
            toasts: ToastManager::new(Duration::from_secs(config.ui.toast_duration_secs)),
            layout: BoardLayout::default(),
            should_quit: false,
            input_mode: false,
            page_scroll_frozen: false,
            scroll_x: 0.0,
            scroll_max: 0.0,
        }
    }

    /// One event-loop turn: pump the engine and age out toasts.
    pub fn tick(&mut self) {
        for notice in self.engine.pump() {
            self.toasts.push(notice);
        }
        self.toasts.tick();
    }

    // -----------------------------------------------------------------------
    // Keyboard
    // -----------------------------------------------------------------------

    pub fn on_key(&mut self, key: KeyEvent) {
        if self.input_mode {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => self.input_mode = false,
                KeyCode::Backspace => {
                    self.engine.filter.query.pop();
                }
                KeyCode::Char(c) => self.engine.filter.query.push(c),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') => self.input_mode = true,
            KeyCode::Char('u') => {
                self.engine.filter.only_unassigned = !self.engine.filter.only_unassigned;
            }
            KeyCode::Char('t') => {
                self.engine.filter.created_today = !self.engine.filter.created_today;
            }
            KeyCode::Char('r') => {
                self.engine.filter.recently_updated = !self.engine.filter.recently_updated;
            }
            KeyCode::Char('c') => self.engine.filter.clear(),
            KeyCode::Left => self.engine.page_prev(),
            KeyCode::Right => self.engine.page_next(),
            KeyCode::Esc => {
                let effects = self.engine.cancel_drag();
                self.apply_effects(effects);
            }
            KeyCode::Char('x') => {
                // Pretend another client touched a lead server-side, to
                // watch the subscription-driven refetch happen.
                let first = self
                    .engine
                    .leads()
                    .iter()
                    .flat_map(|(_, leads)| leads.iter())
                    .next()
                    .map(|l| l.id);
                if let Some(lead_id) = first {
                    let _ = self.remote.simulate_external_update(lead_id);
                }
            }
            KeyCode::Char(c @ '1'..='9') => {
                let index = (c as usize) - ('1' as usize);
                if let Some(pipeline) = self.pipelines.get(index).cloned() {
                    tracing::info!(pipeline = %pipeline.name, "switching pipeline");
                    let effects = self.engine.cancel_drag();
                    self.apply_effects(effects);
                    self.engine.load_pipeline(pipeline);
                }
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Mouse
    // -----------------------------------------------------------------------

    pub fn on_mouse(&mut self, event: MouseEvent) {
        let at = Point::new(event.column as f32, event.row as f32);
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some((lead_id, card)) = self.layout.card_at(at) {
                    self.engine.pointer_down(lead_id, at, card);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let (more_before, more_after) = self.paging_flags();
                let view = BoardView {
                    zones: &self.layout.zones,
                    viewport: self.layout.board_area,
                    scroll_x: self.scroll_x,
                    scroll_max: self.scroll_max,
                    more_before,
                    more_after,
                };
                let effects = self.engine.pointer_move(at, &view);
                self.apply_effects(effects);
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let (more_before, more_after) = self.paging_flags();
                let view = BoardView {
                    zones: &self.layout.zones,
                    viewport: self.layout.board_area,
                    scroll_x: self.scroll_x,
                    scroll_max: self.scroll_max,
                    more_before,
                    more_after,
                };
                let effects = self.engine.pointer_up(at, &view);
                self.apply_effects(effects);
            }
            MouseEventKind::Down(MouseButton::Right) => {
                if let Some((lead_id, _)) = self.layout.card_at(at) {
                    self.cycle_assignee(lead_id);
                }
            }
            _ => {}
        }
    }

    fn paging_flags(&self) -> (bool, bool) {
        let window = self.engine.window();
        (
            window.can_prev(),
            window.can_next(self.engine.stage_count()),
        )
    }

    /// Read-only board view for the renderer (target highlighting).
    pub fn board_view(&self) -> BoardView<'_> {
        let (more_before, more_after) = self.paging_flags();
        BoardView {
            zones: &self.layout.zones,
            viewport: self.layout.board_area,
            scroll_x: self.scroll_x,
            scroll_max: self.scroll_max,
            more_before,
            more_after,
        }
    }

    fn apply_effects(&mut self, effects: Vec<DragEffect>) {
        for effect in effects {
            match effect {
                DragEffect::FreezePageScroll => self.page_scroll_frozen = true,
                DragEffect::RestorePageScroll => self.page_scroll_frozen = false,
                DragEffect::ScrollBy(dx) => {
                    self.scroll_x = (self.scroll_x + dx).clamp(0.0, self.scroll_max);
                }
                DragEffect::PagePrev => self.engine.page_prev(),
                DragEffect::PageNext => self.engine.page_next(),
            }
        }
    }

    /// Right-click cycles a card's assignee: unassigned -> each demo user ->
    /// unassigned.
    fn cycle_assignee(&mut self, lead_id: Uuid) {
        let current = self
            .engine
            .store()
            .lead(lead_id)
            .and_then(|l| l.assigned_user_id);
        let next = match current {
            None => self.users.first().cloned(),
            Some(id) => {
                let pos = self.users.iter().position(|u| u.id == id);
                pos.and_then(|i| self.users.get(i + 1)).cloned()
            }
        };
        self.engine.assign_lead(lead_id, next);
    }
}

// ---------------------------------------------------------------------------
// Tuning & demo data
// ---------------------------------------------------------------------------

/// The board defaults are tuned for pixel surfaces; a terminal cell is
/// roughly 30x coarser, so the gesture thresholds scale down accordingly.
fn cell_tuning(base: &BoardConfig) -> BoardConfig {
    let scale = 30.0;
    let mut cfg = base.clone();
    cfg.activation_distance = (base.activation_distance / scale).max(1.0);
    cfg.autopan_edge_px = (base.autopan_edge_px / scale).max(3.0);
    cfg.autopan_min_speed = (base.autopan_min_speed / scale).max(1.0);
    cfg.autopan_max_speed = (base.autopan_max_speed / scale).max(2.0);
    cfg.edge_page_px = (base.edge_page_px / scale).max(2.0);
    cfg
}

/// Seed an in-memory remote with two pipelines of demo leads. The store
/// answers with ~150ms of simulated latency so the optimistic path is
/// actually observable.
fn demo_store() -> (Arc<MemoryLeadStore>, Vec<Pipeline>, Vec<UserSummary>) {
    let store = MemoryLeadStore::new().with_latency(Duration::from_millis(150));

    let users = vec![
        UserSummary::new("Sam Field", "sam@pipeboard.dev"),
        UserSummary::new("Rin Okada", "rin@pipeboard.dev"),
    ];
    for user in &users {
        store.insert_user(user.clone());
    }

    let mut sales = Pipeline::new("Sales");
    sales.is_default = true;
    sales.add_stage(Stage::new("New", 0).with_color("#4f8cc9").with_probability(10));
    sales.add_stage(Stage::new("Contacted", 1).with_color("#c9a24f").with_probability(30));
    sales.add_stage(Stage::new("Qualified", 2).with_color("#9a4fc9").with_probability(55));
    sales.add_stage(Stage::new("Proposal", 3).with_color("#c94f72").with_probability(75));
    sales.add_stage(Stage::new("Won", 4).with_color("#4fc96a").with_probability(100));

    let mut onboarding = Pipeline::new("Onboarding");
    onboarding.add_stage(Stage::new("Signed up", 0).with_color("#4f8cc9"));
    onboarding.add_stage(Stage::new("Activated", 1).with_color("#c9a24f"));
    onboarding.add_stage(Stage::new("Retained", 2).with_color("#4fc96a"));

    let demo_leads = [
        ("Ana López", Some("ana@acme.io"), Some("+34 600 100 200"), "webform", 82),
        ("Bob Chen", Some("bob@nimbus.co"), None, "referral", 67),
        ("Carla Mendes", None, Some("+55 11 98000 1234"), "ads", 45),
        ("Dmitri Volkov", Some("d.volkov@orbit.ru"), None, "webform", 71),
        ("Erin O'Neill", Some("erin@harbor.ie"), Some("+353 85 123 4567"), "event", 58),
        ("Farid Haddad", None, None, "cold-call", 33),
    ];
    for (i, (name, email, phone, origin, score)) in demo_leads.iter().enumerate() {
        let stage = sales.stages[i % 3].id;
        let mut lead = Lead::new(sales.id, stage, *name)
            .with_origin(*origin)
            .with_score(*score);
        if let Some(email) = email {
            lead = lead.with_email(*email);
        }
        if let Some(phone) = phone {
            lead = lead.with_phone(*phone);
        }
        if i % 2 == 1 {
            lead.set_assignee(Some(users[i % users.len()].clone()));
        }
        store.insert_lead(lead);
    }

    let activated = onboarding.stages[1].id;
    store.insert_lead(
        Lead::new(onboarding.id, activated, "Greta Lindqvist").with_email("greta@fjord.se"),
    );

    store.insert_pipeline(sales.clone());
    store.insert_pipeline(onboarding.clone());

    (Arc::new(store), vec![sales, onboarding], users)
}
