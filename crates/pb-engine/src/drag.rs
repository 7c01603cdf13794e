use std::time::{Duration, Instant};

use pb_core::config::BoardConfig;
use tracing::debug;
use uuid::Uuid;

use crate::geom::{Point, Rect};

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// Drag behaviour knobs, lifted from [`BoardConfig`].
#[derive(Debug, Clone)]
pub struct DragTuning {
    /// Pointer travel required before a pressed card starts dragging.
    pub activation_distance: f32,
    /// Width of the autopan band along the board's left/right edges.
    pub edge_px: f32,
    /// Scroll speed at the outer rim of the band.
    pub min_speed: f32,
    /// Scroll speed at the edge itself.
    pub max_speed: f32,
    /// Scroll proximity to the board start/end that triggers window paging.
    pub edge_page_px: f32,
    /// Minimum interval between window page flips during one gesture.
    pub page_cooldown: Duration,
}

impl DragTuning {
    pub fn from_config(cfg: &BoardConfig) -> Self {
        Self {
            activation_distance: cfg.activation_distance,
            edge_px: cfg.autopan_edge_px,
            min_speed: cfg.autopan_min_speed,
            max_speed: cfg.autopan_max_speed,
            edge_page_px: cfg.edge_page_px,
            page_cooldown: Duration::from_millis(cfg.edge_page_cooldown_ms),
        }
    }
}

impl Default for DragTuning {
    fn default() -> Self {
        Self::from_config(&BoardConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Host-facing geometry and outputs
// ---------------------------------------------------------------------------

/// A candidate drop target: one stage column's droppable area.
#[derive(Debug, Clone, Copy)]
pub struct DropZone {
    pub stage_id: Uuid,
    pub rect: Rect,
}

/// Geometry of the board at one pointer event, supplied by the host. Zones
/// reflect what is rendered *now* — a target that was paged or resized away
/// simply is not in the list, which is how stale targets resolve to "no
/// target".
#[derive(Debug, Clone, Copy)]
pub struct BoardView<'a> {
    pub zones: &'a [DropZone],
    /// The scrollable board area.
    pub viewport: Rect,
    /// Current horizontal scroll offset within the board content.
    pub scroll_x: f32,
    /// Maximum horizontal scroll offset (content width minus viewport).
    pub scroll_max: f32,
    /// Stages exist before/after the currently visible window.
    pub more_before: bool,
    pub more_after: bool,
}

/// Side effects the host must apply. The coordinator never touches scroll or
/// window state itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragEffect {
    /// Freeze page-level scrolling for the duration of the gesture.
    FreezePageScroll,
    /// Undo [`DragEffect::FreezePageScroll`].
    RestorePageScroll,
    /// Scroll the board horizontally by this many pixels (negative = left).
    ScrollBy(f32),
    /// Page the stage window to expose earlier/later stages.
    PagePrev,
    PageNext,
}

/// The single mutation intent a completed gesture can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub lead_id: Uuid,
    pub dest_stage_id: Uuid,
}

// ---------------------------------------------------------------------------
// Session & state machine
// ---------------------------------------------------------------------------

/// Ephemeral per-gesture state. Created when the activation threshold is
/// crossed, destroyed when the gesture ends; there is no ambient drag state
/// outside this value.
#[derive(Debug, Clone)]
pub struct DragSession {
    pub dragged_lead_id: Uuid,
    pub source_stage_id: Uuid,
    pub pointer: Point,
    /// Last time autopan paged the stage window; throttles page flips.
    pub last_autopan_at: Option<Instant>,
    grab_offset: Point,
    card_size: (f32, f32),
}

impl DragSession {
    /// The dragged card's current bounding box, following the pointer with
    /// the grab offset captured at press time.
    pub fn card_rect(&self) -> Rect {
        Rect::new(
            self.pointer.x - self.grab_offset.x,
            self.pointer.y - self.grab_offset.y,
            self.card_size.0,
            self.card_size.1,
        )
    }
}

#[derive(Debug)]
enum State {
    Idle,
    /// Pressed on a card but not yet past the activation threshold.
    Armed {
        lead_id: Uuid,
        source_stage_id: Uuid,
        origin: Point,
        card: Rect,
    },
    Dragging(DragSession),
}

/// Resolves the current drop target from the dragged card's box, the
/// pointer, and the candidate zones. Swappable so hosts with different hit
/// semantics can plug their own.
pub type CollisionStrategy = fn(card: Rect, pointer: Point, zones: &[DropZone]) -> Option<Uuid>;

/// Per-gesture drag state machine: `Idle → Armed → Dragging → Idle`.
///
/// Toolkit-agnostic by design — any pointer-event source feeds
/// `pointer_down` / `pointer_move` / `pointer_up` / `cancel`. Target
/// detection defaults to [`two_phase_collision`]: geometric overlap between
/// the dragged card and each drop zone first, pointer containment as the
/// fallback so fast motion near a boundary still resolves.
pub struct DragCoordinator {
    state: State,
    tuning: DragTuning,
    collision: CollisionStrategy,
}

impl DragCoordinator {
    pub fn new(tuning: DragTuning) -> Self {
        Self {
            state: State::Idle,
            tuning,
            collision: two_phase_collision,
        }
    }

    /// Replace the default collision strategy.
    pub fn with_collision(mut self, strategy: CollisionStrategy) -> Self {
        self.collision = strategy;
        self
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, State::Dragging(_))
    }

    pub fn session(&self) -> Option<&DragSession> {
        match &self.state {
            State::Dragging(session) => Some(session),
            _ => None,
        }
    }

    /// Press on a card. `card` is the card's rendered rect, used for the
    /// grab offset and for overlap-based target detection while dragging.
    pub fn pointer_down(&mut self, lead_id: Uuid, source_stage_id: Uuid, at: Point, card: Rect) {
        if matches!(self.state, State::Idle) {
            self.state = State::Armed {
                lead_id,
                source_stage_id,
                origin: at,
                card,
            };
        }
    }

    pub fn pointer_move(&mut self, at: Point, view: &BoardView) -> Vec<DragEffect> {
        match &mut self.state {
            State::Idle => Vec::new(),
            State::Armed {
                lead_id,
                source_stage_id,
                origin,
                card,
            } => {
                if at.distance_to(*origin) < self.tuning.activation_distance {
                    return Vec::new();
                }
                let mut session = DragSession {
                    dragged_lead_id: *lead_id,
                    source_stage_id: *source_stage_id,
                    pointer: at,
                    last_autopan_at: None,
                    grab_offset: Point::new(origin.x - card.x, origin.y - card.y),
                    card_size: (card.w, card.h),
                };
                debug!(lead_id = %session.dragged_lead_id, "drag started");
                let mut effects = vec![DragEffect::FreezePageScroll];
                effects.extend(autopan(&mut session, &self.tuning, view));
                self.state = State::Dragging(session);
                effects
            }
            State::Dragging(session) => {
                session.pointer = at;
                autopan(session, &self.tuning, view)
            }
        }
    }

    /// Release. Returns the move intent (if the pointer sits over a valid
    /// target other than the source stage) plus the teardown effects.
    pub fn pointer_up(&mut self, at: Point, view: &BoardView) -> (Option<MoveIntent>, Vec<DragEffect>) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle | State::Armed { .. } => (None, Vec::new()),
            State::Dragging(mut session) => {
                session.pointer = at;
                let target = (self.collision)(session.card_rect(), at, view.zones);
                let intent = match target {
                    Some(stage_id) if stage_id != session.source_stage_id => Some(MoveIntent {
                        lead_id: session.dragged_lead_id,
                        dest_stage_id: stage_id,
                    }),
                    _ => None,
                };
                debug!(
                    lead_id = %session.dragged_lead_id,
                    moved = intent.is_some(),
                    "drag ended"
                );
                (intent, vec![DragEffect::RestorePageScroll])
            }
        }
    }

    /// Abort the gesture (escape, focus loss). Never produces a mutation.
    pub fn cancel(&mut self) -> Vec<DragEffect> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Dragging(session) => {
                debug!(lead_id = %session.dragged_lead_id, "drag cancelled");
                vec![DragEffect::RestorePageScroll]
            }
            _ => Vec::new(),
        }
    }

    /// The stage the card would drop onto right now (for host highlighting).
    pub fn target_under(&self, view: &BoardView) -> Option<Uuid> {
        let session = self.session()?;
        (self.collision)(session.card_rect(), session.pointer, view.zones)
    }
}

// ---------------------------------------------------------------------------
// Collision & autopan
// ---------------------------------------------------------------------------

/// Two-phase target resolution: largest card/zone overlap first, pointer
/// containment as the fallback.
pub fn two_phase_collision(card: Rect, pointer: Point, zones: &[DropZone]) -> Option<Uuid> {
    let mut best: Option<(Uuid, f32)> = None;
    for zone in zones {
        let area = card.intersect_area(zone.rect);
        if area > 0.0 && best.map_or(true, |(_, b)| area > b) {
            best = Some((zone.stage_id, area));
        }
    }
    if let Some((stage_id, _)) = best {
        return Some(stage_id);
    }
    zones.iter().find(|z| z.rect.contains(pointer)).map(|z| z.stage_id)
}

/// Edge-proximity scrolling with a linear speed ramp, plus window paging
/// when the board is already scrolled to its limit and more stages exist
/// beyond the visible window.
fn autopan(session: &mut DragSession, tuning: &DragTuning, view: &BoardView) -> Vec<DragEffect> {
    let mut effects = Vec::new();
    let left_dist = (session.pointer.x - view.viewport.x).max(0.0);
    let right_dist = (view.viewport.right() - session.pointer.x).max(0.0);

    let ramp = |dist: f32| {
        let t = (dist / tuning.edge_px).clamp(0.0, 1.0);
        tuning.max_speed - (tuning.max_speed - tuning.min_speed) * t
    };

    if left_dist <= tuning.edge_px {
        effects.push(DragEffect::ScrollBy(-ramp(left_dist)));
        if view.scroll_x <= tuning.edge_page_px
            && view.more_before
            && page_cooldown_elapsed(session, tuning)
        {
            session.last_autopan_at = Some(Instant::now());
            effects.push(DragEffect::PagePrev);
        }
    } else if right_dist <= tuning.edge_px {
        effects.push(DragEffect::ScrollBy(ramp(right_dist)));
        if view.scroll_max - view.scroll_x <= tuning.edge_page_px
            && view.more_after
            && page_cooldown_elapsed(session, tuning)
        {
            session.last_autopan_at = Some(Instant::now());
            effects.push(DragEffect::PageNext);
        }
    }
    effects
}

fn page_cooldown_elapsed(session: &DragSession, tuning: &DragTuning) -> bool {
    session
        .last_autopan_at
        .map_or(true, |at| at.elapsed() >= tuning.page_cooldown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> DragTuning {
        DragTuning {
            activation_distance: 6.0,
            edge_px: 150.0,
            min_speed: 5.0,
            max_speed: 30.0,
            edge_page_px: 100.0,
            page_cooldown: Duration::from_millis(0),
        }
    }

    fn zones(stage_a: Uuid, stage_b: Uuid) -> Vec<DropZone> {
        vec![
            DropZone {
                stage_id: stage_a,
                rect: Rect::new(0.0, 0.0, 300.0, 600.0),
            },
            DropZone {
                stage_id: stage_b,
                rect: Rect::new(300.0, 0.0, 300.0, 600.0),
            },
        ]
    }

    fn view(zones: &[DropZone]) -> BoardView<'_> {
        BoardView {
            zones,
            viewport: Rect::new(0.0, 0.0, 600.0, 600.0),
            scroll_x: 250.0,
            scroll_max: 500.0,
            more_before: false,
            more_after: false,
        }
    }

    fn start_drag(coord: &mut DragCoordinator, lead: Uuid, source: Uuid, view: &BoardView) {
        coord.pointer_down(lead, source, Point::new(50.0, 50.0), Rect::new(40.0, 40.0, 100.0, 40.0));
        coord.pointer_move(Point::new(200.0, 60.0), view);
        assert!(coord.is_dragging());
    }

    #[test]
    fn small_movement_does_not_activate() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());

        coord.pointer_down(Uuid::new_v4(), a, Point::new(50.0, 50.0), Rect::new(40.0, 40.0, 100.0, 40.0));
        let effects = coord.pointer_move(Point::new(52.0, 51.0), &view);

        assert!(effects.is_empty());
        assert!(!coord.is_dragging());
    }

    #[test]
    fn activation_freezes_page_scroll() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());

        coord.pointer_down(Uuid::new_v4(), a, Point::new(50.0, 50.0), Rect::new(40.0, 40.0, 100.0, 40.0));
        let effects = coord.pointer_move(Point::new(200.0, 60.0), &view);

        assert!(effects.contains(&DragEffect::FreezePageScroll));
        assert!(coord.is_dragging());
    }

    #[test]
    fn drop_on_other_stage_emits_one_intent() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let lead = Uuid::new_v4();
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, lead, a, &view);

        let (intent, effects) = coord.pointer_up(Point::new(450.0, 100.0), &view);

        assert_eq!(
            intent,
            Some(MoveIntent {
                lead_id: lead,
                dest_stage_id: b
            })
        );
        assert!(effects.contains(&DragEffect::RestorePageScroll));
        assert!(!coord.is_dragging());
    }

    #[test]
    fn drop_on_source_stage_emits_nothing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, Uuid::new_v4(), a, &view);

        let (intent, effects) = coord.pointer_up(Point::new(100.0, 100.0), &view);

        assert_eq!(intent, None);
        assert!(effects.contains(&DragEffect::RestorePageScroll));
    }

    #[test]
    fn drop_outside_any_zone_emits_nothing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, Uuid::new_v4(), a, &view);

        let (intent, _) = coord.pointer_up(Point::new(2000.0, 2000.0), &view);
        assert_eq!(intent, None);
    }

    #[test]
    fn stale_target_resolves_to_no_target() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones_full = zones(a, b);
        let view_full = view(&zones_full);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, Uuid::new_v4(), a, &view_full);

        // Stage b was resized/paged away before release.
        let zones_shrunk = &zones_full[..1];
        let view_shrunk = BoardView {
            zones: zones_shrunk,
            ..view_full
        };
        let (intent, _) = coord.pointer_up(Point::new(450.0, 100.0), &view_shrunk);
        assert_eq!(intent, None);
    }

    #[test]
    fn overlap_beats_pointer_containment() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        // Grab the card near its right edge: the pointer can sit in zone b
        // while most of the card still overlaps zone a.
        coord.pointer_down(
            Uuid::new_v4(),
            a,
            Point::new(295.0, 50.0),
            Rect::new(100.0, 40.0, 200.0, 40.0),
        );
        coord.pointer_move(Point::new(310.0, 60.0), &view);
        assert!(coord.is_dragging());

        assert_eq!(coord.target_under(&view), Some(a));
    }

    #[test]
    fn containment_fallback_when_card_overlaps_nothing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = vec![DropZone {
            stage_id: b,
            rect: Rect::new(300.0, 0.0, 300.0, 600.0),
        }];
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        // Grabbed just above the card body, so the card box trails below the
        // pointer for the whole gesture.
        coord.pointer_down(Uuid::new_v4(), a, Point::new(50.0, 30.0), Rect::new(40.0, 40.0, 100.0, 40.0));
        coord.pointer_move(Point::new(350.0, 595.0), &view);
        assert!(coord.is_dragging());

        // The trailing card box hangs fully below zone b, but the pointer is
        // inside it: containment resolves the target.
        assert_eq!(coord.target_under(&view), Some(b));
    }

    #[test]
    fn autopan_ramps_up_toward_the_edge() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, Uuid::new_v4(), a, &view);

        let speed_at = |coord: &mut DragCoordinator, x: f32| -> f32 {
            let effects = coord.pointer_move(Point::new(x, 100.0), &view);
            effects
                .iter()
                .find_map(|e| match e {
                    DragEffect::ScrollBy(v) => Some(*v),
                    _ => None,
                })
                .unwrap_or(0.0)
        };

        // Outside the band: no scrolling.
        assert_eq!(speed_at(&mut coord, 300.0), 0.0);

        let outer = speed_at(&mut coord, 460.0); // 140px from right edge
        let inner = speed_at(&mut coord, 590.0); // 10px from right edge
        assert!(outer > 0.0);
        assert!(inner > outer, "speed must increase toward the edge: {inner} vs {outer}");
        assert!(inner <= 30.0);

        let left = speed_at(&mut coord, 5.0);
        assert!(left < 0.0, "left-edge autopan scrolls negative");
    }

    #[test]
    fn edge_paging_requires_scroll_limit_and_more_stages() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let base = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, Uuid::new_v4(), a, &base);

        // Near the right edge but mid-scroll: no page flip.
        let effects = coord.pointer_move(Point::new(590.0, 100.0), &base);
        assert!(!effects.contains(&DragEffect::PageNext));

        // Scrolled to the end with more stages beyond the window: page.
        let at_end = BoardView {
            scroll_x: 450.0,
            more_after: true,
            ..base
        };
        let effects = coord.pointer_move(Point::new(590.0, 100.0), &at_end);
        assert!(effects.contains(&DragEffect::PageNext));

        // Same position without further stages: no page flip.
        let exhausted = BoardView {
            scroll_x: 450.0,
            more_after: false,
            ..base
        };
        let effects = coord.pointer_move(Point::new(590.0, 100.0), &exhausted);
        assert!(!effects.contains(&DragEffect::PageNext));

        // Left side mirrors the behaviour.
        let at_start = BoardView {
            scroll_x: 50.0,
            more_before: true,
            ..base
        };
        let effects = coord.pointer_move(Point::new(5.0, 100.0), &at_start);
        assert!(effects.contains(&DragEffect::PagePrev));
    }

    #[test]
    fn page_cooldown_throttles_flips() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let mut t = tuning();
        t.page_cooldown = Duration::from_secs(60);
        let base = BoardView {
            scroll_x: 450.0,
            more_after: true,
            ..view(&zones)
        };
        let mut coord = DragCoordinator::new(t);
        start_drag(&mut coord, Uuid::new_v4(), a, &base);

        let first = coord.pointer_move(Point::new(590.0, 100.0), &base);
        assert!(first.contains(&DragEffect::PageNext));
        let second = coord.pointer_move(Point::new(590.0, 100.0), &base);
        assert!(!second.contains(&DragEffect::PageNext));
    }

    #[test]
    fn cancel_produces_no_intent_and_restores_scroll() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());
        start_drag(&mut coord, Uuid::new_v4(), a, &view);

        let effects = coord.cancel();
        assert_eq!(effects, vec![DragEffect::RestorePageScroll]);
        assert!(!coord.is_dragging());

        // A release after cancel is inert.
        let (intent, effects) = coord.pointer_up(Point::new(450.0, 100.0), &view);
        assert_eq!(intent, None);
        assert!(effects.is_empty());
    }

    #[test]
    fn custom_collision_strategy_is_honored() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        // A strategy that only ever accepts the last zone.
        fn last_zone(_card: Rect, _pointer: Point, zones: &[DropZone]) -> Option<Uuid> {
            zones.last().map(|z| z.stage_id)
        }
        let mut coord = DragCoordinator::new(tuning()).with_collision(last_zone);
        start_drag(&mut coord, Uuid::new_v4(), a, &view);

        // Released over zone a, but the strategy says b.
        let (intent, _) = coord.pointer_up(Point::new(100.0, 100.0), &view);
        assert_eq!(intent.map(|i| i.dest_stage_id), Some(b));
    }

    #[test]
    fn release_while_armed_is_a_click_not_a_drag() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let zones = zones(a, b);
        let view = view(&zones);
        let mut coord = DragCoordinator::new(tuning());

        coord.pointer_down(Uuid::new_v4(), a, Point::new(50.0, 50.0), Rect::new(40.0, 40.0, 100.0, 40.0));
        let (intent, effects) = coord.pointer_up(Point::new(51.0, 50.0), &view);

        assert_eq!(intent, None);
        assert!(effects.is_empty());
    }
}
