use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Stage / Pipeline
// ---------------------------------------------------------------------------

/// A named, ordered column of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub name: String,
    /// Display color as a hex string (e.g. "#4f8cc9").
    pub color: String,
    /// Position within the pipeline; stages form a total order.
    pub position: u32,
    /// Win probability in percent attached to this stage.
    pub probability: u8,
}

impl Stage {
    pub fn new(name: impl Into<String>, position: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: "#888888".to_string(),
            position,
            probability: 0,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_probability(mut self, probability: u8) -> Self {
        self.probability = probability;
        self
    }
}

/// An ordered collection of stages through which leads progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_default: false,
            stages: Vec::new(),
        }
    }

    /// Append a stage, keeping the stage list sorted by position.
    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
        self.stages.sort_by_key(|s| s.position);
    }

    pub fn stage(&self, id: Uuid) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_ids(&self) -> Vec<Uuid> {
        self.stages.iter().map(|s| s.id).collect()
    }
}

// ---------------------------------------------------------------------------
// UserSummary
// ---------------------------------------------------------------------------

/// Denormalized assignee display data, returned by the remote store so the
/// UI can render an assignment without a second round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}

impl UserSummary {
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            email: email.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A prospect record owned by exactly one stage of one pipeline at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Origin channel the lead arrived through (e.g. "webform", "referral").
    pub origin: Option<String>,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_user: Option<UserSummary>,
    pub score: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(pipeline_id: Uuid, stage_id: Uuid, full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            stage_id,
            full_name: full_name.into(),
            email: None,
            phone: None,
            origin: None,
            assigned_user_id: None,
            assigned_user: None,
            score: 0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_score(mut self, score: i32) -> Self {
        self.score = score;
        self
    }

    /// Bump the last-interaction timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Set the assignment fields (both the id and the denormalized record).
    pub fn set_assignee(&mut self, user: Option<UserSummary>) {
        self.assigned_user_id = user.as_ref().map(|u| u.id);
        self.assigned_user = user;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// LeadsByStage
// ---------------------------------------------------------------------------

/// The stage-grouped working set: `stage_id -> leads`, each list ordered
/// most-recent-interaction first.
///
/// Every stage of the pipeline keeps a key here even when its list is empty,
/// so column rendering stays stable. Reads hand out slices; all mutation goes
/// through the optimistic store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadsByStage {
    groups: HashMap<Uuid, Vec<Lead>>,
}

impl LeadsByStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an empty grouping with a key for every given stage.
    pub fn with_stages(stage_ids: &[Uuid]) -> Self {
        let mut groups = HashMap::new();
        for id in stage_ids {
            groups.insert(*id, Vec::new());
        }
        Self { groups }
    }

    /// Ensure a key exists for `stage_id`.
    pub fn ensure_stage(&mut self, stage_id: Uuid) {
        self.groups.entry(stage_id).or_default();
    }

    pub fn stage(&self, stage_id: Uuid) -> &[Lead] {
        self.groups.get(&stage_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.groups.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &[Lead])> + '_ {
        self.groups.iter().map(|(id, leads)| (*id, leads.as_slice()))
    }

    /// Total lead count across all stages.
    pub fn total_leads(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// The stage currently holding `lead_id`, found by scanning the grouping.
    pub fn stage_of(&self, lead_id: Uuid) -> Option<Uuid> {
        self.groups
            .iter()
            .find(|(_, leads)| leads.iter().any(|l| l.id == lead_id))
            .map(|(id, _)| *id)
    }

    pub fn find(&self, lead_id: Uuid) -> Option<&Lead> {
        self.groups
            .values()
            .flat_map(|leads| leads.iter())
            .find(|l| l.id == lead_id)
    }

    pub fn find_mut(&mut self, lead_id: Uuid) -> Option<&mut Lead> {
        self.groups
            .values_mut()
            .flat_map(|leads| leads.iter_mut())
            .find(|l| l.id == lead_id)
    }

    /// Remove `lead_id` from whichever stage list holds it.
    pub fn remove(&mut self, lead_id: Uuid) -> Option<Lead> {
        for leads in self.groups.values_mut() {
            if let Some(pos) = leads.iter().position(|l| l.id == lead_id) {
                return Some(leads.remove(pos));
            }
        }
        None
    }

    /// Prepend a lead to a stage list (most recent interaction goes first).
    pub fn prepend(&mut self, stage_id: Uuid, lead: Lead) {
        self.groups.entry(stage_id).or_default().insert(0, lead);
    }

    /// Append a lead to the tail of a stage list (used when seeding).
    pub fn push(&mut self, stage_id: Uuid, lead: Lead) {
        self.groups.entry(stage_id).or_default().push(lead);
    }
}
