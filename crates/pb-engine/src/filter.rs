use chrono::{DateTime, TimeZone, Utc};
use pb_core::types::{Lead, LeadsByStage};
use uuid::Uuid;

/// A disposable, derived view over the working set.
///
/// Filters compose as a conjunction, so their order never affects the result,
/// and applying the same configuration twice yields identical output. The
/// canonical grouping is never touched; `apply` allocates a fresh view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    /// Free-text query; whitespace-separated terms are ANDed, each term may
    /// match any of {full name, email, phone, origin}.
    pub query: String,
    pub only_unassigned: bool,
    pub created_today: bool,
    /// Updated within the last 24 hours.
    pub recently_updated: bool,
    /// Restrict to one stage; other stage keys stay present with empty lists
    /// so column rendering does not shift.
    pub stage: Option<Uuid>,
}

impl LeadFilter {
    /// True when no filter is active and `apply` would be the identity.
    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
            && !self.only_unassigned
            && !self.created_today
            && !self.recently_updated
            && self.stage.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Produce the filtered view. `now` is explicit so date comparisons are
    /// deterministic; its timezone defines "today" for `created_today`.
    pub fn apply<Tz: TimeZone>(&self, leads: &LeadsByStage, now: &DateTime<Tz>) -> LeadsByStage {
        let terms: Vec<String> = fold(&self.query)
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut out = LeadsByStage::new();
        for (stage_id, stage_leads) in leads.iter() {
            out.ensure_stage(stage_id);
            if self.stage.is_some_and(|only| only != stage_id) {
                continue;
            }
            for lead in stage_leads {
                if self.matches(lead, &terms, now) {
                    out.push(stage_id, lead.clone());
                }
            }
        }
        out
    }

    fn matches<Tz: TimeZone>(&self, lead: &Lead, terms: &[String], now: &DateTime<Tz>) -> bool {
        if self.only_unassigned && lead.assigned_user_id.is_some() {
            return false;
        }
        if self.created_today {
            let lead_day = lead.created_at.with_timezone(&now.timezone()).date_naive();
            if lead_day != now.date_naive() {
                return false;
            }
        }
        if self.recently_updated {
            let age = now.with_timezone(&Utc) - lead.updated_at;
            if age > chrono::Duration::hours(24) {
                return false;
            }
        }
        if terms.is_empty() {
            return true;
        }

        let haystacks = [
            Some(fold(&lead.full_name)),
            lead.email.as_deref().map(fold),
            lead.phone.as_deref().map(fold),
            lead.origin.as_deref().map(fold),
        ];
        // AND across terms, OR across fields per term.
        terms.iter().all(|term| {
            haystacks
                .iter()
                .flatten()
                .any(|field| field.contains(term.as_str()))
        })
    }
}

/// Case- and diacritic-insensitive normalization for substring matching.
/// Covers the Latin-1 / Latin Extended-A accents that show up in contact
/// names; anything else passes through lowercased.
fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' | 'ă' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' => 'e',
            'í' | 'ì' | 'î' | 'ï' | 'ī' | 'į' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'ū' | 'ů' => 'u',
            'ñ' | 'ń' => 'n',
            'ç' | 'ć' | 'č' => 'c',
            'ý' | 'ÿ' => 'y',
            'š' | 'ś' => 's',
            'ž' | 'ź' | 'ż' => 'z',
            'ł' => 'l',
            'đ' => 'd',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pb_core::types::Lead;

    fn grouping() -> (LeadsByStage, Uuid, Uuid) {
        let stage_a = Uuid::new_v4();
        let stage_b = Uuid::new_v4();
        let pipeline = Uuid::new_v4();
        let mut g = LeadsByStage::with_stages(&[stage_a, stage_b]);
        g.push(
            stage_a,
            Lead::new(pipeline, stage_a, "Ana López").with_email("ana@acme.io"),
        );
        g.push(
            stage_a,
            Lead::new(pipeline, stage_a, "Ana García").with_origin("referral"),
        );
        g.push(
            stage_b,
            Lead::new(pipeline, stage_b, "Bob Chen").with_phone("+1 555 0100"),
        );
        (g, stage_a, stage_b)
    }

    #[test]
    fn all_terms_must_match_across_any_field() {
        let (g, stage_a, _) = grouping();
        let filter = LeadFilter {
            query: "ana lopez".into(),
            ..Default::default()
        };
        let view = filter.apply(&g, &Utc::now());
        let names: Vec<_> = view.stage(stage_a).iter().map(|l| l.full_name.as_str()).collect();
        assert_eq!(names, ["Ana López"]);
    }

    #[test]
    fn term_may_match_phone_or_origin() {
        let (g, stage_a, stage_b) = grouping();
        let by_phone = LeadFilter {
            query: "555".into(),
            ..Default::default()
        };
        let view = by_phone.apply(&g, &Utc::now());
        assert_eq!(view.stage(stage_b).len(), 1);
        assert!(view.stage(stage_a).is_empty());

        let by_origin = LeadFilter {
            query: "referral".into(),
            ..Default::default()
        };
        let view = by_origin.apply(&g, &Utc::now());
        assert_eq!(view.stage(stage_a).len(), 1);
    }

    #[test]
    fn stage_restriction_keeps_empty_keys() {
        let (g, stage_a, stage_b) = grouping();
        let filter = LeadFilter {
            stage: Some(stage_b),
            ..Default::default()
        };
        let view = filter.apply(&g, &Utc::now());
        assert_eq!(view.stage_ids().count(), 2);
        assert!(view.stage(stage_a).is_empty());
        assert_eq!(view.stage(stage_b).len(), 1);
    }

    #[test]
    fn only_unassigned_drops_assigned_leads() {
        let (mut g, stage_a, _) = grouping();
        let user = pb_core::types::UserSummary::new("Sam", "sam@acme.io");
        g.find_mut(g.stage(stage_a)[0].id).unwrap().set_assignee(Some(user));

        let filter = LeadFilter {
            only_unassigned: true,
            ..Default::default()
        };
        let view = filter.apply(&g, &Utc::now());
        assert_eq!(view.total_leads(), 2);
    }

    #[test]
    fn created_today_uses_local_day_boundaries() {
        let (mut g, stage_a, _) = grouping();
        let id = g.stage(stage_a)[0].id;
        g.find_mut(id).unwrap().created_at = Utc::now() - Duration::days(2);

        let filter = LeadFilter {
            created_today: true,
            ..Default::default()
        };
        let view = filter.apply(&g, &Utc::now());
        assert_eq!(view.total_leads(), 2);
        assert!(view.find(id).is_none());
    }

    #[test]
    fn recently_updated_is_a_24h_cutoff() {
        let (mut g, stage_a, _) = grouping();
        let id = g.stage(stage_a)[0].id;
        g.find_mut(id).unwrap().updated_at = Utc::now() - Duration::hours(30);

        let filter = LeadFilter {
            recently_updated: true,
            ..Default::default()
        };
        let view = filter.apply(&g, &Utc::now());
        assert!(view.find(id).is_none());
        assert_eq!(view.total_leads(), 2);
    }

    #[test]
    fn idempotent_and_order_independent() {
        let (g, _, _) = grouping();
        let now = Utc::now();
        let filter = LeadFilter {
            query: "ana".into(),
            only_unassigned: true,
            created_today: true,
            ..Default::default()
        };

        let once = filter.apply(&g, &now);
        let twice = filter.apply(&once, &now);
        assert_eq!(once, twice);

        // Conjunction order cannot matter: applying the sub-filters in
        // sequence equals applying them combined.
        let unassigned_first = LeadFilter {
            only_unassigned: true,
            ..Default::default()
        }
        .apply(&g, &now);
        let then_created = LeadFilter {
            created_today: true,
            ..Default::default()
        }
        .apply(&unassigned_first, &now);

        let created_first = LeadFilter {
            created_today: true,
            ..Default::default()
        }
        .apply(&g, &now);
        let then_unassigned = LeadFilter {
            only_unassigned: true,
            ..Default::default()
        }
        .apply(&created_first, &now);

        assert_eq!(then_created, then_unassigned);
    }

    #[test]
    fn empty_filter_is_identity() {
        let (g, _, _) = grouping();
        let filter = LeadFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&g, &Utc::now()), g);
    }

    #[test]
    fn folding_is_accent_insensitive_both_ways() {
        let (g, stage_a, _) = grouping();
        let accented_query = LeadFilter {
            query: "lópez".into(),
            ..Default::default()
        };
        let view = accented_query.apply(&g, &Utc::now());
        assert_eq!(view.stage(stage_a).len(), 1);
    }
}
