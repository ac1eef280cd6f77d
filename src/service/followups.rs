//! The follow-up dispatcher: a single scan over due orders, routed to a
//! typed handler per order kind. Handlers are idempotent per order id; the
//! status update at the end suppresses re-execution.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Event, PressRelease};
use crate::press::{academic_gossip, GossipContext};
use crate::storage::OrderRow;

use super::expeditions::record_sidecast_memory;
use super::GameService;

/// Order kinds with dedicated digest steps; the generic dispatcher leaves
/// them alone.
const DEDICATED_KINDS: [&str; 3] = [
    "mentorship_activation",
    "conference_resolution",
    "symposium_vote_reminder",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum OrderKind {
    SymposiumReprimand,
    DefectionGrudge,
    DefectionReturn,
    RecruitmentGrudge,
    SidecastPhase(String),
    SidewaysVignette,
    EvaluateOffer,
    EvaluateCounter,
    Other(String),
}

impl OrderKind {
    fn parse(tag: &str) -> Self {
        if let Some(phase) = tag.strip_prefix("followup:sidecast_") {
            return OrderKind::SidecastPhase(phase.to_string());
        }
        match tag {
            "symposium_reprimand" => OrderKind::SymposiumReprimand,
            "defection_grudge" => OrderKind::DefectionGrudge,
            "defection_return" => OrderKind::DefectionReturn,
            "recruitment_grudge" => OrderKind::RecruitmentGrudge,
            "sideways_vignette" => OrderKind::SidewaysVignette,
            "evaluate_offer" => OrderKind::EvaluateOffer,
            "evaluate_counter" => OrderKind::EvaluateCounter,
            other => OrderKind::Other(other.to_string()),
        }
    }
}

impl GameService {
    /// Digest step: drain every due order the generic registry covers.
    pub(crate) fn resolve_followups(&mut self) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        let now = Utc::now();
        for order in self.store.fetch_all_due_orders(now)? {
            if DEDICATED_KINDS.contains(&order.order_type.as_str()) {
                continue;
            }
            let kind = OrderKind::parse(&order.order_type);
            let produced = match kind {
                OrderKind::SymposiumReprimand => self.handle_symposium_reprimand(&order)?,
                OrderKind::DefectionGrudge | OrderKind::DefectionReturn => {
                    self.handle_defection_epilogue(&order)?
                }
                OrderKind::RecruitmentGrudge => self.handle_recruitment_grudge(&order)?,
                OrderKind::SidecastPhase(phase) => self.handle_sidecast_phase(&order, &phase)?,
                OrderKind::SidewaysVignette => self.handle_sideways_vignette(&order)?,
                OrderKind::EvaluateOffer => self.handle_offer_evaluation(&order, "offer_id")?,
                OrderKind::EvaluateCounter => {
                    self.handle_offer_evaluation(&order, "counter_offer_id")?
                }
                OrderKind::Other(_) => self.handle_generic_followup(&order)?,
            };
            releases.extend(produced);
        }
        Ok(releases)
    }

    fn handle_symposium_reprimand(&mut self, order: &OrderRow) -> Result<Vec<PressRelease>> {
        let now = Utc::now();
        let payload = &order.payload;
        let player_id = payload
            .get("player_id")
            .and_then(Value::as_str)
            .or(order.actor_id.as_deref())
            .unwrap_or("unknown")
            .to_string();
        let display_name = payload
            .get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(self
                .store
                .get_player(&player_id)?
                .map(|p| p.display_name))
            .unwrap_or_else(|| player_id.clone());
        let faction = payload
            .get("faction")
            .and_then(Value::as_str)
            .unwrap_or("the Academy")
            .to_string();
        let penalty_influence = payload
            .get("penalty_influence")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let penalty_reputation = payload
            .get("penalty_reputation")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let reprisal_level = payload
            .get("reprisal_level")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let remaining = payload.get("remaining").and_then(Value::as_i64).unwrap_or(0);

        let mut impacts = Vec::new();
        if penalty_influence > 0 {
            impacts.push(format!("{penalty_influence} influence seized by {faction}"));
        }
        if penalty_reputation > 0 {
            impacts.push(format!("{penalty_reputation} reputation deducted"));
        }
        let impact_text = if impacts.is_empty() {
            "Public reprimand issued".to_string()
        } else {
            impacts.join("; ")
        };
        let press = PressRelease::new(
            "symposium_reprimand",
            format!("Symposium Reprimand: {display_name}"),
            format!(
                "{display_name} faces a symposium reprisal from {faction}. {impact_text}. \
                 Outstanding debt: {remaining}. Reprisal level now {reprisal_level}."
            ),
        )
        .with_metadata(json!({
            "player_id": player_id,
            "faction": faction,
            "reprisal_level": reprisal_level,
            "remaining": remaining,
            "penalty_influence": penalty_influence,
            "penalty_reputation": penalty_reputation,
        }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "symposium_reprimand",
            json!({
                "player": player_id,
                "faction": faction,
                "reprisal_level": reprisal_level,
                "remaining": remaining,
            }),
        ))?;
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": "symposium_reprimand" })),
        )?;
        Ok(vec![press])
    }

    /// Grudges fester and reconciliations bring a defector home to their
    /// prior patron.
    fn handle_defection_epilogue(&mut self, order: &OrderRow) -> Result<Vec<PressRelease>> {
        let now = Utc::now();
        let scholar_id = order.actor_id.clone().unwrap_or_default();
        let Some(mut scholar) = self.store.get_scholar(&scholar_id)? else {
            self.store.update_order_status(
                order.id,
                "cancelled",
                Some(&json!({ "reason": "scholar_missing" })),
            )?;
            return Ok(Vec::new());
        };
        let payload = &order.payload;
        let default_scenario = if order.order_type == "defection_grudge" {
            "rivalry"
        } else {
            "reconciliation"
        };
        let scenario = payload
            .get("scenario")
            .and_then(Value::as_str)
            .unwrap_or(default_scenario)
            .to_string();
        let former_employer_id = payload
            .get("former_employer")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(scholar.contract.sidecast_sponsor.clone())
            .unwrap_or_else(|| scholar.contract.employer.clone());
        let former_name = self
            .store
            .get_player(&former_employer_id)?
            .map(|p| p.display_name)
            .unwrap_or_else(|| former_employer_id.clone());
        let new_faction = payload
            .get("new_faction")
            .and_then(Value::as_str)
            .or(payload.get("faction").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| scholar.contract.employer.clone());

        if scenario == "reconciliation" {
            scholar.memory.adjust_feeling(&former_employer_id, 1.5);
            scholar.contract.employer = former_employer_id.clone();
        } else {
            scholar.memory.adjust_feeling(&new_faction, -1.5);
        }
        self.store.save_scholar(&scholar)?;

        let layers = self.multi_press.generate_defection_epilogue_layers(
            &scenario,
            &scholar.name,
            &former_name,
            &new_faction,
        );
        let releases =
            self.apply_multi_press_layers(&layers, &[], now, "defection_epilogue")?;
        self.store.append_event(&Event::new(
            now,
            "defection_epilogue",
            json!({
                "scholar": scholar.id,
                "scenario": scenario,
                "former_faction": former_name,
                "new_faction": new_faction,
            }),
        ))?;
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": format!("defection_{scenario}") })),
        )?;
        Ok(releases)
    }

    fn handle_recruitment_grudge(&mut self, order: &OrderRow) -> Result<Vec<PressRelease>> {
        let now = Utc::now();
        let scholar_id = order.actor_id.clone().unwrap_or_default();
        let Some(mut scholar) = self.store.get_scholar(&scholar_id)? else {
            self.store.update_order_status(
                order.id,
                "cancelled",
                Some(&json!({ "reason": "scholar_missing" })),
            )?;
            return Ok(Vec::new());
        };
        let player = order
            .payload
            .get("player")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        scholar.memory.adjust_feeling(&player, -1.0);
        self.store.save_scholar(&scholar)?;

        let press = academic_gossip(&GossipContext {
            scholar: scholar.name.clone(),
            quote: "The slighted scholar sharpens their public retort.".to_string(),
            trigger: "Recruitment Grudge".to_string(),
        });
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "followup_resolved",
            json!({
                "scholar": scholar.id,
                "kind": order.order_type,
                "order_id": order.id,
            }),
        ))?;
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": "recruitment_grudge" })),
        )?;
        Ok(vec![press])
    }

    /// A sidecast phase fires its layered press, records the memory, and
    /// queues the next phase at the arc's delay.
    fn handle_sidecast_phase(
        &mut self,
        order: &OrderRow,
        phase: &str,
    ) -> Result<Vec<PressRelease>> {
        let now = Utc::now();
        let scholar_id = order.actor_id.clone().unwrap_or_default();
        let Some(mut scholar) = self.store.get_scholar(&scholar_id)? else {
            self.store.update_order_status(
                order.id,
                "cancelled",
                Some(&json!({ "reason": "scholar_missing" })),
            )?;
            return Ok(Vec::new());
        };
        let payload = &order.payload;
        let arc_key = payload
            .get("arc")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(scholar.contract.sidecast_arc.clone())
            .unwrap_or_else(|| self.multi_press.pick_sidecast_arc(&mut self.rng));
        let sponsor_id = payload
            .get("sponsor")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(scholar.contract.sidecast_sponsor.clone());
        let sponsor_display = match &sponsor_id {
            Some(id) => self
                .store
                .get_player(id)?
                .map(|p| p.display_name)
                .unwrap_or_else(|| id.clone()),
            None => "Patron".to_string(),
        };
        let expedition_code = payload
            .get("expedition_code")
            .and_then(Value::as_str)
            .map(str::to_string);

        let plan = self.multi_press.generate_sidecast_layers(
            &arc_key,
            phase,
            &scholar,
            &sponsor_display,
            expedition_code.as_deref(),
        );

        record_sidecast_memory(&mut scholar, sponsor_id.as_deref(), &arc_key, phase, now);
        self.store.save_scholar(&scholar)?;

        let releases = self.apply_multi_press_layers(&plan.layers, &[], now, "sidecast")?;
        self.store.append_event(&Event::new(
            now,
            "sidecast_followup",
            json!({
                "scholar": scholar.id,
                "arc": arc_key,
                "phase": phase,
                "sponsor": sponsor_id,
            }),
        ))?;
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": format!("sidecast_{phase}") })),
        )?;

        if let Some(next_phase) = plan.next_phase {
            let delay_hours = plan.next_delay_hours.unwrap_or_else(|| {
                self.multi_press
                    .sidecast_phase_delay(&arc_key, &next_phase, 36.0)
            });
            let scheduled_at = now + Duration::minutes((delay_hours * 60.0) as i64);
            self.store.enqueue_order(
                &format!("followup:sidecast_{next_phase}"),
                Some(&scholar.id),
                sponsor_id.as_deref(),
                &json!({
                    "arc": arc_key,
                    "phase": next_phase,
                    "sponsor": sponsor_id,
                    "expedition_code": expedition_code,
                }),
                Some(scheduled_at),
                None,
                None,
                now,
            )?;
        }
        Ok(releases)
    }

    fn handle_sideways_vignette(&mut self, order: &OrderRow) -> Result<Vec<PressRelease>> {
        let now = Utc::now();
        let payload = &order.payload;
        let scholar = match order.actor_id.as_deref() {
            Some(id) => self.store.get_scholar(id)?,
            None => None,
        };
        let scholar_name = scholar
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "the expedition".to_string());
        let headline = payload
            .get("headline")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Sideways Vignette — {scholar_name}"));
        let body = payload
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let tags = payload.get("tags").cloned().unwrap_or(json!([]));

        let press = PressRelease::new("sideways_vignette", headline.clone(), body).with_metadata(
            json!({
                "scholar": scholar.as_ref().map(|s| s.id.clone()),
                "tags": tags,
            }),
        );
        self.archive_press(&press, now)?;
        let mut releases = vec![press];

        if let Some(gossip) = payload.get("gossip").and_then(Value::as_array) {
            for quote in gossip.iter().filter_map(Value::as_str) {
                let gossip_press = academic_gossip(&GossipContext {
                    scholar: scholar_name.clone(),
                    quote: quote.to_string(),
                    trigger: "Sideways Discovery".to_string(),
                });
                self.archive_press(&gossip_press, now)?;
                releases.push(gossip_press);
            }
        }

        self.store.append_event(&Event::new(
            now,
            "sideways_vignette",
            json!({
                "scholar": scholar.map(|s| s.id),
                "headline": headline,
            }),
        ))?;
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": "sideways_vignette" })),
        )?;
        Ok(releases)
    }

    fn handle_offer_evaluation(
        &mut self,
        order: &OrderRow,
        key: &str,
    ) -> Result<Vec<PressRelease>> {
        let Some(offer_id) = order.payload.get(key).and_then(Value::as_i64) else {
            self.store.update_order_status(
                order.id,
                "cancelled",
                Some(&json!({ "reason": "missing_offer" })),
            )?;
            return Ok(Vec::new());
        };
        let releases = match self.resolve_offer_negotiation(offer_id) {
            Ok(releases) => releases,
            Err(crate::error::GameError::NotFound { .. }) => {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "offer_missing" })),
                )?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": "offer_negotiation" })),
        )?;
        Ok(releases)
    }

    /// Unknown kinds (unlocked opportunities and the like) surface as a
    /// lingering-thread gossip item rather than being silently dropped.
    fn handle_generic_followup(&mut self, order: &OrderRow) -> Result<Vec<PressRelease>> {
        let now = Utc::now();
        let scholar = match order.actor_id.as_deref() {
            Some(id) => self.store.get_scholar(id)?,
            None => None,
        };
        let Some(scholar) = scholar else {
            self.store.update_order_status(
                order.id,
                "cancelled",
                Some(&json!({ "reason": "scholar_missing" })),
            )?;
            return Ok(Vec::new());
        };
        let trigger = order
            .order_type
            .split(['_', ':'])
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let press = academic_gossip(&GossipContext {
            scholar: scholar.name.clone(),
            quote: "An unresolved thread lingers in the archives.".to_string(),
            trigger,
        });
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "followup_resolved",
            json!({
                "scholar": scholar.id,
                "kind": order.order_type,
                "order_id": order.id,
            }),
        ))?;
        self.store.update_order_status(
            order.id,
            "completed",
            Some(&json!({ "resolution": order.order_type })),
        )?;
        Ok(vec![press])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;

    #[test]
    fn test_order_kind_parsing() {
        assert_eq!(
            OrderKind::parse("followup:sidecast_debut"),
            OrderKind::SidecastPhase("debut".to_string())
        );
        assert_eq!(OrderKind::parse("evaluate_offer"), OrderKind::EvaluateOffer);
        assert_eq!(
            OrderKind::parse("sealed_chamber_survey"),
            OrderKind::Other("sealed_chamber_survey".to_string())
        );
    }

    #[test]
    fn test_recruitment_grudge_sours_feelings_once() {
        let mut svc = service();
        let now = Utc::now();
        svc.schedule_followup(
            "s.ironquill",
            "recruitment_grudge",
            now,
            json!({ "player": "bob", "faction": "academia" }),
            now,
        )
        .unwrap();

        let releases = svc.resolve_followups().unwrap();
        assert_eq!(releases.len(), 1);
        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.memory.feeling("bob"), -1.0);

        // Completed orders do not fire twice.
        assert!(svc.resolve_followups().unwrap().is_empty());
        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.memory.feeling("bob"), -1.0);
    }

    #[test]
    fn test_reconciliation_returns_scholar_to_patron() {
        let mut svc = service();
        svc.ensure_player("patron", None).unwrap();
        let mut scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        scholar.contract.employer = "industry".to_string();
        svc.store.save_scholar(&scholar).unwrap();

        let now = Utc::now();
        svc.schedule_followup(
            "s.ironquill",
            "defection_return",
            now,
            json!({
                "former_employer": "patron",
                "new_faction": "industry",
                "scenario": "reconciliation",
            }),
            now,
        )
        .unwrap();
        let releases = svc.resolve_followups().unwrap();
        assert!(!releases.is_empty());

        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.contract.employer, "patron");
        assert_eq!(scholar.memory.feeling("patron"), 1.5);
        let events = svc.store.export_events(None).unwrap();
        assert!(events.iter().any(|(_, e)| e.action == "defection_epilogue"
            && e.payload["scenario"] == "reconciliation"));
    }

    #[test]
    fn test_sidecast_phase_chains_to_next() {
        let mut svc = service();
        svc.ensure_player("sponsor", None).unwrap();
        let mut scholar = svc.store.get_scholar("s.farseer").unwrap().unwrap();
        scholar.contract.sidecast_arc = Some("prodigy".to_string());
        scholar.contract.sidecast_sponsor = Some("sponsor".to_string());
        svc.store.save_scholar(&scholar).unwrap();

        let now = Utc::now();
        svc.store
            .enqueue_order(
                "followup:sidecast_debut",
                Some("s.farseer"),
                Some("sponsor"),
                &json!({ "arc": "prodigy", "phase": "debut", "sponsor": "sponsor" }),
                Some(now),
                None,
                None,
                now,
            )
            .unwrap();

        let releases = svc.resolve_followups().unwrap();
        assert!(releases
            .iter()
            .any(|r| r.press_type == "sidecast_debut"));

        // Integration is queued with a future schedule.
        let next = svc
            .store
            .list_orders(Some("followup:sidecast_integration"), Some("pending"))
            .unwrap();
        assert_eq!(next.len(), 1);
        assert!(next[0].scheduled_at.unwrap() > now);

        let scholar = svc.store.get_scholar("s.farseer").unwrap().unwrap();
        assert!((scholar.memory.feeling("sponsor") - 1.0).abs() < 1e-9);
        assert_eq!(scholar.contract.sidecast_history.len(), 1);
    }

    #[test]
    fn test_sideways_vignette_emits_gossip() {
        let mut svc = service();
        let now = Utc::now();
        svc.store
            .enqueue_order(
                "sideways_vignette",
                Some("s.ironquill"),
                None,
                &json!({
                    "headline": "The Diarists of the Delta",
                    "body": "Two centuries of rainfall.",
                    "gossip": ["Someone kept faith with the sky."],
                }),
                Some(now),
                None,
                None,
                now,
            )
            .unwrap();
        let releases = svc.resolve_followups().unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].press_type, "sideways_vignette");
        assert_eq!(releases[1].press_type, "academic_gossip");
    }

    #[test]
    fn test_dedicated_kinds_are_left_for_their_own_steps() {
        let mut svc = service();
        let now = Utc::now();
        svc.store
            .enqueue_order(
                "conference_resolution",
                Some("p"),
                Some("CONF-1"),
                &json!({ "conference_code": "CONF-1" }),
                None,
                None,
                None,
                now,
            )
            .unwrap();
        svc.resolve_followups().unwrap();
        let order = svc
            .store
            .list_orders(Some("conference_resolution"), Some("pending"))
            .unwrap();
        assert_eq!(order.len(), 1);
    }
}
