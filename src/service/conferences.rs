//! Conferences: public theory debates with reputation stakes.

use chrono::Utc;
use serde_json::json;

use crate::error::{GameError, Result};
use crate::models::{ConfidenceLevel, Event, ExpeditionOutcome, PressRelease};
use crate::press::{academic_gossip, GossipContext};

use super::GameService;

impl GameService {
    /// Queue a conference on a recorded theory; it resolves at the next
    /// digest through a `conference_resolution` order.
    pub fn launch_conference(
        &mut self,
        player_id: &str,
        theory_id: i64,
        confidence: ConfidenceLevel,
        supporters: &[String],
        opposition: &[String],
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        self.require_reputation(&player, "conference")?;
        let theory = self
            .store
            .get_theory(theory_id)?
            .ok_or_else(|| GameError::not_found("theory", theory_id.to_string()))?;

        let known = self.known_scholar_ids()?;
        for scholar_id in supporters.iter().chain(opposition.iter()) {
            if !known.contains(scholar_id) {
                return Err(GameError::not_found("scholar", scholar_id.clone()));
            }
        }

        let code = format!("CONF-{}", self.rng.randint(1000, 9999));
        let now = Utc::now();
        self.store.add_conference(
            &code,
            player_id,
            theory_id,
            confidence,
            supporters,
            opposition,
            now,
        )?;
        self.store.enqueue_order(
            "conference_resolution",
            Some(player_id),
            Some(&code),
            &json!({
                "conference_code": code,
                "theory_id": theory_id,
                "confidence": confidence.as_str(),
                "supporters": supporters,
                "opposition": opposition,
            }),
            None,
            Some("conferences"),
            Some(&code),
            now,
        )?;

        let press = academic_gossip(&GossipContext {
            scholar: player.display_name.clone(),
            quote: format!("Conference {code} announced to debate: {}", theory.theory),
            trigger: format!("Conference on theory #{theory_id}"),
        });
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "conference_launched",
            json!({
                "code": code,
                "player": player_id,
                "theory_id": theory_id,
                "confidence": confidence.as_str(),
                "supporters": supporters,
                "opposition": opposition,
            }),
        ))?;
        Ok(press)
    }

    /// Digest step: roll every due conference. Supporters add +5 each,
    /// opposition -5 each; 60+ succeeds, 40+ is partial, less fails.
    pub(crate) fn resolve_conferences(&mut self) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        let now = Utc::now();
        for order in self.store.fetch_due_orders("conference_resolution", now)? {
            let code = order
                .payload
                .get("conference_code")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .or_else(|| order.subject_id.clone());
            let Some(code) = code else {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "missing_code" })),
                )?;
                continue;
            };
            let Some(conference) = self.store.get_conference(&code)? else {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "conference_missing" })),
                )?;
                continue;
            };
            let player = self.store.get_player(&conference.player_id)?;
            let theory = self.store.get_theory(conference.theory_id)?;
            let (Some(mut player), Some(_)) = (player, theory) else {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "conference_context_missing" })),
                )?;
                continue;
            };

            let base_roll = self.rng.randint(1, 100);
            let support_modifier = conference.supporters.len() as i64 * 5;
            let opposition_modifier = conference.opposition.len() as i64 * 5;
            let final_roll = base_roll + support_modifier - opposition_modifier;
            let outcome = if final_roll >= 60 {
                ExpeditionOutcome::Success
            } else if final_roll >= 40 {
                ExpeditionOutcome::Partial
            } else {
                ExpeditionOutcome::Failure
            };

            let reputation_delta = self.confidence_delta(conference.confidence, outcome);
            let (lower, upper) = self.settings.reputation_bounds();
            player.adjust_reputation(reputation_delta, lower, upper);
            self.store.upsert_player(&player)?;

            self.store.resolve_conference(
                &code,
                outcome.as_str(),
                reputation_delta,
                &json!({
                    "roll": base_roll,
                    "support_modifier": support_modifier,
                    "opposition_modifier": opposition_modifier,
                    "final_roll": final_roll,
                }),
            )?;

            let outcome_text = match outcome {
                ExpeditionOutcome::Success => {
                    "The conference concluded with resounding support for the theory"
                }
                ExpeditionOutcome::Partial => "The conference ended with mixed opinions",
                _ => "The conference thoroughly rejected the theory",
            };
            let press = PressRelease::new(
                "conference_outcome",
                format!("Conference {code} Concluded"),
                format!(
                    "{outcome_text}. Reputation change: {reputation_delta:+}. Final tally: roll \
                     {base_roll} {support_modifier:+} support {opposition_modifier:+} opposition \
                     = {final_roll}.",
                    opposition_modifier = -opposition_modifier
                ),
            )
            .with_metadata(json!({
                "code": code,
                "outcome": outcome.as_str(),
                "reputation_delta": reputation_delta,
            }));
            self.archive_press(&press, now)?;
            releases.push(press);

            self.store.append_event(&Event::new(
                now,
                "conference_resolved",
                json!({
                    "code": code,
                    "outcome": outcome.as_str(),
                    "reputation_delta": reputation_delta,
                    "final_roll": final_roll,
                }),
            ))?;
            self.store.update_order_status(
                order.id,
                "completed",
                Some(&json!({ "outcome": outcome.as_str() })),
            )?;
        }
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use crate::models::Player;

    fn seed_theory(svc: &mut GameService, player_id: &str) -> i64 {
        let mut player = Player::new(player_id, player_id);
        player.reputation = 10;
        svc.store.upsert_player(&player).unwrap();
        svc.submit_theory(player_id, "T", ConfidenceLevel::Certain, &[], "2030-01-01")
            .unwrap();
        svc.store.last_theory_id_by_player(player_id).unwrap().unwrap()
    }

    #[test]
    fn test_launch_requires_known_theory_and_scholars() {
        let mut svc = service();
        let theory_id = seed_theory(&mut svc, "alice");

        let err = svc
            .launch_conference("alice", theory_id + 99, ConfidenceLevel::Suspect, &[], &[])
            .unwrap_err();
        assert!(matches!(err, GameError::NotFound { kind: "theory", .. }));

        let err = svc
            .launch_conference(
                "alice",
                theory_id,
                ConfidenceLevel::Suspect,
                &["s.ghost".to_string()],
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, GameError::NotFound { kind: "scholar", .. }));
    }

    #[test]
    fn test_conference_resolves_at_digest_with_wager_delta() {
        let mut svc = service();
        let theory_id = seed_theory(&mut svc, "alice");
        let press = svc
            .launch_conference(
                "alice",
                theory_id,
                ConfidenceLevel::Suspect,
                &["s.ironquill".to_string()],
                &["s.farseer".to_string()],
            )
            .unwrap();
        assert!(press.body.contains("CONF-"));

        let before = svc.store.get_player("alice").unwrap().unwrap().reputation;
        let releases = svc.resolve_conferences().unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].press_type, "conference_outcome");

        let events = svc.store.export_events(None).unwrap();
        let resolved = events
            .iter()
            .rev()
            .find(|(_, e)| e.action == "conference_resolved")
            .unwrap();
        let delta = resolved.1.payload["reputation_delta"].as_i64().unwrap();
        // Suspect wager: +2 on success, +1 partial, -1 failure.
        assert!([2, 1, -1].contains(&delta));
        let after = svc.store.get_player("alice").unwrap().unwrap().reputation;
        assert_eq!(after, before + delta);

        // Order consumed; a second digest pass does nothing.
        assert!(svc.resolve_conferences().unwrap().is_empty());
    }
}
