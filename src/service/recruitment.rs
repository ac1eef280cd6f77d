//! Recruitment attempts and odds previews.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::error::{GameError, Result};
use crate::models::{Event, Player, PressRelease};
use crate::press::{recruitment_report, RecruitmentContext};

use super::GameService;

#[derive(Debug, Clone, Copy)]
pub struct RecruitmentChance {
    pub chance: f64,
    pub influence_bonus: f64,
    pub cooldown_penalty: f64,
    pub cooldown_active: bool,
    pub cooldown_remaining: i64,
    pub influence: i64,
}

impl GameService {
    /// Attempt to recruit a scholar. Success moves the contract and pays
    /// +1 faction influence; failure sows a grudge follow-up. Either way
    /// the recruitment cooldown arms for two digests.
    pub fn attempt_recruitment(
        &mut self,
        player_id: &str,
        scholar_id: &str,
        faction: &str,
        base_chance: f64,
    ) -> Result<(bool, PressRelease)> {
        self.ensure_not_paused()?;
        self.validate_faction(faction)?;
        self.ensure_player(player_id, None)?;
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let mut scholar = self
            .store
            .get_scholar(scholar_id)?
            .ok_or_else(|| GameError::not_found("scholar", scholar_id))?;
        self.require_reputation(&player, "recruitment")?;

        let base = self.compute_recruitment_chance(&player, faction, base_chance);
        let relationship = self.relationship_bonus(&scholar, player_id)?;
        let chance = self.clamp_probability(base.chance + relationship.total);
        let roll = self.rng.uniform(0.0, 1.0);
        let success = roll < chance;
        let now = Utc::now();

        let entry = player.cooldowns.entry("recruitment".to_string()).or_insert(0);
        *entry = (*entry).max(2);

        let mut press;
        if success {
            scholar.memory.adjust_feeling(player_id, 2.0);
            scholar.contract.employer = player_id.to_string();
            scholar.contract.faction = Some(faction.to_string());
            self.apply_influence_change(&mut player, faction, 1);
            press = recruitment_report(&RecruitmentContext {
                player: player_id.to_string(),
                scholar: scholar.name.clone(),
                outcome: "success".to_string(),
                chance,
                faction: faction.to_string(),
                relationship_modifier: relationship.total,
            });
        } else {
            scholar.memory.adjust_feeling(player_id, -1.0);
            press = recruitment_report(&RecruitmentContext {
                player: player_id.to_string(),
                scholar: scholar.name.clone(),
                outcome: "failure".to_string(),
                chance,
                faction: faction.to_string(),
                relationship_modifier: relationship.total,
            });
            let resolve_at = now + Duration::days(1);
            self.schedule_followup(
                scholar_id,
                "recruitment_grudge",
                resolve_at,
                json!({ "player": player_id, "faction": faction }),
                now,
            )?;
        }
        press.set_meta("player", json!(player_id));
        press.set_meta("scholar", json!(scholar.id));
        press.set_meta("faction", json!(faction));
        press.set_meta("chance", json!(chance));
        press.set_meta("base_chance", json!(base.chance));
        press.set_meta("relationship_modifier", json!(relationship.total));
        press.set_meta("relationship_details", relationship.as_json());

        self.store.save_scholar(&scholar)?;
        self.store.upsert_player(&player)?;
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "recruitment_attempt",
            json!({
                "player": player_id,
                "scholar": scholar_id,
                "faction": faction,
                "chance": chance,
                "success": success,
                "cooldown_penalty": base.cooldown_penalty,
                "influence_bonus": base.influence_bonus,
                "relationship": relationship.as_json(),
            }),
        ))?;

        let observers = self.store.all_scholars()?;
        let layers = self.multi_press.generate_recruitment_layers(
            &player.display_name,
            &scholar,
            success,
            faction,
            chance,
            &observers,
            &mut self.rng,
        );
        self.apply_multi_press_layers(&layers, &["recruitment_report"], now, "recruitment")?;
        Ok((success, press))
    }

    /// Per-faction odds preview without mutating state.
    pub fn recruitment_odds(
        &mut self,
        player_id: &str,
        scholar_id: &str,
        base_chance: f64,
    ) -> Result<Vec<Value>> {
        self.ensure_not_paused()?;
        self.ensure_player(player_id, None)?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let scholar = self
            .store
            .get_scholar(scholar_id)?
            .ok_or_else(|| GameError::not_found("scholar", scholar_id))?;
        self.require_reputation(&player, "recruitment")?;

        let relationship = self.relationship_bonus(&scholar, player_id)?;
        let mut odds = Vec::new();
        for faction in crate::catalogs::FACTIONS {
            let base = self.compute_recruitment_chance(&player, faction, base_chance);
            let final_chance = self.clamp_probability(base.chance + relationship.total);
            odds.push(json!({
                "faction": faction,
                "chance": final_chance,
                "base_chance": base.chance,
                "influence_bonus": base.influence_bonus,
                "cooldown_penalty": base.cooldown_penalty,
                "cooldown_active": base.cooldown_active,
                "cooldown_remaining": base.cooldown_remaining,
                "influence": base.influence,
                "relationship_modifier": relationship.total,
            }));
        }
        odds.sort_by(|a, b| {
            b["chance"]
                .as_f64()
                .partial_cmp(&a["chance"].as_f64())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(odds)
    }

    /// Chance before the relationship modifier: base × cooldown penalty +
    /// influence bonus, clamped to [0.05, 0.95].
    pub(crate) fn compute_recruitment_chance(
        &self,
        player: &Player,
        faction: &str,
        base_chance: f64,
    ) -> RecruitmentChance {
        let raw_influence = player.influence.get(faction).copied().unwrap_or(0);
        let influence_bonus = raw_influence.max(0) as f64 * 0.05;
        let cooldown_remaining = player.cooldowns.get("recruitment").copied().unwrap_or(0);
        let cooldown_penalty = if cooldown_remaining > 0 { 0.5 } else { 1.0 };
        let chance = (base_chance * cooldown_penalty + influence_bonus).clamp(0.05, 0.95);
        RecruitmentChance {
            chance,
            influence_bonus,
            cooldown_penalty,
            cooldown_active: cooldown_remaining > 0,
            cooldown_remaining,
            influence: raw_influence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;

    #[test]
    fn test_cooldown_halves_base_chance() {
        let svc = service();
        let mut player = Player::new("bob", "Bob");
        let fresh = svc.compute_recruitment_chance(&player, "academia", 0.6);
        assert!(!fresh.cooldown_active);
        assert!((fresh.chance - 0.6).abs() < 1e-9);

        player.cooldowns.insert("recruitment".to_string(), 2);
        let cooled = svc.compute_recruitment_chance(&player, "academia", 0.6);
        assert!(cooled.cooldown_active);
        assert_eq!(cooled.cooldown_remaining, 2);
        assert!((cooled.chance - 0.3).abs() < 1e-9);
        assert!((cooled.cooldown_penalty - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_influence_bonus_and_clamp() {
        let svc = service();
        let mut player = Player::new("bob", "Bob");
        player.influence.insert("academia".to_string(), 4);
        let with_bonus = svc.compute_recruitment_chance(&player, "academia", 0.6);
        assert!((with_bonus.influence_bonus - 0.2).abs() < 1e-9);
        assert!((with_bonus.chance - 0.8).abs() < 1e-9);

        let clamped = svc.compute_recruitment_chance(&player, "academia", 1.0);
        assert!((clamped.chance - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_attempt_always_arms_cooldown_and_logs_event() {
        let mut svc = service();
        svc.ensure_player("bob", None).unwrap();
        let (success, press) = svc
            .attempt_recruitment("bob", "s.ironquill", "academia", 1.0)
            .unwrap();
        assert_eq!(press.press_type, "recruitment_report");
        assert_eq!(press.metadata["chance"].as_f64().unwrap(), 0.95);

        let bob = svc.store.get_player("bob").unwrap().unwrap();
        assert_eq!(bob.cooldowns.get("recruitment"), Some(&2));
        let ironquill = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        if success {
            assert_eq!(ironquill.contract.employer, "bob");
            assert_eq!(ironquill.memory.feeling("bob"), 2.0);
            assert_eq!(bob.influence["academia"], 1);
        } else {
            assert_eq!(ironquill.memory.feeling("bob"), -1.0);
            // Grudge follow-up lands in the orders queue.
            let orders = svc
                .store
                .list_orders(Some("recruitment_grudge"), Some("pending"))
                .unwrap();
            assert_eq!(orders.len(), 1);
        }
        let events = svc.store.export_events(None).unwrap();
        assert!(events
            .iter()
            .any(|(_, e)| e.action == "recruitment_attempt" && e.payload["success"] == success));
    }

    #[test]
    fn test_second_attempt_sees_cooldown_in_odds() {
        let mut svc = service();
        svc.ensure_player("bob", None).unwrap();
        svc.attempt_recruitment("bob", "s.ironquill", "academia", 1.0)
            .unwrap();
        let odds = svc.recruitment_odds("bob", "s.karatau", 1.0).unwrap();
        let academia = odds
            .iter()
            .find(|entry| entry["faction"] == "academia")
            .unwrap();
        assert_eq!(academia["cooldown_active"], true);
        assert_eq!(academia["cooldown_remaining"], 2);
    }

    #[test]
    fn test_unknown_scholar_is_not_found() {
        let mut svc = service();
        svc.ensure_player("bob", None).unwrap();
        let err = svc
            .attempt_recruitment("bob", "s.nobody", "academia", 0.6)
            .unwrap_err();
        assert!(matches!(err, GameError::NotFound { kind: "scholar", .. }));
    }
}
