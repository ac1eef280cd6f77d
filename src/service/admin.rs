//! Moderator tools. Admin operations bypass gameplay guards but still
//! write events and `admin_action` press so the archive shows provenance.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::{GameError, Result};
use crate::models::{Event, PressRelease};

use super::GameService;

impl GameService {
    pub fn admin_adjust_reputation(
        &mut self,
        admin_id: &str,
        player_id: &str,
        delta: i64,
        reason: Option<&str>,
    ) -> Result<PressRelease> {
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let before = player.reputation;
        let (lower, upper) = self.settings.reputation_bounds();
        player.adjust_reputation(delta, lower, upper);
        self.store.upsert_player(&player)?;

        let now = Utc::now();
        let press = PressRelease::new(
            "admin_action",
            format!("Moderation Note — {}", player.display_name),
            format!(
                "The operations desk adjusts {}'s reputation by {delta:+} ({before} to {}).{}",
                player.display_name,
                player.reputation,
                reason.map(|r| format!(" Reason: {r}.")).unwrap_or_default()
            ),
        )
        .with_metadata(json!({
            "admin": admin_id,
            "player": player_id,
            "delta": delta,
            "before": before,
            "after": player.reputation,
            "reason": reason,
        }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "admin_adjust_reputation",
            json!({
                "admin": admin_id,
                "player": player_id,
                "delta": delta,
                "before": before,
                "after": player.reputation,
                "reason": reason,
            }),
        ))?;
        Ok(press)
    }

    /// Adjust influence directly. Admin credit may exceed the influence
    /// cap; the balance still never drops below zero.
    pub fn admin_adjust_influence(
        &mut self,
        admin_id: &str,
        player_id: &str,
        faction: &str,
        delta: i64,
        reason: Option<&str>,
    ) -> Result<PressRelease> {
        self.validate_faction(faction)?;
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        self.ensure_influence_structure(&mut player);
        let entry = player.influence.entry(faction.to_string()).or_insert(0);
        let before = *entry;
        *entry = (before + delta).max(0);
        let after = *entry;
        self.store.upsert_player(&player)?;

        let now = Utc::now();
        let press = PressRelease::new(
            "admin_action",
            format!("Moderation Note — {}", player.display_name),
            format!(
                "The operations desk adjusts {}'s {faction} influence by {delta:+} ({before} to \
                 {after}).{}",
                player.display_name,
                reason.map(|r| format!(" Reason: {r}.")).unwrap_or_default()
            ),
        )
        .with_metadata(json!({
            "admin": admin_id,
            "player": player_id,
            "faction": faction,
            "delta": delta,
            "before": before,
            "after": after,
            "reason": reason,
        }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "admin_adjust_influence",
            json!({
                "admin": admin_id,
                "player": player_id,
                "faction": faction,
                "delta": delta,
                "before": before,
                "after": after,
                "reason": reason,
            }),
        ))?;
        Ok(press)
    }

    /// Force a defection roll through the uncontested evaluation path.
    pub fn admin_force_defection(
        &mut self,
        admin_id: &str,
        scholar_id: &str,
        new_faction: &str,
        offer_quality: f64,
    ) -> Result<(bool, PressRelease)> {
        let (defected, press) =
            self.evaluate_defection_offer(scholar_id, offer_quality, 0.0, 0.0, 0.0, new_faction)?;
        let now = Utc::now();
        self.store.append_event(&Event::new(
            now,
            "admin_force_defection",
            json!({
                "admin": admin_id,
                "scholar": scholar_id,
                "new_faction": new_faction,
                "offer_quality": offer_quality,
                "defected": defected,
            }),
        ))?;
        Ok((defected, press))
    }

    pub fn admin_create_seasonal_commitment(
        &mut self,
        admin_id: &str,
        player_id: &str,
        faction: &str,
        tier: Option<&str>,
        base_cost: Option<i64>,
        duration_days: Option<i64>,
    ) -> Result<i64> {
        let commitment_id = self.start_seasonal_commitment(
            player_id,
            faction,
            tier,
            base_cost,
            duration_days,
            true,
        )?;
        let now = Utc::now();
        self.store.append_event(&Event::new(
            now,
            "admin_create_seasonal_commitment",
            json!({
                "admin": admin_id,
                "player": player_id,
                "faction": faction,
                "commitment_id": commitment_id,
                "tier": tier,
                "base_cost": base_cost,
                "duration_days": duration_days,
            }),
        ))?;
        Ok(commitment_id)
    }

    pub fn admin_update_seasonal_commitment(
        &mut self,
        admin_id: &str,
        commitment_id: i64,
        base_cost: Option<i64>,
        end_at: Option<DateTime<Utc>>,
        status: Option<&str>,
    ) -> Result<()> {
        let commitment = self
            .store
            .get_seasonal_commitment(commitment_id)?
            .ok_or_else(|| GameError::not_found("commitment", commitment_id.to_string()))?;
        self.store
            .update_seasonal_commitment(commitment_id, base_cost, end_at, None)?;
        if let Some(status) = status {
            self.store
                .set_seasonal_commitment_status(commitment_id, status, Utc::now())?;
        }
        self.store.append_event(&Event::new(
            Utc::now(),
            "admin_update_seasonal_commitment",
            json!({
                "admin": admin_id,
                "commitment_id": commitment_id,
                "player": commitment.player_id,
                "base_cost": base_cost,
                "end_at": end_at.map(|t| t.to_rfc3339()),
                "status": status,
            }),
        ))?;
        Ok(())
    }

    pub fn admin_create_faction_project(
        &mut self,
        admin_id: &str,
        name: &str,
        faction: &str,
        target_progress: f64,
        metadata: Option<Value>,
    ) -> Result<i64> {
        let project_id = self.start_faction_project(name, faction, target_progress, metadata)?;
        self.store.append_event(&Event::new(
            Utc::now(),
            "admin_create_faction_project",
            json!({
                "admin": admin_id,
                "project_id": project_id,
                "name": name,
                "faction": faction,
                "target_progress": target_progress,
            }),
        ))?;
        Ok(project_id)
    }

    pub fn admin_update_faction_project(
        &mut self,
        admin_id: &str,
        project_id: i64,
        target_progress: Option<f64>,
        status: Option<&str>,
    ) -> Result<()> {
        if self.store.get_faction_project(project_id)?.is_none() {
            return Err(GameError::not_found("project", project_id.to_string()));
        }
        self.store
            .update_faction_project(project_id, target_progress, status, Utc::now())?;
        self.store.append_event(&Event::new(
            Utc::now(),
            "admin_update_faction_project",
            json!({
                "admin": admin_id,
                "project_id": project_id,
                "target_progress": target_progress,
                "status": status,
            }),
        ))?;
        Ok(())
    }

    pub fn admin_list_orders(
        &self,
        order_type: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let limit = limit.clamp(1, 50);
        let orders = self.store.list_orders(order_type, status)?;
        Ok(orders
            .into_iter()
            .take(limit)
            .map(|order| {
                json!({
                    "id": order.id,
                    "order_type": order.order_type,
                    "status": order.status,
                    "actor_id": order.actor_id,
                    "subject_id": order.subject_id,
                    "scheduled_at": order.scheduled_at.map(|t| t.to_rfc3339()),
                    "created_at": order.created_at.to_rfc3339(),
                    "payload": order.payload,
                })
            })
            .collect())
    }

    /// Cancel a pending dispatcher order with a reason; later execution is
    /// suppressed by the status row.
    pub fn admin_cancel_order(&mut self, order_id: i64, reason: Option<&str>) -> Result<Value> {
        let order = self
            .store
            .get_order(order_id)?
            .ok_or_else(|| GameError::not_found("order", order_id.to_string()))?;
        if order.status != "pending" {
            return Err(GameError::invalid(format!(
                "order {order_id} is not pending (status: {})",
                order.status
            )));
        }
        self.store.update_order_status(
            order_id,
            "cancelled",
            reason.map(|r| json!({ "reason": r })).as_ref(),
        )?;
        let summary = json!({
            "id": order_id,
            "order_type": order.order_type,
            "actor_id": order.actor_id,
            "subject_id": order.subject_id,
            "reason": reason,
        });
        self.push_admin_notification(format!(
            "Cancelled order #{order_id} ({}){}",
            order.order_type,
            reason.map(|r| format!(" - {r}")).unwrap_or_default()
        ));
        self.store.append_event(&Event::new(
            Utc::now(),
            "admin_cancel_order",
            summary.clone(),
        ))?;
        self.telemetry
            .system("dispatcher_order_cancelled", summary.clone());
        Ok(summary)
    }

    /// Manual pause. Non-admin operations fail until resumed.
    pub fn pause_game(&mut self, admin_id: &str, reason: &str) -> Result<PressRelease> {
        self.set_pause(format!("Paused by {admin_id}: {reason}"));
        let now = Utc::now();
        let press = PressRelease::new(
            "admin_action",
            "Game Pause",
            format!("Live actions are halted by {admin_id}: {reason}."),
        )
        .with_metadata(json!({ "admin": admin_id, "reason": reason }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "game_paused",
            json!({ "reason": reason, "source": "admin", "admin": admin_id }),
        ))?;
        self.push_admin_notification(format!("Game paused by {admin_id}: {reason}"));
        Ok(press)
    }

    /// Resume from any pause; reports whether the game was paused at all.
    pub fn resume_game(&mut self, admin_id: Option<&str>) -> Result<PressRelease> {
        let actor = admin_id.unwrap_or("system").to_string();
        let (was_paused, previous_reason) = self.lift_pause();
        let message = if was_paused {
            format!("Game resumed by {actor}.")
        } else {
            format!("Resume requested by {actor}; game was not paused.")
        };
        self.push_admin_notification(message.clone());

        let mut body_lines = vec![message];
        if let Some(reason) = &previous_reason {
            body_lines.push(format!("Previous pause reason: {reason}"));
        }
        let now = Utc::now();
        let press = PressRelease::new("admin_action", "Game Resume", body_lines.join("\n"))
            .with_metadata(json!({
                "admin": actor,
                "previous_reason": previous_reason,
                "was_paused": was_paused,
            }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "game_resumed",
            json!({
                "admin": actor,
                "was_paused": was_paused,
                "previous_reason": previous_reason,
            }),
        ))?;
        let layers = self
            .multi_press
            .generate_admin_layers("resume", &actor, previous_reason.as_deref());
        self.apply_multi_press_layers(&layers, &["admin_action"], now, "admin")?;
        Ok(press)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use crate::models::ConfidenceLevel;

    #[test]
    fn test_admin_reputation_clamps_and_logs() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        let press = svc
            .admin_adjust_reputation("mod", "alice", 200, Some("calibration"))
            .unwrap();
        assert_eq!(press.press_type, "admin_action");
        let alice = svc.store.get_player("alice").unwrap().unwrap();
        assert_eq!(alice.reputation, 50);
        let events = svc.store.export_events(None).unwrap();
        assert!(events
            .iter()
            .any(|(_, e)| e.action == "admin_adjust_reputation"));
    }

    #[test]
    fn test_admin_influence_may_exceed_cap_but_not_floor() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        svc.admin_adjust_influence("mod", "alice", "academia", 20, None)
            .unwrap();
        let alice = svc.store.get_player("alice").unwrap().unwrap();
        assert_eq!(alice.influence["academia"], 20);

        svc.admin_adjust_influence("mod", "alice", "academia", -50, None)
            .unwrap();
        let alice = svc.store.get_player("alice").unwrap().unwrap();
        assert_eq!(alice.influence["academia"], 0);
    }

    #[test]
    fn test_pause_blocks_commands_until_resume() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        svc.pause_game("mod", "maintenance").unwrap();
        let err = svc
            .submit_theory("alice", "T", ConfidenceLevel::Suspect, &[], "soon")
            .unwrap_err();
        assert!(matches!(err, GameError::GamePaused { .. }));

        let press = svc.resume_game(Some("mod")).unwrap();
        assert_eq!(press.metadata["was_paused"], true);
        svc.submit_theory("alice", "T", ConfidenceLevel::Suspect, &[], "soon")
            .unwrap();
    }

    #[test]
    fn test_admin_cancel_order_requires_pending() {
        let mut svc = service();
        let now = Utc::now();
        let order_id = svc
            .store
            .enqueue_order(
                "recruitment_grudge",
                Some("s.ironquill"),
                None,
                &json!({ "player": "bob" }),
                Some(now + chrono::Duration::days(1)),
                None,
                None,
                now,
            )
            .unwrap();
        svc.admin_cancel_order(order_id, Some("mistake")).unwrap();
        let order = svc.store.get_order(order_id).unwrap().unwrap();
        assert_eq!(order.status, "cancelled");
        assert!(svc.admin_cancel_order(order_id, None).is_err());
        // The cancelled grudge never fires.
        assert!(svc.resolve_followups().unwrap().is_empty());
    }
}
