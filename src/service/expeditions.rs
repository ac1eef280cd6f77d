//! Expedition queueing and resolution, including sideways effects and
//! sidecast spawning.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::catalogs::{expedition_costs, expedition_rewards};
use crate::error::{GameError, Result};
use crate::models::{
    ConfidenceLevel, Event, ExpeditionOutcome, ExpeditionPreparation, ExpeditionRecord,
    ExpeditionResult, ExpeditionType, MemoryFact, Player, PrepDepth, PressRelease, Scholar,
    SidewaysEffect, TheoryRecord,
};
use crate::press::{expedition_result_release, ExpeditionContext, GossipContext, OutcomeContext};

use super::{ExpeditionOrder, GameService};

impl GameService {
    /// Queue an expedition: charge costs, credit funding factions, record
    /// the order and emit the manifesto.
    #[allow(clippy::too_many_arguments)]
    pub fn queue_expedition(
        &mut self,
        code: &str,
        player_id: &str,
        expedition_type: ExpeditionType,
        objective: &str,
        team: &[String],
        funding: &[String],
        preparation: ExpeditionPreparation,
        prep_depth: PrepDepth,
        confidence: ConfidenceLevel,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        if code.trim().is_empty() {
            return Err(GameError::invalid("expedition code cannot be empty"));
        }
        if self.pending_expeditions.contains_key(code) {
            return Err(GameError::invalid(format!(
                "expedition {code} is already queued"
            )));
        }
        for faction in funding {
            self.validate_faction(faction)?;
        }
        self.ensure_player(player_id, None)?;
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        self.require_reputation(&player, &format!("expedition_{}", expedition_type.as_str()))?;

        self.charge_expedition(&mut player, expedition_type, funding)?;
        self.store.upsert_player(&player)?;

        let now = Utc::now();
        let order = ExpeditionOrder {
            code: code.to_string(),
            player_id: player_id.to_string(),
            expedition_type,
            objective: objective.to_string(),
            team: team.to_vec(),
            funding: funding.to_vec(),
            preparation,
            prep_depth,
            confidence,
            timestamp: now,
        };
        self.pending_expeditions.insert(code.to_string(), order);

        self.store.record_expedition(
            &ExpeditionRecord {
                code: code.to_string(),
                player_id: player_id.to_string(),
                expedition_type,
                objective: objective.to_string(),
                team: team.to_vec(),
                funding: funding.to_vec(),
                prep_depth,
                confidence,
                outcome: None,
                reputation_delta: 0,
                timestamp: now,
            },
            None,
        )?;
        self.store.append_event(&Event::new(
            now,
            "launch_expedition",
            json!({
                "code": code,
                "player": player_id,
                "type": expedition_type.as_str(),
                "objective": objective,
                "team": team,
                "funding": funding,
                "prep_depth": prep_depth.as_str(),
                "confidence": confidence.as_str(),
            }),
        ))?;
        self.store.append_event(&Event::new(
            now,
            "expedition_queued",
            json!({ "code": code, "player": player_id }),
        ))?;

        let ctx = ExpeditionContext {
            code: code.to_string(),
            player: player_id.to_string(),
            expedition_type: expedition_type.as_str().to_string(),
            objective: objective.to_string(),
            team: team.to_vec(),
            funding: funding.to_vec(),
        };
        let press = crate::press::research_manifesto(&ctx);
        let base_body = press.body.clone();
        let press = self.enhance_press(
            press,
            &base_body,
            Some(&player.display_name),
            None,
            json!({
                "event_type": "expedition",
                "player": player.display_name,
                "expedition_code": code,
                "objective": objective,
                "expedition_type": expedition_type.as_str(),
            }),
        )?;
        self.archive_press(&press, now)?;
        Ok(press)
    }

    /// Convenience wrapper that generates a code and zeroed preparation.
    pub fn launch_expedition(
        &mut self,
        player_id: &str,
        expedition_type: ExpeditionType,
        objective: &str,
        team: &[String],
        funding: &[String],
        confidence: ConfidenceLevel,
        prep_depth: PrepDepth,
    ) -> Result<PressRelease> {
        let prefix: String = expedition_type
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(2)
            .collect::<String>()
            .to_uppercase();
        let code = format!("{prefix}-{}", self.rng.randint(100_000, 999_999));
        self.queue_expedition(
            &code,
            player_id,
            expedition_type,
            objective,
            team,
            funding,
            ExpeditionPreparation::default(),
            prep_depth,
            confidence,
        )
    }

    /// Resolve every queued expedition: roll the outcome, settle
    /// reputation and influence, emit the result press and its layers,
    /// apply sideways effects and maybe spawn a sidecast scholar.
    pub fn resolve_pending_expeditions(&mut self) -> Result<Vec<PressRelease>> {
        self.ensure_not_paused()?;
        let mut releases = Vec::new();
        releases.extend(self.release_scheduled_press(None)?);

        let orders: Vec<ExpeditionOrder> = self.pending_expeditions.values().cloned().collect();
        for order in orders {
            let code = order.code.clone();
            let result = self.resolver.resolve(
                &mut self.rng,
                &order.preparation,
                order.prep_depth,
                order.expedition_type,
            );
            let delta = self.confidence_delta(order.confidence, result.outcome);
            let mut player = self
                .store
                .get_player(&order.player_id)?
                .ok_or_else(|| GameError::not_found("player", order.player_id.clone()))?;
            let new_reputation = self.apply_reputation_change(&mut player, delta, order.confidence);
            self.store.upsert_player(&player)?;

            let reactions = self.generate_reactions(&order.team, &result)?;
            let outcome_ctx = OutcomeContext {
                code: code.clone(),
                player: order.player_id.clone(),
                expedition_type: order.expedition_type.as_str().to_string(),
                result: result.clone(),
                reputation_change: delta,
                reactions,
            };
            let release = expedition_result_release(&outcome_ctx);
            let base_body = release.body.clone();
            let release = self.enhance_press(
                release,
                &base_body,
                Some(&player.display_name),
                None,
                json!({
                    "event_type": "expedition",
                    "player": player.display_name,
                    "expedition_code": code,
                    "outcome": result.outcome.as_str(),
                    "reputation_delta": delta,
                }),
            )?;
            let now = Utc::now();
            self.archive_press(&release, now)?;
            releases.push(release.clone());

            let expedition_ctx = ExpeditionContext {
                code: order.code.clone(),
                player: order.player_id.clone(),
                expedition_type: order.expedition_type.as_str().to_string(),
                objective: order.objective.clone(),
                team: order.team.clone(),
                funding: order.funding.clone(),
            };
            let depth = self.multi_press.determine_depth(
                &format!("expedition_{}", order.expedition_type.as_str()),
                delta,
                Some(order.confidence.as_str()),
                result.outcome == ExpeditionOutcome::Landmark,
            );
            let scholars = self.store.all_scholars()?;
            let layers = self.multi_press.generate_expedition_layers(
                &expedition_ctx,
                &outcome_ctx,
                &scholars,
                depth,
                &mut self.rng,
            );
            let extra = self.apply_multi_press_layers(
                &layers,
                &["research_manifesto", release.press_type.as_str()],
                now,
                "expedition",
            )?;
            releases.extend(extra);

            self.store.append_event(&Event::new(
                now,
                "expedition_resolved",
                json!({
                    "code": code,
                    "player": order.player_id,
                    "type": order.expedition_type.as_str(),
                    "result": result.outcome.as_str(),
                    "roll": result.roll,
                    "modifier": result.modifier,
                    "final": result.final_score,
                    "confidence": order.confidence.as_str(),
                    "reputation_delta": delta,
                    "reputation_after": new_reputation,
                }),
            ))?;
            self.store.record_expedition(
                &ExpeditionRecord {
                    code: order.code.clone(),
                    player_id: order.player_id.clone(),
                    expedition_type: order.expedition_type,
                    objective: order.objective.clone(),
                    team: order.team.clone(),
                    funding: order.funding.clone(),
                    prep_depth: order.prep_depth,
                    confidence: order.confidence,
                    outcome: Some(result.outcome),
                    reputation_delta: delta,
                    timestamp: order.timestamp,
                },
                Some(&json!({
                    "roll": result.roll,
                    "modifier": result.modifier,
                    "final": result.final_score,
                    "sideways": result.sideways_discovery,
                    "failure": result.failure_detail,
                })),
            )?;

            self.apply_expedition_rewards(&mut player, order.expedition_type, &result);
            self.store.upsert_player(&player)?;
            self.update_relationships_from_result(&order, &result)?;

            if !result.sideways_effects.is_empty() {
                let effect_releases = self.apply_sideways_effects(&order, &result, &mut player)?;
                releases.extend(effect_releases);
            }
            if let Some(sidecast) = self.maybe_spawn_sidecast(&order, &result)? {
                self.archive_press(&sidecast, now)?;
                releases.push(sidecast);
            }
            self.pending_expeditions.remove(&code);
        }

        releases.extend(self.release_scheduled_press(None)?);
        Ok(releases)
    }

    /// Funding pledges credit their faction first; the static cost table
    /// then debits, and the balance may never go negative.
    fn charge_expedition(
        &self,
        player: &mut Player,
        expedition_type: ExpeditionType,
        funding: &[String],
    ) -> Result<()> {
        for faction in funding {
            self.apply_influence_change(player, faction, 1);
        }
        for (faction, amount) in expedition_costs(expedition_type) {
            let have = player.influence.get(*faction).copied().unwrap_or(0);
            if have < *amount {
                return Err(GameError::InsufficientInfluence {
                    faction: faction.to_string(),
                    have,
                    need: *amount,
                });
            }
            self.apply_influence_change(player, faction, -amount);
        }
        Ok(())
    }

    fn apply_expedition_rewards(
        &self,
        player: &mut Player,
        expedition_type: ExpeditionType,
        result: &ExpeditionResult,
    ) {
        if result.outcome == ExpeditionOutcome::Failure {
            return;
        }
        for (faction, amount) in expedition_rewards(expedition_type) {
            self.apply_influence_change(player, faction, *amount);
        }
    }

    fn update_relationships_from_result(
        &mut self,
        order: &ExpeditionOrder,
        result: &ExpeditionResult,
    ) -> Result<()> {
        for scholar_id in &order.team {
            let Some(mut scholar) = self.store.get_scholar(scholar_id)? else {
                continue;
            };
            let delta = if result.outcome == ExpeditionOutcome::Failure {
                -2.0
            } else {
                1.0
            };
            scholar.memory.adjust_feeling(&order.player_id, delta);
            let feeling = scholar.memory.feeling(&order.player_id);
            self.store.save_scholar(&scholar)?;
            self.store
                .update_relationship(scholar_id, &order.player_id, feeling)?;
        }
        Ok(())
    }

    /// Apply the mechanical consequences of a sideways discovery and
    /// schedule any delayed press or orders it carries.
    fn apply_sideways_effects(
        &mut self,
        order: &ExpeditionOrder,
        result: &ExpeditionResult,
        player: &mut Player,
    ) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        let now = Utc::now();
        let tags = &result.sideways_tags;

        self.schedule_sideways_followups(order, result, now)?;

        for effect in &result.sideways_effects {
            match effect {
                SidewaysEffect::FactionShift {
                    faction,
                    amount,
                    description,
                } => {
                    let old = player.influence.get(faction).copied().unwrap_or(0);
                    self.apply_influence_change(player, faction, *amount);
                    let new = player.influence.get(faction).copied().unwrap_or(0);
                    let mut press = PressRelease::new(
                        "faction_shift",
                        format!("Expedition Discovery Shifts {faction} Relations"),
                        format!(
                            "{description}. {}'s {faction} influence changes by {amount} \
                             (from {old} to {new}).",
                            player.display_name
                        ),
                    )
                    .with_metadata(json!({
                        "player": player.display_name,
                        "faction": faction,
                        "change": amount,
                    }));
                    attach_tags(&mut press, tags);
                    releases.push(press);
                }
                SidewaysEffect::SpawnTheory {
                    theory,
                    confidence,
                    description,
                } => {
                    let deadline = (now + Duration::days(7)).format("%Y-%m-%d").to_string();
                    self.store.record_theory(&TheoryRecord {
                        timestamp: now,
                        player_id: order.player_id.clone(),
                        theory: theory.clone(),
                        confidence: *confidence,
                        supporters: Vec::new(),
                        deadline,
                    })?;
                    let mut press = PressRelease::new(
                        "discovery_theory",
                        "Discovery Spawns New Theory",
                        format!(
                            "{description}. {} proposes: '{theory}' with {} confidence.",
                            player.display_name,
                            confidence.as_str()
                        ),
                    )
                    .with_metadata(json!({ "player": player.display_name, "theory": theory }));
                    attach_tags(&mut press, tags);
                    releases.push(press);
                }
                SidewaysEffect::CreateGrudge {
                    target,
                    intensity,
                    description,
                } => {
                    let target_scholar = self.resolve_grudge_target(target, &order.team)?;
                    if let Some(mut scholar) = target_scholar {
                        scholar.memory.adjust_feeling(&order.player_id, -intensity);
                        self.store.save_scholar(&scholar)?;
                        let mut press = PressRelease::new(
                            "scholar_grudge",
                            format!("{} Objects to Expedition Approach", scholar.name),
                            format!(
                                "{description}. {} expresses concerns about {}'s expedition \
                                 methods.",
                                scholar.name, player.display_name
                            ),
                        )
                        .with_metadata(json!({
                            "scholar": scholar.name,
                            "player": player.display_name,
                        }));
                        attach_tags(&mut press, tags);
                        releases.push(press);
                    }
                }
                SidewaysEffect::QueueOrder {
                    order_type,
                    order_data,
                    description,
                } => {
                    if order_type == "conference" {
                        if let Some(press) =
                            self.spawn_sideways_conference(order, order_data, description, now)?
                        {
                            let mut press = press;
                            attach_tags(&mut press, tags);
                            releases.push(press);
                        }
                    } else {
                        self.store.enqueue_order(
                            order_type,
                            Some(&order.player_id),
                            Some(&order.code),
                            order_data,
                            None,
                            None,
                            None,
                            now,
                        )?;
                    }
                }
                SidewaysEffect::ReputationChange {
                    amount,
                    description,
                } => {
                    let old = player.reputation;
                    let (lower, upper) = self.settings.reputation_bounds();
                    player.adjust_reputation(*amount, lower, upper);
                    let mut press = PressRelease::new(
                        "reputation_shift",
                        "Discovery Affects Academic Standing",
                        format!(
                            "{description}. {}'s reputation changes by {amount} (from {old} \
                             to {}).",
                            player.display_name, player.reputation
                        ),
                    )
                    .with_metadata(json!({ "player": player.display_name, "change": amount }));
                    attach_tags(&mut press, tags);
                    releases.push(press);
                }
                SidewaysEffect::UnlockOpportunity {
                    kind,
                    expires_in_days,
                    description,
                } => {
                    let deadline = now + Duration::days(*expires_in_days);
                    let scholar_id = order
                        .team
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    self.schedule_followup(
                        &scholar_id,
                        kind,
                        deadline,
                        json!({
                            "source_type": "expedition_opportunity",
                            "source_id": order.code,
                            "kind": kind,
                        }),
                        now,
                    )?;
                    let mut press = PressRelease::new(
                        "opportunity_unlocked",
                        "New Opportunity Emerges",
                        format!("{description}. Opportunity expires in {expires_in_days} days."),
                    )
                    .with_metadata(json!({
                        "player": player.display_name,
                        "opportunity": kind,
                    }));
                    attach_tags(&mut press, tags);
                    releases.push(press);
                }
            }
        }

        self.store.upsert_player(player)?;
        for release in &releases {
            self.archive_press(release, now)?;
        }
        let scheduled = self.release_scheduled_press(Some(now))?;
        Ok(releases.into_iter().chain(scheduled).collect())
    }

    fn resolve_grudge_target(
        &mut self,
        target: &str,
        team: &[String],
    ) -> Result<Option<Scholar>> {
        if target != "random" {
            return self.store.get_scholar(target);
        }
        let eligible: Vec<Scholar> = self
            .store
            .all_scholars()?
            .into_iter()
            .filter(|s| !team.contains(&s.id))
            .collect();
        if eligible.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.rng.choice(&eligible).clone()))
    }

    /// Sideways conferences piggyback on a spawned theory with a 48-hour
    /// deadline.
    fn spawn_sideways_conference(
        &mut self,
        order: &ExpeditionOrder,
        order_data: &Value,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PressRelease>> {
        let topic = order_data
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or("Emergency colloquium on expedition findings");
        self.store.record_theory(&TheoryRecord {
            timestamp: now,
            player_id: order.player_id.clone(),
            theory: topic.to_string(),
            confidence: ConfidenceLevel::Suspect,
            supporters: Vec::new(),
            deadline: (now + Duration::hours(48)).format("%Y-%m-%d %H:%M").to_string(),
        })?;
        let Some(theory_id) = self.store.last_theory_id_by_player(&order.player_id)? else {
            return Ok(None);
        };
        let scholars = self.store.all_scholars()?;
        let supporters: Vec<String> = scholars.iter().take(3).map(|s| s.id.clone()).collect();
        let opposition: Vec<String> = scholars
            .iter()
            .skip(3)
            .take(3)
            .map(|s| s.id.clone())
            .collect();
        // A sideways colloquium never blocks resolution on the sponsor's
        // standing.
        match self.launch_conference(
            &order.player_id,
            theory_id,
            ConfidenceLevel::Suspect,
            &supporters,
            &opposition,
        ) {
            Ok(_) => {}
            Err(GameError::ThresholdNotMet { .. }) => return Ok(None),
            Err(err) => return Err(err),
        }
        Ok(Some(
            PressRelease::new(
                "conference_scheduled",
                "Emergency Colloquium Scheduled",
                format!("{description}. Conference scheduled to discuss expedition findings."),
            )
            .with_metadata(json!({ "player": order.player_id })),
        ))
    }

    fn schedule_sideways_followups(
        &mut self,
        order: &ExpeditionOrder,
        result: &ExpeditionResult,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        for entry in &result.press_followups {
            let release_at = timestamp + Duration::minutes(entry.delay_minutes.max(1));
            let mut metadata = json!({
                "source": "sideways_followup",
                "order_code": order.code,
                "expedition_type": order.expedition_type.as_str(),
            });
            if !result.sideways_tags.is_empty() {
                metadata["tags"] = json!(result.sideways_tags);
            }
            let release = PressRelease::new(
                entry.press_type.clone(),
                entry.headline.clone(),
                entry.body.clone(),
            )
            .with_metadata(metadata);
            self.store.enqueue_press(&release, release_at, timestamp)?;
            self.store.append_event(&Event::new(
                timestamp,
                "sideways_press_scheduled",
                json!({
                    "order_code": order.code,
                    "headline": entry.headline,
                    "delay_minutes": entry.delay_minutes,
                    "type": entry.press_type,
                }),
            ))?;
        }
        for entry in &result.order_followups {
            let scheduled_at = if entry.delay_minutes > 0 {
                Some(timestamp + Duration::minutes(entry.delay_minutes))
            } else {
                None
            };
            let mut payload = entry.payload.clone();
            if payload.is_null() {
                payload = json!({});
            }
            if let Some(object) = payload.as_object_mut() {
                object
                    .entry("source".to_string())
                    .or_insert(json!("sideways_followup"));
                object
                    .entry("order_code".to_string())
                    .or_insert(json!(order.code));
                if !result.sideways_tags.is_empty() {
                    object
                        .entry("tags".to_string())
                        .or_insert(json!(result.sideways_tags));
                }
            }
            self.store.enqueue_order(
                &entry.order_type,
                Some(&order.player_id),
                Some(&order.code),
                &payload,
                scheduled_at,
                None,
                None,
                timestamp,
            )?;
            self.store.append_event(&Event::new(
                timestamp,
                "sideways_order_scheduled",
                json!({
                    "order_code": order.code,
                    "order_type": entry.order_type,
                    "delay_minutes": entry.delay_minutes,
                }),
            ))?;
        }
        Ok(())
    }

    /// On a non-failure with roster room, spawn a sidecast scholar
    /// sponsored by the expedition's player and open the debut arc.
    fn maybe_spawn_sidecast(
        &mut self,
        order: &ExpeditionOrder,
        result: &ExpeditionResult,
    ) -> Result<Option<PressRelease>> {
        if result.outcome == ExpeditionOutcome::Failure {
            return Ok(None);
        }
        if self.store.scholar_count()? as usize >= self.settings.max_roster {
            return Ok(None);
        }
        let identifier = self.next_generated_id();
        let mut scholar = self.repository.generate(&mut self.rng, &identifier);
        scholar.contract.employer = order.player_id.clone();
        let arc_key = self.multi_press.pick_sidecast_arc(&mut self.rng);
        scholar.contract.sidecast_arc = Some(arc_key.clone());
        scholar.contract.sidecast_sponsor = Some(order.player_id.clone());
        let now = Utc::now();
        record_sidecast_memory(
            &mut scholar,
            Some(&order.player_id),
            &arc_key,
            "spawn",
            now,
        );
        scholar.contract.expedition_links.push(crate::models::ExpeditionLink {
            expedition: order.code.clone(),
            timestamp: now,
        });
        self.store.save_scholar(&scholar)?;

        let press = crate::press::academic_gossip(&GossipContext {
            scholar: scholar.name.clone(),
            quote: "I saw the expedition and could not resist joining.".to_string(),
            trigger: format!("Expedition {}", order.code),
        });
        self.store.append_event(&Event::new(
            now,
            "scholar_sidecast",
            json!({ "scholar": scholar.id, "expedition": order.code }),
        ))?;

        let delay_hours = self
            .multi_press
            .sidecast_phase_delay(&arc_key, "debut", 6.0);
        let scheduled_at = now + Duration::minutes((delay_hours * 60.0) as i64);
        self.store.enqueue_order(
            "followup:sidecast_debut",
            Some(&scholar.id),
            Some(&order.player_id),
            &json!({
                "arc": arc_key,
                "phase": "debut",
                "sponsor": order.player_id,
                "expedition_code": order.code,
                "expedition_type": order.expedition_type.as_str(),
            }),
            Some(scheduled_at),
            None,
            None,
            now,
        )?;
        Ok(Some(press))
    }

    pub fn pending_expedition_codes(&self) -> Vec<String> {
        self.pending_expeditions.keys().cloned().collect()
    }

    pub fn admin_cancel_expedition(&mut self, code: &str, reason: Option<&str>) -> Result<PressRelease> {
        let Some(order) = self.pending_expeditions.remove(code) else {
            return Err(GameError::not_found("expedition", code));
        };
        let now = Utc::now();
        let press = PressRelease::new(
            "admin_action",
            format!("Expedition {code} Cancelled"),
            format!(
                "Expedition {code} ({}) has been withdrawn by the operations desk.{}",
                order.expedition_type.as_str(),
                reason.map(|r| format!(" Reason: {r}.")).unwrap_or_default()
            ),
        )
        .with_metadata(json!({ "code": code, "player": order.player_id, "reason": reason }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "admin_cancel_expedition",
            json!({ "code": code, "player": order.player_id, "reason": reason }),
        ))?;
        Ok(press)
    }
}

fn attach_tags(release: &mut PressRelease, tags: &[String]) {
    if tags.is_empty() {
        return;
    }
    release.set_meta("tags", json!(tags));
}

pub(crate) fn record_sidecast_memory(
    scholar: &mut Scholar,
    sponsor_id: Option<&str>,
    arc: &str,
    phase: &str,
    timestamp: DateTime<Utc>,
) {
    let delta = match phase {
        "spawn" => 0.75,
        "debut" => 1.0,
        "integration" => 0.6,
        "spotlight" => 1.2,
        _ => 0.4,
    };
    if let Some(sponsor) = sponsor_id {
        scholar.memory.adjust_feeling(sponsor, delta);
    }
    let subject = sponsor_id.unwrap_or(arc).to_string();
    scholar.memory.record_fact(MemoryFact {
        timestamp,
        kind: "sidecast".to_string(),
        subject,
        details: [
            ("arc".to_string(), json!(arc)),
            ("phase".to_string(), json!(phase)),
            ("sponsor_id".to_string(), json!(sponsor_id)),
        ]
        .into_iter()
        .collect(),
    });
    scholar.contract.sidecast_history.push(crate::models::SidecastNote {
        arc: arc.to_string(),
        phase: phase.to_string(),
        sponsor_id: sponsor_id.map(str::to_string),
        timestamp,
    });
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;

    fn big_prep() -> ExpeditionPreparation {
        ExpeditionPreparation {
            think_tank_bonus: 100,
            ..Default::default()
        }
    }

    fn doomed_prep() -> ExpeditionPreparation {
        ExpeditionPreparation {
            site_friction: -200,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_expedition_charges_costs_and_credits_funding() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        let press = svc
            .queue_expedition(
                "AR-01",
                "alice",
                ExpeditionType::ThinkTank,
                "Obj",
                &["s.ironquill".to_string()],
                &["academia".to_string()],
                ExpeditionPreparation::default(),
                PrepDepth::Shallow,
                ConfidenceLevel::Certain,
            )
            .unwrap();
        assert_eq!(press.press_type, "research_manifesto");
        assert!(press.headline.contains("AR-01"));
        // -1 cost, +1 funding credit nets to zero.
        let alice = svc.store.get_player("alice").unwrap().unwrap();
        assert_eq!(alice.influence["academia"], 0);
        assert_eq!(svc.pending_expedition_codes(), vec!["AR-01".to_string()]);
    }

    #[test]
    fn test_resolution_success_pays_wager_and_rewards() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        svc.queue_expedition(
            "AR-01",
            "alice",
            ExpeditionType::ThinkTank,
            "Obj",
            &["s.ironquill".to_string()],
            &["academia".to_string()],
            big_prep(),
            PrepDepth::Shallow,
            ConfidenceLevel::Certain,
        )
        .unwrap();
        let releases = svc.resolve_pending_expeditions().unwrap();
        let report = releases
            .iter()
            .find(|r| r.press_type == "discovery_report")
            .expect("discovery report emitted");
        let outcome = report.metadata["outcome"].as_str().unwrap();
        assert!(outcome == "success" || outcome == "landmark");

        let alice = svc.store.get_player("alice").unwrap().unwrap();
        assert_eq!(alice.reputation, 5);
        // think_tank reward credits academia.
        assert!(alice.influence["academia"] >= 1);
        assert!(svc.pending_expedition_codes().is_empty());

        let events = svc.store.export_events(None).unwrap();
        let resolved = events
            .iter()
            .find(|(_, e)| e.action == "expedition_resolved")
            .unwrap();
        assert_eq!(resolved.1.payload["reputation_delta"], 5);

        // Teammate feeling improved on success.
        let ironquill = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(ironquill.memory.feeling("alice"), 1.0);
        assert_eq!(
            svc.store.get_relationship("s.ironquill", "alice").unwrap(),
            Some(1.0)
        );
    }

    #[test]
    fn test_resolution_failure_emits_retraction_and_penalty() {
        let mut svc = service();
        svc.ensure_player("bob", None).unwrap();
        svc.queue_expedition(
            "FX-01",
            "bob",
            ExpeditionType::ThinkTank,
            "Obj",
            &["s.farseer".to_string()],
            &["academia".to_string()],
            doomed_prep(),
            PrepDepth::Standard,
            ConfidenceLevel::Certain,
        )
        .unwrap();
        let releases = svc.resolve_pending_expeditions().unwrap();
        assert!(releases.iter().any(|r| r.press_type == "retraction_notice"));
        let bob = svc.store.get_player("bob").unwrap().unwrap();
        assert_eq!(bob.reputation, -7);
        let farseer = svc.store.get_scholar("s.farseer").unwrap().unwrap();
        assert_eq!(farseer.memory.feeling("bob"), -2.0);
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        svc.queue_expedition(
            "AR-01",
            "alice",
            ExpeditionType::ThinkTank,
            "Obj",
            &[],
            &["academia".to_string()],
            ExpeditionPreparation::default(),
            PrepDepth::Standard,
            ConfidenceLevel::Suspect,
        )
        .unwrap();
        let err = svc
            .queue_expedition(
                "AR-01",
                "alice",
                ExpeditionType::ThinkTank,
                "Obj",
                &[],
                &["academia".to_string()],
                ExpeditionPreparation::default(),
                PrepDepth::Standard,
                ConfidenceLevel::Suspect,
            )
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
    }

    #[test]
    fn test_underfunded_expedition_is_rejected() {
        let mut svc = service();
        svc.ensure_player("pauper", None).unwrap();
        let err = svc
            .queue_expedition(
                "GP-01",
                "pauper",
                ExpeditionType::ThinkTank,
                "Obj",
                &[],
                &[],
                ExpeditionPreparation::default(),
                PrepDepth::Standard,
                ConfidenceLevel::Suspect,
            )
            .unwrap_err();
        assert!(matches!(err, GameError::InsufficientInfluence { .. }));
    }

    #[test]
    fn test_admin_cancel_removes_pending_order() {
        let mut svc = service();
        svc.ensure_player("alice", None).unwrap();
        svc.queue_expedition(
            "AR-02",
            "alice",
            ExpeditionType::ThinkTank,
            "Obj",
            &[],
            &["academia".to_string()],
            ExpeditionPreparation::default(),
            PrepDepth::Standard,
            ConfidenceLevel::Suspect,
        )
        .unwrap();
        let press = svc.admin_cancel_expedition("AR-02", Some("weather")).unwrap();
        assert_eq!(press.press_type, "admin_action");
        assert!(svc.pending_expedition_codes().is_empty());
        assert!(svc.admin_cancel_expedition("AR-02", None).is_err());
    }
}
