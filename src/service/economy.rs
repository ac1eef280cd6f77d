//! The influence economy's periodic obligations: debt settlement and
//! reprisals, contract upkeep, seasonal commitments, faction projects, and
//! the direct influence sinks (investments, endowments).

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::error::{GameError, Result};
use crate::models::{Event, PressRelease};
use crate::press::{
    archive_endowment, faction_investment, faction_project_complete, faction_project_update,
    seasonal_commitment_complete, seasonal_commitment_update, ArchiveEndowmentContext,
    FactionInvestmentContext, FactionProjectContext, ProjectContribution,
    SeasonalCommitmentContext,
};

use super::GameService;

impl GameService {
    /// Pay down a player's symposium debts from available influence,
    /// first-in-first-out, then apply any due reprisals.
    pub(crate) fn settle_symposium_debts(
        &mut self,
        player_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let debts = self.store.list_influence_debts(player_id, Some("symposium"))?;
        if debts.is_empty() {
            return Ok(json!({
                "settled": 0,
                "outstanding": 0,
                "details": [],
                "reprisals": [],
            }));
        }
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let mut settled_total = 0;
        let mut outstanding_total = 0;
        let mut details = Vec::new();
        for debt in &debts {
            let balance = player.influence.get(&debt.faction).copied().unwrap_or(0);
            let payment = balance.min(debt.amount).max(0);
            let mut remaining = debt.amount;
            if payment > 0 {
                self.apply_influence_change(&mut player, &debt.faction, -payment);
                self.store.apply_influence_debt_payment(
                    player_id,
                    &debt.faction,
                    payment,
                    now,
                    "symposium",
                )?;
                settled_total += payment;
                remaining -= payment;
            }
            outstanding_total += remaining;
            details.push(json!({
                "faction": debt.faction,
                "remaining": remaining,
                "reprisal_level": debt.reprisal_level,
            }));
        }
        if settled_total > 0 {
            self.store.upsert_player(&player)?;
        }
        let reprisals = self.apply_influence_debt_reprisal(
            player_id,
            &details,
            now,
            "symposium",
            self.settings.symposium_debt_reprisal_threshold,
            self.settings.symposium_debt_reprisal_penalty,
            self.settings.symposium_debt_reprisal_cooldown_days,
        )?;
        Ok(json!({
            "settled": settled_total,
            "outstanding": outstanding_total,
            "details": details,
            "reprisals": reprisals,
        }))
    }

    /// Escalating penalty for debts at or past the threshold once the
    /// cooldown has lapsed: seize `penalty` influence, or a point of
    /// reputation when there is nothing to seize. Schedules the public
    /// reprimand follow-up.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn apply_influence_debt_reprisal(
        &mut self,
        player_id: &str,
        debt_details: &[Value],
        now: DateTime<Utc>,
        source: &str,
        threshold: i64,
        penalty: i64,
        cooldown_days: i64,
    ) -> Result<Vec<Value>> {
        if threshold <= 0 || penalty < 0 {
            return Ok(Vec::new());
        }
        let cooldown = Duration::days(cooldown_days);
        let mut reprisals = Vec::new();
        for detail in debt_details {
            let remaining = detail["remaining"].as_i64().unwrap_or(0);
            if remaining < threshold {
                continue;
            }
            let Some(faction) = detail["faction"].as_str() else {
                continue;
            };
            let Some(record) = self.store.get_influence_debt(player_id, faction, source)? else {
                continue;
            };
            if let Some(last) = record.last_reprisal_at {
                if last + cooldown > now {
                    continue;
                }
            }
            let mut player = self
                .store
                .get_player(player_id)?
                .ok_or_else(|| GameError::not_found("player", player_id))?;
            let influence_before = player.influence.get(faction).copied().unwrap_or(0);
            let penalty_applied = influence_before.min(penalty).max(0);
            let mut reputation_penalty = 0;
            if penalty_applied > 0 {
                self.apply_influence_change(&mut player, faction, -penalty_applied);
            } else {
                reputation_penalty = 1;
                let (lower, upper) = self.settings.reputation_bounds();
                player.adjust_reputation(-reputation_penalty, lower, upper);
            }
            self.store.upsert_player(&player)?;

            let reprisal_level = record.reprisal_level + 1;
            self.store.update_influence_debt_reprisal(
                player_id,
                faction,
                source,
                reprisal_level,
                now,
            )?;

            let message = json!({
                "player_id": player_id,
                "display_name": player.display_name,
                "faction": faction,
                "penalty_influence": penalty_applied,
                "penalty_reputation": reputation_penalty,
                "reprisal_level": reprisal_level,
                "remaining": remaining,
                "source": source,
            });
            self.telemetry.counter(
                &format!("{source}_debt_reprisal"),
                (penalty_applied.max(reputation_penalty)) as f64,
                json!({ "player": player_id, "faction": faction }),
            );
            self.schedule_followup(
                player_id,
                "symposium_reprimand",
                now,
                message.clone(),
                now,
            )?;
            self.push_admin_notification(format!(
                "Reprisal ({source}): {} owes {remaining} influence to {faction} (level \
                 {reprisal_level}).",
                player.display_name
            ));
            reprisals.push(message);
        }
        Ok(reprisals)
    }

    /// Digest step: charge per-scholar contract upkeep per faction, paying
    /// old contract debt first and booking any shortfall as new debt.
    pub(crate) fn apply_contract_upkeep(&mut self, now: DateTime<Utc>) -> Result<()> {
        let upkeep = self.settings.contract_upkeep_per_scholar.max(0);
        if upkeep == 0 {
            return Ok(());
        }
        let commitments = self.contract_commitments()?;
        for (player_id, faction_counts) in commitments {
            let Some(mut player) = self.store.get_player(&player_id)? else {
                continue;
            };
            let mut debt_details = Vec::new();
            for (faction, count) in faction_counts {
                let total_cost = upkeep * count;
                if total_cost <= 0 {
                    continue;
                }
                self.ensure_influence_structure(&mut player);
                let mut available = player.influence.get(&faction).copied().unwrap_or(0);

                let existing_debt = self
                    .store
                    .get_influence_debt(&player_id, &faction, "contract")?
                    .map(|d| d.amount)
                    .unwrap_or(0);
                if existing_debt > 0 && available > 0 {
                    let paid_toward_debt = available.min(existing_debt);
                    available -= paid_toward_debt;
                    self.store.apply_influence_debt_payment(
                        &player_id,
                        &faction,
                        paid_toward_debt,
                        now,
                        "contract",
                    )?;
                    self.apply_influence_change(&mut player, &faction, -paid_toward_debt);
                }

                let payment = available.min(total_cost);
                if payment > 0 {
                    self.apply_influence_change(&mut player, &faction, -payment);
                }
                let debt = total_cost - payment;
                if debt > 0 {
                    self.store
                        .record_influence_debt(&player_id, &faction, debt, now, "contract")?;
                    self.push_admin_notification(format!(
                        "Contract upkeep shortfall: {} owes {debt} {faction} influence.",
                        player.display_name
                    ));
                }
                let remaining = self
                    .store
                    .get_influence_debt(&player_id, &faction, "contract")?
                    .map(|d| d.amount)
                    .unwrap_or(0);
                debt_details.push(json!({
                    "faction": faction,
                    "remaining": remaining,
                }));
                self.telemetry.counter(
                    "contract_upkeep",
                    total_cost as f64,
                    json!({ "player": player_id, "faction": faction, "debt": debt }),
                );
            }
            self.store.upsert_player(&player)?;
            if !debt_details.is_empty() {
                self.apply_influence_debt_reprisal(
                    &player_id,
                    &debt_details,
                    now,
                    "contract",
                    self.settings.contract_debt_reprisal_threshold,
                    self.settings.contract_debt_reprisal_penalty,
                    self.settings.contract_debt_reprisal_cooldown_days,
                )?;
            }
        }
        Ok(())
    }

    /// Start a seasonal commitment; requires a neutral-or-better faction
    /// relationship unless an admin override allows it.
    pub fn start_seasonal_commitment(
        &mut self,
        player_id: &str,
        faction: &str,
        tier: Option<&str>,
        base_cost: Option<i64>,
        duration_days: Option<i64>,
        allow_override: bool,
    ) -> Result<i64> {
        self.validate_faction(faction)?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let relationship = self.player_faction_relationship(&player, faction, None)?;
        if !allow_override && relationship < self.settings.seasonal_commitment_min_relationship {
            return Err(GameError::invalid(
                "seasonal commitments require a neutral or better relationship with the faction",
            ));
        }
        let now = Utc::now();
        let base = base_cost.unwrap_or(self.settings.seasonal_commitment_base_cost);
        let duration = duration_days.unwrap_or(self.settings.seasonal_commitment_duration_days);
        let end_at = now + Duration::days(duration);
        self.store
            .create_seasonal_commitment(player_id, faction, tier, base, now, end_at)
    }

    /// Digest step: charge due seasonal commitments (at most once per six
    /// hours each), discounted by relationship, booking shortfalls as
    /// seasonal debt and completing commitments whose term has ended.
    pub(crate) fn apply_seasonal_commitments(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        for commitment in self.store.list_active_seasonal_commitments()? {
            if let Some(last) = commitment.last_processed_at {
                if now - last < Duration::hours(6) {
                    continue;
                }
            }
            let Some(mut player) = self.store.get_player(&commitment.player_id)? else {
                continue;
            };
            let relationship =
                self.player_faction_relationship(&player, &commitment.faction, None)?;
            let modifier = (1.0 - relationship).max(0.5);
            let effective_cost = ((commitment.base_cost as f64 * modifier).round() as i64).max(0);

            self.ensure_influence_structure(&mut player);
            let available = player
                .influence
                .get(&commitment.faction)
                .copied()
                .unwrap_or(0);
            let paid = available.min(effective_cost);
            if paid > 0 {
                self.apply_influence_change(&mut player, &commitment.faction, -paid);
            }
            let debt = effective_cost - paid;
            if debt > 0 {
                self.store.record_influence_debt(
                    &commitment.player_id,
                    &commitment.faction,
                    debt,
                    now,
                    "seasonal",
                )?;
            }
            self.store.upsert_player(&player)?;

            let remaining = self
                .store
                .get_influence_debt(&commitment.player_id, &commitment.faction, "seasonal")?
                .map(|d| d.amount)
                .unwrap_or(0);
            if remaining > 0 {
                self.apply_influence_debt_reprisal(
                    &commitment.player_id,
                    &[json!({ "faction": commitment.faction, "remaining": remaining })],
                    now,
                    "seasonal",
                    self.settings.seasonal_commitment_reprisal_threshold,
                    self.settings.seasonal_commitment_reprisal_penalty,
                    self.settings.seasonal_commitment_reprisal_cooldown_days,
                )?;
            }

            let ctx = SeasonalCommitmentContext {
                player: player.display_name.clone(),
                faction: commitment.faction.clone(),
                tier: commitment.tier.clone(),
                cost: effective_cost,
                relationship_modifier: relationship,
                paid,
                debt,
                status: "active".to_string(),
            };
            let mut release = seasonal_commitment_update(&ctx);
            release.merge_meta_map(
                "commitment",
                json!({
                    "id": commitment.id,
                    "tier": commitment.tier,
                    "base_cost": commitment.base_cost,
                    "relationship_modifier": relationship,
                    "paid": paid,
                    "debt": remaining.max(debt),
                }),
            );
            self.archive_press(&release, now)?;
            releases.push(release);

            self.store
                .mark_seasonal_commitment_processed(commitment.id, now)?;
            if commitment.end_at <= now {
                self.store
                    .set_seasonal_commitment_status(commitment.id, "completed", now)?;
                let completion = seasonal_commitment_complete(&SeasonalCommitmentContext {
                    status: "completed".to_string(),
                    ..ctx
                });
                self.archive_press(&completion, now)?;
                releases.push(completion);
            }
            self.telemetry.counter(
                "seasonal_commitment_charge",
                effective_cost as f64,
                json!({
                    "player": commitment.player_id,
                    "faction": commitment.faction,
                    "debt": debt,
                }),
            );
        }
        Ok(releases)
    }

    pub fn start_faction_project(
        &mut self,
        name: &str,
        faction: &str,
        target_progress: f64,
        metadata: Option<Value>,
    ) -> Result<i64> {
        self.validate_faction(faction)?;
        if target_progress <= 0.0 {
            return Err(GameError::invalid("project target must be positive"));
        }
        self.store
            .create_faction_project(name, faction, target_progress, metadata.as_ref(), Utc::now())
    }

    pub fn list_faction_projects(&self, include_completed: bool) -> Result<Vec<Value>> {
        Ok(self
            .store
            .list_faction_projects(include_completed)?
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "name": p.name,
                    "faction": p.faction,
                    "progress": p.progress,
                    "target_progress": p.target_progress,
                    "status": p.status,
                })
            })
            .collect())
    }

    /// Digest step: every player with positive influence in a project's
    /// faction pushes it forward; completion pays contributors a reward.
    pub(crate) fn advance_faction_projects(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        let projects = self.store.list_faction_projects(false)?;
        if projects.is_empty() {
            return Ok(releases);
        }
        let players = self.store.all_players()?;
        for project in projects {
            let base_increment = self.settings.faction_project_base_progress_weight;
            let mut total_progress = project.progress;
            let mut contributions = Vec::new();
            let mut contributors = Vec::new();
            for player in &players {
                let influence = player
                    .influence
                    .get(&project.faction)
                    .copied()
                    .unwrap_or(0)
                    .max(0) as f64;
                let relationship = self.player_faction_relationship(
                    player,
                    &project.faction,
                    Some(self.settings.faction_project_relationship_weight),
                )?;
                let contribution = influence * base_increment + relationship;
                if contribution <= 0.0 {
                    continue;
                }
                total_progress += contribution;
                contributions.push(ProjectContribution {
                    player: player.display_name.clone(),
                    contribution,
                    relationship_modifier: relationship,
                    influence,
                });
                contributors.push(player.id.clone());
            }
            if contributions.is_empty() {
                continue;
            }

            self.store
                .update_faction_project_progress(project.id, total_progress, now)?;
            let ctx = FactionProjectContext {
                name: project.name.clone(),
                faction: project.faction.clone(),
                progress: total_progress,
                target: project.target_progress,
                contributions,
            };
            let mut release = faction_project_update(&ctx);
            release.merge_meta_map(
                "project",
                json!({
                    "id": project.id,
                    "progress": total_progress,
                    "target": project.target_progress,
                }),
            );
            self.archive_press(&release, now)?;
            releases.push(release);

            if total_progress >= project.target_progress {
                self.store.complete_faction_project(project.id, now)?;
                let completion = faction_project_complete(&ctx);
                self.archive_press(&completion, now)?;
                releases.push(completion);

                let reward = self.settings.faction_project_completion_reward;
                if reward > 0 {
                    for contributor in &contributors {
                        if let Some(mut player) = self.store.get_player(contributor)? {
                            self.apply_influence_change(&mut player, &project.faction, reward);
                            self.store.upsert_player(&player)?;
                        }
                    }
                }
            }
            self.telemetry.gauge(
                "faction_project_progress",
                total_progress,
                json!({ "project_id": project.id, "faction": project.faction }),
            );
        }
        Ok(releases)
    }

    /// Sink influence into a faction; large gifts warm the feelings of the
    /// player's contracted scholars in that faction.
    pub fn invest_in_faction(
        &mut self,
        player_id: &str,
        faction: &str,
        amount: i64,
        program: Option<&str>,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        self.validate_faction(faction)?;
        if amount < self.settings.faction_investment_min_amount {
            return Err(GameError::invalid(format!(
                "minimum investment is {} influence",
                self.settings.faction_investment_min_amount
            )));
        }
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        self.ensure_influence_structure(&mut player);
        let available = player.influence.get(faction).copied().unwrap_or(0);
        if available < amount {
            return Err(GameError::InsufficientInfluence {
                faction: faction.to_string(),
                have: available,
                need: amount,
            });
        }

        let now = Utc::now();
        self.apply_influence_change(&mut player, faction, -amount);
        self.store.upsert_player(&player)?;
        let investment_id =
            self.store
                .record_faction_investment(player_id, faction, amount, program, now)?;

        let step = self.settings.faction_investment_feeling_step.max(1);
        let relationship_bonus =
            (amount / step) as f64 * self.settings.faction_investment_feeling_bonus;
        if relationship_bonus > 0.0 {
            for mut scholar in self.store.all_scholars()? {
                if scholar.contract.employer != player_id {
                    continue;
                }
                if scholar.contract.faction.as_deref() != Some(faction) {
                    continue;
                }
                scholar.memory.adjust_feeling(player_id, relationship_bonus);
                self.store.save_scholar(&scholar)?;
            }
        }

        let total = self.store.total_faction_investment(player_id, faction)?;
        let mut press = faction_investment(&FactionInvestmentContext {
            player: player.display_name.clone(),
            faction: faction.to_string(),
            amount,
            total,
            program: program.map(str::to_string),
            relationship_bonus,
        });
        press.set_meta("investment_id", json!(investment_id));
        press.set_meta("player_id", json!(player_id));
        press.set_meta("faction", json!(faction));
        press.set_meta("amount", json!(amount));
        press.set_meta("total", json!(total));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "faction_investment",
            json!({
                "player": player_id,
                "faction": faction,
                "amount": amount,
                "program": program,
                "total": total,
            }),
        ))?;
        self.telemetry.counter(
            "faction_investment",
            amount as f64,
            json!({ "player": player_id, "faction": faction }),
        );
        Ok(press)
    }

    pub fn list_faction_investments(&self, player_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .store
            .list_faction_investments(player_id)?
            .into_iter()
            .map(|row| {
                json!({
                    "id": row.id,
                    "faction": row.faction,
                    "amount": row.amount,
                    "program": row.program,
                    "created_at": row.created_at.to_rfc3339(),
                })
            })
            .collect())
    }

    /// Endow the archive: an influence sink that also pays down symposium
    /// then seasonal debts and grants reputation per threshold unit given.
    pub fn endow_archive(
        &mut self,
        player_id: &str,
        amount: i64,
        faction: Option<&str>,
        program: Option<&str>,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        let funding_faction = faction.unwrap_or("academia");
        self.validate_faction(funding_faction)?;
        if amount < self.settings.archive_endowment_min_amount {
            return Err(GameError::invalid(format!(
                "minimum endowment is {} influence",
                self.settings.archive_endowment_min_amount
            )));
        }
        let mut player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        self.ensure_influence_structure(&mut player);
        let available = player.influence.get(funding_faction).copied().unwrap_or(0);
        if available < amount {
            return Err(GameError::InsufficientInfluence {
                faction: funding_faction.to_string(),
                have: available,
                need: amount,
            });
        }

        let now = Utc::now();
        self.apply_influence_change(&mut player, funding_faction, -amount);

        let threshold = self.settings.archive_endowment_reputation_threshold;
        let reputation_gain = if threshold > 0 {
            (amount / threshold) * self.settings.archive_endowment_reputation_bonus
        } else {
            0
        };
        if reputation_gain > 0 {
            let (lower, upper) = self.settings.reputation_bounds();
            player.adjust_reputation(reputation_gain, lower, upper);
        }
        self.store.upsert_player(&player)?;

        let endowment_id =
            self.store
                .record_archive_endowment(player_id, funding_faction, amount, program, now)?;

        let mut paid_debt = self.store.apply_influence_debt_payment(
            player_id,
            funding_faction,
            amount,
            now,
            "symposium",
        )?;
        let leftover = amount - paid_debt;
        if leftover > 0 {
            paid_debt += self.store.apply_influence_debt_payment(
                player_id,
                funding_faction,
                leftover,
                now,
                "seasonal",
            )?;
        }

        let mut press = archive_endowment(&ArchiveEndowmentContext {
            player: player.display_name.clone(),
            faction: funding_faction.to_string(),
            amount,
            program: program.map(str::to_string),
            paid_debt,
            reputation_delta: reputation_gain,
        });
        press.set_meta("endowment_id", json!(endowment_id));
        press.set_meta("player_id", json!(player_id));
        press.set_meta("faction", json!(funding_faction));
        press.set_meta("amount", json!(amount));
        press.set_meta("paid_debt", json!(paid_debt));
        press.set_meta("reputation_gain", json!(reputation_gain));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "archive_endowment",
            json!({
                "player": player_id,
                "faction": funding_faction,
                "amount": amount,
                "program": program,
                "paid_debt": paid_debt,
                "reputation_gain": reputation_gain,
            }),
        ))?;
        self.telemetry.counter(
            "archive_endowment",
            amount as f64,
            json!({ "player": player_id, "faction": funding_faction }),
        );
        Ok(press)
    }

    pub fn list_archive_endowments(&self, player_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .store
            .list_archive_endowments(player_id)?
            .into_iter()
            .map(|row| {
                json!({
                    "id": row.id,
                    "faction": row.faction,
                    "amount": row.amount,
                    "program": row.program,
                    "created_at": row.created_at.to_rfc3339(),
                })
            })
            .collect())
    }

    pub fn list_seasonal_commitments(&self, player_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .store
            .list_player_commitments(player_id)?
            .into_iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "faction": c.faction,
                    "tier": c.tier,
                    "base_cost": c.base_cost,
                    "start_at": c.start_at.to_rfc3339(),
                    "end_at": c.end_at.to_rfc3339(),
                    "status": c.status,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{service, service_with};
    use super::*;
    use crate::config::Settings;
    use crate::models::Player;

    fn rich_player(svc: &mut GameService, id: &str, faction: &str, amount: i64) {
        let mut player = Player::new(id, id);
        player.influence.insert(faction.to_string(), amount);
        svc.store.upsert_player(&player).unwrap();
    }

    fn employ(svc: &mut GameService, scholar_id: &str, employer: &str, faction: &str) {
        let mut scholar = svc.store.get_scholar(scholar_id).unwrap().unwrap();
        scholar.contract.employer = employer.to_string();
        scholar.contract.faction = Some(faction.to_string());
        svc.store.save_scholar(&scholar).unwrap();
    }

    #[test]
    fn test_contract_upkeep_charges_and_books_debt() {
        let mut svc = service();
        rich_player(&mut svc, "patron", "academia", 1);
        employ(&mut svc, "s.ironquill", "patron", "academia");
        employ(&mut svc, "s.karatau", "patron", "academia");

        // Upkeep is 2 (two scholars × 1) against a balance of 1.
        svc.apply_contract_upkeep(Utc::now()).unwrap();
        let patron = svc.store.get_player("patron").unwrap().unwrap();
        assert_eq!(patron.influence["academia"], 0);
        let debt = svc
            .store
            .get_influence_debt("patron", "academia", "contract")
            .unwrap()
            .unwrap();
        assert_eq!(debt.amount, 1);

        // Next digest with replenished influence pays the old debt first.
        let mut patron = svc.store.get_player("patron").unwrap().unwrap();
        patron.influence.insert("academia".to_string(), 5);
        svc.store.upsert_player(&patron).unwrap();
        svc.apply_contract_upkeep(Utc::now()).unwrap();
        assert!(svc
            .store
            .get_influence_debt("patron", "academia", "contract")
            .unwrap()
            .is_none());
        let patron = svc.store.get_player("patron").unwrap().unwrap();
        // 5 - 1 (old debt) - 2 (new charge) = 2.
        assert_eq!(patron.influence["academia"], 2);
    }

    #[test]
    fn test_reprisal_fires_after_threshold_and_respects_cooldown() {
        let mut svc = service();
        rich_player(&mut svc, "carol", "academia", 2);
        let now = Utc::now();
        svc.store
            .record_influence_debt("carol", "academia", 5, now, "symposium")
            .unwrap();

        let reprisals = svc
            .apply_influence_debt_reprisal(
                "carol",
                &[json!({ "faction": "academia", "remaining": 5 })],
                now,
                "symposium",
                3,
                1,
                2,
            )
            .unwrap();
        assert_eq!(reprisals.len(), 1);
        assert_eq!(reprisals[0]["penalty_influence"], 1);
        let carol = svc.store.get_player("carol").unwrap().unwrap();
        assert_eq!(carol.influence["academia"], 1);
        // The reprimand follow-up is queued.
        let orders = svc
            .store
            .list_orders(Some("symposium_reprimand"), Some("pending"))
            .unwrap();
        assert_eq!(orders.len(), 1);

        // Cooldown suppresses an immediate second reprisal.
        let again = svc
            .apply_influence_debt_reprisal(
                "carol",
                &[json!({ "faction": "academia", "remaining": 5 })],
                now,
                "symposium",
                3,
                1,
                2,
            )
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_reprisal_takes_reputation_when_broke() {
        let mut svc = service();
        rich_player(&mut svc, "carol", "academia", 0);
        let now = Utc::now();
        svc.store
            .record_influence_debt("carol", "academia", 5, now, "symposium")
            .unwrap();
        let reprisals = svc
            .apply_influence_debt_reprisal(
                "carol",
                &[json!({ "faction": "academia", "remaining": 5 })],
                now,
                "symposium",
                3,
                1,
                2,
            )
            .unwrap();
        assert_eq!(reprisals[0]["penalty_reputation"], 1);
        let carol = svc.store.get_player("carol").unwrap().unwrap();
        assert_eq!(carol.reputation, -1);
    }

    #[test]
    fn test_seasonal_commitment_charges_with_relationship_discount() {
        let mut svc = service();
        rich_player(&mut svc, "patron", "academia", 10);
        let id = svc
            .start_seasonal_commitment("patron", "academia", Some("gold"), Some(4), Some(30), true)
            .unwrap();

        let releases = svc.apply_seasonal_commitments(Utc::now()).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].press_type, "seasonal_commitment_update");
        let patron = svc.store.get_player("patron").unwrap().unwrap();
        // No contracted scholars: relationship comes from influence and is
        // small, so the charge stays at the base cost.
        assert!(patron.influence["academia"] <= 7);

        // A second pass inside six hours is a no-op.
        assert!(svc.apply_seasonal_commitments(Utc::now()).unwrap().is_empty());
        let commitment = svc.store.get_seasonal_commitment(id).unwrap().unwrap();
        assert_eq!(commitment.status, "active");
    }

    #[test]
    fn test_seasonal_commitment_completes_at_end() {
        let mut svc = service();
        rich_player(&mut svc, "patron", "academia", 10);
        svc.start_seasonal_commitment("patron", "academia", None, Some(2), Some(0), true)
            .unwrap();
        let releases = svc
            .apply_seasonal_commitments(Utc::now() + Duration::seconds(1))
            .unwrap();
        assert!(releases
            .iter()
            .any(|r| r.press_type == "seasonal_commitment_complete"));
    }

    #[test]
    fn test_faction_project_progresses_and_completes() {
        let mut svc = service();
        rich_player(&mut svc, "patron", "industry", 10);
        // High reputation keeps the influence cap above the reward credit.
        let mut patron = svc.store.get_player("patron").unwrap().unwrap();
        patron.reputation = 40;
        svc.store.upsert_player(&patron).unwrap();
        let project_id = svc
            .start_faction_project("The Orrery", "industry", 1.5, None)
            .unwrap();

        let releases = svc.advance_faction_projects(Utc::now()).unwrap();
        assert!(releases
            .iter()
            .any(|r| r.press_type == "faction_project_update"));
        let project = svc.store.get_faction_project(project_id).unwrap().unwrap();
        assert!(project.progress > 0.0);

        // Contribution is 10 × 0.1 + relationship each pass; two passes
        // cross the 1.5 target and pay the completion reward.
        let releases = svc.advance_faction_projects(Utc::now()).unwrap();
        assert!(releases
            .iter()
            .any(|r| r.press_type == "faction_project_complete"));
        let project = svc.store.get_faction_project(project_id).unwrap().unwrap();
        assert_eq!(project.status, "completed");
        let patron = svc.store.get_player("patron").unwrap().unwrap();
        assert!(patron.influence["industry"] >= 10);
    }

    #[test]
    fn test_investment_spends_influence_and_warms_scholars() {
        let mut svc = service();
        rich_player(&mut svc, "patron", "industry", 10);
        employ(&mut svc, "s.marchetti", "patron", "industry");

        let press = svc
            .invest_in_faction("patron", "industry", 4, Some("laboratories"))
            .unwrap();
        assert_eq!(press.press_type, "faction_investment");
        let patron = svc.store.get_player("patron").unwrap().unwrap();
        assert_eq!(patron.influence["industry"], 6);
        let scholar = svc.store.get_scholar("s.marchetti").unwrap().unwrap();
        // 4 / step(2) × 0.2 = 0.4 feeling bonus.
        assert!((scholar.memory.feeling("patron") - 0.4).abs() < 1e-9);

        let err = svc
            .invest_in_faction("patron", "industry", 1, None)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
    }

    #[test]
    fn test_endowment_pays_debts_then_grants_reputation() {
        let settings = Settings {
            archive_endowment_min_amount: 5,
            archive_endowment_reputation_threshold: 10,
            archive_endowment_reputation_bonus: 1,
            ..Settings::default()
        };
        let mut svc = service_with(settings);
        rich_player(&mut svc, "carol", "academia", 12);
        let now = Utc::now();
        svc.store
            .record_influence_debt("carol", "academia", 3, now, "symposium")
            .unwrap();
        svc.store
            .record_influence_debt("carol", "academia", 2, now, "seasonal")
            .unwrap();

        let press = svc
            .endow_archive("carol", 10, Some("academia"), None)
            .unwrap();
        assert_eq!(press.metadata["paid_debt"], 5);
        assert_eq!(press.metadata["reputation_gain"], 1);
        let carol = svc.store.get_player("carol").unwrap().unwrap();
        assert_eq!(carol.influence["academia"], 2);
        assert_eq!(carol.reputation, 1);
        assert!(svc
            .store
            .get_influence_debt("carol", "academia", "symposium")
            .unwrap()
            .is_none());
        assert!(svc
            .store
            .get_influence_debt("carol", "academia", "seasonal")
            .unwrap()
            .is_none());
    }
}
