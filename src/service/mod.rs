//! The game service: validates commands, mutates state through the store,
//! emits press and events, and schedules deferred work. Single writer; the
//! narrative enhancer call is the only suspension point.

mod admin;
mod conferences;
mod defection;
mod digest;
mod economy;
mod expeditions;
mod followups;
mod mentorship;
mod recruitment;
mod symposium;
mod theories;

use std::collections::{BTreeMap, VecDeque};
use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::catalogs::{self, FACTIONS};
use crate::config::Settings;
use crate::enhancer::{enhancer_from_settings, EnhanceRequest, NarrativeEnhancer};
use crate::error::{GameError, Result};
use crate::expeditions::ExpeditionResolver;
use crate::models::{
    ConfidenceLevel, Event, ExpeditionOutcome, ExpeditionPreparation, ExpeditionResult,
    ExpeditionType, Player, PrepDepth, PressRecord, PressRelease, Scholar,
};
use crate::multi_press::{MultiPressGenerator, PressLayer};
use crate::rng::DeterministicRng;
use crate::scholars::ScholarRepository;
use crate::storage::GameStore;
use crate::telemetry::{JsonlTelemetry, NullTelemetry, TelemetrySink};

pub use crate::storage::OrderRow;

/// Press types the digest may still release while the game is paused.
const PAUSE_ALLOWED_TYPES: [&str; 3] = ["admin_action", "admin_update", "symposium_reminder"];

/// A queued expedition waiting for the next resolution pass.
#[derive(Debug, Clone)]
pub struct ExpeditionOrder {
    pub code: String,
    pub player_id: String,
    pub expedition_type: ExpeditionType,
    pub objective: String,
    pub team: Vec<String>,
    pub funding: Vec<String>,
    pub preparation: ExpeditionPreparation,
    pub prep_depth: PrepDepth,
    pub confidence: ConfidenceLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseSource {
    Llm,
    Admin,
}

/// Relationship modifier breakdown for a (scholar, player) pair.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipBonus {
    pub total: f64,
    pub feeling: f64,
    pub base_bonus: f64,
    pub mentorship_bonus: f64,
    pub sidecast_bonus: f64,
    pub active_mentorship: bool,
}

impl RelationshipBonus {
    pub fn as_json(&self) -> Value {
        json!({
            "total": self.total,
            "feeling": self.feeling,
            "base_bonus": self.base_bonus,
            "mentorship_bonus": self.mentorship_bonus,
            "sidecast_bonus": self.sidecast_bonus,
            "active_mentorship": self.active_mentorship,
        })
    }
}

pub struct GameService {
    pub(crate) settings: Settings,
    pub(crate) store: GameStore,
    pub(crate) repository: ScholarRepository,
    pub(crate) resolver: ExpeditionResolver,
    pub(crate) rng: DeterministicRng,
    pub(crate) multi_press: MultiPressGenerator,
    pub(crate) enhancer: Box<dyn NarrativeEnhancer>,
    pub(crate) telemetry: Box<dyn TelemetrySink>,
    pub(crate) pending_expeditions: BTreeMap<String, ExpeditionOrder>,
    pub(crate) generated_counter: i64,
    paused: bool,
    pause_reason: Option<String>,
    pause_source: Option<PauseSource>,
    llm_fail_start: Option<DateTime<Utc>>,
    admin_notifications: VecDeque<String>,
    pub(crate) latest_symposium_scoring: Vec<Value>,
}

impl GameService {
    pub fn open(db_path: &Path, settings: Settings) -> Result<Self> {
        let enhancer = enhancer_from_settings(&settings);
        Self::with_ports(db_path, settings, enhancer, JsonlTelemetry::from_env())
    }

    pub fn with_ports(
        db_path: &Path,
        settings: Settings,
        enhancer: Box<dyn NarrativeEnhancer>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Result<Self> {
        let store = GameStore::open(db_path, settings.timeline_start_year)?;
        Self::from_parts(store, settings, enhancer, telemetry)
    }

    pub fn in_memory(settings: Settings) -> Result<Self> {
        let store = GameStore::open_in_memory(settings.timeline_start_year)?;
        let enhancer = enhancer_from_settings(&settings);
        Self::from_parts(store, settings, enhancer, Box::new(NullTelemetry))
    }

    pub fn in_memory_with(
        settings: Settings,
        enhancer: Box<dyn NarrativeEnhancer>,
    ) -> Result<Self> {
        let store = GameStore::open_in_memory(settings.timeline_start_year)?;
        Self::from_parts(store, settings, enhancer, Box::new(NullTelemetry))
    }

    fn from_parts(
        mut store: GameStore,
        settings: Settings,
        enhancer: Box<dyn NarrativeEnhancer>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Result<Self> {
        let repository = ScholarRepository::new();
        if store.scholar_count()? == 0 {
            for scholar in repository.base_scholars() {
                store.save_scholar(&scholar)?;
            }
        }
        let generated_counter = initial_generated_counter(&mut store)?;
        let mut service = Self {
            rng: DeterministicRng::new(settings.rng_seed),
            multi_press: MultiPressGenerator::new(settings.tone_setting.clone()),
            settings,
            store,
            repository,
            resolver: ExpeditionResolver::default(),
            enhancer,
            telemetry,
            pending_expeditions: BTreeMap::new(),
            generated_counter,
            paused: false,
            pause_reason: None,
            pause_source: None,
            llm_fail_start: None,
            admin_notifications: VecDeque::new(),
            latest_symposium_scoring: Vec::new(),
        };
        service.ensure_roster()?;
        Ok(service)
    }

    // -- pause machinery -------------------------------------------------

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause_reason(&self) -> Option<&str> {
        self.pause_reason.as_deref()
    }

    pub(crate) fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(GameError::GamePaused {
                reason: self
                    .pause_reason
                    .clone()
                    .unwrap_or_else(|| "Game is paused".to_string()),
            });
        }
        Ok(())
    }

    pub fn drain_admin_notifications(&mut self) -> Vec<String> {
        self.admin_notifications.drain(..).collect()
    }

    pub fn push_admin_notification(&mut self, message: impl Into<String>) {
        self.admin_notifications.push_back(message.into());
    }

    /// Returns true once the failure window has run past the pause timeout.
    fn register_llm_failure(&mut self) -> bool {
        let now = Utc::now();
        let start = *self.llm_fail_start.get_or_insert(now);
        (now - start).num_milliseconds() as f64 / 1000.0 >= self.settings.llm_pause_timeout_secs
    }

    fn clear_llm_failure(&mut self) {
        self.llm_fail_start = None;
    }

    fn pause_for_llm(&mut self, reason: &str) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        self.paused = true;
        self.pause_reason = Some(format!("Narrative generator unavailable: {reason}"));
        self.pause_source = Some(PauseSource::Llm);
        self.push_admin_notification(format!(
            "Game paused - narrative generator unavailable: {reason}"
        ));
        let now = Utc::now();
        let press = PressRelease::new(
            "admin_action",
            "Game Pause",
            format!("Live actions are halted while narrative systems recover: {reason}."),
        )
        .with_metadata(json!({ "source": "llm", "reason": reason }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "game_paused",
            json!({ "reason": reason, "source": "llm" }),
        ))?;
        let layers = self
            .multi_press
            .generate_admin_layers("pause", "Operations Council", Some(reason));
        self.apply_multi_press_layers(&layers, &["admin_action"], now, "admin")?;
        self.telemetry
            .system("llm_pause", json!({ "reason": reason }));
        Ok(())
    }

    fn resume_from_llm(&mut self) -> Result<()> {
        if !self.paused || self.pause_source != Some(PauseSource::Llm) {
            self.llm_fail_start = None;
            return Ok(());
        }
        let previous_reason = self.pause_reason.take();
        self.paused = false;
        self.pause_source = None;
        self.llm_fail_start = None;
        self.push_admin_notification("Narrative generator restored - game resumed.");
        let now = Utc::now();
        let press = PressRelease::new(
            "admin_action",
            "Game Resume",
            "Narrative systems restored; queued actions will resume shortly.",
        )
        .with_metadata(json!({ "source": "llm", "reason": previous_reason }));
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "game_resumed",
            json!({ "source": "llm", "reason": previous_reason }),
        ))?;
        let layers = self.multi_press.generate_admin_layers(
            "resume",
            "Operations Council",
            previous_reason.as_deref(),
        );
        self.apply_multi_press_layers(&layers, &["admin_action"], now, "admin")?;
        self.telemetry
            .system("llm_resume", json!({ "reason": previous_reason }));
        Ok(())
    }

    pub(crate) fn set_pause(&mut self, reason: String) {
        self.paused = true;
        self.pause_reason = Some(reason);
        self.pause_source = Some(PauseSource::Admin);
    }

    pub(crate) fn lift_pause(&mut self) -> (bool, Option<String>) {
        let was_paused = self.paused;
        let previous = self.pause_reason.take();
        self.paused = false;
        self.pause_source = None;
        self.llm_fail_start = None;
        (was_paused, previous)
    }

    // -- enhancement -----------------------------------------------------

    pub(crate) fn resolve_scholar_traits(&mut self, scholar_name: &str) -> Result<Option<Value>> {
        for scholar in self.store.all_scholars()? {
            if scholar.name.eq_ignore_ascii_case(scholar_name) {
                return Ok(Some(json!({
                    "personality": scholar.archetype,
                    "specialization": if scholar.disciplines.is_empty() {
                        "general research".to_string()
                    } else {
                        scholar.disciplines.join(", ")
                    },
                    "quirks": scholar.methods,
                    "drives": scholar.drives,
                })));
            }
        }
        Ok(None)
    }

    /// Run the release body through the enhancer port. Failure keeps the
    /// template body and feeds the pause window; success stamps `llm`
    /// metadata and lifts an LLM pause.
    pub(crate) fn enhance_press(
        &mut self,
        mut release: PressRelease,
        base_body: &str,
        persona_name: Option<&str>,
        persona_traits: Option<Value>,
        extra_context: Value,
    ) -> Result<PressRelease> {
        let event_type = extra_context
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or("");
        if self.paused
            && !PAUSE_ALLOWED_TYPES.contains(&release.press_type.as_str())
            && event_type != "admin"
        {
            return Err(GameError::GamePaused {
                reason: self
                    .pause_reason
                    .clone()
                    .unwrap_or_else(|| "Game is paused".to_string()),
            });
        }

        let mut context = json!({
            "type": release.press_type,
            "headline": release.headline,
            "body": base_body,
        });
        if let (Some(ctx), Some(extra)) = (context.as_object_mut(), extra_context.as_object()) {
            for (key, value) in extra {
                ctx.insert(key.clone(), value.clone());
            }
        }

        let started = std::time::Instant::now();
        let request = EnhanceRequest {
            press_type: &release.press_type,
            base_body,
            context,
            persona_name,
            persona_traits: persona_traits.clone(),
        };
        match self.enhancer.enhance(&request) {
            Ok(body) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                self.telemetry.latency(
                    "llm_enhance",
                    elapsed,
                    true,
                    json!({ "type": release.press_type, "persona": persona_name }),
                );
                self.clear_llm_failure();
                self.resume_from_llm()?;
                release.body = body;
                release.merge_meta_map(
                    "llm",
                    json!({
                        "persona": persona_name,
                        "generated_at": Utc::now().to_rfc3339(),
                    }),
                );
                Ok(release)
            }
            Err(err) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                self.telemetry.latency(
                    "llm_enhance",
                    elapsed,
                    false,
                    json!({ "type": release.press_type, "error": err.to_string() }),
                );
                // Admin-context traffic (pause/resume notices) never feeds
                // the failure window, or a dead enhancer would re-pause the
                // game in the middle of resuming it.
                if event_type != "admin" && self.register_llm_failure() {
                    self.pause_for_llm(&err.to_string())?;
                }
                Ok(release)
            }
        }
    }

    pub(crate) fn archive_press(&mut self, press: &PressRelease, timestamp: DateTime<Utc>) -> Result<()> {
        self.store.record_press(&PressRecord {
            timestamp,
            release: press.clone(),
        })?;
        Ok(())
    }

    /// Render a layer plan: immediate layers are enhanced and archived now,
    /// delayed layers are enhanced and queued for the dispatcher.
    pub(crate) fn apply_multi_press_layers(
        &mut self,
        layers: &[PressLayer],
        skip_types: &[&str],
        timestamp: DateTime<Utc>,
        event_type: &str,
    ) -> Result<Vec<PressRelease>> {
        let mut immediate = Vec::new();
        for layer in layers {
            let rendered = layer.render();
            if skip_types.contains(&rendered.press_type.as_str()) {
                continue;
            }
            self.telemetry.counter(
                "press_layer",
                1.0,
                json!({
                    "layer_type": layer.layer_type,
                    "event_type": event_type,
                    "delay_minutes": layer.delay_minutes,
                }),
            );
            let persona = layer.context.persona_hint().map(str::to_string);
            let persona_traits = match &persona {
                Some(name) => self.resolve_scholar_traits(name)?,
                None => None,
            };
            let base_body = rendered.body.clone();
            let mut extra = json!({
                "event_type": event_type,
                "layer_type": layer.layer_type,
                "delay_minutes": layer.delay_minutes,
            });
            if let Some(seed) = &layer.tone_seed {
                extra["tone_seed"] = json!(seed);
            }
            let mut release =
                self.enhance_press(rendered, &base_body, persona.as_deref(), persona_traits, extra)?;

            if layer.delay_minutes <= 0 {
                self.archive_press(&release, timestamp)?;
                immediate.push(release);
                continue;
            }

            release.merge_meta_map(
                "scheduled",
                json!({
                    "delay_minutes": layer.delay_minutes,
                    "generated_at": timestamp.to_rfc3339(),
                    "layer_type": layer.layer_type,
                    "event_type": event_type,
                }),
            );
            let release_at = timestamp + Duration::minutes(layer.delay_minutes);
            self.store.enqueue_press(&release, release_at, timestamp)?;
            self.store.append_event(&Event::new(
                timestamp,
                "press_scheduled",
                json!({
                    "headline": release.headline,
                    "release_at": release_at.to_rfc3339(),
                    "layer_type": layer.layer_type,
                }),
            ))?;
            self.push_admin_notification(format!(
                "Scheduled follow-up press '{}' for {}",
                release.headline,
                release_at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        Ok(immediate)
    }

    // -- players & economy helpers --------------------------------------

    pub fn ensure_player(&mut self, player_id: &str, display_name: Option<&str>) -> Result<()> {
        if let Some(mut player) = self.store.get_player(player_id)? {
            self.ensure_influence_structure(&mut player);
            self.store.upsert_player(&player)?;
            return Ok(());
        }
        let mut player = Player::new(player_id, display_name.unwrap_or(player_id));
        self.ensure_influence_structure(&mut player);
        self.store.upsert_player(&player)?;
        Ok(())
    }

    pub(crate) fn ensure_influence_structure(&self, player: &mut Player) {
        for faction in FACTIONS {
            player.influence.entry(faction.to_string()).or_insert(0);
        }
    }

    pub(crate) fn influence_cap(&self, player: &Player) -> i64 {
        let base = self.settings.influence_cap_base;
        let per_rep = self.settings.influence_cap_per_reputation;
        let dynamic = base + (per_rep * player.reputation.max(0) as f64) as i64;
        dynamic.max(base)
    }

    /// Positive deltas clamp to the influence cap; negative deltas apply in
    /// full (callers guard against going below zero).
    pub(crate) fn apply_influence_change(
        &self,
        player: &mut Player,
        faction: &str,
        delta: i64,
    ) -> i64 {
        self.ensure_influence_structure(player);
        let cap = self.influence_cap(player);
        let current = player.influence.get(faction).copied().unwrap_or(0);
        let mut new_value = current + delta;
        if delta > 0 {
            new_value = new_value.min(cap);
        }
        player.influence.insert(faction.to_string(), new_value);
        new_value
    }

    pub(crate) fn require_reputation(&self, player: &Player, action: &str) -> Result<()> {
        let Some(threshold) = self.settings.action_threshold(action) else {
            return Ok(());
        };
        if player.reputation < threshold {
            return Err(GameError::ThresholdNotMet {
                action: action.to_string(),
                required: threshold,
                player: player.display_name.clone(),
                actual: player.reputation,
            });
        }
        Ok(())
    }

    pub(crate) fn apply_reputation_change(
        &self,
        player: &mut Player,
        delta: i64,
        confidence: ConfidenceLevel,
    ) -> i64 {
        let (lower, upper) = self.settings.reputation_bounds();
        let new_value = player.adjust_reputation(delta, lower, upper);
        if self.settings.wager(confidence).triggers_recruitment_cooldown {
            let entry = player.cooldowns.entry("recruitment".to_string()).or_insert(0);
            *entry = (*entry).max(2);
        }
        new_value
    }

    pub(crate) fn confidence_delta(
        &self,
        confidence: ConfidenceLevel,
        outcome: ExpeditionOutcome,
    ) -> i64 {
        let wager = self.settings.wager(confidence);
        match outcome {
            ExpeditionOutcome::Success | ExpeditionOutcome::Landmark => wager.reward,
            ExpeditionOutcome::Partial => (wager.reward / 2).max(1),
            ExpeditionOutcome::Failure => wager.penalty,
        }
    }

    pub(crate) fn clamp_probability(&self, value: f64) -> f64 {
        value.clamp(0.05, 0.95)
    }

    /// Feeling plus mentorship/sidecast history, clamped to ±0.25.
    pub(crate) fn relationship_bonus(
        &mut self,
        scholar: &Scholar,
        player_id: &str,
    ) -> Result<RelationshipBonus> {
        let feeling = scholar.memory.feeling(player_id);
        let base_bonus = (feeling * 0.02).clamp(-0.2, 0.2);

        let active = self.store.get_active_mentorship(&scholar.id)?;
        let active_for_player = active
            .as_ref()
            .map(|m| m.player_id == player_id)
            .unwrap_or(false);
        let mentorship_bonus = if active_for_player {
            0.05
        } else {
            let entries: Vec<_> = scholar
                .contract
                .mentorship_history
                .iter()
                .filter(|entry| entry.mentor_id == player_id)
                .collect();
            match entries.last() {
                Some(last) if last.event == "completion" => 0.04,
                Some(_) => 0.02,
                None => 0.0,
            }
        };

        let sidecast_bonus = if scholar
            .contract
            .sidecast_history
            .iter()
            .any(|entry| entry.sponsor_id.as_deref() == Some(player_id))
        {
            0.02
        } else {
            0.0
        };

        let total = (base_bonus + mentorship_bonus + sidecast_bonus).clamp(-0.25, 0.25);
        Ok(RelationshipBonus {
            total,
            feeling,
            base_bonus,
            mentorship_bonus,
            sidecast_bonus,
            active_mentorship: active_for_player,
        })
    }

    /// Average feeling of the player's contracted scholars in a faction,
    /// weighted; falls back to a small influence-derived value when the
    /// player has no scholars there.
    pub(crate) fn player_faction_relationship(
        &mut self,
        player: &Player,
        faction: &str,
        weight: Option<f64>,
    ) -> Result<f64> {
        let factor = weight.unwrap_or(self.settings.seasonal_commitment_relationship_weight);
        let mut total = 0.0;
        let mut count = 0usize;
        for scholar in self.store.all_scholars()? {
            if scholar.contract.employer != player.id {
                continue;
            }
            if !faction.is_empty() && scholar.contract.faction.as_deref() != Some(faction) {
                continue;
            }
            total += scholar.memory.feeling(&player.id);
            count += 1;
            total += scholar
                .contract
                .mentorship_history
                .iter()
                .filter(|entry| entry.mentor_id == player.id)
                .count() as f64;
            if scholar
                .contract
                .sidecast_history
                .iter()
                .any(|entry| entry.sponsor_id.as_deref() == Some(player.id.as_str()))
            {
                total += 1.0;
            }
        }
        if count == 0 {
            let influence = player.influence.get(faction).copied().unwrap_or(0).max(0) as f64;
            if influence <= 0.0 {
                return Ok(0.0);
            }
            return Ok(((influence / 10.0) * factor).clamp(-0.1, 0.1));
        }
        let average = total / count as f64;
        Ok((average * factor).clamp(-0.25, 0.25))
    }

    pub(crate) fn generate_reactions(
        &mut self,
        team: &[String],
        result: &ExpeditionResult,
    ) -> Result<Vec<String>> {
        let mut reactions = Vec::new();
        for scholar_id in team {
            let Some(scholar) = self.store.get_scholar(scholar_id)? else {
                continue;
            };
            let tone = if result.outcome.is_success() {
                "thrilled"
            } else {
                "wary"
            };
            let phrase = scholar
                .catchphrase
                .replace("{evidence}", "evidence")
                .replace("{topic}", "the work")
                .replace("{concept}", "collaboration")
                .replace("{reckless_method}", "dynamite")
                .replace("{premise}", "the data holds")
                .replace("{wild_leap}", "we can fly");
            reactions.push(format!("{} ({tone}): {phrase}", scholar.name));
        }
        Ok(reactions)
    }

    pub(crate) fn schedule_followup(
        &mut self,
        scholar_id: &str,
        kind: &str,
        resolve_at: DateTime<Utc>,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.store.enqueue_order(
            kind,
            Some(scholar_id),
            None,
            &payload,
            Some(resolve_at),
            None,
            None,
            now,
        )
    }

    // -- read-only surfaces ----------------------------------------------

    pub fn player_status(&mut self, player_id: &str) -> Result<Option<Value>> {
        let Some(mut player) = self.store.get_player(player_id)? else {
            return Ok(None);
        };
        self.ensure_influence_structure(&mut player);
        let cap = self.influence_cap(&player);
        let debts = self.store.list_influence_debts(player_id, None)?;
        let outstanding: i64 = debts.iter().map(|d| d.amount).sum();
        let commitments = self.store.list_player_commitments(player_id)?;
        let contracts = self.contract_summary_for_player(&player)?;
        Ok(Some(json!({
            "player_id": player.id,
            "display_name": player.display_name,
            "reputation": player.reputation,
            "influence": player.influence,
            "influence_cap": cap,
            "cooldowns": player.cooldowns,
            "contracts": contracts,
            "commitments": commitments.iter().map(|c| json!({
                "id": c.id,
                "faction": c.faction,
                "tier": c.tier,
                "base_cost": c.base_cost,
                "end_at": c.end_at.to_rfc3339(),
                "status": c.status,
            })).collect::<Vec<_>>(),
            "outstanding_debt": outstanding,
            "debts": debts.iter().map(|d| json!({
                "faction": d.faction,
                "source": d.source,
                "amount": d.amount,
                "reprisal_level": d.reprisal_level,
            })).collect::<Vec<_>>(),
        })))
    }

    pub fn roster_status(&mut self) -> Result<Vec<Value>> {
        let mut roster = Vec::new();
        for scholar in self.store.all_scholars()? {
            roster.push(json!({
                "id": scholar.id,
                "name": scholar.name,
                "archetype": scholar.archetype,
                "employer": scholar.contract.employer,
                "faction": scholar.contract.faction,
                "track": scholar.career.track.as_str(),
                "tier": scholar.career.tier,
                "memories": scholar.memory.facts.len(),
            }));
        }
        Ok(roster)
    }

    pub fn wager_reference(&self) -> Value {
        json!({
            "wagers": {
                "suspect": {
                    "reward": self.settings.wager_suspect.reward,
                    "penalty": self.settings.wager_suspect.penalty,
                },
                "certain": {
                    "reward": self.settings.wager_certain.reward,
                    "penalty": self.settings.wager_certain.penalty,
                },
                "stake_my_career": {
                    "reward": self.settings.wager_stake_my_career.reward,
                    "penalty": self.settings.wager_stake_my_career.penalty,
                    "triggers_recruitment_cooldown": true,
                },
            },
            "action_thresholds": self.settings.action_thresholds,
            "reputation_bounds": {
                "min": self.settings.reputation_min,
                "max": self.settings.reputation_max,
            },
        })
    }

    pub fn export_press_archive(&self, limit: Option<i64>, offset: i64) -> Result<Vec<PressRecord>> {
        self.store.list_press(limit, offset)
    }

    pub fn export_log(&self, limit: Option<i64>) -> Result<Vec<(i64, Event)>> {
        self.store.export_events(limit)
    }

    pub fn list_player_offers(&self, player_id: &str) -> Result<Vec<crate::models::OfferRecord>> {
        self.store.list_active_offers(Some(player_id))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Test/ops access to the underlying store.
    pub fn store_mut(&mut self) -> &mut GameStore {
        &mut self.store
    }

    // -- roster ----------------------------------------------------------

    /// Keep the roster within bounds: generate when short, retire when
    /// over (Independent first, then lowest loyalty, then fewest memories).
    pub(crate) fn ensure_roster(&mut self) -> Result<()> {
        let mut scholars = self.store.all_scholars()?;
        while scholars.len() < self.settings.min_roster {
            let identifier = format!("s.proc-{:03}", self.generated_counter);
            self.generated_counter += 1;
            let scholar = self.repository.generate(&mut self.rng, &identifier);
            self.store.save_scholar(&scholar)?;
            self.store.append_event(&Event::new(
                Utc::now(),
                "scholar_spawned",
                json!({ "id": scholar.id, "name": scholar.name, "origin": "roster_fill" }),
            ))?;
            scholars.push(scholar);
        }
        if scholars.len() <= self.settings.max_roster {
            return Ok(());
        }
        let surplus = scholars.len() - self.settings.max_roster;
        scholars.sort_by(|a, b| {
            let rank = |s: &Scholar| {
                (
                    if s.contract.is_independent() { 0 } else { 1 },
                    s.stats.loyalty,
                    s.memory.facts.len(),
                )
            };
            rank(a).cmp(&rank(b))
        });
        for scholar in scholars.iter().take(surplus) {
            self.store.remove_scholar(&scholar.id)?;
            self.store.append_event(&Event::new(
                Utc::now(),
                "scholar_retired",
                json!({ "id": scholar.id, "name": scholar.name }),
            ))?;
        }
        Ok(())
    }

    pub(crate) fn next_generated_id(&mut self) -> String {
        let identifier = format!("s.proc-{:03}", self.generated_counter);
        self.generated_counter += 1;
        identifier
    }

    pub(crate) fn contract_commitments(&mut self) -> Result<BTreeMap<String, BTreeMap<String, i64>>> {
        let mut commitments: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        for scholar in self.store.all_scholars()? {
            if scholar.contract.is_independent() {
                continue;
            }
            let Some(faction) = scholar.contract.faction.clone() else {
                continue;
            };
            *commitments
                .entry(scholar.contract.employer.clone())
                .or_default()
                .entry(faction)
                .or_insert(0) += 1;
        }
        Ok(commitments)
    }

    fn contract_summary_for_player(&mut self, player: &Player) -> Result<Value> {
        let commitments = self.contract_commitments()?;
        let empty = BTreeMap::new();
        let per_faction = commitments.get(&player.id).unwrap_or(&empty);
        let mut summary = serde_json::Map::new();
        for (faction, count) in per_faction {
            let upkeep = count * self.settings.contract_upkeep_per_scholar;
            let outstanding = self
                .store
                .get_influence_debt(&player.id, faction, "contract")?
                .map(|d| d.amount)
                .unwrap_or(0);
            summary.insert(
                faction.clone(),
                json!({ "scholars": count, "upkeep": upkeep, "outstanding": outstanding }),
            );
        }
        Ok(Value::Object(summary))
    }

    /// Factions the game recognises; admin overrides still validate names.
    pub(crate) fn validate_faction(&self, faction: &str) -> Result<()> {
        if catalogs::is_faction(faction) {
            return Ok(());
        }
        Err(GameError::invalid(format!("invalid faction: {faction}")))
    }

    pub(crate) fn known_scholar_ids(&mut self) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .all_scholars()?
            .into_iter()
            .map(|s| s.id)
            .collect())
    }
}

fn initial_generated_counter(store: &mut GameStore) -> Result<i64> {
    let mut max_index = 0;
    for scholar in store.all_scholars()? {
        if let Some(rest) = scholar.id.strip_prefix("s.proc-") {
            if let Ok(value) = rest.parse::<i64>() {
                max_index = max_index.max(value);
            }
        }
    }
    Ok(max_index + 1)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::enhancer::TemplateEnhancer;

    pub fn service() -> GameService {
        GameService::in_memory_with(Settings::default(), Box::new(TemplateEnhancer)).unwrap()
    }

    pub fn service_with(settings: Settings) -> GameService {
        GameService::in_memory_with(settings, Box::new(TemplateEnhancer)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::service;
    use super::*;

    #[test]
    fn test_construction_seeds_and_fills_roster() {
        let mut svc = service();
        let roster = svc.roster_status().unwrap();
        assert!(roster.len() >= svc.settings.min_roster);
        assert!(roster.len() <= svc.settings.max_roster);
        assert!(roster
            .iter()
            .any(|entry| entry["id"] == "s.ironquill"));
    }

    #[test]
    fn test_influence_cap_scales_with_reputation() {
        let svc = service();
        let mut player = Player::new("p", "P");
        assert_eq!(svc.influence_cap(&player), 5);
        player.reputation = 20;
        assert_eq!(svc.influence_cap(&player), 9);
        player.reputation = -40;
        assert_eq!(svc.influence_cap(&player), 5);
    }

    #[test]
    fn test_positive_influence_clamps_to_cap() {
        let svc = service();
        let mut player = Player::new("p", "P");
        svc.apply_influence_change(&mut player, "academia", 3);
        svc.apply_influence_change(&mut player, "academia", 10);
        assert_eq!(player.influence["academia"], 5);
        svc.apply_influence_change(&mut player, "academia", -2);
        assert_eq!(player.influence["academia"], 3);
    }

    #[test]
    fn test_confidence_delta_matches_wager_table() {
        let svc = service();
        let cases = [
            (ConfidenceLevel::Suspect, ExpeditionOutcome::Success, 2),
            (ConfidenceLevel::Suspect, ExpeditionOutcome::Partial, 1),
            (ConfidenceLevel::Suspect, ExpeditionOutcome::Failure, -1),
            (ConfidenceLevel::Certain, ExpeditionOutcome::Success, 5),
            (ConfidenceLevel::Certain, ExpeditionOutcome::Partial, 2),
            (ConfidenceLevel::Certain, ExpeditionOutcome::Failure, -7),
            (ConfidenceLevel::StakeMyCareer, ExpeditionOutcome::Landmark, 15),
            (ConfidenceLevel::StakeMyCareer, ExpeditionOutcome::Partial, 7),
            (ConfidenceLevel::StakeMyCareer, ExpeditionOutcome::Failure, -25),
        ];
        for (confidence, outcome, expected) in cases {
            assert_eq!(svc.confidence_delta(confidence, outcome), expected);
        }
    }

    #[test]
    fn test_require_reputation_names_action_and_threshold() {
        let svc = service();
        let player = Player::new("p", "Penny");
        let err = svc
            .require_reputation(&player, "expedition_great_project")
            .unwrap_err();
        match err {
            GameError::ThresholdNotMet {
                action, required, ..
            } => {
                assert_eq!(action, "expedition_great_project");
                assert_eq!(required, 10);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_stake_career_reputation_change_sets_cooldown() {
        let svc = service();
        let mut player = Player::new("p", "P");
        svc.apply_reputation_change(&mut player, 15, ConfidenceLevel::StakeMyCareer);
        assert_eq!(player.cooldowns.get("recruitment"), Some(&2));
        // Certain confidence leaves cooldowns alone.
        let mut other = Player::new("q", "Q");
        svc.apply_reputation_change(&mut other, 5, ConfidenceLevel::Certain);
        assert!(other.cooldowns.is_empty());
    }
}
