//! Runtime settings: defaults in code, environment overrides, optional
//! JSON settings file. Unknown keys in the file are load-time errors.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{GameError, Result};
use crate::models::ConfidenceLevel;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceWager {
    pub reward: i64,
    pub penalty: i64,
    #[serde(default)]
    pub triggers_recruitment_cooldown: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub db_path: String,
    pub rng_seed: u64,

    pub reputation_min: i64,
    pub reputation_max: i64,
    pub wager_suspect: ConfidenceWager,
    pub wager_certain: ConfidenceWager,
    pub wager_stake_my_career: ConfidenceWager,
    pub action_thresholds: BTreeMap<String, i64>,
    pub influence_cap_base: i64,
    pub influence_cap_per_reputation: f64,

    pub min_roster: usize,
    pub max_roster: usize,

    pub contract_upkeep_per_scholar: i64,
    pub contract_debt_reprisal_threshold: i64,
    pub contract_debt_reprisal_penalty: i64,
    pub contract_debt_reprisal_cooldown_days: i64,

    pub seasonal_commitment_base_cost: i64,
    pub seasonal_commitment_duration_days: i64,
    pub seasonal_commitment_min_relationship: f64,
    pub seasonal_commitment_relationship_weight: f64,
    pub seasonal_commitment_reprisal_threshold: i64,
    pub seasonal_commitment_reprisal_penalty: i64,
    pub seasonal_commitment_reprisal_cooldown_days: i64,

    pub faction_project_base_progress_weight: f64,
    pub faction_project_relationship_weight: f64,
    pub faction_project_completion_reward: i64,

    pub faction_investment_min_amount: i64,
    pub faction_investment_feeling_step: i64,
    pub faction_investment_feeling_bonus: f64,
    pub archive_endowment_min_amount: i64,
    pub archive_endowment_reputation_threshold: i64,
    pub archive_endowment_reputation_bonus: i64,

    pub symposium_pledge_base: i64,
    pub symposium_pledge_escalation_cap: i64,
    pub symposium_grace_misses: i64,
    pub symposium_grace_window_days: i64,
    pub symposium_first_reminder_hours: f64,
    pub symposium_escalation_hours: f64,
    pub symposium_max_backlog: i64,
    pub symposium_max_per_player: i64,
    pub symposium_proposal_expiry_days: i64,
    pub symposium_recent_window: i64,
    pub symposium_scoring_fresh_bonus: f64,
    pub symposium_scoring_repeat_penalty: f64,
    pub symposium_scoring_age_weight: f64,
    pub symposium_scoring_max_age_days: i64,
    pub symposium_debt_reprisal_threshold: i64,
    pub symposium_debt_reprisal_penalty: i64,
    pub symposium_debt_reprisal_cooldown_days: i64,

    pub timeline_start_year: i64,
    pub time_scale_days_per_year: i64,

    pub llm_api_base: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub llm_pause_timeout_secs: f64,
    pub tone_setting: Option<String>,

    pub digest_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let mut action_thresholds = BTreeMap::new();
        action_thresholds.insert("theory".to_string(), -5);
        action_thresholds.insert("expedition_think_tank".to_string(), -2);
        action_thresholds.insert("expedition_field".to_string(), 2);
        action_thresholds.insert("expedition_great_project".to_string(), 10);
        action_thresholds.insert("recruitment".to_string(), 0);
        action_thresholds.insert("conference".to_string(), 2);

        Self {
            db_path: "./greatwork.sqlite".to_string(),
            rng_seed: 42,

            reputation_min: -50,
            reputation_max: 50,
            wager_suspect: ConfidenceWager {
                reward: 2,
                penalty: -1,
                triggers_recruitment_cooldown: false,
            },
            wager_certain: ConfidenceWager {
                reward: 5,
                penalty: -7,
                triggers_recruitment_cooldown: false,
            },
            wager_stake_my_career: ConfidenceWager {
                reward: 15,
                penalty: -25,
                triggers_recruitment_cooldown: true,
            },
            action_thresholds,
            influence_cap_base: 5,
            influence_cap_per_reputation: 0.2,

            min_roster: 20,
            max_roster: 30,

            contract_upkeep_per_scholar: 1,
            contract_debt_reprisal_threshold: 4,
            contract_debt_reprisal_penalty: 1,
            contract_debt_reprisal_cooldown_days: 3,

            seasonal_commitment_base_cost: 3,
            seasonal_commitment_duration_days: 30,
            seasonal_commitment_min_relationship: -0.05,
            seasonal_commitment_relationship_weight: 0.05,
            seasonal_commitment_reprisal_threshold: 4,
            seasonal_commitment_reprisal_penalty: 1,
            seasonal_commitment_reprisal_cooldown_days: 3,

            faction_project_base_progress_weight: 0.1,
            faction_project_relationship_weight: 0.05,
            faction_project_completion_reward: 2,

            faction_investment_min_amount: 2,
            faction_investment_feeling_step: 2,
            faction_investment_feeling_bonus: 0.2,
            archive_endowment_min_amount: 5,
            archive_endowment_reputation_threshold: 10,
            archive_endowment_reputation_bonus: 1,

            symposium_pledge_base: 2,
            symposium_pledge_escalation_cap: 4,
            symposium_grace_misses: 1,
            symposium_grace_window_days: 14,
            symposium_first_reminder_hours: 24.0,
            symposium_escalation_hours: 48.0,
            symposium_max_backlog: 10,
            symposium_max_per_player: 2,
            symposium_proposal_expiry_days: 10,
            symposium_recent_window: 3,
            symposium_scoring_fresh_bonus: 1.0,
            symposium_scoring_repeat_penalty: 0.5,
            symposium_scoring_age_weight: 2.0,
            symposium_scoring_max_age_days: 10,
            symposium_debt_reprisal_threshold: 3,
            symposium_debt_reprisal_penalty: 1,
            symposium_debt_reprisal_cooldown_days: 2,

            timeline_start_year: 1923,
            time_scale_days_per_year: 365,

            llm_api_base: None,
            llm_api_key: None,
            llm_model: "local-model".to_string(),
            llm_timeout_secs: 30,
            llm_max_retries: 3,
            llm_pause_timeout_secs: 600.0,
            tone_setting: None,

            digest_interval_secs: 3600,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(v) = env_str("GREATWORK_DB") {
            settings.db_path = v;
        }
        if let Some(v) = env_parse("GREATWORK_SEED") {
            settings.rng_seed = v;
        }
        if let Some(v) = env_parse("REPUTATION_MIN") {
            settings.reputation_min = v;
        }
        if let Some(v) = env_parse("REPUTATION_MAX") {
            settings.reputation_max = v;
        }
        if let Some(v) = env_parse("TIMELINE_START_YEAR") {
            settings.timeline_start_year = v;
        }
        if let Some(v) = env_parse("TIME_SCALE_DAYS_PER_YEAR") {
            settings.time_scale_days_per_year = v;
        }
        if let Some(v) = env_parse("DIGEST_INTERVAL_SECS") {
            settings.digest_interval_secs = v;
        }
        settings.llm_api_base = env_str("LLM_API_BASE").or(settings.llm_api_base);
        settings.llm_api_key = env_str("LLM_API_KEY").or(settings.llm_api_key);
        if let Some(v) = env_str("LLM_MODEL_NAME") {
            settings.llm_model = v;
        }
        if let Some(v) = env_parse("LLM_TIMEOUT") {
            settings.llm_timeout_secs = v;
        }
        if let Some(v) = env_parse("LLM_RETRY_ATTEMPTS") {
            settings.llm_max_retries = v;
        }
        if let Some(v) = env_parse("LLM_PAUSE_TIMEOUT") {
            settings.llm_pause_timeout_secs = v;
        }
        settings.tone_setting = env_str("GREATWORK_PRESS_SETTING").or(settings.tone_setting);
        settings
    }

    /// Load from a JSON settings file; any key the struct does not declare
    /// is rejected.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GameError::invalid(format!("cannot read settings {path:?}: {e}")))?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| GameError::invalid(format!("invalid settings {path:?}: {e}")))?;
        Ok(settings)
    }

    pub fn reputation_bounds(&self) -> (i64, i64) {
        (self.reputation_min, self.reputation_max)
    }

    pub fn wager(&self, level: ConfidenceLevel) -> ConfidenceWager {
        match level {
            ConfidenceLevel::Suspect => self.wager_suspect,
            ConfidenceLevel::Certain => self.wager_certain,
            ConfidenceLevel::StakeMyCareer => self.wager_stake_my_career,
        }
    }

    pub fn action_threshold(&self, action: &str) -> Option<i64> {
        self.action_thresholds.get(action).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wager_table() {
        let settings = Settings::default();
        assert_eq!(settings.wager(ConfidenceLevel::Suspect).reward, 2);
        assert_eq!(settings.wager(ConfidenceLevel::Certain).penalty, -7);
        assert_eq!(settings.wager(ConfidenceLevel::StakeMyCareer).reward, 15);
        assert!(settings
            .wager(ConfidenceLevel::StakeMyCareer)
            .triggers_recruitment_cooldown);
    }

    #[test]
    fn test_settings_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"reputation_min": -10, "mystery_knob": 3}"#).unwrap();
        let err = Settings::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("mystery_knob"));
    }

    #[test]
    fn test_settings_file_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"reputation_min": -10, "reputation_max": 10}"#).unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.reputation_bounds(), (-10, 10));
        // Untouched keys keep their defaults.
        assert_eq!(settings.symposium_pledge_base, 2);
    }
}
