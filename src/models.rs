//! Core domain model: players, scholars, expeditions, offers, press.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Suspect,
    Certain,
    StakeMyCareer,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Suspect => "suspect",
            ConfidenceLevel::Certain => "certain",
            ConfidenceLevel::StakeMyCareer => "stake_my_career",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GameError> {
        match value {
            "suspect" => Ok(ConfidenceLevel::Suspect),
            "certain" => Ok(ConfidenceLevel::Certain),
            "stake_my_career" => Ok(ConfidenceLevel::StakeMyCareer),
            other => Err(GameError::invalid(format!(
                "unknown confidence level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionOutcome {
    Failure,
    Partial,
    Success,
    Landmark,
}

impl ExpeditionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpeditionOutcome::Failure => "failure",
            ExpeditionOutcome::Partial => "partial",
            ExpeditionOutcome::Success => "success",
            ExpeditionOutcome::Landmark => "landmark",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExpeditionOutcome::Success | ExpeditionOutcome::Landmark)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionType {
    ThinkTank,
    Field,
    GreatProject,
}

impl ExpeditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpeditionType::ThinkTank => "think_tank",
            ExpeditionType::Field => "field",
            ExpeditionType::GreatProject => "great_project",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GameError> {
        match value {
            "think_tank" => Ok(ExpeditionType::ThinkTank),
            "field" => Ok(ExpeditionType::Field),
            "great_project" => Ok(ExpeditionType::GreatProject),
            other => Err(GameError::invalid(format!(
                "unknown expedition type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepDepth {
    Shallow,
    Standard,
    Deep,
}

impl PrepDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrepDepth::Shallow => "shallow",
            PrepDepth::Standard => "standard",
            PrepDepth::Deep => "deep",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GameError> {
        match value {
            "shallow" => Ok(PrepDepth::Shallow),
            "standard" => Ok(PrepDepth::Standard),
            "deep" => Ok(PrepDepth::Deep),
            other => Err(GameError::invalid(format!("unknown prep depth '{other}'"))),
        }
    }
}

// =============================================================================
// Scholar memory
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

/// A scholar's long memory: ordered facts, decaying feelings keyed by
/// subject, and permanent scars that are exempt from decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub facts: Vec<MemoryFact>,
    #[serde(default)]
    pub feelings: BTreeMap<String, f64>,
    #[serde(default)]
    pub scars: BTreeSet<String>,
    pub decay: f64,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            facts: Vec::new(),
            feelings: BTreeMap::new(),
            scars: BTreeSet::new(),
            decay: 0.98,
        }
    }
}

impl Memory {
    pub fn record_fact(&mut self, fact: MemoryFact) {
        self.facts.push(fact);
    }

    pub fn adjust_feeling(&mut self, subject: &str, delta: f64) {
        *self.feelings.entry(subject.to_string()).or_insert(0.0) += delta;
    }

    pub fn feeling(&self, subject: &str) -> f64 {
        self.feelings.get(subject).copied().unwrap_or(0.0)
    }

    pub fn add_scar(&mut self, scar: &str) {
        self.scars.insert(scar.to_string());
    }

    /// Multiply non-scar feelings by the decay factor; entries that fall
    /// below 0.01 in magnitude are dropped.
    pub fn decay_feelings(&mut self) {
        let decay = self.decay;
        let scars = self.scars.clone();
        self.feelings.retain(|subject, value| {
            if scars.contains(subject) {
                return true;
            }
            *value *= decay;
            value.abs() >= 0.01
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarStats {
    pub talent: i64,
    pub reliability: i64,
    pub integrity: i64,
    pub theatrics: i64,
    pub loyalty: i64,
    pub risk: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CareerTrack {
    Academia,
    Industry,
}

impl CareerTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareerTrack::Academia => "Academia",
            CareerTrack::Industry => "Industry",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GameError> {
        match value {
            "Academia" => Ok(CareerTrack::Academia),
            "Industry" => Ok(CareerTrack::Industry),
            other => Err(GameError::invalid(format!(
                "unknown career track '{other}'; choose Academia or Industry"
            ))),
        }
    }

    pub fn ladder(&self) -> &'static [&'static str] {
        match self {
            CareerTrack::Academia => &["Postdoc", "Fellow", "Professor"],
            CareerTrack::Industry => &["Associate", "Director", "Visionary"],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareerState {
    pub track: CareerTrack,
    pub tier: String,
    #[serde(default)]
    pub ticks: i64,
}

impl Default for CareerState {
    fn default() -> Self {
        Self {
            track: CareerTrack::Academia,
            tier: "Postdoc".to_string(),
            ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipNote {
    pub event: String,
    pub mentor_id: String,
    pub mentor: String,
    pub track: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecastNote {
    pub arc: String,
    pub phase: String,
    pub sponsor_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpeditionLink {
    pub expedition: String,
    pub timestamp: DateTime<Utc>,
}

pub const INDEPENDENT: &str = "Independent";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractState {
    pub employer: String,
    #[serde(default)]
    pub faction: Option<String>,
    #[serde(default)]
    pub term_years: i64,
    #[serde(default)]
    pub sidecast_arc: Option<String>,
    #[serde(default)]
    pub sidecast_sponsor: Option<String>,
    #[serde(default)]
    pub mentorship_history: Vec<MentorshipNote>,
    #[serde(default)]
    pub sidecast_history: Vec<SidecastNote>,
    #[serde(default)]
    pub expedition_links: Vec<ExpeditionLink>,
}

impl Default for ContractState {
    fn default() -> Self {
        Self {
            employer: INDEPENDENT.to_string(),
            faction: None,
            term_years: 1,
            sidecast_arc: None,
            sidecast_sponsor: None,
            mentorship_history: Vec::new(),
            sidecast_history: Vec::new(),
            expedition_links: Vec::new(),
        }
    }
}

impl ContractState {
    pub fn is_independent(&self) -> bool {
        self.employer == INDEPENDENT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scholar {
    pub id: String,
    pub name: String,
    pub seed: i64,
    pub archetype: String,
    pub disciplines: Vec<String>,
    pub methods: Vec<String>,
    pub drives: Vec<String>,
    pub virtues: Vec<String>,
    pub vices: Vec<String>,
    pub stats: ScholarStats,
    #[serde(default)]
    pub politics: BTreeMap<String, i64>,
    pub catchphrase: String,
    pub taboos: Vec<String>,
    #[serde(default)]
    pub memory: Memory,
    #[serde(default)]
    pub career: CareerState,
    #[serde(default)]
    pub contract: ContractState,
}

impl Scholar {
    pub fn loyalty_score(&self) -> f64 {
        self.stats.loyalty as f64 / 10.0
    }

    pub fn integrity_score(&self) -> f64 {
        self.stats.integrity as f64 / 10.0
    }
}

// =============================================================================
// Players
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub reputation: i64,
    #[serde(default)]
    pub influence: BTreeMap<String, i64>,
    #[serde(default)]
    pub cooldowns: BTreeMap<String, i64>,
}

impl Player {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            reputation: 0,
            influence: BTreeMap::new(),
            cooldowns: BTreeMap::new(),
        }
    }

    /// Apply a reputation change clamped to the configured bounds; returns
    /// the new value.
    pub fn adjust_reputation(&mut self, delta: i64, lower: i64, upper: i64) -> i64 {
        self.reputation = (self.reputation + delta).clamp(lower, upper);
        self.reputation
    }

    /// Decrement every cooldown by one digest tick, dropping exhausted
    /// entries.
    pub fn tick_cooldowns(&mut self) {
        self.cooldowns.retain(|_, remaining| {
            *remaining = (*remaining - 1).max(0);
            *remaining > 0
        });
    }
}

// =============================================================================
// Expeditions
// =============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExpeditionPreparation {
    pub think_tank_bonus: i64,
    pub expertise_bonus: i64,
    pub site_friction: i64,
    pub political_friction: i64,
}

impl ExpeditionPreparation {
    pub fn total_modifier(&self) -> i64 {
        self.think_tank_bonus + self.expertise_bonus + self.site_friction + self.political_friction
    }
}

/// Mechanical consequence of a non-failure sideways discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SidewaysEffect {
    FactionShift {
        faction: String,
        amount: i64,
        description: String,
    },
    SpawnTheory {
        theory: String,
        confidence: ConfidenceLevel,
        description: String,
    },
    CreateGrudge {
        /// Scholar id, or "random" to pick an off-team scholar at resolve
        /// time.
        target: String,
        intensity: f64,
        description: String,
    },
    QueueOrder {
        order_type: String,
        order_data: Value,
        description: String,
    },
    ReputationChange {
        amount: i64,
        description: String,
    },
    UnlockOpportunity {
        kind: String,
        expires_in_days: i64,
        description: String,
    },
}

impl SidewaysEffect {
    pub fn description(&self) -> &str {
        match self {
            SidewaysEffect::FactionShift { description, .. }
            | SidewaysEffect::SpawnTheory { description, .. }
            | SidewaysEffect::CreateGrudge { description, .. }
            | SidewaysEffect::QueueOrder { description, .. }
            | SidewaysEffect::ReputationChange { description, .. }
            | SidewaysEffect::UnlockOpportunity { description, .. } => description,
        }
    }
}

/// Delayed press scheduled by a sideways discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidewaysPressFollowup {
    pub delay_minutes: i64,
    #[serde(rename = "type")]
    pub press_type: String,
    pub headline: String,
    pub body: String,
}

/// Deferred order scheduled by a sideways discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidewaysOrderFollowup {
    pub order_type: String,
    pub delay_minutes: i64,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpeditionResult {
    pub roll: i64,
    pub modifier: i64,
    pub final_score: i64,
    pub outcome: ExpeditionOutcome,
    #[serde(default)]
    pub failure_detail: Option<String>,
    #[serde(default)]
    pub sideways_discovery: Option<String>,
    #[serde(default)]
    pub sideways_effects: Vec<SidewaysEffect>,
    #[serde(default)]
    pub sideways_tags: Vec<String>,
    #[serde(default)]
    pub press_followups: Vec<SidewaysPressFollowup>,
    #[serde(default)]
    pub order_followups: Vec<SidewaysOrderFollowup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpeditionRecord {
    pub code: String,
    pub player_id: String,
    pub expedition_type: ExpeditionType,
    pub objective: String,
    pub team: Vec<String>,
    pub funding: Vec<String>,
    pub prep_depth: PrepDepth,
    pub confidence: ConfidenceLevel,
    pub outcome: Option<ExpeditionOutcome>,
    pub reputation_delta: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheoryRecord {
    pub timestamp: DateTime<Utc>,
    pub player_id: String,
    pub theory: String,
    pub confidence: ConfidenceLevel,
    pub supporters: Vec<String>,
    pub deadline: String,
}

// =============================================================================
// Defection offers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    Initial,
    Counter,
    Final,
}

impl OfferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferType::Initial => "initial",
            OfferType::Counter => "counter",
            OfferType::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GameError> {
        match value {
            "initial" => Ok(OfferType::Initial),
            "counter" => Ok(OfferType::Counter),
            "final" => Ok(OfferType::Final),
            other => Err(GameError::invalid(format!("unknown offer type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Countered,
    Accepted,
    Rejected,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Countered => "countered",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GameError> {
        match value {
            "pending" => Ok(OfferStatus::Pending),
            "countered" => Ok(OfferStatus::Countered),
            "accepted" => Ok(OfferStatus::Accepted),
            "rejected" => Ok(OfferStatus::Rejected),
            "expired" => Ok(OfferStatus::Expired),
            other => Err(GameError::invalid(format!(
                "unknown offer status '{other}'"
            ))),
        }
    }
}

/// A defection offer or counter-offer. The escrowed influence has been
/// deducted from the offering player for as long as the row is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRecord {
    pub id: i64,
    pub scholar_id: String,
    /// Target faction the scholar would defect to.
    pub faction: String,
    /// Player making the poaching offer.
    pub rival_id: String,
    /// Current employer at offer time.
    pub patron_id: String,
    pub offer_type: OfferType,
    pub influence_offered: BTreeMap<String, i64>,
    #[serde(default)]
    pub terms: BTreeMap<String, Value>,
    pub status: OfferStatus,
    pub parent_offer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl OfferRecord {
    /// The player whose influence is escrowed by this offer: the rival on
    /// an initial/final offer, the patron on a counter.
    pub fn escrow_owner(&self) -> &str {
        match self.offer_type {
            OfferType::Counter => &self.patron_id,
            _ => &self.rival_id,
        }
    }

    pub fn total_influence(&self) -> i64 {
        self.influence_offered.values().sum()
    }
}

// =============================================================================
// Press & events
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressRelease {
    #[serde(rename = "type")]
    pub press_type: String,
    pub headline: String,
    pub body: String,
    #[serde(default)]
    pub metadata: Value,
}

impl PressRelease {
    pub fn new(
        press_type: impl Into<String>,
        headline: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            press_type: press_type.into(),
            headline: headline.into(),
            body: body.into(),
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mutable view of the metadata object, coercing non-object metadata.
    pub fn metadata_object(&mut self) -> &mut serde_json::Map<String, Value> {
        if !matches!(self.metadata, Value::Object(_)) {
            self.metadata = Value::Object(serde_json::Map::new());
        }
        match &mut self.metadata {
            Value::Object(map) => map,
            _ => unreachable!("metadata coerced to an object above"),
        }
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.metadata_object().insert(key.to_string(), value);
    }

    /// Merge into a named metadata sub-map (for example `scheduled`).
    pub fn merge_meta_map(&mut self, key: &str, entries: Value) {
        let object = self.metadata_object();
        let slot = object
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let (Some(slot), Some(entries)) = (slot.as_object_mut(), entries.as_object()) {
            for (k, v) in entries {
                slot.insert(k.clone(), v.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressRecord {
    pub timestamp: DateTime<Utc>,
    pub release: PressRelease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub payload: Value,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, action: impl Into<String>, payload: Value) -> Self {
        Self {
            timestamp,
            action: action.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reputation_clamps_to_bounds() {
        let mut player = Player::new("p1", "P One");
        assert_eq!(player.adjust_reputation(100, -50, 50), 50);
        assert_eq!(player.adjust_reputation(-200, -50, 50), -50);
        assert_eq!(player.adjust_reputation(10, -50, 50), -40);
    }

    #[test]
    fn test_tick_cooldowns_drops_exhausted_entries() {
        let mut player = Player::new("p1", "P One");
        player.cooldowns.insert("recruitment".into(), 2);
        player.cooldowns.insert("theory".into(), 1);
        player.tick_cooldowns();
        assert_eq!(player.cooldowns.get("recruitment"), Some(&1));
        assert!(!player.cooldowns.contains_key("theory"));
        player.tick_cooldowns();
        assert!(player.cooldowns.is_empty());
    }

    #[test]
    fn test_feeling_decay_skips_scars_and_drops_faint_entries() {
        let mut memory = Memory::default();
        memory.adjust_feeling("patron", 2.0);
        memory.adjust_feeling("rival", 0.009);
        memory.adjust_feeling("betrayer", -3.0);
        memory.add_scar("betrayer");
        memory.decay_feelings();

        assert!((memory.feeling("patron") - 1.96).abs() < 1e-9);
        assert_eq!(memory.feeling("rival"), 0.0);
        // Scarred feelings keep their full intensity.
        assert_eq!(memory.feeling("betrayer"), -3.0);
    }

    #[test]
    fn test_preparation_modifier_sums_all_components() {
        let prep = ExpeditionPreparation {
            think_tank_bonus: 3,
            expertise_bonus: 2,
            site_friction: -1,
            political_friction: -2,
        };
        assert_eq!(prep.total_modifier(), 2);
    }

    #[test]
    fn test_offer_escrow_owner_by_type() {
        let mut offer = OfferRecord {
            id: 1,
            scholar_id: "s.x".into(),
            faction: "industry".into(),
            rival_id: "rival".into(),
            patron_id: "patron".into(),
            offer_type: OfferType::Initial,
            influence_offered: BTreeMap::from([("industry".into(), 8)]),
            terms: BTreeMap::new(),
            status: OfferStatus::Pending,
            parent_offer_id: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        assert_eq!(offer.escrow_owner(), "rival");
        assert_eq!(offer.total_influence(), 8);
        offer.offer_type = OfferType::Counter;
        assert_eq!(offer.escrow_owner(), "patron");
    }

    #[test]
    fn test_press_metadata_merge() {
        let mut press = PressRelease::new("academic_bulletin", "H", "B");
        press.merge_meta_map("scheduled", serde_json::json!({"delay_minutes": 60}));
        press.merge_meta_map("scheduled", serde_json::json!({"layer_type": "academic_gossip"}));
        let scheduled = &press.metadata["scheduled"];
        assert_eq!(scheduled["delay_minutes"], 60);
        assert_eq!(scheduled["layer_type"], "academic_gossip");
    }

    #[test]
    fn test_confidence_round_trip() {
        for level in [
            ConfidenceLevel::Suspect,
            ConfidenceLevel::Certain,
            ConfidenceLevel::StakeMyCareer,
        ] {
            assert_eq!(ConfidenceLevel::parse(level.as_str()).unwrap(), level);
        }
        assert!(ConfidenceLevel::parse("reckless").is_err());
    }
}
