//! Expedition resolution: a d100 roll plus preparation modifiers against
//! per-type outcome thresholds, with an independent sideways-discovery roll
//! on any non-failure.

use serde_json::json;

use crate::models::{
    ExpeditionOutcome, ExpeditionPreparation, ExpeditionResult, ExpeditionType, PrepDepth,
    SidewaysEffect, SidewaysOrderFollowup, SidewaysPressFollowup,
};
use crate::rng::DeterministicRng;

#[derive(Debug, Clone, Copy)]
struct OutcomeThresholds {
    failure_below: i64,
    partial_below: i64,
    landmark_at: i64,
}

fn base_thresholds(expedition_type: ExpeditionType) -> OutcomeThresholds {
    match expedition_type {
        ExpeditionType::ThinkTank => OutcomeThresholds {
            failure_below: 35,
            partial_below: 65,
            landmark_at: 90,
        },
        ExpeditionType::Field => OutcomeThresholds {
            failure_below: 40,
            partial_below: 70,
            landmark_at: 92,
        },
        ExpeditionType::GreatProject => OutcomeThresholds {
            failure_below: 45,
            partial_below: 75,
            landmark_at: 95,
        },
    }
}

/// Prep depth shifts the thresholds, never the roll itself.
fn depth_shift(depth: PrepDepth) -> i64 {
    match depth {
        PrepDepth::Shallow => 5,
        PrepDepth::Standard => 0,
        PrepDepth::Deep => -5,
    }
}

fn sideways_chance(expedition_type: ExpeditionType, depth: PrepDepth) -> f64 {
    let base: f64 = match expedition_type {
        ExpeditionType::ThinkTank => 0.20,
        ExpeditionType::Field => 0.35,
        ExpeditionType::GreatProject => 0.50,
    };
    let factor: f64 = match depth {
        PrepDepth::Shallow => 0.5,
        PrepDepth::Standard => 1.0,
        PrepDepth::Deep => 1.5,
    };
    (base * factor).min(0.95)
}

/// Failure vignettes keyed by expedition type.
pub struct FailureTables {
    think_tank: Vec<&'static str>,
    field: Vec<&'static str>,
    great_project: Vec<&'static str>,
}

impl Default for FailureTables {
    fn default() -> Self {
        Self {
            think_tank: vec![
                "the modelling assumptions collapsed under peer review",
                "a rival institute published first with better data",
                "the archival sources turned out to be forgeries",
            ],
            field: vec![
                "monsoon rains flooded the dig site for a month",
                "local permits were revoked mid-season",
                "the supply caravan never arrived",
                "the survey instruments were ruined in transit",
            ],
            great_project: vec![
                "funding partners withdrew at the worst moment",
                "the grand apparatus cracked on first firing",
                "political interference halted the works",
            ],
        }
    }
}

impl FailureTables {
    fn pick(&self, rng: &mut DeterministicRng, expedition_type: ExpeditionType) -> String {
        let table = match expedition_type {
            ExpeditionType::ThinkTank => &self.think_tank,
            ExpeditionType::Field => &self.field,
            ExpeditionType::GreatProject => &self.great_project,
        };
        (*rng.choice(table)).to_string()
    }
}

pub struct ExpeditionResolver {
    failure_tables: FailureTables,
}

impl ExpeditionResolver {
    pub fn new(failure_tables: FailureTables) -> Self {
        Self { failure_tables }
    }

    pub fn resolve(
        &self,
        rng: &mut DeterministicRng,
        preparation: &ExpeditionPreparation,
        depth: PrepDepth,
        expedition_type: ExpeditionType,
    ) -> ExpeditionResult {
        let roll = rng.randint(1, 100);
        let modifier = preparation.total_modifier();
        let final_score = roll + modifier;

        let thresholds = base_thresholds(expedition_type);
        let shift = depth_shift(depth);
        let outcome = if final_score < thresholds.failure_below + shift {
            ExpeditionOutcome::Failure
        } else if final_score < thresholds.partial_below + shift {
            ExpeditionOutcome::Partial
        } else if final_score < thresholds.landmark_at + shift {
            ExpeditionOutcome::Success
        } else {
            ExpeditionOutcome::Landmark
        };

        let mut result = ExpeditionResult {
            roll,
            modifier,
            final_score,
            outcome,
            failure_detail: None,
            sideways_discovery: None,
            sideways_effects: Vec::new(),
            sideways_tags: Vec::new(),
            press_followups: Vec::new(),
            order_followups: Vec::new(),
        };

        if outcome == ExpeditionOutcome::Failure {
            result.failure_detail = Some(self.failure_tables.pick(rng, expedition_type));
            return result;
        }

        if rng.uniform(0.0, 1.0) < sideways_chance(expedition_type, depth) {
            let entry = pick_sideways(rng, expedition_type);
            result.sideways_discovery = Some(entry.discovery.to_string());
            result.sideways_effects = (entry.effects)(rng);
            result.sideways_tags = entry.tags.iter().map(|t| t.to_string()).collect();
            result.press_followups = (entry.press_followups)();
            result.order_followups = (entry.order_followups)();
        }

        result
    }
}

impl Default for ExpeditionResolver {
    fn default() -> Self {
        Self::new(FailureTables::default())
    }
}

// =============================================================================
// Sideways catalogue
// =============================================================================

struct SidewaysEntry {
    discovery: &'static str,
    tags: &'static [&'static str],
    effects: fn(&mut DeterministicRng) -> Vec<SidewaysEffect>,
    press_followups: fn() -> Vec<SidewaysPressFollowup>,
    order_followups: fn() -> Vec<SidewaysOrderFollowup>,
}

fn no_press() -> Vec<SidewaysPressFollowup> {
    Vec::new()
}

fn no_orders() -> Vec<SidewaysOrderFollowup> {
    Vec::new()
}

fn pick_sideways(rng: &mut DeterministicRng, expedition_type: ExpeditionType) -> &'static SidewaysEntry {
    let table: &[SidewaysEntry] = match expedition_type {
        ExpeditionType::ThinkTank => &THINK_TANK_SIDEWAYS,
        ExpeditionType::Field => &FIELD_SIDEWAYS,
        ExpeditionType::GreatProject => &GREAT_PROJECT_SIDEWAYS,
    };
    rng.choice(table)
}

static THINK_TANK_SIDEWAYS: [SidewaysEntry; 3] = [
    SidewaysEntry {
        discovery: "a marginal annotation pointing at an unpublished rival manuscript",
        tags: &["archival"],
        effects: |_| {
            vec![SidewaysEffect::SpawnTheory {
                theory: "The annotated margins describe a suppressed second survey".to_string(),
                confidence: crate::models::ConfidenceLevel::Suspect,
                description: "The annotation suggests a theory worth airing".to_string(),
            }]
        },
        press_followups: no_press,
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "an accounting irregularity in the institute's patron ledgers",
        tags: &["scandal"],
        effects: |_| {
            vec![SidewaysEffect::FactionShift {
                faction: "government".to_string(),
                amount: 1,
                description: "Auditors appreciate the tip-off".to_string(),
            }]
        },
        press_followups: || {
            vec![SidewaysPressFollowup {
                delay_minutes: 180,
                press_type: "sideways_followup".to_string(),
                headline: "Ledger Questions Linger".to_string(),
                body: "Clerks keep finding new irregularities in the patron accounts.".to_string(),
            }]
        },
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "a junior analyst's heretical reinterpretation of the source data",
        tags: &["rivalry"],
        effects: |rng| {
            vec![SidewaysEffect::CreateGrudge {
                target: "random".to_string(),
                intensity: 1.0 + rng.uniform(0.0, 1.0),
                description: "An established scholar resents the reinterpretation".to_string(),
            }]
        },
        press_followups: no_press,
        order_followups: no_orders,
    },
];

static FIELD_SIDEWAYS: [SidewaysEntry; 4] = [
    SidewaysEntry {
        discovery: "a sealed chamber beneath the main trench",
        tags: &["site"],
        effects: |_| {
            vec![SidewaysEffect::UnlockOpportunity {
                kind: "sealed_chamber_survey".to_string(),
                expires_in_days: 3,
                description: "The chamber can be surveyed before the season ends".to_string(),
            }]
        },
        press_followups: || {
            vec![SidewaysPressFollowup {
                delay_minutes: 120,
                press_type: "sideways_followup".to_string(),
                headline: "What Lies Beneath the Trench?".to_string(),
                body: "Workers refuse to re-enter until the chamber is blessed.".to_string(),
            }]
        },
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "trade tokens from a polity the textbooks call mythical",
        tags: &["heterodox"],
        effects: |_| {
            vec![
                SidewaysEffect::SpawnTheory {
                    theory: "The token polity traded across the inland sea".to_string(),
                    confidence: crate::models::ConfidenceLevel::Suspect,
                    description: "The tokens demand a public claim".to_string(),
                },
                SidewaysEffect::ReputationChange {
                    amount: 2,
                    description: "The find alone burnishes the sponsor's standing".to_string(),
                },
            ]
        },
        press_followups: no_press,
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "evidence the site was salted by a previous expedition",
        tags: &["scandal", "rivalry"],
        effects: |_| {
            vec![SidewaysEffect::QueueOrder {
                order_type: "conference".to_string(),
                order_data: json!({
                    "topic": "Emergency colloquium on site contamination",
                }),
                description: "The contamination claim must be debated openly".to_string(),
            }]
        },
        press_followups: no_press,
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "a local archive of weather diaries spanning two centuries",
        tags: &["archival"],
        effects: |_| {
            vec![SidewaysEffect::FactionShift {
                faction: "academia".to_string(),
                amount: 1,
                description: "The diaries are donated to the Academy".to_string(),
            }]
        },
        press_followups: no_press,
        order_followups: || {
            vec![SidewaysOrderFollowup {
                order_type: "sideways_vignette".to_string(),
                delay_minutes: 240,
                payload: json!({
                    "headline": "The Diarists of the Delta",
                    "body": "Two hundred years of rainfall, recorded in a steady hand.",
                    "gossip": ["Someone kept faith with the sky for two centuries."],
                }),
            }]
        },
    },
];

static GREAT_PROJECT_SIDEWAYS: [SidewaysEntry; 3] = [
    SidewaysEntry {
        discovery: "the apparatus resonates at a frequency nobody predicted",
        tags: &["anomaly"],
        effects: |_| {
            vec![
                SidewaysEffect::SpawnTheory {
                    theory: "The resonance implies a standing wave in the bedrock".to_string(),
                    confidence: crate::models::ConfidenceLevel::Certain,
                    description: "The anomaly demands a formal theory".to_string(),
                },
                SidewaysEffect::UnlockOpportunity {
                    kind: "resonance_measurement".to_string(),
                    expires_in_days: 5,
                    description: "The resonance can be measured while the apparatus runs".to_string(),
                },
            ]
        },
        press_followups: || {
            vec![SidewaysPressFollowup {
                delay_minutes: 90,
                press_type: "sideways_followup".to_string(),
                headline: "The Hum Beneath the Works".to_string(),
                body: "Night staff report the apparatus singing to itself.".to_string(),
            }]
        },
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "foreign observers taking meticulous notes from the gallery",
        tags: &["diplomacy"],
        effects: |_| {
            vec![SidewaysEffect::FactionShift {
                faction: "foreign".to_string(),
                amount: 2,
                description: "The observers carry favourable reports home".to_string(),
            }]
        },
        press_followups: no_press,
        order_followups: no_orders,
    },
    SidewaysEntry {
        discovery: "a cache of the original architect's discarded blueprints",
        tags: &["archival", "anomaly"],
        effects: |_| {
            vec![SidewaysEffect::ReputationChange {
                amount: 3,
                description: "Restoring the architect's intent earns public credit".to_string(),
            }]
        },
        press_followups: no_press,
        order_followups: no_orders,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwhelming_preparation_guarantees_landmark() {
        let resolver = ExpeditionResolver::default();
        let mut rng = DeterministicRng::new(1);
        let prep = ExpeditionPreparation {
            think_tank_bonus: 100,
            ..Default::default()
        };
        let result = resolver.resolve(&mut rng, &prep, PrepDepth::Standard, ExpeditionType::ThinkTank);
        assert_eq!(result.outcome, ExpeditionOutcome::Landmark);
        assert_eq!(result.final_score, result.roll + 100);
        assert!(result.failure_detail.is_none());
    }

    #[test]
    fn test_crushing_friction_guarantees_failure_with_detail() {
        let resolver = ExpeditionResolver::default();
        let mut rng = DeterministicRng::new(2);
        let prep = ExpeditionPreparation {
            site_friction: -200,
            ..Default::default()
        };
        let result = resolver.resolve(&mut rng, &prep, PrepDepth::Deep, ExpeditionType::Field);
        assert_eq!(result.outcome, ExpeditionOutcome::Failure);
        assert!(result.failure_detail.is_some());
        assert!(result.sideways_effects.is_empty());
    }

    #[test]
    fn test_depth_shifts_thresholds_not_roll() {
        // A score of 36 on think_tank: partial at standard depth, failure at
        // shallow (threshold shifted up to 40).
        let resolver = ExpeditionResolver::default();
        for (depth, expect_failure) in [(PrepDepth::Standard, false), (PrepDepth::Shallow, true)] {
            // Search the RNG stream for a roll landing on exactly 36.
            let mut found = false;
            for seed in 0..500 {
                let mut probe = DeterministicRng::new(seed);
                if probe.randint(1, 100) == 36 {
                    let mut rng = DeterministicRng::new(seed);
                    let result = resolver.resolve(
                        &mut rng,
                        &ExpeditionPreparation::default(),
                        depth,
                        ExpeditionType::ThinkTank,
                    );
                    assert_eq!(result.roll, 36);
                    assert_eq!(result.outcome == ExpeditionOutcome::Failure, expect_failure);
                    found = true;
                    break;
                }
            }
            assert!(found, "no seed produced a roll of 36");
        }
    }

    #[test]
    fn test_sideways_only_on_non_failure() {
        let resolver = ExpeditionResolver::default();
        let mut rng = DeterministicRng::new(3);
        for _ in 0..100 {
            let result = resolver.resolve(
                &mut rng,
                &ExpeditionPreparation::default(),
                PrepDepth::Deep,
                ExpeditionType::GreatProject,
            );
            if result.outcome == ExpeditionOutcome::Failure {
                assert!(result.sideways_discovery.is_none());
            }
            if result.sideways_discovery.is_some() {
                assert!(!result.sideways_effects.is_empty());
            }
        }
    }

    #[test]
    fn test_deep_great_project_eventually_finds_sideways() {
        let resolver = ExpeditionResolver::default();
        let mut rng = DeterministicRng::new(4);
        let prep = ExpeditionPreparation {
            think_tank_bonus: 60,
            ..Default::default()
        };
        let mut hits = 0;
        for _ in 0..60 {
            let result =
                resolver.resolve(&mut rng, &prep, PrepDepth::Deep, ExpeditionType::GreatProject);
            if result.sideways_discovery.is_some() {
                hits += 1;
            }
        }
        assert!(hits > 0, "sideways discovery never fired in 60 resolutions");
    }
}
