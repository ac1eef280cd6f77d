//! Scholar repository: the base roster plus deterministic procedural
//! generation from the namebanks and archetype tables.

use chrono::{DateTime, Utc};

use crate::catalogs::{
    ARCHETYPES, CATCHPHRASES, DISCIPLINES, DRIVES, FACTIONS, METHODS, NAMEBANKS, TABOOS, VICES,
    VIRTUES,
};
use crate::models::{
    CareerState, CareerTrack, ContractState, Memory, MemoryFact, Scholar, ScholarStats,
};
use crate::rng::DeterministicRng;

pub struct ScholarRepository;

impl ScholarRepository {
    pub fn new() -> Self {
        Self
    }

    pub fn base_scholars(&self) -> Vec<Scholar> {
        BASE_SCHOLARS
            .iter()
            .map(|spec| {
                let mut scholar = Scholar {
                    id: spec.id.to_string(),
                    name: spec.name.to_string(),
                    seed: spec.seed,
                    archetype: spec.archetype.to_string(),
                    disciplines: spec.disciplines.iter().map(|s| s.to_string()).collect(),
                    methods: spec.methods.iter().map(|s| s.to_string()).collect(),
                    drives: spec.drives.iter().map(|s| s.to_string()).collect(),
                    virtues: spec.virtues.iter().map(|s| s.to_string()).collect(),
                    vices: spec.vices.iter().map(|s| s.to_string()).collect(),
                    stats: spec.stats,
                    politics: FACTIONS
                        .iter()
                        .zip(spec.politics.iter())
                        .map(|(faction, value)| (faction.to_string(), *value))
                        .collect(),
                    catchphrase: spec.catchphrase.to_string(),
                    taboos: spec.taboos.iter().map(|s| s.to_string()).collect(),
                    memory: Memory::default(),
                    career: CareerState::default(),
                    contract: ContractState::default(),
                };
                scholar.contract.term_years = spec.term_years;
                scholar
            })
            .collect()
    }

    /// Generate a new scholar from the RNG and the namebank tables.
    pub fn generate(&self, rng: &mut DeterministicRng, identifier: &str) -> Scholar {
        let bank = rng.choice(&NAMEBANKS);
        let given = *rng.choice(bank.given);
        let surname = *rng.choice(bank.surname);
        let name = format!("Dr {given} {surname}");
        let seed = rng.randint(1, 10_000_000);
        let archetype = (*rng.choice(&ARCHETYPES)).to_string();

        let discipline_count = 1 + rng.randint(0, 1) as usize;
        let disciplines = rng
            .sample(&DISCIPLINES, discipline_count)
            .into_iter()
            .map(String::from)
            .collect();
        let methods = rng
            .sample(&METHODS, 2)
            .into_iter()
            .map(String::from)
            .collect();
        let drives = rng
            .sample(&DRIVES, 2)
            .into_iter()
            .map(String::from)
            .collect();
        let virtues = rng
            .sample(&VIRTUES, 2)
            .into_iter()
            .map(String::from)
            .collect();
        let vices = rng
            .sample(&VICES, 1)
            .into_iter()
            .map(String::from)
            .collect();
        let taboo_count = 1 + rng.randint(0, 1) as usize;
        let taboos = rng
            .sample(&TABOOS, taboo_count)
            .into_iter()
            .map(String::from)
            .collect();

        let stats = ScholarStats {
            talent: rng.randint(4, 9),
            reliability: rng.randint(2, 9),
            integrity: rng.randint(1, 9),
            theatrics: rng.randint(1, 9),
            loyalty: rng.randint(1, 9),
            risk: rng.randint(1, 9),
        };
        let politics = FACTIONS
            .iter()
            .map(|faction| (faction.to_string(), rng.randint(-3, 3)))
            .collect();
        let catchphrase = (*rng.choice(&CATCHPHRASES)).to_string();

        let mut contract = ContractState::default();
        contract.term_years = rng.randint(1, 5);

        Scholar {
            id: identifier.to_string(),
            name,
            seed,
            archetype,
            disciplines,
            methods,
            drives,
            virtues,
            vices,
            stats,
            politics,
            catchphrase,
            taboos,
            memory: Memory::default(),
            career: CareerState {
                track: CareerTrack::Academia,
                tier: "Postdoc".to_string(),
                ticks: 0,
            },
            contract,
        }
    }
}

impl Default for ScholarRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Logistic defection curve. Loyalty and integrity pull against the
/// combined pressure of the offer, mistreatment, alignment and plateau.
pub fn defection_probability(
    scholar: &Scholar,
    offer_quality: f64,
    mistreatment: f64,
    alignment: f64,
    plateau: f64,
) -> f64 {
    let x = offer_quality + mistreatment + alignment + plateau
        - 0.6 * scholar.loyalty_score()
        - 0.4 * scholar.integrity_score();
    1.0 / (1.0 + (-6.0 * (x - 0.5)).exp())
}

/// Add a permanent scar, record the fact, and sour the feeling toward the
/// subject.
pub fn apply_scar(scholar: &mut Scholar, scar: &str, subject: &str, timestamp: DateTime<Utc>) {
    scholar.memory.add_scar(scar);
    scholar.memory.record_fact(MemoryFact {
        timestamp,
        kind: "scar".to_string(),
        subject: subject.to_string(),
        details: [(
            "scar".to_string(),
            serde_json::Value::String(scar.to_string()),
        )]
        .into_iter()
        .collect(),
    });
    scholar.memory.adjust_feeling(subject, -3.0);
}

struct BaseScholarSpec {
    id: &'static str,
    name: &'static str,
    seed: i64,
    archetype: &'static str,
    disciplines: &'static [&'static str],
    methods: &'static [&'static str],
    drives: &'static [&'static str],
    virtues: &'static [&'static str],
    vices: &'static [&'static str],
    stats: ScholarStats,
    politics: [i64; 5],
    catchphrase: &'static str,
    taboos: &'static [&'static str],
    term_years: i64,
}

const BASE_SCHOLARS: [BaseScholarSpec; 8] = [
    BaseScholarSpec {
        id: "s.ironquill",
        name: "Dr Elara Ironquill",
        seed: 101,
        archetype: "Empiricist",
        disciplines: &["Archaeology", "Cartography"],
        methods: &["survey and trench", "statistical inference"],
        drives: &["Truth", "Legacy"],
        virtues: &["integrity", "diligence"],
        vices: &["obstinacy"],
        stats: ScholarStats {
            talent: 8,
            reliability: 8,
            integrity: 9,
            theatrics: 3,
            loyalty: 7,
            risk: 4,
        },
        politics: [2, 0, -1, 0, 1],
        catchphrase: "Show me {evidence} or I am not buying it.",
        taboos: &["forged provenance"],
        term_years: 3,
    },
    BaseScholarSpec {
        id: "s.farseer",
        name: "Dr Teodor Farseer",
        seed: 102,
        archetype: "Visionary",
        disciplines: &["Astronomy"],
        methods: &["instrument calibration", "archival collation"],
        drives: &["Acclaim", "Heresy"],
        virtues: &["courage", "candour"],
        vices: &["vanity"],
        stats: ScholarStats {
            talent: 9,
            reliability: 4,
            integrity: 5,
            theatrics: 8,
            loyalty: 4,
            risk: 8,
        },
        politics: [1, -2, 2, -1, 0],
        catchphrase: "Bear with me. If {premise}, then {wild_leap}.",
        taboos: &["rushed publication"],
        term_years: 2,
    },
    BaseScholarSpec {
        id: "s.saltwright",
        name: "Dr Orsola Saltwright",
        seed: 103,
        archetype: "Field Rat",
        disciplines: &["Geology", "Antiquities"],
        methods: &["expedition logistics", "survey and trench"],
        drives: &["Wanderlust", "Truth"],
        virtues: &["patience", "generosity"],
        vices: &["recklessness"],
        stats: ScholarStats {
            talent: 6,
            reliability: 7,
            integrity: 7,
            theatrics: 4,
            loyalty: 8,
            risk: 7,
        },
        politics: [0, 1, 1, 0, 2],
        catchphrase: "Have we tried {reckless_method} yet?",
        taboos: &["grave disturbance"],
        term_years: 4,
    },
    BaseScholarSpec {
        id: "s.volkonsky",
        name: "Dr Yelena Volkonsky",
        seed: 104,
        archetype: "Archivist",
        disciplines: &["Cryptolinguistics", "Folklore"],
        methods: &["comparative etymology", "archival collation"],
        drives: &["Orthodoxy", "Legacy"],
        virtues: &["diligence", "humility"],
        vices: &["melancholy"],
        stats: ScholarStats {
            talent: 7,
            reliability: 9,
            integrity: 8,
            theatrics: 2,
            loyalty: 9,
            risk: 2,
        },
        politics: [3, 1, -2, 1, -1],
        catchphrase: "As I have long suspected, {topic} hinges on {concept}.",
        taboos: &["press leaks", "uncredited collaboration"],
        term_years: 5,
    },
    BaseScholarSpec {
        id: "s.noorani",
        name: "Dr Nasrin Noorani",
        seed: 105,
        archetype: "Mystic",
        disciplines: &["Natural Philosophy"],
        methods: &["patron interviews", "comparative etymology"],
        drives: &["Heresy", "Wanderlust"],
        virtues: &["courage", "candour"],
        vices: &["gossip"],
        stats: ScholarStats {
            talent: 8,
            reliability: 5,
            integrity: 6,
            theatrics: 7,
            loyalty: 5,
            risk: 6,
        },
        politics: [-1, -1, 0, 3, 2],
        catchphrase: "Bear with me. If {premise}, then {wild_leap}.",
        taboos: &["patron flattery"],
        term_years: 2,
    },
    BaseScholarSpec {
        id: "s.marchetti",
        name: "Dr Bianca Marchetti",
        seed: 106,
        archetype: "Showman",
        disciplines: &["Chemistry", "Mathematics"],
        methods: &["double-blind assay", "statistical inference"],
        drives: &["Acclaim", "Rivalry"],
        virtues: &["candour", "courage"],
        vices: &["envy"],
        stats: ScholarStats {
            talent: 7,
            reliability: 6,
            integrity: 4,
            theatrics: 9,
            loyalty: 3,
            risk: 7,
        },
        politics: [0, 0, 3, -2, 1],
        catchphrase: "Show me {evidence} or I am not buying it.",
        taboos: &["forged provenance"],
        term_years: 1,
    },
    BaseScholarSpec {
        id: "s.karatau",
        name: "Dr Temir Karatau",
        seed: 107,
        archetype: "Skeptic",
        disciplines: &["Geology", "Mathematics"],
        methods: &["statistical inference", "instrument calibration"],
        drives: &["Truth", "Orthodoxy"],
        virtues: &["integrity", "patience"],
        vices: &["obstinacy"],
        stats: ScholarStats {
            talent: 6,
            reliability: 8,
            integrity: 9,
            theatrics: 3,
            loyalty: 6,
            risk: 3,
        },
        politics: [1, 2, 0, 0, -1],
        catchphrase: "Show me {evidence} or I am not buying it.",
        taboos: &["rushed publication"],
        term_years: 3,
    },
    BaseScholarSpec {
        id: "s.pellerin",
        name: "Dr Rafael Pellerin",
        seed: 108,
        archetype: "Contrarian",
        disciplines: &["Folklore", "Antiquities"],
        methods: &["patron interviews", "archival collation"],
        drives: &["Rivalry", "Patronage"],
        virtues: &["candour", "generosity"],
        vices: &["grudge-keeping"],
        stats: ScholarStats {
            talent: 5,
            reliability: 5,
            integrity: 5,
            theatrics: 6,
            loyalty: 4,
            risk: 5,
        },
        politics: [-2, 1, 2, 1, 0],
        catchphrase: "As I have long suspected, {topic} hinges on {concept}.",
        taboos: &["uncredited collaboration"],
        term_years: 2,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn build_scholar(loyalty: i64, integrity: i64) -> Scholar {
        let mut scholar = ScholarRepository::new().base_scholars().remove(0);
        scholar.stats.loyalty = loyalty;
        scholar.stats.integrity = integrity;
        scholar
    }

    #[test]
    fn test_base_roster_includes_ironquill() {
        let roster = ScholarRepository::new().base_scholars();
        let ironquill = roster.iter().find(|s| s.id == "s.ironquill").unwrap();
        assert_eq!(ironquill.name, "Dr Elara Ironquill");
        assert!(ironquill.contract.is_independent());
    }

    #[test]
    fn test_generation_is_deterministic_per_seed() {
        let repo = ScholarRepository::new();
        let mut rng_a = DeterministicRng::new(42);
        let mut rng_b = DeterministicRng::new(42);
        let a = repo.generate(&mut rng_a, "s.proc-001");
        let b = repo.generate(&mut rng_b, "s.proc-001");
        assert_eq!(a.name, b.name);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.archetype, b.archetype);
    }

    #[test]
    fn test_generated_scholar_within_stat_ranges() {
        let repo = ScholarRepository::new();
        let mut rng = DeterministicRng::new(7);
        for i in 0..20 {
            let scholar = repo.generate(&mut rng, &format!("s.proc-{i:03}"));
            assert!((4..=9).contains(&scholar.stats.talent));
            assert!((1..=9).contains(&scholar.stats.loyalty));
            assert!(!scholar.disciplines.is_empty());
            assert_eq!(scholar.methods.len(), 2);
            assert_eq!(scholar.politics.len(), FACTIONS.len());
        }
    }

    #[test]
    fn test_high_loyalty_lowers_probability() {
        let loyal = build_scholar(9, 8);
        let disloyal = build_scholar(2, 3);
        let p_loyal = defection_probability(&loyal, 0.8, 0.2, 0.1, 0.2);
        let p_disloyal = defection_probability(&disloyal, 0.8, 0.2, 0.1, 0.2);
        assert!(p_loyal < p_disloyal);
    }

    #[test]
    fn test_probability_bounds() {
        let scholar = build_scholar(5, 5);
        let p = defection_probability(&scholar, 1.0, 1.0, 0.3, 0.4);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_apply_scar_records_fact_and_feeling() {
        let mut scholar = build_scholar(5, 5);
        let now = Utc::now();
        apply_scar(&mut scholar, "defection", "old_patron", now);
        assert!(scholar.memory.scars.contains("defection"));
        assert_eq!(scholar.memory.feeling("old_patron"), -3.0);
        assert_eq!(scholar.memory.facts.last().unwrap().kind, "scar");
    }
}
