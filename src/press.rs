//! Press constructors: pure functions from typed contexts to releases.
//! The narrative enhancer may rewrite bodies later; these templates are the
//! canonical fallback text.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{ExpeditionOutcome, ExpeditionResult, PressRelease};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletinContext {
    pub bulletin_number: i64,
    pub player: String,
    pub theory: String,
    pub confidence: String,
    pub supporters: Vec<String>,
    pub deadline: String,
}

pub fn academic_bulletin(ctx: &BulletinContext) -> PressRelease {
    let support = if ctx.supporters.is_empty() {
        "None".to_string()
    } else {
        ctx.supporters.join(", ")
    };
    let headline = format!("Academic Bulletin No. {}", ctx.bulletin_number);
    let body = format!(
        "{} submits \"{}\" with {} confidence. Supporting scholars: {}. \
         Counter-claims invited before {}.",
        ctx.player, ctx.theory, ctx.confidence, support, ctx.deadline
    );
    PressRelease::new("academic_bulletin", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpeditionContext {
    pub code: String,
    pub player: String,
    pub expedition_type: String,
    pub objective: String,
    pub team: Vec<String>,
    pub funding: Vec<String>,
}

pub fn research_manifesto(ctx: &ExpeditionContext) -> PressRelease {
    let team = ctx.team.join(", ");
    let funding = if ctx.funding.is_empty() {
        "self-funded".to_string()
    } else {
        ctx.funding.join(", ")
    };
    let headline = format!("Expedition {} Manifesto", ctx.code);
    let body = format!(
        "{} announces Expedition {}. Objective: {}. Team: {}. Funding: {}.",
        ctx.player, ctx.code, ctx.objective, team, funding
    );
    PressRelease::new("research_manifesto", headline, body)
}

fn title_case(value: &str) -> String {
    value
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeContext {
    pub code: String,
    pub player: String,
    pub expedition_type: String,
    pub result: ExpeditionResult,
    pub reputation_change: i64,
    pub reactions: Vec<String>,
}

fn outcome_body(ctx: &OutcomeContext) -> String {
    let mut body = format!(
        "Outcome: {}. Roll {} + {} = {}. Reputation change: {:+}.",
        ctx.result.outcome.as_str(),
        ctx.result.roll,
        ctx.result.modifier,
        ctx.result.final_score,
        ctx.reputation_change
    );
    if let Some(sideways) = &ctx.result.sideways_discovery {
        body.push_str(&format!(" Side discovery: {sideways}."));
    }
    if let Some(detail) = &ctx.result.failure_detail {
        body.push_str(&format!(" Failure detail: {detail}."));
    }
    if !ctx.reactions.is_empty() {
        body.push_str(&format!(" Scholar reactions: {}.", ctx.reactions.join(" | ")));
    }
    body
}

pub fn discovery_report(ctx: &OutcomeContext) -> PressRelease {
    let headline = format!(
        "Discovery Report: Expedition {} ({})",
        ctx.code,
        title_case(&ctx.expedition_type)
    );
    PressRelease::new("discovery_report", headline, outcome_body(ctx))
        .with_metadata(json!({ "outcome": ctx.result.outcome.as_str() }))
}

pub fn retraction_notice(ctx: &OutcomeContext) -> PressRelease {
    let headline = format!(
        "Retraction Notice: Expedition {} ({})",
        ctx.code,
        title_case(&ctx.expedition_type)
    );
    PressRelease::new("retraction_notice", headline, outcome_body(ctx))
        .with_metadata(json!({ "outcome": ctx.result.outcome.as_str() }))
}

/// Pick the result release type from the outcome.
pub fn expedition_result_release(ctx: &OutcomeContext) -> PressRelease {
    if ctx.result.outcome == ExpeditionOutcome::Failure {
        retraction_notice(ctx)
    } else {
        discovery_report(ctx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipContext {
    pub scholar: String,
    pub quote: String,
    pub trigger: String,
}

pub fn academic_gossip(ctx: &GossipContext) -> PressRelease {
    let headline = format!("Academic Gossip — {}", ctx.scholar);
    let body = format!("{}: \"{}\" (Context: {}).", ctx.scholar, ctx.quote, ctx.trigger);
    PressRelease::new("academic_gossip", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecruitmentContext {
    pub player: String,
    pub scholar: String,
    pub outcome: String,
    pub chance: f64,
    pub faction: String,
    pub relationship_modifier: f64,
}

pub fn recruitment_report(ctx: &RecruitmentContext) -> PressRelease {
    let headline = format!("Recruitment Update: {}", ctx.scholar);
    let body = format!(
        "{} pursued {} through {}. Outcome: {}. Chance: {:.0}%.",
        ctx.player,
        ctx.scholar,
        ctx.faction,
        ctx.outcome,
        ctx.chance * 100.0
    );
    PressRelease::new("recruitment_report", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectionContext {
    pub scholar: String,
    pub outcome: String,
    pub new_faction: String,
    pub probability: f64,
}

pub fn defection_notice(ctx: &DefectionContext) -> PressRelease {
    let headline = format!("Defection Wire — {}", ctx.scholar);
    let body = format!(
        "{} {} an offer from {}. Probability: {:.0}%.",
        ctx.scholar,
        ctx.outcome,
        ctx.new_faction,
        ctx.probability * 100.0
    );
    PressRelease::new("defection_notice", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalCommitmentContext {
    pub player: String,
    pub faction: String,
    pub tier: Option<String>,
    pub cost: i64,
    pub relationship_modifier: f64,
    pub paid: i64,
    pub debt: i64,
    pub status: String,
}

pub fn seasonal_commitment_update(ctx: &SeasonalCommitmentContext) -> PressRelease {
    let headline = format!("Seasonal Dues: {} × {}", ctx.player, ctx.faction);
    let mut body = format!(
        "{} renders {} influence to {} for the season (relationship modifier {:+.2}).",
        ctx.player, ctx.paid, ctx.faction, ctx.relationship_modifier
    );
    if ctx.debt > 0 {
        body.push_str(&format!(" Shortfall of {} recorded as debt.", ctx.debt));
    }
    if let Some(tier) = &ctx.tier {
        body.push_str(&format!(" Commitment tier: {tier}."));
    }
    PressRelease::new("seasonal_commitment_update", headline, body)
}

pub fn seasonal_commitment_complete(ctx: &SeasonalCommitmentContext) -> PressRelease {
    let headline = format!("Season Concluded: {} × {}", ctx.player, ctx.faction);
    let body = format!(
        "{}'s seasonal commitment to {} has run its course. The faction tallies its ledgers.",
        ctx.player, ctx.faction
    );
    PressRelease::new("seasonal_commitment_complete", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContribution {
    pub player: String,
    pub contribution: f64,
    pub relationship_modifier: f64,
    pub influence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionProjectContext {
    pub name: String,
    pub faction: String,
    pub progress: f64,
    pub target: f64,
    pub contributions: Vec<ProjectContribution>,
}

pub fn faction_project_update(ctx: &FactionProjectContext) -> PressRelease {
    let headline = format!("Project Dispatch: {}", ctx.name);
    let backers = ctx
        .contributions
        .iter()
        .map(|c| c.player.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let body = format!(
        "Work on {} advances to {:.1} of {:.1} under the {} banner. Backers this cycle: {}.",
        ctx.name, ctx.progress, ctx.target, ctx.faction, backers
    );
    PressRelease::new("faction_project_update", headline, body)
}

pub fn faction_project_complete(ctx: &FactionProjectContext) -> PressRelease {
    let headline = format!("Project Complete: {}", ctx.name);
    let body = format!(
        "{} is finished. The {} faction celebrates its backers and settles the accounts.",
        ctx.name, ctx.faction
    );
    PressRelease::new("faction_project_complete", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionInvestmentContext {
    pub player: String,
    pub faction: String,
    pub amount: i64,
    pub total: i64,
    pub program: Option<String>,
    pub relationship_bonus: f64,
}

pub fn faction_investment(ctx: &FactionInvestmentContext) -> PressRelease {
    let headline = format!("Faction Investment: {} Backs {}", ctx.player, ctx.faction);
    let mut body = format!(
        "{} invests {} influence in {} (lifetime contribution {}).",
        ctx.player, ctx.amount, ctx.faction, ctx.total
    );
    if let Some(program) = &ctx.program {
        body.push_str(&format!(" Earmarked for: {program}."));
    }
    PressRelease::new("faction_investment", headline, body)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEndowmentContext {
    pub player: String,
    pub faction: String,
    pub amount: i64,
    pub program: Option<String>,
    pub paid_debt: i64,
    pub reputation_delta: i64,
}

pub fn archive_endowment(ctx: &ArchiveEndowmentContext) -> PressRelease {
    let headline = format!("Archive Endowment — {}", ctx.player);
    let mut body = format!(
        "{} endows the archive with {} influence drawn from {} accounts.",
        ctx.player, ctx.amount, ctx.faction
    );
    if ctx.paid_debt > 0 {
        body.push_str(&format!(
            " {} of it settles outstanding obligations.",
            ctx.paid_debt
        ));
    }
    if ctx.reputation_delta != 0 {
        body.push_str(&format!(
            " The Academy notes the generosity ({:+} reputation).",
            ctx.reputation_delta
        ));
    }
    PressRelease::new("archive_endowment", headline, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: ExpeditionOutcome) -> ExpeditionResult {
        ExpeditionResult {
            roll: 62,
            modifier: 4,
            final_score: 66,
            outcome,
            failure_detail: None,
            sideways_discovery: None,
            sideways_effects: Vec::new(),
            sideways_tags: Vec::new(),
            press_followups: Vec::new(),
            order_followups: Vec::new(),
        }
    }

    #[test]
    fn test_bulletin_counts_and_names_supporters() {
        let press = academic_bulletin(&BulletinContext {
            bulletin_number: 1,
            player: "alice".into(),
            theory: "T".into(),
            confidence: "certain".into(),
            supporters: vec![],
            deadline: "2030-12-31".into(),
        });
        assert_eq!(press.headline, "Academic Bulletin No. 1");
        assert!(press.body.contains("Supporting scholars: None"));
        assert!(press.body.contains("2030-12-31"));
    }

    #[test]
    fn test_result_release_picks_type_by_outcome() {
        let ctx = OutcomeContext {
            code: "AR-01".into(),
            player: "alice".into(),
            expedition_type: "think_tank".into(),
            result: result(ExpeditionOutcome::Success),
            reputation_change: 5,
            reactions: vec!["Dr X (thrilled): onward".into()],
        };
        let press = expedition_result_release(&ctx);
        assert_eq!(press.press_type, "discovery_report");
        assert!(press.headline.contains("Think Tank"));
        assert!(press.body.contains("Reputation change: +5"));
        assert_eq!(press.metadata["outcome"], "success");

        let mut failed = ctx.clone();
        failed.result = result(ExpeditionOutcome::Failure);
        failed.result.failure_detail = Some("monsoon".into());
        failed.reputation_change = -7;
        let press = expedition_result_release(&failed);
        assert_eq!(press.press_type, "retraction_notice");
        assert!(press.body.contains("monsoon"));
        assert!(press.body.contains("-7"));
    }

    #[test]
    fn test_recruitment_report_formats_chance() {
        let press = recruitment_report(&RecruitmentContext {
            player: "bob".into(),
            scholar: "Dr Elara Ironquill".into(),
            outcome: "failure".into(),
            chance: 0.55,
            faction: "academia".into(),
            relationship_modifier: 0.02,
        });
        assert!(press.body.contains("55%"));
        assert!(press.body.contains("academia"));
    }

    #[test]
    fn test_endowment_mentions_debt_and_reputation() {
        let press = archive_endowment(&ArchiveEndowmentContext {
            player: "carol".into(),
            faction: "academia".into(),
            amount: 10,
            program: None,
            paid_debt: 3,
            reputation_delta: 1,
        });
        assert!(press.body.contains("3 of it settles"));
        assert!(press.body.contains("+1 reputation"));
    }
}
