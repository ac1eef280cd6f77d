//! Symposium pledges, forfeits, debts and reprisals end to end.

use greatwork::enhancer::TemplateEnhancer;
use greatwork::models::Player;
use greatwork::telemetry::NullTelemetry;
use greatwork::{GameService, Settings};

fn build_service(dir: &tempfile::TempDir, settings: Settings) -> GameService {
    let db_path = dir.path().join("state.sqlite");
    GameService::with_ports(
        &db_path,
        settings,
        Box::new(TemplateEnhancer),
        Box::new(NullTelemetry),
    )
    .unwrap()
}

fn seed_player(service: &mut GameService, id: &str, faction: &str, influence: i64) {
    let mut player = Player::new(id, id);
    player.influence.insert(faction.to_string(), influence);
    service.store_mut().upsert_player(&player).unwrap();
}

#[test]
fn test_non_voter_forfeit_becomes_debt_and_reprisal() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        symposium_grace_misses: 0,
        symposium_pledge_base: 5,
        symposium_debt_reprisal_threshold: 1,
        symposium_debt_reprisal_penalty: 1,
        symposium_debt_reprisal_cooldown_days: 0,
        ..Settings::default()
    };
    let mut service = build_service(&dir, settings);
    seed_player(&mut service, "carol", "academia", 4);

    service
        .start_symposium(Some("Topic"), Some("Desc"), None)
        .unwrap();
    let topic = service
        .store_mut()
        .get_current_symposium_topic()
        .unwrap()
        .unwrap();

    // Carol never votes: her 4 influence covers 4 of the 5 pledge and the
    // remaining 1 becomes a symposium debt.
    service.resolve_symposium().unwrap();
    let pledge = service
        .store_mut()
        .get_symposium_pledge(topic.id, "carol")
        .unwrap()
        .unwrap();
    assert_eq!(pledge.status, "debt");
    let carol = service.store_mut().get_player("carol").unwrap().unwrap();
    assert_eq!(carol.influence["academia"], 0);
    let debt = service
        .store_mut()
        .get_influence_debt("carol", "academia", "symposium")
        .unwrap()
        .unwrap();
    assert_eq!(debt.amount, 1);

    // The next symposium settles what it can and, with the cooldown
    // elapsed and the threshold met, takes a reprisal on what persists.
    service
        .start_symposium(Some("Second"), Some("Desc"), None)
        .unwrap();
    let events = service.export_log(None).unwrap();
    assert!(events
        .iter()
        .any(|(_, e)| e.action == "symposium_started"));
    // Carol has no influence left, so the debt persists and the reprisal
    // takes reputation instead.
    let carol = service.store_mut().get_player("carol").unwrap().unwrap();
    assert_eq!(carol.reputation, -1);
    let debt = service
        .store_mut()
        .get_influence_debt("carol", "academia", "symposium")
        .unwrap()
        .unwrap();
    assert!(debt.reprisal_level >= 1);

    // The reprimand follow-up lands at the next digest.
    let releases = service.advance_digest().unwrap();
    assert!(releases
        .iter()
        .any(|r| r.press_type == "symposium_reprimand"));
}

#[test]
fn test_voting_player_keeps_influence_and_grace() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = build_service(&dir, Settings::default());
    seed_player(&mut service, "carol", "academia", 4);
    seed_player(&mut service, "dave", "industry", 3);

    service
        .start_symposium(Some("Topic"), Some("Desc"), None)
        .unwrap();
    let topic = service
        .store_mut()
        .get_current_symposium_topic()
        .unwrap()
        .unwrap();
    service.vote_symposium("carol", 2).unwrap();
    let resolution = service.resolve_symposium().unwrap();
    assert_eq!(resolution.press_type, "symposium_resolution");
    assert_eq!(resolution.metadata["winner"], "2");

    let carol_pledge = service
        .store_mut()
        .get_symposium_pledge(topic.id, "carol")
        .unwrap()
        .unwrap();
    assert_eq!(carol_pledge.status, "fulfilled");
    let carol = service.store_mut().get_player("carol").unwrap().unwrap();
    assert_eq!(carol.influence["academia"], 4);

    // Dave missed but had grace; his pledge is waived.
    let dave_pledge = service
        .store_mut()
        .get_symposium_pledge(topic.id, "dave")
        .unwrap()
        .unwrap();
    assert_eq!(dave_pledge.status, "waived");
    let dave = service.store_mut().get_player("dave").unwrap().unwrap();
    assert_eq!(dave.influence["industry"], 3);

    let status = service.symposium_pledge_status("dave").unwrap();
    assert_eq!(status["miss_streak"], 1);
    assert_eq!(status["grace_remaining"], 0);
    assert_eq!(status["outstanding_debt"], 0);
}

#[test]
fn test_escalating_pledges_for_repeat_misses() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        symposium_grace_misses: 0,
        symposium_pledge_base: 2,
        symposium_pledge_escalation_cap: 4,
        ..Settings::default()
    };
    let mut service = build_service(&dir, settings);
    seed_player(&mut service, "carol", "academia", 0);

    for round in 0..3 {
        service
            .start_symposium(Some(&format!("Round {round}")), Some("Desc"), None)
            .unwrap();
        service.resolve_symposium().unwrap();
    }
    let participation = service
        .store_mut()
        .get_symposium_participation("carol")
        .unwrap()
        .unwrap();
    assert_eq!(participation.miss_streak, 3);

    // The fourth pledge escalates with the miss streak (2 base + 3) plus
    // the capped debt penalty from everything already owed.
    service
        .start_symposium(Some("Round 4"), Some("Desc"), None)
        .unwrap();
    let topic = service
        .store_mut()
        .get_current_symposium_topic()
        .unwrap()
        .unwrap();
    let pledge = service
        .store_mut()
        .get_symposium_pledge(topic.id, "carol")
        .unwrap()
        .unwrap();
    assert!(pledge.pledge_amount >= 5);
}
