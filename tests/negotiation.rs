//! Defection negotiation chains: escrow conservation and scholar
//! movement.

use std::collections::BTreeMap;

use greatwork::enhancer::TemplateEnhancer;
use greatwork::models::{OfferStatus, Player};
use greatwork::telemetry::NullTelemetry;
use greatwork::{GameService, Settings};

fn build_service(dir: &tempfile::TempDir) -> GameService {
    let db_path = dir.path().join("state.sqlite");
    GameService::with_ports(
        &db_path,
        Settings::default(),
        Box::new(TemplateEnhancer),
        Box::new(NullTelemetry),
    )
    .unwrap()
}

fn seed_player(service: &mut GameService, id: &str, faction: &str, influence: i64) {
    let mut player = Player::new(id, id);
    player.reputation = 40;
    player.influence.insert(faction.to_string(), influence);
    service.store_mut().upsert_player(&player).unwrap();
}

fn employ(service: &mut GameService, scholar_id: &str, employer: &str) {
    let mut scholar = service
        .store_mut()
        .get_scholar(scholar_id)
        .unwrap()
        .unwrap();
    scholar.contract.employer = employer.to_string();
    scholar.contract.faction = Some("academia".to_string());
    service.store_mut().save_scholar(&scholar).unwrap();
}

#[test]
fn test_offer_counter_chain_resolves_with_conservation() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = build_service(&dir);
    seed_player(&mut service, "r", "academia", 10);
    seed_player(&mut service, "p", "academia", 12);
    employ(&mut service, "s.ironquill", "p");

    let (offer_id, _) = service
        .create_defection_offer(
            "r",
            "s.ironquill",
            "academia",
            &BTreeMap::from([("academia".to_string(), 8)]),
            None,
        )
        .unwrap();
    let (counter_id, _) = service
        .counter_offer(
            "p",
            offer_id,
            &BTreeMap::from([("academia".to_string(), 10)]),
            None,
        )
        .unwrap();

    // Both escrows are out while the negotiation runs.
    let rival = service.store_mut().get_player("r").unwrap().unwrap();
    let patron = service.store_mut().get_player("p").unwrap().unwrap();
    assert_eq!(rival.influence["academia"], 2);
    assert_eq!(patron.influence["academia"], 2);

    // The larger counter escrow outweighs its loyalty discount.
    let p_initial = service.evaluate_scholar_offer(offer_id).unwrap();
    let p_counter = service.evaluate_scholar_offer(counter_id).unwrap();
    assert!(p_counter > p_initial - 0.1);

    // The evaluation window lapses; the dispatcher resolves the chain.
    let releases = service.resolve_offer_negotiation(counter_id).unwrap();
    assert!(!releases.is_empty());

    let events = service.export_log(None).unwrap();
    let resolved = events
        .iter()
        .rev()
        .find(|(_, e)| e.action == "negotiation_resolved")
        .unwrap();
    let accepted = resolved.1.payload["accepted"].as_bool().unwrap();
    let best = resolved.1.payload["best_offer"].as_i64().unwrap();

    let rival = service.store_mut().get_player("r").unwrap().unwrap();
    let patron = service.store_mut().get_player("p").unwrap().unwrap();
    let scholar = service
        .store_mut()
        .get_scholar("s.ironquill")
        .unwrap()
        .unwrap();

    // Escrow conservation: whatever the roll, influence only moves back
    // to its owner or into the winning bid.
    if accepted {
        if best == counter_id {
            assert_eq!(rival.influence["academia"], 10);
            assert_eq!(patron.influence["academia"], 2);
            assert_eq!(scholar.contract.employer, "p");
        } else {
            assert_eq!(rival.influence["academia"], 2);
            assert_eq!(patron.influence["academia"], 12);
            assert_eq!(scholar.contract.employer, "academia");
            assert!(scholar.memory.scars.contains("defection"));
        }
    } else {
        assert_eq!(rival.influence["academia"], 10);
        assert_eq!(patron.influence["academia"], 12);
        assert_eq!(scholar.contract.employer, "p");
    }

    // The chain is fully settled.
    let chain = service.store_mut().get_offer_chain(offer_id).unwrap();
    assert_eq!(chain.len(), 2);
    assert!(chain.iter().all(|o| o.status != OfferStatus::Pending));

    // A second resolution pass has nothing to do and moves no influence.
    service.resolve_offer_negotiation(counter_id).unwrap();
    let rival_after = service.store_mut().get_player("r").unwrap().unwrap();
    let patron_after = service.store_mut().get_player("p").unwrap().unwrap();
    assert_eq!(rival_after.influence, rival.influence);
    assert_eq!(patron_after.influence, patron.influence);
}

#[test]
fn test_uncontested_offer_resolves_via_digest() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = build_service(&dir);
    seed_player(&mut service, "r", "industry", 10);
    seed_player(&mut service, "p", "academia", 5);
    employ(&mut service, "s.marchetti", "p");

    let (offer_id, _) = service
        .create_defection_offer(
            "r",
            "s.marchetti",
            "industry",
            &BTreeMap::from([("industry".to_string(), 6)]),
            None,
        )
        .unwrap();

    // The evaluate_offer order sits 24h out in the queue; the negotiation
    // itself can be resolved directly once the window is treated as
    // lapsed.
    let orders = service
        .store_mut()
        .list_orders(Some("evaluate_offer"), Some("pending"))
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payload["offer_id"], offer_id);

    let releases = service.resolve_offer_negotiation(offer_id).unwrap();
    assert!(!releases.is_empty());
    let offer = service.store_mut().get_offer(offer_id).unwrap().unwrap();
    assert!(matches!(
        offer.status,
        OfferStatus::Accepted | OfferStatus::Rejected
    ));

    // Total influence in the system is conserved: 6 either returned to
    // the rival or consumed by the accepted bid.
    let rival = service.store_mut().get_player("r").unwrap().unwrap();
    match offer.status {
        OfferStatus::Accepted => assert_eq!(rival.influence["industry"], 4),
        _ => assert_eq!(rival.influence["industry"], 10),
    }
}
