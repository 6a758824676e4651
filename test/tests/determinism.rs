//! The property underneath checksum verification: identical committed
//! operations produce identical models and identical digests, everywhere.

use std::time::Duration;

use proptest::prelude::*;

use tandem_client::{Client, ClientConfig, ClientEvent};
use tandem_server::{Server, ServerConfig};
use tandem_shared::{apply_committed, apply_tick, MemoryStore, Model, Xxh3Context};

use tandem_test::helpers::{establish, init_logging, pump, SimClock, TestClient, TestServer};
use tandem_test::test_protocol::{schema, survivor_entity, Survivor, SurvivorAction};

fn new_server() -> TestServer {
    Server::new(
        ServerConfig::default(),
        schema(),
        Box::new(MemoryStore::new()),
    )
}

fn new_client() -> TestClient {
    Client::new(ClientConfig::default(), schema(), survivor_entity(7))
}

#[test]
fn a_long_session_never_desyncs() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    let mut all_events = Vec::new();
    for round in 0u64..30 {
        let action = match round % 4 {
            0 => SurvivorAction::Move {
                dx: (round % 3) as i32 - 1,
                dy: 1 - (round % 2) as i32 * 2,
            },
            1 => SurvivorAction::Gather {
                item: format!("item-{}", round % 5),
            },
            2 => SurvivorAction::Spend { amount: 1 },
            _ => SurvivorAction::Move { dx: 0, dy: 1 },
        };
        client.submit(action, clock.now()).unwrap();
        if round % 3 == 0 {
            server.tick(clock.now());
        }
        if round % 7 == 0 {
            server
                .push_action(
                    survivor_entity(7),
                    SurvivorAction::GrantBonus { gold: 3 },
                    clock.now(),
                )
                .unwrap();
        }
        let (client_events, _) = pump(
            &mut client,
            &mut server,
            &mut clock,
            3,
            Duration::from_millis(20),
        );
        all_events.extend(client_events);
    }

    assert!(
        !all_events
            .iter()
            .any(|event| matches!(event, ClientEvent::Desync { .. })),
        "desync in a lockstep run"
    );
    assert!(!all_events
        .iter()
        .any(|event| matches!(event, ClientEvent::SessionLost { .. })));
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.confirmed(), client.predicted());
    assert_eq!(
        client.confirmed().unwrap(),
        server.model(survivor_entity(7)).unwrap()
    );
}

fn arb_action() -> impl Strategy<Value = SurvivorAction> {
    prop_oneof![
        (-1i32..=1, -1i32..=1).prop_map(|(dx, dy)| SurvivorAction::Move { dx, dy }),
        "[a-z]{1,8}".prop_map(|item| SurvivorAction::Gather { item }),
        (0u64..100).prop_map(|amount| SurvivorAction::Spend { amount }),
        (0u64..1000).prop_map(|gold| SurvivorAction::GrantBonus { gold }),
    ]
}

proptest! {
    // Two replicas committing the same operations with the same seeds agree
    // on every digest and end in the same state, whatever the operations.
    #[test]
    fn replicas_agree_on_any_committed_sequence(
        actions in proptest::collection::vec(arb_action(), 1..40),
        tick_every in 1usize..5,
    ) {
        let mut left = Survivor::new(survivor_entity(1));
        let mut right = left.clone();
        let mut op_seq = 0u64;

        for (index, action) in actions.iter().enumerate() {
            let mut cx_left = Xxh3Context::seeded(op_seq);
            let mut cx_right = Xxh3Context::seeded(op_seq);
            let verdict_left = apply_committed(action, &mut left, &mut cx_left);
            let verdict_right = apply_committed(action, &mut right, &mut cx_right);
            prop_assert_eq!(&verdict_left, &verdict_right);
            if verdict_left.is_success() {
                prop_assert_eq!(cx_left.digest(), cx_right.digest());
                op_seq += 1;
            }

            if index % tick_every == 0 {
                let mut cx_left = Xxh3Context::seeded(op_seq);
                let mut cx_right = Xxh3Context::seeded(op_seq);
                apply_tick(&mut left, &mut cx_left);
                apply_tick(&mut right, &mut cx_right);
                prop_assert_eq!(cx_left.digest(), cx_right.digest());
                op_seq += 1;
            }
        }
        prop_assert_eq!(left, right);
    }

    // Divergence is never silent: replicas in different states disagree on
    // the digest of the next committed state.
    #[test]
    fn diverged_replicas_disagree_on_the_next_digest(extra_gold in 1u64..1000) {
        let mut left = Survivor::new(survivor_entity(1));
        let mut right = left.clone();
        right.gold += extra_gold;

        let action = SurvivorAction::GrantBonus { gold: 1 };
        let mut cx_left = Xxh3Context::seeded(0);
        let mut cx_right = Xxh3Context::seeded(0);
        apply_committed(&action, &mut left, &mut cx_left);
        apply_committed(&action, &mut right, &mut cx_right);
        prop_assert_ne!(cx_left.digest(), cx_right.digest());
    }
}
