//! Submission, confirmation, server pushes, ticks, and the policy boundary.

use tandem_client::{Client, ClientConfig, ClientEvent, SubmitError};
use tandem_server::{Server, ServerConfig, ServerEvent};
use tandem_shared::{
    decode, encode, ClientPacket, MemoryStore, RejectReason, ServerPacket,
};

use tandem_test::helpers::{
    establish, init_logging, settle, SimClock, TestClient, TestServer,
};
use tandem_test::local_pipe::duplex;
use tandem_test::test_protocol::{schema, survivor_entity, SurvivorAction};

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
fn submit_confirm_round_trip() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    let handle = client
        .submit(SurvivorAction::Spend { amount: 30 }, clock.now())
        .unwrap();
    assert_eq!(client.pending_count(), 1);

    let (client_events, server_events) = settle(&mut client, &mut server, &mut clock);
    assert!(client_events.iter().any(|event| matches!(
        event,
        ClientEvent::ActionConfirmed { handle: h, op_seq: 0 } if *h == handle
    )));
    assert!(!client_events
        .iter()
        .any(|event| matches!(event, ClientEvent::Desync { .. })));
    assert!(server_events.iter().any(|event| matches!(
        event,
        ServerEvent::ActionCommitted { op_seq: 0, .. }
    )));

    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.confirmed().unwrap().gold, 20);
    assert_eq!(client.predicted(), client.confirmed());
    assert_eq!(server.model(survivor_entity(7)).unwrap().gold, 20);
}

#[test]
fn pushed_action_reaches_the_client() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    let op_seq = server
        .push_action(
            survivor_entity(7),
            SurvivorAction::GrantBonus { gold: 100 },
            clock.now(),
        )
        .unwrap();
    assert_eq!(op_seq, 0);

    let (client_events, _) = settle(&mut client, &mut server, &mut clock);
    assert!(client_events.iter().any(|event| matches!(
        event,
        ClientEvent::ServerAction {
            op_seq: 0,
            action: SurvivorAction::GrantBonus { gold: 100 },
        }
    )));
    assert_eq!(client.confirmed().unwrap().gold, 150);
}

#[test]
fn tick_checkpoints_apply_in_order() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    client
        .submit(SurvivorAction::Gather { item: "wood".to_string() }, clock.now())
        .unwrap();
    server.tick(clock.now());
    server.tick(clock.now());

    let (client_events, _) = settle(&mut client, &mut server, &mut clock);
    let ticks: Vec<_> = client_events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::TickApplied { tick } => Some(*tick),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![1, 2]);
    assert!(!client_events
        .iter()
        .any(|event| matches!(event, ClientEvent::Desync { .. })));
    assert_eq!(client.confirmed(), client.predicted());
    assert_eq!(
        client.confirmed().unwrap(),
        server.model(survivor_entity(7)).unwrap()
    );
}

#[test]
fn policy_is_enforced_locally() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    assert!(matches!(
        client.submit(SurvivorAction::GrantBonus { gold: 1 }, clock.now()),
        Err(SubmitError::ServerOnly)
    ));
    assert!(matches!(
        client.submit(SurvivorAction::CheatGold { amount: 1 }, clock.now()),
        Err(SubmitError::DevelopmentDisabled)
    ));
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn development_actions_work_when_both_ends_allow_them() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = Server::new(
        ServerConfig {
            allow_development_actions: true,
            ..ServerConfig::default()
        },
        schema(),
        Box::new(MemoryStore::new()),
    );
    let mut client = Client::new(
        ClientConfig {
            allow_development_actions: true,
            ..ClientConfig::default()
        },
        schema(),
        survivor_entity(7),
    );
    establish(&mut client, &mut server, &mut clock);

    client
        .submit(SurvivorAction::CheatGold { amount: 500 }, clock.now())
        .unwrap();
    let (client_events, _) = settle(&mut client, &mut server, &mut clock);
    assert!(client_events
        .iter()
        .any(|event| matches!(event, ClientEvent::ActionConfirmed { .. })));
    assert_eq!(client.confirmed().unwrap().gold, 550);
}

#[test]
fn invalid_action_never_leaves_the_client() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    let result = client.submit(SurvivorAction::Spend { amount: 1000 }, clock.now());
    assert!(matches!(
        result,
        Err(SubmitError::WouldReject {
            reason: RejectReason::InvalidState { .. }
        })
    ));
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.predicted().unwrap().gold, 50);
}

// A hand-driven client that skips the local checks, standing in for a
// hacked or badly out-of-date peer.
#[test]
fn forged_server_only_submission_is_rejected_at_the_boundary() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();

    let (peer_end, server_end, _severance) = duplex();
    let (mut peer_tx, mut peer_rx) = peer_end.split();
    let (server_tx, server_rx) = server_end.split();
    server.accept(server_tx, server_rx, clock.now());

    let hello: ClientPacket<SurvivorAction> = ClientPacket::Hello {
        protocol_version: 1,
        schema_version: schema().range().current,
        entity: survivor_entity(9),
        resume: None,
    };
    peer_tx.send(&encode(&hello)).unwrap();
    server.update(clock.now());

    let forged: ClientPacket<SurvivorAction> = ClientPacket::SubmitAction {
        client_seq: 1,
        action: SurvivorAction::GrantBonus { gold: 9999 },
    };
    peer_tx.send(&encode(&forged)).unwrap();
    let server_events = server.update(clock.now());

    assert!(server_events.iter().any(|event| matches!(
        event,
        ServerEvent::PolicyViolation { action: "GrantBonus", .. }
    )));
    assert_eq!(server.model(survivor_entity(9)).unwrap().gold, 50);

    // The peer got a grant, then the policy rejection
    let mut rejects = Vec::new();
    while let Some(bytes) = peer_rx.receive().unwrap() {
        let packet: ServerPacket<SurvivorAction> = decode(&bytes).unwrap();
        if let ServerPacket::Reject { client_seq, reason } = packet {
            rejects.push((client_seq, reason));
        }
    }
    assert_eq!(rejects, vec![(1, RejectReason::PolicyForbids)]);
}

#[test]
fn stale_overdraft_is_rejected_by_validation() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();

    let (peer_end, server_end, _severance) = duplex();
    let (mut peer_tx, mut peer_rx) = peer_end.split();
    let (server_tx, server_rx) = server_end.split();
    server.accept(server_tx, server_rx, clock.now());

    let hello: ClientPacket<SurvivorAction> = ClientPacket::Hello {
        protocol_version: 1,
        schema_version: schema().range().current,
        entity: survivor_entity(9),
        resume: None,
    };
    peer_tx.send(&encode(&hello)).unwrap();
    let overdraft: ClientPacket<SurvivorAction> = ClientPacket::SubmitAction {
        client_seq: 1,
        action: SurvivorAction::Spend { amount: 1000 },
    };
    peer_tx.send(&encode(&overdraft)).unwrap();
    let server_events = server.update(clock.now());

    assert!(server_events.iter().any(|event| matches!(
        event,
        ServerEvent::ActionRejected {
            reason: RejectReason::InvalidState { .. },
            ..
        }
    )));
    assert_eq!(server.model(survivor_entity(9)).unwrap().gold, 50);

    let mut saw_reject = false;
    while let Some(bytes) = peer_rx.receive().unwrap() {
        if matches!(
            decode::<ServerPacket<SurvivorAction>>(&bytes).unwrap(),
            ServerPacket::Reject { client_seq: 1, .. }
        ) {
            saw_reject = true;
        }
    }
    assert!(saw_reject);
}
