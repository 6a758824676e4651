//! Checksum verification and the desync loss path.

use tandem_client::{Client, ClientConfig, ClientEvent, ConnectionState};
use tandem_shared::{
    decode, encode, Blob, ClientPacket, LossCategory, Model, PacketReceiver, PacketSender,
    ServerPacket, SessionToken, loss_codes,
};

use tandem_test::helpers::{init_logging, SimClock};
use tandem_test::local_pipe::duplex;
use tandem_test::test_protocol::{schema, survivor_entity, Survivor, SurvivorAction};

type TestClient = Client<Survivor, SurvivorAction>;

/// Connects a client to a hand-driven authority and returns the peer's
/// transport pair once the session is up
fn granted_client(
    config: ClientConfig,
    clock: &SimClock,
) -> (TestClient, Box<dyn PacketSender>, Box<dyn PacketReceiver>) {
    let mut client = Client::new(config, schema(), survivor_entity(7));
    let (client_end, server_end, _severance) = duplex();
    let (client_tx, client_rx) = client_end.split();
    client.connect(client_tx, client_rx, clock.now()).unwrap();

    let (mut tx, rx) = server_end.split();
    let grant: ServerPacket<SurvivorAction> = ServerPacket::Grant {
        token: SessionToken(31),
        snapshot: Blob::new(encode(&Survivor::new(survivor_entity(7)))),
        op_seq_base: 0,
        tick: 0,
    };
    tx.send(&encode(&grant)).unwrap();
    let events = client.update(clock.now());
    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::SessionStarted { .. })));
    (client, tx, rx)
}

fn submitted_seq(rx: &mut Box<dyn PacketReceiver>) -> u32 {
    while let Some(bytes) = rx.receive().unwrap() {
        let packet: ClientPacket<SurvivorAction> = decode(&bytes).unwrap();
        if let ClientPacket::SubmitAction { client_seq, .. } = packet {
            return client_seq;
        }
    }
    panic!("no submission crossed the wire");
}

#[test]
fn tampered_digest_is_a_desync_reported_exactly_once() {
    init_logging();
    let clock = SimClock::new();
    let (mut client, mut tx, mut rx) = granted_client(ClientConfig::default(), &clock);

    client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();
    let client_seq = submitted_seq(&mut rx);

    let confirm: ServerPacket<SurvivorAction> = ServerPacket::Confirm {
        op_seq: 0,
        client_seq,
        digest: Some(0xBAD0_BAD0_BAD0_BAD0),
    };
    tx.send(&encode(&confirm)).unwrap();
    let events = client.update(clock.now());

    let desyncs: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, ClientEvent::Desync { op_seq: 0, .. }))
        .collect();
    assert_eq!(desyncs.len(), 1);
    assert!(events.iter().any(|event| matches!(
        event,
        ClientEvent::SessionLost { reason }
            if reason.category == LossCategory::Desync
                && reason.technical_code == loss_codes::DIGEST_MISMATCH
                && reason.auto_reconnect()
    )));
    assert!(matches!(client.state(), ConnectionState::SessionLost { .. }));

    // Reconnecting is the recovery path; there is no retry of the session
    let events = client.update(clock.now());
    assert!(events.is_empty());
}

#[test]
fn absent_digest_verifies_nothing() {
    init_logging();
    let clock = SimClock::new();
    let (mut client, mut tx, mut rx) = granted_client(ClientConfig::default(), &clock);

    client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();
    let client_seq = submitted_seq(&mut rx);

    let confirm: ServerPacket<SurvivorAction> = ServerPacket::Confirm {
        op_seq: 0,
        client_seq,
        digest: None,
    };
    tx.send(&encode(&confirm)).unwrap();
    let events = client.update(clock.now());

    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::ActionConfirmed { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ClientEvent::Desync { .. })));
    assert!(client.state().is_active());
}

#[test]
fn verification_can_be_switched_off() {
    init_logging();
    let clock = SimClock::new();
    let config = ClientConfig {
        verify_checksums: false,
        ..ClientConfig::default()
    };
    let (mut client, mut tx, mut rx) = granted_client(config, &clock);

    client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();
    let client_seq = submitted_seq(&mut rx);

    let confirm: ServerPacket<SurvivorAction> = ServerPacket::Confirm {
        op_seq: 0,
        client_seq,
        digest: Some(0xBAD0_BAD0_BAD0_BAD0),
    };
    tx.send(&encode(&confirm)).unwrap();
    let events = client.update(clock.now());

    assert!(!events
        .iter()
        .any(|event| matches!(event, ClientEvent::Desync { .. })));
    assert!(client.state().is_active());
    assert_eq!(client.confirmed().unwrap().gold, 40);
}
