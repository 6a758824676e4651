//! The predicted model: speculative application, ordered replay, rollback.

use tandem_client::{Client, ClientConfig, ClientEvent};
use tandem_server::{Server, ServerConfig};
use tandem_shared::{
    apply_committed, apply_tick, decode, encode, Blob, ClientPacket, MemoryStore, Model,
    PacketReceiver, PacketSender, RejectReason, ServerPacket, SessionToken, Xxh3Context,
};

use tandem_test::helpers::{establish, init_logging, settle, SimClock, TestClient, TestServer};
use tandem_test::local_pipe::{duplex, PipeEnd};
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
fn prediction_runs_ahead_of_confirmation() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();

    // Before any server round trip the split is visible
    assert_eq!(client.predicted().unwrap().gold, 40);
    assert_eq!(client.confirmed().unwrap().gold, 50);

    settle(&mut client, &mut server, &mut clock);
    assert_eq!(client.confirmed().unwrap().gold, 40);
    assert_eq!(client.predicted(), client.confirmed());
}

#[test]
fn pending_queue_replays_in_submission_order() {
    init_logging();
    let mut clock = SimClock::new();
    let mut server = new_server();
    let mut client = new_client();
    establish(&mut client, &mut server, &mut clock);

    client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();
    client
        .submit(SurvivorAction::Gather { item: "flint".to_string() }, clock.now())
        .unwrap();
    client
        .submit(SurvivorAction::Move { dx: 1, dy: 0 }, clock.now())
        .unwrap();
    assert_eq!(client.pending_count(), 3);

    let predicted = client.predicted().unwrap();
    assert_eq!(predicted.gold, 42);
    assert_eq!(predicted.inventory.get("flint"), Some(&1));
    assert_eq!(predicted.x, 1);

    let (client_events, _) = settle(&mut client, &mut server, &mut clock);
    let confirmed_ops: Vec<_> = client_events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::ActionConfirmed { op_seq, .. } => Some(*op_seq),
            _ => None,
        })
        .collect();
    assert_eq!(confirmed_ops, vec![0, 1, 2]);
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.confirmed(), client.predicted());
    assert_eq!(
        client.confirmed().unwrap(),
        server.model(survivor_entity(7)).unwrap()
    );
}

/// A hand-driven server: grants a session, then answers however the test
/// needs it to
struct FakeServer {
    tx: Box<dyn PacketSender>,
    rx: Box<dyn PacketReceiver>,
}

impl FakeServer {
    fn grant(end: PipeEnd, model: &Survivor) -> Self {
        let (tx, rx) = end.split();
        let mut fake = Self { tx, rx };
        let grant: ServerPacket<SurvivorAction> = ServerPacket::Grant {
            token: SessionToken(77),
            snapshot: Blob::new(encode(model)),
            op_seq_base: 0,
            tick: 0,
        };
        fake.send(&grant);
        fake
    }

    fn send(&mut self, packet: &ServerPacket<SurvivorAction>) {
        self.tx.send(&encode(packet)).unwrap();
    }

    fn drain(&mut self) -> Vec<ClientPacket<SurvivorAction>> {
        let mut packets = Vec::new();
        while let Some(bytes) = self.rx.receive().unwrap() {
            packets.push(decode(&bytes).unwrap());
        }
        packets
    }
}

#[test]
fn rejection_rolls_the_prediction_back() {
    init_logging();
    let mut clock = SimClock::new();
    let mut client = new_client();

    let (client_end, server_end, _severance) = duplex();
    let (client_tx, client_rx) = client_end.split();
    client.connect(client_tx, client_rx, clock.now()).unwrap();
    let mut fake = FakeServer::grant(server_end, &Survivor::new(survivor_entity(7)));
    client.update(clock.now());
    assert!(client.state().is_active());

    let handle = client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();
    assert_eq!(client.predicted().unwrap().gold, 40);
    let submitted = fake.drain();
    let client_seq = submitted
        .iter()
        .find_map(|packet| match packet {
            ClientPacket::SubmitAction { client_seq, .. } => Some(*client_seq),
            _ => None,
        })
        .expect("no submission crossed the wire");

    // The authority says no; nothing was committed
    fake.send(&ServerPacket::Reject {
        client_seq,
        reason: RejectReason::invalid("ledger divergence"),
    });
    let events = client.update(clock.now());
    assert!(events.iter().any(|event| matches!(
        event,
        ClientEvent::ActionRejected { handle: h, reason: RejectReason::InvalidState { .. } }
            if *h == handle
    )));
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.predicted().unwrap().gold, 50);
    assert_eq!(client.confirmed().unwrap().gold, 50);
}

#[test]
fn out_of_order_commits_apply_in_sequence_order() {
    init_logging();
    let mut clock = SimClock::new();
    let mut client = new_client();

    let (client_end, server_end, _severance) = duplex();
    let (client_tx, client_rx) = client_end.split();
    client.connect(client_tx, client_rx, clock.now()).unwrap();
    let model = Survivor::new(survivor_entity(7));
    let mut fake = FakeServer::grant(server_end, &model);
    client.update(clock.now());

    // The authority committed a push at op 0 and a tick at op 1, but the
    // tick's packet arrives first. Nothing applies until the gap closes.
    let mut shadow = model;
    let mut cx = Xxh3Context::seeded(0);
    apply_committed(&SurvivorAction::GrantBonus { gold: 5 }, &mut shadow, &mut cx);
    let push_digest = cx.digest();
    let mut cx = Xxh3Context::seeded(1);
    apply_tick(&mut shadow, &mut cx);
    let tick_digest = cx.digest();

    fake.send(&ServerPacket::TickCheckpoint {
        op_seq: 1,
        tick: 1,
        digest: Some(tick_digest),
    });
    let events = client.update(clock.now());
    assert!(events.is_empty(), "applied across a gap: {events:?}");
    assert_eq!(client.confirmed().unwrap().gold, 50);

    fake.send(&ServerPacket::Pushed {
        op_seq: 0,
        action: SurvivorAction::GrantBonus { gold: 5 },
        digest: Some(push_digest),
    });
    let events = client.update(clock.now());
    let kinds: Vec<&ClientEvent<SurvivorAction>> = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                ClientEvent::ServerAction { .. } | ClientEvent::TickApplied { .. }
            )
        })
        .collect();
    assert!(matches!(kinds[0], ClientEvent::ServerAction { op_seq: 0, .. }));
    assert!(matches!(kinds[1], ClientEvent::TickApplied { tick: 1 }));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ClientEvent::Desync { .. })));
    assert_eq!(client.confirmed().unwrap(), &shadow);
}

#[test]
fn still_invalid_pending_actions_are_skipped_in_the_replay() {
    init_logging();
    let mut clock = SimClock::new();
    let mut client = new_client();

    let (client_end, server_end, _severance) = duplex();
    let (client_tx, client_rx) = client_end.split();
    client.connect(client_tx, client_rx, clock.now()).unwrap();
    let mut fake = FakeServer::grant(server_end, &Survivor::new(survivor_entity(7)));
    client.update(clock.now());

    client
        .submit(SurvivorAction::Spend { amount: 40 }, clock.now())
        .unwrap();
    client
        .submit(SurvivorAction::Spend { amount: 10 }, clock.now())
        .unwrap();
    assert_eq!(client.predicted().unwrap().gold, 0);

    // The authority pushes a commit that invalidates the second pending
    // spend: gold drops before the replay runs.
    let mut shadow = Survivor::new(survivor_entity(7));
    let mut cx = Xxh3Context::seeded(0);
    apply_committed(&SurvivorAction::Spend { amount: 45 }, &mut shadow, &mut cx);
    fake.send(&ServerPacket::Pushed {
        op_seq: 0,
        action: SurvivorAction::Spend { amount: 45 },
        digest: Some(cx.digest()),
    });
    client.update(clock.now());

    // Confirmed is 5 gold; the 40-spend no longer validates and is skipped,
    // the 10-spend isn't affordable after it either way. Both stay pending;
    // the authority still owes a verdict on each.
    assert_eq!(client.confirmed().unwrap().gold, 5);
    assert_eq!(client.pending_count(), 2);
    assert_eq!(client.predicted().unwrap().gold, 5);
}
