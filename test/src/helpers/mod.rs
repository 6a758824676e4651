//! Scaffolding shared by the integration tests: a simulated clock, a store
//! both server instances can share, and a pump that advances a connected
//! client/server pair together.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tandem_client::{Client, ClientEvent};
use tandem_server::{Server, ServerEvent};
use tandem_shared::{EntityId, MemoryStore, ModelStore, PersistError, SchemaVersion, StoredModel};

use crate::local_pipe::{duplex, Severance};
use crate::test_protocol::{Survivor, SurvivorAction};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A clock the tests control. Endpoints only ever see the instants handed
/// to them, so time moves exactly as far as a test says.
pub struct SimClock {
    now: Instant,
}

impl SimClock {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) -> Instant {
        self.now += by;
        self.now
    }
}

/// A memory store that survives the server owning it, for tests that
/// restart the server or run two of them
#[derive(Clone, Default)]
pub struct SharedStore(Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for SharedStore {
    fn save(
        &mut self,
        entity: EntityId,
        bytes: &[u8],
        schema_version: SchemaVersion,
    ) -> Result<(), PersistError> {
        match self.0.lock() {
            Ok(mut store) => store.save(entity, bytes, schema_version),
            Err(_) => Err(PersistError::SaveFailed {
                entity,
                detail: "store lock poisoned".to_string(),
            }),
        }
    }

    fn load(&mut self, entity: EntityId) -> Result<Option<StoredModel>, PersistError> {
        match self.0.lock() {
            Ok(mut store) => store.load(entity),
            Err(_) => Err(PersistError::LoadFailed {
                entity,
                detail: "store lock poisoned".to_string(),
            }),
        }
    }
}

pub type TestClient = Client<Survivor, SurvivorAction>;
pub type TestServer = Server<Survivor, SurvivorAction>;
pub type TestClientEvent = ClientEvent<SurvivorAction>;
pub type TestServerEvent = ServerEvent<SurvivorAction>;

/// Advances both endpoints by `rounds` steps of `step` each, returning
/// every event either side produced. Server first, so a packet the client
/// sent last round is answered before the client polls again.
pub fn pump(
    client: &mut TestClient,
    server: &mut TestServer,
    clock: &mut SimClock,
    rounds: usize,
    step: Duration,
) -> (Vec<TestClientEvent>, Vec<TestServerEvent>) {
    let mut client_events = Vec::new();
    let mut server_events = Vec::new();
    for _ in 0..rounds {
        let now = clock.advance(step);
        server_events.extend(server.update(now));
        client_events.extend(client.update(now));
    }
    (client_events, server_events)
}

/// Wires a client to a server over a fresh pipe and runs the handshake to
/// completion, panicking if no session comes up
pub fn establish(
    client: &mut TestClient,
    server: &mut TestServer,
    clock: &mut SimClock,
) -> Severance {
    let (client_end, server_end, severance) = duplex();
    let (client_tx, client_rx) = client_end.split();
    let (server_tx, server_rx) = server_end.split();
    server.accept(server_tx, server_rx, clock.now());
    client
        .connect(client_tx, client_rx, clock.now())
        .expect("connect");
    let (client_events, _) = settle(client, server, clock);
    assert!(
        client_events
            .iter()
            .any(|event| matches!(event, ClientEvent::SessionStarted { .. })),
        "handshake never completed: {client_events:?}"
    );
    severance
}

/// A few quick rounds, enough for any in-flight packet to land
pub fn settle(
    client: &mut TestClient,
    server: &mut TestServer,
    clock: &mut SimClock,
) -> (Vec<TestClientEvent>, Vec<TestServerEvent>) {
    pump(client, server, clock, 4, Duration::from_millis(10))
}
