use std::collections::{HashMap, HashSet};
use std::time::Instant;

use log::warn;

use tandem_shared::{
    apply_committed, apply_tick, decode, encode, ActionPolicy, ActionResult, Blob, ClientPacket,
    ClientSeq, Digest, EntityId, LossCategory, Model, ModelAction, ModelStore, NoopContext,
    OpSeq, PacketReceiver, PacketSender, RejectReason, Schema, SchemaVersion, ServerPacket,
    SessionLossReason, SessionToken, Timer, TransportError, Xxh3Context, loss_codes,
};

use crate::{
    error::PushError,
    events::ServerEvent,
    server_config::ServerConfig,
    session::{ClientKey, Remote, Session},
};

/// The authoritative endpoint.
///
/// Owns one model per granted session and the single total order of
/// committed operations against it. Poll-driven like the client: the host
/// calls `accept` for each transport connection it established, `update`
/// once per loop, and `tick` on its own schedule.
pub struct Server<M: Model, A: ModelAction<M>> {
    config: ServerConfig,
    schema: Schema,
    store: Box<dyn ModelStore>,
    remotes: HashMap<u64, Remote<M>>,
    next_key: u64,
    banned: HashSet<EntityId>,
    maintenance: bool,
    events: Vec<ServerEvent<A>>,
}

impl<M: Model, A: ModelAction<M>> Server<M, A> {
    pub fn new(config: ServerConfig, schema: Schema, store: Box<dyn ModelStore>) -> Self {
        Self {
            config,
            schema,
            store,
            remotes: HashMap::new(),
            next_key: 1,
            banned: HashSet::new(),
            maintenance: false,
            events: Vec::new(),
        }
    }

    /// Registers a freshly established transport connection. No session
    /// exists until its hello passes the handshake checks.
    pub fn accept(
        &mut self,
        sender: Box<dyn PacketSender>,
        receiver: Box<dyn PacketReceiver>,
        now: Instant,
    ) -> ClientKey {
        let key = self.next_key;
        self.next_key += 1;
        self.remotes.insert(
            key,
            Remote {
                sender,
                receiver,
                last_heard: now,
                heartbeat: Timer::new(self.config.heartbeat_interval, now),
                session: None,
            },
        );
        ClientKey(key)
    }

    /// While set, every handshake is refused with `ServerMaintenance`.
    /// Existing sessions carry on; kick them with `shutdown` if the
    /// maintenance needs them gone.
    pub fn set_maintenance(&mut self, maintenance: bool) {
        self.maintenance = maintenance;
    }

    pub fn maintenance(&self) -> bool {
        self.maintenance
    }

    /// Bans an entity: future handshakes are refused and any live session
    /// ends now
    pub fn ban(&mut self, entity: EntityId, now: Instant) {
        self.banned.insert(entity);
        let keys = self.keys_for(entity);
        for key in keys {
            self.close_remote(
                key,
                SessionLossReason::new(LossCategory::PlayerBanned, loss_codes::BANNED, "banned"),
                now,
            );
        }
    }

    /// Ends one session deliberately, with a bye the client can act on
    pub fn disconnect(&mut self, key: ClientKey, reason: SessionLossReason, now: Instant) {
        self.close_remote(key, reason, now);
    }

    /// Ends every session with the same reason. The maintenance-window
    /// goodbye, typically.
    pub fn shutdown(&mut self, reason: SessionLossReason, now: Instant) {
        let keys: Vec<u64> = self.remotes.keys().copied().collect();
        for key in keys {
            self.close_remote(ClientKey(key), reason.clone(), now);
        }
    }

    /// Commits a server-originated action against an entity's model and
    /// announces it to the session's client. The action policy does not
    /// apply here; the server may originate anything.
    pub fn push_action(
        &mut self,
        entity: EntityId,
        action: A,
        now: Instant,
    ) -> Result<OpSeq, PushError> {
        let Some((&raw_key, remote)) = self
            .remotes
            .iter_mut()
            .find(|(_, remote)| remote.session.as_ref().map(|s| s.entity) == Some(entity))
        else {
            return Err(PushError::NoSession { entity });
        };
        let Some(session) = remote.session.as_mut() else {
            return Err(PushError::NoSession { entity });
        };
        let (op_seq, digest) = commit_action(&self.config, session, &action)
            .map_err(|reason| PushError::Rejected { reason })?;
        let packet: ServerPacket<A> = ServerPacket::Pushed {
            op_seq,
            action: action.clone(),
            digest,
        };
        if let Err(err) = send_packet(remote, &packet, now) {
            // The silence timeout reaps this remote on the next update
            warn!("push to {entity} not delivered: {err}");
        }
        self.events.push(ServerEvent::ActionCommitted {
            key: ClientKey(raw_key),
            entity,
            op_seq,
            action,
        });
        Ok(op_seq)
    }

    /// Advances every session's model by one scheduled tick and announces
    /// the checkpoint. Call on the host's fixed cadence.
    pub fn tick(&mut self, now: Instant) {
        for remote in self.remotes.values_mut() {
            let Some(session) = remote.session.as_mut() else {
                continue;
            };
            session.tick += 1;
            let op_seq = session.next_op_seq;
            session.next_op_seq += 1;
            let digest = if self.config.compute_checksums {
                let mut cx = Xxh3Context::seeded(op_seq as u64);
                apply_tick(&mut session.model, &mut cx);
                Some(cx.digest())
            } else {
                apply_tick(&mut session.model, &mut NoopContext);
                None
            };
            let packet: ServerPacket<A> = ServerPacket::TickCheckpoint {
                op_seq,
                tick: session.tick,
                digest,
            };
            if let Err(err) = send_packet(remote, &packet, now) {
                warn!("tick checkpoint not delivered: {err}");
            }
        }
    }

    /// Drains every transport, reaps silent clients, keeps idle sessions
    /// warm, and returns everything that happened
    pub fn update(&mut self, now: Instant) -> Vec<ServerEvent<A>> {
        let keys: Vec<u64> = self.remotes.keys().copied().collect();
        for raw_key in keys {
            let Some(mut remote) = self.remotes.remove(&raw_key) else {
                continue;
            };
            if self.service_remote(ClientKey(raw_key), &mut remote, now) {
                self.remotes.insert(raw_key, remote);
            }
        }
        std::mem::take(&mut self.events)
    }

    pub fn session_count(&self) -> usize {
        self.remotes
            .values()
            .filter(|remote| remote.session.is_some())
            .count()
    }

    /// The authoritative model of an entity with a live session
    pub fn model(&self, entity: EntityId) -> Option<&M> {
        self.remotes.values().find_map(|remote| {
            remote
                .session
                .as_ref()
                .filter(|session| session.entity == entity)
                .map(|session| &session.model)
        })
    }

    pub fn token_for(&self, entity: EntityId) -> Option<SessionToken> {
        self.remotes.values().find_map(|remote| {
            remote
                .session
                .as_ref()
                .filter(|session| session.entity == entity)
                .map(|session| session.token)
        })
    }

    // Per-remote servicing; the remote is detached from the map while its
    // packets are handled, so handshake code may walk the other remotes.

    /// Returns false when the remote should be dropped from the map
    fn service_remote(&mut self, key: ClientKey, remote: &mut Remote<M>, now: Instant) -> bool {
        loop {
            match remote.receiver.receive() {
                Ok(Some(bytes)) => {
                    if !self.handle_packet(key, remote, &bytes, now) {
                        return false;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    self.end_session(
                        key,
                        remote,
                        SessionLossReason::new(
                            LossCategory::ConnectionLost,
                            loss_codes::TRANSPORT_RECEIVE_FAILED,
                            format!("receive failed: {err}"),
                        ),
                        false,
                        now,
                    );
                    return false;
                }
            }
        }
        if now.duration_since(remote.last_heard) >= self.config.session_timeout {
            self.end_session(
                key,
                remote,
                SessionLossReason::new(
                    LossCategory::ConnectionLost,
                    loss_codes::SESSION_TIMEOUT,
                    "client went silent",
                ),
                false,
                now,
            );
            return false;
        }
        if remote.session.is_some() && remote.heartbeat.ringing(now) {
            let heartbeat: ServerPacket<A> = ServerPacket::Heartbeat;
            if let Err(err) = send_packet(remote, &heartbeat, now) {
                self.end_session(
                    key,
                    remote,
                    SessionLossReason::new(
                        LossCategory::ConnectionLost,
                        loss_codes::TRANSPORT_SEND_FAILED,
                        format!("heartbeat send failed: {err}"),
                    ),
                    false,
                    now,
                );
                return false;
            }
        }
        true
    }

    fn handle_packet(
        &mut self,
        key: ClientKey,
        remote: &mut Remote<M>,
        bytes: &[u8],
        now: Instant,
    ) -> bool {
        let packet = match decode::<ClientPacket<A>>(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!("{key}: malformed packet: {err}");
                self.end_session(
                    key,
                    remote,
                    SessionLossReason::new(
                        LossCategory::InternalError,
                        loss_codes::MALFORMED_PACKET,
                        format!("malformed client packet: {err}"),
                    ),
                    true,
                    now,
                );
                return false;
            }
        };
        remote.last_heard = now;
        match packet {
            ClientPacket::Hello {
                protocol_version,
                schema_version,
                entity,
                resume,
            } => self.handle_hello(key, remote, protocol_version, schema_version, entity, resume, now),
            ClientPacket::SubmitAction { client_seq, action } => {
                self.handle_submit(key, remote, client_seq, action, now);
                true
            }
            ClientPacket::Heartbeat => true,
            ClientPacket::Bye => {
                self.end_session(
                    key,
                    remote,
                    SessionLossReason::new(
                        LossCategory::ExplicitStop,
                        loss_codes::STOPPED_BY_CALLER,
                        "client said goodbye",
                    ),
                    false,
                    now,
                );
                false
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_hello(
        &mut self,
        key: ClientKey,
        remote: &mut Remote<M>,
        protocol_version: u16,
        schema_version: SchemaVersion,
        entity: EntityId,
        resume: Option<SessionToken>,
        now: Instant,
    ) -> bool {
        if remote.session.is_some() {
            warn!("{key}: hello on an already granted session, ignored");
            return true;
        }
        let refusal = if self.maintenance {
            Some(SessionLossReason::new(
                LossCategory::ServerMaintenance,
                loss_codes::MAINTENANCE,
                "maintenance window",
            ))
        } else if protocol_version != self.config.protocol_version {
            Some(SessionLossReason::new(
                LossCategory::ClientTooOld,
                loss_codes::PROTOCOL_MISMATCH,
                format!(
                    "client speaks protocol {protocol_version}, server speaks {}",
                    self.config.protocol_version
                ),
            ))
        } else if !self.schema.range().accepts(schema_version) {
            let range = self.schema.range();
            Some(SessionLossReason::new(
                LossCategory::ClientTooOld,
                loss_codes::SCHEMA_OUT_OF_WINDOW,
                format!(
                    "client schema {schema_version} outside window {}..={}",
                    range.min, range.current
                ),
            ))
        } else if self.banned.contains(&entity) {
            Some(SessionLossReason::new(
                LossCategory::PlayerBanned,
                loss_codes::BANNED,
                "banned",
            ))
        } else {
            None
        };
        if let Some(reason) = refusal {
            return self.refuse(key, remote, entity, reason, now);
        }

        // One session per entity: a new handshake replaces any live one,
        // whether or not the client presented the old token
        self.retire_sessions_for(entity, resume, now);

        let model = match self.store.load(entity) {
            Ok(Some(stored)) => match decode::<M>(&stored.bytes) {
                Ok(model) => model,
                Err(err) => {
                    self.events.push(ServerEvent::StorageFailed {
                        entity,
                        detail: format!("stored model failed to decode: {err}"),
                    });
                    return self.refuse(
                        key,
                        remote,
                        entity,
                        SessionLossReason::new(
                            LossCategory::LocalStorageFailure,
                            loss_codes::STORAGE_LOAD_FAILED,
                            format!("stored model failed to decode: {err}"),
                        ),
                        now,
                    );
                }
            },
            Ok(None) => M::new(entity),
            Err(err) => {
                self.events.push(ServerEvent::StorageFailed {
                    entity,
                    detail: err.to_string(),
                });
                return self.refuse(
                    key,
                    remote,
                    entity,
                    SessionLossReason::new(
                        LossCategory::LocalStorageFailure,
                        loss_codes::STORAGE_LOAD_FAILED,
                        err.to_string(),
                    ),
                    now,
                );
            }
        };

        let session = Session {
            entity,
            token: SessionToken(fastrand::u64(1..)),
            model,
            next_op_seq: 0,
            tick: 0,
        };
        let grant: ServerPacket<A> = ServerPacket::Grant {
            token: session.token,
            snapshot: Blob::new(encode(&session.model)),
            op_seq_base: session.next_op_seq,
            tick: session.tick,
        };
        if let Err(err) = send_packet(remote, &grant, now) {
            warn!("{key}: grant not delivered: {err}");
            return false;
        }
        self.events.push(ServerEvent::ClientConnected {
            key,
            entity,
            token: session.token,
        });
        remote.session = Some(session);
        true
    }

    /// Sends a refusal and closes the remote. Always returns false.
    fn refuse(
        &mut self,
        key: ClientKey,
        remote: &mut Remote<M>,
        entity: EntityId,
        reason: SessionLossReason,
        now: Instant,
    ) -> bool {
        let refuse: ServerPacket<A> = ServerPacket::Refuse {
            reason: reason.clone(),
        };
        if let Err(err) = send_packet(remote, &refuse, now) {
            warn!("{key}: refusal not delivered: {err}");
        }
        self.events
            .push(ServerEvent::HandshakeRefused { key, entity, reason });
        false
    }

    fn handle_submit(
        &mut self,
        key: ClientKey,
        remote: &mut Remote<M>,
        client_seq: ClientSeq,
        action: A,
        now: Instant,
    ) {
        let Some(session) = remote.session.as_mut() else {
            warn!("{key}: submission before handshake, dropped");
            return;
        };
        let entity = session.entity;

        // The policy boundary. `apply` never sees an action its origin may
        // not issue.
        let permitted = match action.policy() {
            ActionPolicy::ClientIssuable => true,
            ActionPolicy::Development => self.config.allow_development_actions,
            ActionPolicy::ServerOnly => false,
        };
        if !permitted {
            warn!("{key}: policy violation, {} submitted {}", entity, action.name());
            self.events.push(ServerEvent::PolicyViolation {
                key,
                entity,
                action: action.name(),
            });
            let reject: ServerPacket<A> = ServerPacket::Reject {
                client_seq,
                reason: RejectReason::PolicyForbids,
            };
            if let Err(err) = send_packet(remote, &reject, now) {
                warn!("{key}: rejection not delivered: {err}");
            }
            return;
        }

        match commit_action(&self.config, session, &action) {
            Ok((op_seq, digest)) => {
                let confirm: ServerPacket<A> = ServerPacket::Confirm {
                    op_seq,
                    client_seq,
                    digest,
                };
                if let Err(err) = send_packet(remote, &confirm, now) {
                    warn!("{key}: confirmation not delivered: {err}");
                }
                self.events.push(ServerEvent::ActionCommitted {
                    key,
                    entity,
                    op_seq,
                    action,
                });
            }
            Err(reason) => {
                let reject: ServerPacket<A> = ServerPacket::Reject {
                    client_seq,
                    reason: reason.clone(),
                };
                if let Err(err) = send_packet(remote, &reject, now) {
                    warn!("{key}: rejection not delivered: {err}");
                }
                self.events
                    .push(ServerEvent::ActionRejected { key, entity, reason });
            }
        }
    }

    /// Ends a detached remote's session: optional bye, persist, event. The
    /// caller drops the remote by not reinserting it.
    fn end_session(
        &mut self,
        key: ClientKey,
        remote: &mut Remote<M>,
        reason: SessionLossReason,
        notify: bool,
        now: Instant,
    ) {
        let Some(session) = remote.session.take() else {
            return;
        };
        if notify {
            let bye: ServerPacket<A> = ServerPacket::Bye {
                reason: reason.clone(),
            };
            if let Err(err) = send_packet(remote, &bye, now) {
                warn!("{key}: bye not delivered: {err}");
            }
        }
        self.persist(&session);
        self.events.push(ServerEvent::ClientDisconnected {
            key,
            entity: session.entity,
            reason,
        });
    }

    /// Ends a session for a remote still in the map, then removes it
    fn close_remote(&mut self, key: ClientKey, reason: SessionLossReason, now: Instant) {
        let Some(mut remote) = self.remotes.remove(&key.0) else {
            return;
        };
        self.end_session(key, &mut remote, reason, true, now);
    }

    /// Replaces any live session for the entity ahead of a new grant. The
    /// resume token only affects logging; replacement happens either way.
    fn retire_sessions_for(&mut self, entity: EntityId, resume: Option<SessionToken>, now: Instant) {
        for key in self.keys_for(entity) {
            let old_token = self
                .remotes
                .get(&key.0)
                .and_then(|remote| remote.session.as_ref().map(|session| session.token));
            if resume.is_some() && resume == old_token {
                log::debug!("{key}: {entity} resumed, retiring the stale session");
            }
            self.close_remote(
                key,
                SessionLossReason::new(
                    LossCategory::ConnectionLost,
                    loss_codes::SESSION_REPLACED,
                    "session replaced by a newer connection",
                ),
                now,
            );
        }
    }

    fn keys_for(&self, entity: EntityId) -> Vec<ClientKey> {
        self.remotes
            .iter()
            .filter(|(_, remote)| {
                remote.session.as_ref().map(|session| session.entity) == Some(entity)
            })
            .map(|(&raw_key, _)| ClientKey(raw_key))
            .collect()
    }

    fn persist(&mut self, session: &Session<M>) {
        let bytes = encode(&session.model);
        if let Err(err) = self
            .store
            .save(session.entity, &bytes, self.schema.range().current)
        {
            log::error!("model save failed: {err}");
            self.events.push(ServerEvent::StorageFailed {
                entity: session.entity,
                detail: err.to_string(),
            });
        }
    }
}

/// Validate-then-commit for one action, stamping it with the session's next
/// op seq on success. A rejection consumes nothing.
fn commit_action<M: Model, A: ModelAction<M>>(
    config: &ServerConfig,
    session: &mut Session<M>,
    action: &A,
) -> Result<(OpSeq, Option<Digest>), RejectReason> {
    let op_seq = session.next_op_seq;
    let (result, digest) = if config.compute_checksums {
        let mut cx = Xxh3Context::seeded(op_seq as u64);
        let result = apply_committed(action, &mut session.model, &mut cx);
        let digest = cx.digest();
        (result, Some(digest))
    } else {
        (
            apply_committed(action, &mut session.model, &mut NoopContext),
            None,
        )
    };
    match result {
        ActionResult::Success => {
            session.next_op_seq += 1;
            Ok((op_seq, digest))
        }
        ActionResult::Rejected(reason) => Err(reason),
    }
}

fn send_packet<M, A: tandem_shared::Wire>(
    remote: &mut Remote<M>,
    packet: &ServerPacket<A>,
    now: Instant,
) -> Result<(), TransportError> {
    remote.sender.send(&encode(packet))?;
    remote.heartbeat.reset(now);
    Ok(())
}
