use std::collections::VecDeque;
use std::time::Instant;

use log::warn;

use tandem_shared::{
    apply_committed, apply_tick, decode, encode, execute, ActionPolicy, ClientPacket, ClientSeq,
    Digest, EntityId, ExecuteMode, LossCategory, Model, ModelAction, NetworkProbe, NoopContext,
    OpReceiver, OpSeq, PacketReceiver, PacketSender, Schema, ServerPacket, SessionLossReason,
    SessionToken, Tick, Timer, TransportError, Xxh3Context, loss_codes,
};

use crate::{
    client_config::ClientConfig,
    connection::{transition, ConnectionState, Lifecycle, SessionInput},
    error::{ConnectError, SubmitError},
    events::ClientEvent,
};

/// Ticket for one in-flight submission, echoed back in the confirmation or
/// rejection event
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PendingHandle(pub u64);

struct PendingAction<A> {
    handle: PendingHandle,
    client_seq: ClientSeq,
    action: A,
    submitted_at: Instant,
}

/// A committed operation as the server announced it, waiting for its turn
/// in the single authoritative order
enum ServerOp<A> {
    /// Commit of an action this client submitted; the action itself is in
    /// the pending queue
    Local {
        client_seq: ClientSeq,
        digest: Option<Digest>,
    },
    /// Commit of a server-originated action
    Pushed { action: A, digest: Option<Digest> },
    /// Commit of a scheduled tick
    Tick { tick: Tick, digest: Option<Digest> },
}

struct Transport {
    sender: Box<dyn PacketSender>,
    receiver: Box<dyn PacketReceiver>,
}

/// The client endpoint.
///
/// Owns the session state machine, a confirmed model that replays the
/// server's committed operations in order, and a predicted model that runs
/// ahead by the still-pending local submissions. Poll-driven: the host
/// calls `connect` / `submit` / `update` / `disconnect` and drains the
/// events `update` returns. The client never spawns threads, reads the
/// clock, or calls back into the host.
pub struct Client<M: Model, A: ModelAction<M>> {
    config: ClientConfig,
    schema: Schema,
    entity: EntityId,
    state: ConnectionState,
    transport: Option<Transport>,
    probe: Option<Box<dyn NetworkProbe>>,
    confirmed: Option<M>,
    predicted: Option<M>,
    pending: VecDeque<PendingAction<A>>,
    ops: Option<OpReceiver<ServerOp<A>>>,
    events: Vec<ClientEvent<A>>,
    resume: Option<SessionToken>,
    next_client_seq: ClientSeq,
    next_handle: u64,
    heartbeat: Option<Timer>,
    last_heard: Option<Instant>,
    handshake_started: Option<Instant>,
}

impl<M: Model, A: ModelAction<M>> Client<M, A> {
    pub fn new(config: ClientConfig, schema: Schema, entity: EntityId) -> Self {
        Self {
            config,
            schema,
            entity,
            state: ConnectionState::NotConnected,
            transport: None,
            probe: None,
            confirmed: None,
            predicted: None,
            pending: VecDeque::new(),
            ops: None,
            events: Vec::new(),
            resume: None,
            next_client_seq: 1,
            next_handle: 1,
            heartbeat: None,
            last_heard: None,
            handshake_started: None,
        }
    }

    /// Attaches a network probe whose findings ride along in network-shaped
    /// loss reasons
    pub fn with_probe(mut self, probe: Box<dyn NetworkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.state.token()
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Last state confirmed by the authority. Survives session loss so the
    /// host can keep rendering while it reconnects.
    pub fn confirmed(&self) -> Option<&M> {
        self.confirmed.as_ref()
    }

    /// Confirmed state plus the still-pending local submissions
    pub fn predicted(&self) -> Option<&M> {
        self.predicted.as_ref()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Begins a connection attempt over the given transport pair. Valid
    /// when idle or after a loss; a client runs at most one attempt at a
    /// time.
    pub fn connect(
        &mut self,
        sender: Box<dyn PacketSender>,
        receiver: Box<dyn PacketReceiver>,
        now: Instant,
    ) -> Result<(), ConnectError> {
        let input = match self.state {
            ConnectionState::NotConnected => SessionInput::Connect,
            ConnectionState::SessionLost { .. } | ConnectionState::TerminalError { .. } => {
                SessionInput::Reconnect
            }
            ConnectionState::Connecting | ConnectionState::HandshakeInProgress => {
                return Err(ConnectError::AlreadyConnecting);
            }
            ConnectionState::SessionActive { .. } => return Err(ConnectError::AlreadyActive),
        };
        self.apply_input(input);
        self.transport = Some(Transport { sender, receiver });
        self.handshake_started = Some(now);

        let hello: ClientPacket<A> = ClientPacket::Hello {
            protocol_version: self.config.protocol_version,
            schema_version: self.schema.range().current,
            entity: self.entity,
            resume: self.resume,
        };
        match self.send_packet(&hello, now) {
            Ok(()) => self.apply_input(SessionInput::HelloSent),
            Err(err) => self.fail(SessionLossReason::new(
                LossCategory::CouldNotConnect,
                loss_codes::TRANSPORT_SEND_FAILED,
                format!("hello send failed: {err}"),
            )),
        }
        Ok(())
    }

    /// Ends whatever is in progress. During a handshake this is a clean
    /// cancellation back to `NotConnected`; during an active session it is
    /// an explicit-stop loss. The confirmed model stays readable.
    pub fn disconnect(&mut self, now: Instant) {
        if self.state.is_active() {
            let bye: ClientPacket<A> = ClientPacket::Bye;
            if let Err(err) = self.send_packet(&bye, now) {
                warn!("bye not delivered: {err}");
            }
        }
        self.apply_input(SessionInput::Stop);
    }

    /// Submits an action: validates it against the predicted model, sends
    /// it to the authority, and applies it speculatively. The returned
    /// handle reappears in the eventual `ActionConfirmed` or
    /// `ActionRejected` event.
    pub fn submit(&mut self, action: A, now: Instant) -> Result<PendingHandle, SubmitError> {
        if !self.state.is_active() {
            return Err(SubmitError::NoSession);
        }
        match action.policy() {
            ActionPolicy::ServerOnly => return Err(SubmitError::ServerOnly),
            ActionPolicy::Development if !self.config.allow_development_actions => {
                return Err(SubmitError::DevelopmentDisabled);
            }
            _ => {}
        }
        {
            let Some(predicted) = self.predicted.as_ref() else {
                return Err(SubmitError::NoSession);
            };
            if let Err(reason) = action.validate(predicted) {
                return Err(SubmitError::WouldReject { reason });
            }
        }

        let client_seq = self.next_client_seq;
        let packet = ClientPacket::SubmitAction {
            client_seq,
            action: action.clone(),
        };
        if let Err(err) = self.send_packet(&packet, now) {
            self.fail(SessionLossReason::new(
                LossCategory::ConnectionLost,
                loss_codes::TRANSPORT_SEND_FAILED,
                format!("submit send failed: {err}"),
            ));
            return Err(SubmitError::SendFailed(err));
        }
        self.next_client_seq += 1;

        // Speculative commit; the confirmed replay happens when the server
        // announces the commit in order.
        if let Some(predicted) = self.predicted.as_mut() {
            let _ = execute(&action, predicted, ExecuteMode::Commit, &mut NoopContext);
        }
        let handle = PendingHandle(self.next_handle);
        self.next_handle += 1;
        self.pending.push_back(PendingAction {
            handle,
            client_seq,
            action,
            submitted_at: now,
        });
        Ok(handle)
    }

    /// Drains the transport, advances timers, and returns everything that
    /// happened. Call once per host tick with the host's clock.
    pub fn update(&mut self, now: Instant) -> Vec<ClientEvent<A>> {
        self.pump(now);
        self.check_timers(now);
        std::mem::take(&mut self.events)
    }

    // Transition plumbing

    fn apply_input(&mut self, input: SessionInput) {
        let previous_token = self.state.token();
        let (next, effect) = transition(&self.state, &input);
        self.state = next;
        match effect {
            Lifecycle::None => {}
            Lifecycle::SessionStarted { token } => {
                self.events.push(ClientEvent::SessionStarted { token });
            }
            Lifecycle::FailedToStartSession { reason } => {
                self.events
                    .push(ClientEvent::FailedToStartSession { reason });
            }
            Lifecycle::SessionLost { reason } => {
                self.events.push(ClientEvent::SessionLost { reason });
            }
        }
        // Anything that is not connecting or connected releases the
        // connection's resources. The models stay.
        if !self.state.is_active()
            && !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::HandshakeInProgress
            )
        {
            self.transport = None;
            self.ops = None;
            self.heartbeat = None;
            self.handshake_started = None;
            self.last_heard = None;
            self.pending.clear();
            if let Some(token) = previous_token {
                // Kept only as a resume hint in the next hello; the token
                // itself no longer proves anything.
                self.resume = Some(token);
            }
        }
    }

    fn fail(&mut self, reason: SessionLossReason) {
        let reason = self.probed(reason);
        self.apply_input(SessionInput::ConnectionFailed { reason });
    }

    /// Lets the network probe refine a network-shaped reason
    fn probed(&mut self, mut reason: SessionLossReason) -> SessionLossReason {
        if !matches!(
            reason.category,
            LossCategory::CouldNotConnect | LossCategory::ConnectionLost
        ) {
            return reason;
        }
        let Some(probe) = self.probe.as_mut() else {
            return reason;
        };
        if !probe.internet_reachable() {
            reason.category = LossCategory::NoInternet;
        }
        if let Some(line) = probe.diagnose() {
            reason = reason.with_diagnostics(line);
        }
        reason
    }

    // Inbound path

    fn pump(&mut self, now: Instant) {
        loop {
            if self.transport.is_none() {
                return;
            }
            let received = match self.transport.as_mut() {
                Some(transport) => transport.receiver.receive(),
                None => return,
            };
            match received {
                Ok(Some(bytes)) => self.process_packet(&bytes, now),
                Ok(None) => return,
                Err(err) => {
                    let category = if self.state.is_active() {
                        LossCategory::ConnectionLost
                    } else {
                        LossCategory::CouldNotConnect
                    };
                    self.fail(SessionLossReason::new(
                        category,
                        loss_codes::TRANSPORT_RECEIVE_FAILED,
                        format!("receive failed: {err}"),
                    ));
                    return;
                }
            }
        }
    }

    fn process_packet(&mut self, bytes: &[u8], now: Instant) {
        let packet = match decode::<ServerPacket<A>>(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                self.fail(SessionLossReason::new(
                    LossCategory::InternalError,
                    loss_codes::MALFORMED_PACKET,
                    format!("malformed server packet: {err}"),
                ));
                return;
            }
        };
        self.last_heard = Some(now);

        match packet {
            ServerPacket::Grant {
                token,
                snapshot,
                op_seq_base,
                tick: _,
            } => {
                if self.state.is_active() {
                    warn!("duplicate grant ignored");
                    return;
                }
                let model = match decode::<M>(snapshot.as_slice()) {
                    Ok(model) => model,
                    Err(err) => {
                        self.fail(SessionLossReason::new(
                            LossCategory::InternalError,
                            loss_codes::MALFORMED_PACKET,
                            format!("snapshot failed to decode: {err}"),
                        ));
                        return;
                    }
                };
                self.confirmed = Some(model.clone());
                self.predicted = Some(model);
                self.ops = Some(OpReceiver::new(op_seq_base));
                self.heartbeat = Some(Timer::new(self.config.heartbeat_interval, now));
                self.handshake_started = None;
                self.apply_input(SessionInput::GrantReceived { token });
            }
            ServerPacket::Refuse { reason } => {
                self.apply_input(SessionInput::Refused { reason });
            }
            ServerPacket::Confirm {
                op_seq,
                client_seq,
                digest,
            } => {
                self.enqueue_op(op_seq, ServerOp::Local { client_seq, digest });
            }
            ServerPacket::Reject { client_seq, reason } => {
                match self
                    .pending
                    .iter()
                    .position(|pending| pending.client_seq == client_seq)
                {
                    Some(position) => {
                        if let Some(pending) = self.pending.remove(position) {
                            self.events.push(ClientEvent::ActionRejected {
                                handle: pending.handle,
                                reason,
                            });
                            self.rebuild_predicted();
                        }
                    }
                    None => warn!("rejection for unknown submission {client_seq}"),
                }
            }
            ServerPacket::Pushed {
                op_seq,
                action,
                digest,
            } => {
                self.enqueue_op(op_seq, ServerOp::Pushed { action, digest });
            }
            ServerPacket::TickCheckpoint {
                op_seq,
                tick,
                digest,
            } => {
                self.enqueue_op(op_seq, ServerOp::Tick { tick, digest });
            }
            ServerPacket::Heartbeat => {}
            ServerPacket::Bye { reason } => {
                self.apply_input(SessionInput::ServerBye { reason });
            }
        }
    }

    fn enqueue_op(&mut self, op_seq: OpSeq, op: ServerOp<A>) {
        let Some(ops) = self.ops.as_mut() else {
            warn!("op {op_seq} with no session, dropped");
            return;
        };
        ops.insert(op_seq, op);
        self.drain_ops();
    }

    /// Applies every consecutive committed operation to the confirmed
    /// model, in the authority's order and no other
    fn drain_ops(&mut self) {
        loop {
            let Some(ops) = self.ops.as_mut() else { return };
            let Some((op_seq, op)) = ops.pop_ready() else {
                return;
            };
            match op {
                ServerOp::Local { client_seq, digest } => {
                    let Some(position) = self
                        .pending
                        .iter()
                        .position(|pending| pending.client_seq == client_seq)
                    else {
                        self.fail(SessionLossReason::new(
                            LossCategory::InternalError,
                            loss_codes::MALFORMED_PACKET,
                            format!("confirm for unknown submission {client_seq}"),
                        ));
                        continue;
                    };
                    let Some(pending) = self.pending.remove(position) else {
                        continue;
                    };
                    let Some(confirmed) = self.confirmed.as_mut() else {
                        continue;
                    };
                    let mut cx = Xxh3Context::seeded(op_seq as u64);
                    let result = apply_committed(&pending.action, confirmed, &mut cx);
                    if !result.is_success() {
                        // The authority committed it, so a local rejection
                        // means the models already disagree.
                        self.fail(SessionLossReason::new(
                            LossCategory::InternalError,
                            loss_codes::CONFIRMED_REPLAY_REJECTED,
                            format!("confirmed action failed to replay at op {op_seq}"),
                        ));
                        continue;
                    }
                    self.events.push(ClientEvent::ActionConfirmed {
                        handle: pending.handle,
                        op_seq,
                    });
                    self.verify_digest(op_seq, digest, cx.digest());
                }
                ServerOp::Pushed { action, digest } => {
                    let Some(confirmed) = self.confirmed.as_mut() else {
                        continue;
                    };
                    let mut cx = Xxh3Context::seeded(op_seq as u64);
                    let result = apply_committed(&action, confirmed, &mut cx);
                    if !result.is_success() {
                        self.fail(SessionLossReason::new(
                            LossCategory::InternalError,
                            loss_codes::CONFIRMED_REPLAY_REJECTED,
                            format!("pushed action failed to replay at op {op_seq}"),
                        ));
                        continue;
                    }
                    self.events.push(ClientEvent::ServerAction { op_seq, action });
                    self.verify_digest(op_seq, digest, cx.digest());
                }
                ServerOp::Tick { tick, digest } => {
                    let Some(confirmed) = self.confirmed.as_mut() else {
                        continue;
                    };
                    let mut cx = Xxh3Context::seeded(op_seq as u64);
                    apply_tick(confirmed, &mut cx);
                    self.events.push(ClientEvent::TickApplied { tick });
                    self.verify_digest(op_seq, digest, cx.digest());
                }
            }
            if !self.state.is_active() {
                return;
            }
            self.rebuild_predicted();
        }
    }

    /// Compares the digest the server reported for an operation with the
    /// one computed here. A mismatch is a desync: reported once, never
    /// retried, and the session is lost right after.
    fn verify_digest(&mut self, op_seq: OpSeq, reported: Option<Digest>, computed: Digest) {
        if !self.config.verify_checksums {
            return;
        }
        let Some(reported) = reported else { return };
        if reported == computed {
            return;
        }
        self.events.push(ClientEvent::Desync {
            op_seq,
            reported,
            computed,
        });
        self.fail(SessionLossReason::new(
            LossCategory::Desync,
            loss_codes::DIGEST_MISMATCH,
            format!("op {op_seq}: server reported {reported:#018x}, computed {computed:#018x}"),
        ));
    }

    /// Predicted = confirmed plus a replay of the pending queue. A pending
    /// action that no longer validates is skipped here but stays in flight;
    /// the authority's verdict on it is still outstanding.
    fn rebuild_predicted(&mut self) {
        let Some(confirmed) = self.confirmed.as_ref() else {
            return;
        };
        let mut predicted = confirmed.clone();
        for pending in &self.pending {
            let _ = execute(
                &pending.action,
                &mut predicted,
                ExecuteMode::Commit,
                &mut NoopContext,
            );
        }
        self.predicted = Some(predicted);
    }

    // Timeouts and keepalive

    fn check_timers(&mut self, now: Instant) {
        let handshaking = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::HandshakeInProgress
        );
        if handshaking {
            if let Some(started) = self.handshake_started {
                if now.duration_since(started) >= self.config.handshake_timeout {
                    self.fail(SessionLossReason::new(
                        LossCategory::CouldNotConnect,
                        loss_codes::HANDSHAKE_TIMEOUT,
                        "handshake timed out",
                    ));
                }
            }
            return;
        }
        if !self.state.is_active() {
            return;
        }
        if let Some(heard) = self.last_heard {
            if now.duration_since(heard) >= self.config.session_timeout {
                self.fail(SessionLossReason::new(
                    LossCategory::ConnectionLost,
                    loss_codes::SESSION_TIMEOUT,
                    "server went silent",
                ));
                return;
            }
        }
        if let Some(pending) = self.pending.front() {
            if now.duration_since(pending.submitted_at) >= self.config.confirm_timeout {
                let client_seq = pending.client_seq;
                self.fail(SessionLossReason::new(
                    LossCategory::ConnectionLost,
                    loss_codes::CONFIRM_TIMEOUT,
                    format!("submission {client_seq} never resolved"),
                ));
                return;
            }
        }
        let should_beat = match self.heartbeat.as_ref() {
            Some(timer) => timer.ringing(now),
            None => false,
        };
        if should_beat {
            let heartbeat: ClientPacket<A> = ClientPacket::Heartbeat;
            if let Err(err) = self.send_packet(&heartbeat, now) {
                self.fail(SessionLossReason::new(
                    LossCategory::ConnectionLost,
                    loss_codes::TRANSPORT_SEND_FAILED,
                    format!("heartbeat send failed: {err}"),
                ));
            }
        }
    }

    // Outbound path

    fn send_packet(
        &mut self,
        packet: &ClientPacket<A>,
        now: Instant,
    ) -> Result<(), TransportError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        transport.sender.send(&encode(packet))?;
        if let Some(timer) = self.heartbeat.as_mut() {
            timer.reset(now);
        }
        Ok(())
    }
}
