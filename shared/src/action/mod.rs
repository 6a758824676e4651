// The two-phase action pipeline. Every state change to a model happens
// through an action: validate against the current state, then, only on the
// authority's say-so, apply. Both endpoints run the exact same code here,
// which is what makes client prediction and checksum comparison possible.

use tandem_wire::{encode, read_member, read_members, write_member, ByteReader, ByteWriter, Wire, WireError, WireKind};

use crate::{
    checksum::ChecksumContext,
    entity::EntityId,
    named::Named,
};

pub mod op_receiver;
pub use op_receiver::OpReceiver;

/// Step name folded into the checksum after every committed operation
const STEP_MODEL_STATE: &str = "model-state";
/// Step name opening every committed tick
const STEP_TICK: &str = "tick";

/// A synchronized game state.
///
/// Determinism contract: `tick` and every action applied to the model must
/// compute identical results on every platform given identical inputs. In
/// practice that means integer arithmetic and deterministic iteration
/// (`BTreeMap` over `HashMap`) for anything that feeds the checksum.
pub trait Model: Wire + Clone {
    /// Fresh state for an entity with no persisted model
    fn new(entity: EntityId) -> Self;

    fn entity_id(&self) -> EntityId;

    /// One scheduled time step
    fn tick(&mut self, cx: &mut dyn ChecksumContext);
}

/// Who is allowed to issue an action
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionPolicy {
    /// Clients may submit it; the server may also originate it
    ClientIssuable,
    /// Only the server may originate it
    ServerOnly,
    /// Client-issuable, but only on servers with development actions enabled
    Development,
}

/// Why an action was not committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// A validation precondition failed against the current model
    InvalidState { detail: String },
    /// The action's policy forbids it from this origin
    PolicyForbids,
    /// A rejection code this build does not know about (newer peer)
    Other { code: u32 },
}

impl RejectReason {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }
}

// Reject reasons travel inside Reject packets. Codes are stable; a decoder
// meeting a code from a newer revision preserves it rather than erroring.
impl Wire for RejectReason {
    fn kind() -> WireKind {
        WireKind::Struct
    }

    fn ser(&self, writer: &mut ByteWriter) {
        let code: u32 = match self {
            RejectReason::InvalidState { .. } => 1,
            RejectReason::PolicyForbids => 2,
            RejectReason::Other { code } => *code,
        };
        write_member(writer, 1, &code);
        if let RejectReason::InvalidState { detail } = self {
            write_member(writer, 2, detail);
        }
        writer.write_end();
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let mut code: Option<u32> = None;
        let mut detail: Option<String> = None;
        read_members(reader, |r, tag, kind| {
            match tag {
                1 => code = Some(read_member(r, kind)?),
                2 => detail = Some(read_member(r, kind)?),
                _ => r.skip_kind(kind)?,
            }
            Ok(())
        })?;
        Ok(match code.unwrap_or_default() {
            1 => RejectReason::InvalidState {
                detail: detail.unwrap_or_default(),
            },
            2 => RejectReason::PolicyForbids,
            code => RejectReason::Other { code },
        })
    }
}

/// Outcome of executing one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    Rejected(RejectReason),
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success)
    }
}

/// Which phase of the two-phase contract to run
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecuteMode {
    /// Validate only; the model is untouched
    DryRun,
    /// Validate, then apply
    Commit,
}

/// One state transition of a model.
///
/// Implementations are data: closed enums whose variants carry the action's
/// parameters. Randomness, clocks and I/O are all forbidden in both phases;
/// anything the action needs must be a field of it or of the model.
pub trait ModelAction<M: Model>: Wire + Named + Clone {
    /// Phase one: precondition check. The shared borrow makes mutation a
    /// compile error, so a dry run can never dirty the model.
    fn validate(&self, model: &M) -> Result<(), RejectReason>;

    /// Phase two: state mutation, reached only after `validate` passed.
    /// Intermediate results worth cross-checking go into `cx`.
    fn apply(&self, model: &mut M, cx: &mut dyn ChecksumContext);

    fn policy(&self) -> ActionPolicy;
}

/// Runs one action against a model under the two-phase contract. A dry run
/// returns what a commit would have returned, without touching the model.
pub fn execute<M: Model, A: ModelAction<M>>(
    action: &A,
    model: &mut M,
    mode: ExecuteMode,
    cx: &mut dyn ChecksumContext,
) -> ActionResult {
    if let Err(reason) = action.validate(model) {
        return ActionResult::Rejected(reason);
    }
    if mode == ExecuteMode::DryRun {
        return ActionResult::Success;
    }
    cx.step(action.name());
    action.apply(model, cx);
    ActionResult::Success
}

/// Commits one authority-confirmed action and folds the resulting model
/// state into the checksum. Client and server both commit through here, so
/// both hash the identical step sequence.
pub fn apply_committed<M: Model, A: ModelAction<M>>(
    action: &A,
    model: &mut M,
    cx: &mut dyn ChecksumContext,
) -> ActionResult {
    let result = execute(action, model, ExecuteMode::Commit, cx);
    if result.is_success() {
        cx.step_value(STEP_MODEL_STATE, &encode(model));
    }
    result
}

/// Commits one scheduled tick, likewise folding the post-tick state into
/// the checksum
pub fn apply_tick<M: Model>(model: &mut M, cx: &mut dyn ChecksumContext) {
    cx.step(STEP_TICK);
    model.tick(cx);
    cx.step_value(STEP_MODEL_STATE, &encode(model));
}

// Tests
