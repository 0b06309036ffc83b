use serde::{Deserialize, Serialize};

use crate::event::{Event, Millis};
use crate::matcher::Bindings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Fulfilled,
    Violated,
    Expired,
    Permitted,
}

/// What moved an instance out of `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    TargetMatched,
    ExceptionMatched,
    DeadlinePassed,
    DeadlineCondition,
    ScopeEnded,
    EndOfLog,
    PermissionGranted,
}

/// A pending norm instance.
///
/// Owned by the tracker of its norm. Resolving consumes it, so an instance
/// can produce at most one `Verdict`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormInstance {
    pub instance_id: String,
    pub norm_id: String,
    /// Per-norm creation counter.
    pub creation_seq: u64,
    pub trigger_event_id: String,
    pub trigger_ts: Millis,
    pub trigger_seq: u64,
    pub bindings: Bindings,
    pub deadline_ts: Option<Millis>,
}

/// How an instance resolves.
#[derive(Clone, Copy, Debug)]
pub struct Resolution<'e> {
    pub outcome: Outcome,
    pub cause: Cause,
    /// Event that resolved the instance, if one did.
    pub event: Option<&'e Event>,
    pub at: Millis,
    /// Event that showed a deadline had passed, or the last event of the log.
    pub witness: Option<&'e Event>,
}

impl<'e> Resolution<'e> {
    pub fn by_event(outcome: Outcome, cause: Cause, event: &'e Event) -> Self {
        Self {
            outcome,
            cause,
            event: Some(event),
            at: event.timestamp,
            witness: None,
        }
    }

    pub fn timeout(outcome: Outcome, cause: Cause, at: Millis, witness: Option<&'e Event>) -> Self {
        Self {
            outcome,
            cause,
            event: None,
            at,
            witness,
        }
    }
}

impl NormInstance {
    pub fn resolve(self, r: Resolution<'_>) -> Verdict {
        let resolved_at = r.at.max(self.trigger_ts);
        Verdict {
            instance_id: self.instance_id,
            norm_id: self.norm_id,
            outcome: r.outcome,
            cause: r.cause,
            excused: r.cause == Cause::ExceptionMatched,
            trigger_event_id: self.trigger_event_id,
            trigger_ts: self.trigger_ts,
            trigger_seq: self.trigger_seq,
            creation_seq: self.creation_seq,
            resolving_event_id: r.event.map(|e| e.id.clone()),
            resolving_seq: r.event.map(|e| e.seq),
            witness_event_id: r.witness.map(|e| e.id.clone()),
            window: [self.trigger_ts, resolved_at],
            bindings: self.bindings,
        }
    }
}

/// Final outcome of one instance. Immutable.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub instance_id: String,
    pub norm_id: String,
    pub outcome: Outcome,
    pub cause: Cause,
    /// Fulfilled through an exception rather than the target.
    pub excused: bool,
    pub trigger_event_id: String,
    pub trigger_ts: Millis,
    pub trigger_seq: u64,
    pub creation_seq: u64,
    pub resolving_event_id: Option<String>,
    pub resolving_seq: Option<u64>,
    pub witness_event_id: Option<String>,
    /// `[trigger_ts, resolution_ts]`
    pub window: [Millis; 2],
    pub bindings: Bindings,
}

impl Verdict {
    pub fn resolved_at(&self) -> Millis {
        self.window[1]
    }
}
