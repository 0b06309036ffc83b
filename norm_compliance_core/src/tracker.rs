//! Per-norm instance tracking.
//!
//! One `NormTracker` owns every instance of one norm. Events are fed strictly
//! in log order; instances of different norms never interact, so norms can be
//! tracked one after another or on separate threads with the same result.

use std::collections::BTreeSet;

use log::debug;

use crate::cfg::{EndOfLogPolicy, EngineCfg};
use crate::event::{Event, EventLog};
use crate::matcher::{matches, Bindings};
use crate::norm::{Deadline, Modality, Norm};
use crate::roles::{same_role, RoleDirectory};
use crate::state::{Cause, NormInstance, Outcome, Resolution, Verdict};

pub struct NormTracker<'a> {
    norm: &'a Norm,
    cfg: &'a EngineCfg,
    roles: &'a RoleDirectory,
    pending: Vec<NormInstance>,
    closed_scopes: BTreeSet<String>,
    created: u64,
    resolved: Vec<Verdict>,
}

impl<'a> NormTracker<'a> {
    pub fn new(norm: &'a Norm, cfg: &'a EngineCfg, roles: &'a RoleDirectory) -> Self {
        Self {
            norm,
            cfg,
            roles,
            pending: Vec::new(),
            closed_scopes: BTreeSet::new(),
            created: 0,
            resolved: Vec::new(),
        }
    }

    pub fn pending(&self) -> &[NormInstance] {
        &self.pending
    }

    pub fn resolved(&self) -> &[Verdict] {
        &self.resolved
    }

    /// Advance every pending instance on `event`, then consider it as a trigger.
    ///
    /// Resolution runs first, so an event that both fulfills an instance and
    /// matches the trigger resolves the old instance before opening a new one.
    pub fn observe(&mut self, event: &Event) {
        let pending = std::mem::take(&mut self.pending);
        for inst in pending {
            match self.step(&inst, event) {
                Some(res) => self.settle(inst, res),
                None => self.pending.push(inst),
            }
        }

        self.close_scope(event);

        if self.is_triggered_by(event) {
            self.open(event);
        }
    }

    /// Resolve everything still pending at end of log.
    pub fn finish(mut self, last: Option<&Event>) -> Vec<Verdict> {
        let pending = std::mem::take(&mut self.pending);
        for inst in pending {
            // A fixed deadline still bounds the window when the log ends first.
            let at = inst
                .deadline_ts
                .unwrap_or_else(|| last.map_or(inst.trigger_ts, |e| e.timestamp));
            let (outcome, cause) = match self.norm.modality {
                Modality::Obligation => match self.cfg.end_of_log {
                    EndOfLogPolicy::Violate => (Outcome::Violated, Cause::EndOfLog),
                    EndOfLogPolicy::Expire => (Outcome::Expired, Cause::EndOfLog),
                },
                Modality::Prohibition => (Outcome::Fulfilled, Cause::EndOfLog),
                // Permissions resolve on trigger and are never pending.
                Modality::Permission => (Outcome::Permitted, Cause::PermissionGranted),
            };
            self.settle(inst, Resolution::timeout(outcome, cause, at, last));
        }
        self.resolved
    }

    fn settle(&mut self, inst: NormInstance, res: Resolution<'_>) {
        let verdict = inst.resolve(res);
        debug!(
            "norm {} instance {} resolved {:?} ({:?})",
            verdict.norm_id, verdict.instance_id, verdict.outcome, verdict.cause
        );
        self.resolved.push(verdict);
    }

    /// Decide whether `event` resolves `inst`.
    ///
    /// Checks run in a fixed order: fixed deadline passed, exception, target,
    /// deadline condition, scope end. Clause matches only count for events that
    /// agree with every declared binding of the instance.
    ///
    /// An obligation only advances on events strictly later in time than its
    /// trigger. A prohibition's window opens right after the trigger in log
    /// order, so a forbidden action in the same millisecond still violates.
    ///
    /// Exceptions close prohibitions as well as obligations: a matching
    /// exception ends the prohibition window as an excused `Fulfilled`.
    /// Permissions resolve on their trigger and never reach this point.
    fn step<'e>(&self, inst: &NormInstance, event: &'e Event) -> Option<Resolution<'e>> {
        let norm = self.norm;
        let after_trigger = match norm.modality {
            Modality::Prohibition => event.order_key() > (inst.trigger_ts, inst.trigger_seq),
            Modality::Obligation | Modality::Permission => event.timestamp > inst.trigger_ts,
        };
        if !after_trigger {
            return None;
        }
        let b = &inst.bindings;

        if let Some(deadline) = inst.deadline_ts {
            if event.timestamp > deadline {
                return match norm.modality {
                    Modality::Obligation => Some(Resolution::timeout(
                        Outcome::Violated,
                        Cause::DeadlinePassed,
                        deadline,
                        Some(event),
                    )),
                    Modality::Prohibition => Some(Resolution::timeout(
                        Outcome::Fulfilled,
                        Cause::DeadlinePassed,
                        deadline,
                        Some(event),
                    )),
                    Modality::Permission => None,
                };
            }
        }

        if !norm.agrees(event, b) {
            return None;
        }

        if norm.exceptions.iter().any(|c| matches(c, event, b)) {
            return match norm.modality {
                Modality::Obligation | Modality::Prohibition => Some(Resolution::by_event(
                    Outcome::Fulfilled,
                    Cause::ExceptionMatched,
                    event,
                )),
                Modality::Permission => None,
            };
        }

        if let Some(target) = &norm.target {
            if matches(target, event, b) {
                return match norm.modality {
                    Modality::Obligation => Some(Resolution::by_event(
                        Outcome::Fulfilled,
                        Cause::TargetMatched,
                        event,
                    )),
                    Modality::Prohibition => Some(Resolution::by_event(
                        Outcome::Violated,
                        Cause::TargetMatched,
                        event,
                    )),
                    Modality::Permission => None,
                };
            }
        }

        if let Some(Deadline::Until(cond)) = &norm.deadline {
            if matches(cond, event, b) {
                return match norm.modality {
                    Modality::Obligation => Some(Resolution::by_event(
                        Outcome::Violated,
                        Cause::DeadlineCondition,
                        event,
                    )),
                    Modality::Prohibition => Some(Resolution::by_event(
                        Outcome::Fulfilled,
                        Cause::DeadlineCondition,
                        event,
                    )),
                    Modality::Permission => None,
                };
            }
        }

        if let Some(scope_end) = &norm.scope_end {
            if matches(scope_end, event, b) {
                return Some(Resolution::by_event(
                    Outcome::Expired,
                    Cause::ScopeEnded,
                    event,
                ));
            }
        }

        None
    }

    /// Record a scope closure: `event` matches `scope_end` under bindings taken from itself.
    ///
    /// Only norms with declared bindings have cases to close. For an unbound
    /// norm a scope end just expires whatever is pending.
    fn close_scope(&mut self, event: &Event) {
        if self.norm.bind.is_empty() {
            return;
        }
        let Some(scope_end) = &self.norm.scope_end else {
            return;
        };
        let Some(own) = self.norm.capture(event) else {
            return;
        };
        if matches(scope_end, event, &own) {
            let key = self.norm.scope_key(&own);
            if self.closed_scopes.insert(key) {
                debug!("norm {} scope closed by {}", self.norm.id, event.id);
            }
        }
    }

    fn is_triggered_by(&self, event: &Event) -> bool {
        if !matches(&self.norm.trigger, event, &Bindings::new()) {
            return false;
        }
        match (&self.norm.role, self.cfg.role_gating) {
            (Some(role), true) => self
                .roles
                .role_of(event)
                .is_some_and(|r| same_role(r, role)),
            _ => true,
        }
    }

    fn open(&mut self, event: &Event) {
        let norm = self.norm;
        let Some(bindings) = norm.capture(event) else {
            debug!(
                "norm {}: trigger {} lacks a bound field, no instance",
                norm.id, event.id
            );
            return;
        };
        if self.closed_scopes.contains(&norm.scope_key(&bindings)) {
            debug!("norm {}: trigger {} falls in a closed scope", norm.id, event.id);
            return;
        }
        if self.cfg.coalesce_duplicate_triggers
            && self.pending.iter().any(|p| p.bindings.same_values(&bindings))
        {
            debug!("norm {}: trigger {} coalesced", norm.id, event.id);
            return;
        }

        self.created += 1;
        let inst = NormInstance {
            instance_id: format!("{}#{}", norm.id, self.created),
            norm_id: norm.id.clone(),
            creation_seq: self.created,
            trigger_event_id: event.id.clone(),
            trigger_ts: event.timestamp,
            trigger_seq: event.seq,
            bindings,
            deadline_ts: norm.fixed_deadline(event.timestamp),
        };
        debug!("norm {} instance {} opened by {}", norm.id, inst.instance_id, event.id);

        match norm.modality {
            Modality::Permission => self.settle(
                inst,
                Resolution::by_event(Outcome::Permitted, Cause::PermissionGranted, event),
            ),
            Modality::Obligation | Modality::Prohibition => self.pending.push(inst),
        }
    }
}

/// Run one norm over the whole log.
pub fn track_norm(norm: &Norm, log: &EventLog, cfg: &EngineCfg, roles: &RoleDirectory) -> Vec<Verdict> {
    let mut tracker = NormTracker::new(norm, cfg, roles);
    for ev in log.events() {
        tracker.observe(ev);
    }
    tracker.finish(log.last())
}
