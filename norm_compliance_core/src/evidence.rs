//! Evidence index over the event log and per-verdict evidence selection.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::event::{Event, EventLog, Millis, Value};
use crate::matcher::{matches, Bindings, Condition, Field};
use crate::norm::{Modality, Norm, ACTOR_BINDING};
use crate::state::Verdict;

/// Inclusive time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Millis,
    pub to: Millis,
}

impl TimeWindow {
    pub const ALL: TimeWindow = TimeWindow {
        from: Millis::MIN,
        to: Millis::MAX,
    };

    pub fn between(from: Millis, to: Millis) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, ts: Millis) -> bool {
        ts >= self.from && ts <= self.to
    }
}

/// Predicate for evidence lookups. Every set field must hold.
#[derive(Clone, Debug, Default)]
pub struct EvidenceQuery<'q> {
    pub actor: Option<&'q str>,
    pub action: Option<&'q str>,
    /// Attribute must be present and equal.
    pub attributes: Vec<(&'q str, &'q Value)>,
    pub condition: Option<(&'q Condition, &'q Bindings)>,
}

impl<'q> EvidenceQuery<'q> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor: &'q str) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn action(mut self, action: &'q str) -> Self {
        self.action = Some(action);
        self
    }

    pub fn attribute(mut self, key: &'q str, value: &'q Value) -> Self {
        self.attributes.push((key, value));
        self
    }

    pub fn condition(mut self, cond: &'q Condition, bindings: &'q Bindings) -> Self {
        self.condition = Some((cond, bindings));
        self
    }

    /// Events that agree with an instance's declared bindings, or with its
    /// trigger actor when the norm declares none.
    pub fn sharing(norm: &'q Norm, bindings: &'q Bindings) -> Self {
        let mut q = Self::default();
        if norm.bind.is_empty() {
            q.actor = bindings.get(ACTOR_BINDING).and_then(Value::as_str);
            return q;
        }
        for b in &norm.bind {
            let Some(v) = bindings.get(&b.name) else {
                continue;
            };
            match &b.field {
                Field::Actor => q.actor = v.as_str(),
                Field::Action => q.action = v.as_str(),
                Field::Attribute(key) => q.attributes.push((key.as_str(), v)),
            }
        }
        q
    }

    pub fn accepts(&self, ev: &Event) -> bool {
        if self.actor.is_some_and(|a| a != ev.actor) {
            return false;
        }
        if self.action.is_some_and(|a| a != ev.action) {
            return false;
        }
        let attrs_ok = self
            .attributes
            .iter()
            .all(|(k, v)| ev.attr(k).is_some_and(|have| have.loosely_eq(v)));
        if !attrs_ok {
            return false;
        }
        match self.condition {
            Some((cond, bindings)) => matches(cond, ev, bindings),
            None => true,
        }
    }
}

/// Read-only index over one `EventLog`, built once and shared by every tracker.
///
/// Posting lists hold log positions; since the log is time ordered they are
/// time ordered too.
#[derive(Debug)]
pub struct EvidenceIndex<'l> {
    events: &'l [Event],
    by_id: HashMap<&'l str, usize>,
    by_actor_action: HashMap<&'l str, HashMap<&'l str, Vec<usize>>>,
    by_actor: HashMap<&'l str, Vec<usize>>,
    by_attribute: HashMap<&'l str, Vec<usize>>,
}

impl<'l> EvidenceIndex<'l> {
    pub fn build(log: &'l EventLog) -> Self {
        let events = log.events();
        let mut by_id = HashMap::with_capacity(events.len());
        let mut by_actor_action: HashMap<&str, HashMap<&str, Vec<usize>>> = HashMap::new();
        let mut by_actor: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_attribute: HashMap<&str, Vec<usize>> = HashMap::new();

        for (pos, ev) in events.iter().enumerate() {
            by_id.insert(ev.id.as_str(), pos);
            by_actor_action
                .entry(ev.actor.as_str())
                .or_default()
                .entry(ev.action.as_str())
                .or_default()
                .push(pos);
            by_actor.entry(ev.actor.as_str()).or_default().push(pos);
            for key in ev.attributes.keys() {
                by_attribute.entry(key.as_str()).or_default().push(pos);
            }
        }

        Self {
            events,
            by_id,
            by_actor_action,
            by_actor,
            by_attribute,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event(&self, id: &str) -> Option<&'l Event> {
        self.by_id.get(id).map(|&pos| &self.events[pos])
    }

    /// Smallest posting list that covers every candidate for `q`.
    fn candidates(&self, q: &EvidenceQuery<'_>) -> Cow<'_, [usize]> {
        match (q.actor, q.action) {
            (Some(actor), Some(action)) => Cow::Borrowed(
                self.by_actor_action
                    .get(actor)
                    .and_then(|m| m.get(action))
                    .map_or(&[][..], |v| v.as_slice()),
            ),
            (Some(actor), None) => Cow::Borrowed(
                self.by_actor
                    .get(actor)
                    .map_or(&[][..], |v| v.as_slice()),
            ),
            _ => {
                let smallest = q
                    .attributes
                    .iter()
                    .map(|(k, _)| self.by_attribute.get::<str>(k).map_or(&[][..], |v| v.as_slice()))
                    .min_by_key(|list| list.len());
                match smallest {
                    Some(list) => Cow::Borrowed(list),
                    None => Cow::Owned((0..self.events.len()).collect()),
                }
            }
        }
    }

    /// Events matching `q` inside `window`, in log order.
    pub fn query(&self, q: &EvidenceQuery<'_>, window: TimeWindow) -> Vec<&'l Event> {
        let cand = self.candidates(q);
        let lo = cand.partition_point(|&p| self.events[p].timestamp < window.from);
        let hi = cand.partition_point(|&p| self.events[p].timestamp <= window.to);
        if lo >= hi {
            return Vec::new();
        }
        let events = self.events;
        cand[lo..hi]
            .iter()
            .map(|&p| &events[p])
            .filter(|ev| q.accepts(ev))
            .collect()
    }

    /// Up to `limit` events matching `q`, closest in time to `anchor` first.
    ///
    /// Walks outward from the anchor position; on equal distance the earlier
    /// event wins.
    pub fn nearest(
        &self,
        q: &EvidenceQuery<'_>,
        anchor: (Millis, u64),
        limit: usize,
        exclude: &[&str],
    ) -> Vec<&'l Event> {
        let events = self.events;
        let cand = self.candidates(q);
        let split = cand.partition_point(|&p| events[p].order_key() < anchor);
        let (mut left, mut right) = (split, split);
        let mut out = Vec::new();

        while out.len() < limit {
            let take_left = match (left > 0, right < cand.len()) {
                (true, true) => {
                    let l = &events[cand[left - 1]];
                    let r = &events[cand[right]];
                    l.timestamp.abs_diff(anchor.0) <= r.timestamp.abs_diff(anchor.0)
                }
                (true, false) => true,
                (false, true) => false,
                (false, false) => break,
            };
            let ev = if take_left {
                left -= 1;
                &events[cand[left]]
            } else {
                right += 1;
                &events[cand[right - 1]]
            };
            if q.accepts(ev) && !exclude.contains(&ev.id.as_str()) {
                out.push(ev);
            }
        }
        out
    }
}

/// Minimal evidence for one verdict, as event ids.
///
/// The resolving event, the deadline witness and the trigger come first; the
/// rest of the `cap` is filled with the closest events sharing the instance
/// bindings (for permissions, with uses of the permission). The result is
/// ordered by distance to the resolution time, ties by ingestion order.
pub fn select_evidence(
    index: &EvidenceIndex<'_>,
    norm: &Norm,
    verdict: &Verdict,
    cap: usize,
) -> Vec<String> {
    if cap == 0 {
        return Vec::new();
    }
    let anchor_ts = verdict.resolved_at();
    let anchor = (anchor_ts, verdict.resolving_seq.unwrap_or(u64::MAX));

    let mut chosen: Vec<&Event> = Vec::new();
    let required = [
        verdict.resolving_event_id.as_deref(),
        verdict.witness_event_id.as_deref(),
        Some(verdict.trigger_event_id.as_str()),
    ];
    for id in required.into_iter().flatten() {
        if let Some(ev) = index.event(id) {
            if !chosen.iter().any(|c| c.id == ev.id) {
                chosen.push(ev);
            }
        }
    }
    chosen.truncate(cap);

    if chosen.len() < cap && norm.modality == Modality::Permission {
        if let Some(target) = &norm.target {
            let q = EvidenceQuery::new().condition(target, &verdict.bindings);
            let window = TimeWindow::between(verdict.trigger_ts.saturating_add(1), Millis::MAX);
            let uses: Vec<&Event> = index
                .query(&q, window)
                .into_iter()
                .filter(|ev| !chosen.iter().any(|c| c.id == ev.id))
                .take(cap - chosen.len())
                .collect();
            chosen.extend(uses);
        }
    }

    if chosen.len() < cap {
        let q = EvidenceQuery::sharing(norm, &verdict.bindings);
        let exclude: Vec<&str> = chosen.iter().map(|e| e.id.as_str()).collect();
        let more = index.nearest(&q, anchor, cap - chosen.len(), &exclude);
        chosen.extend(more);
    }

    chosen.sort_by_key(|e| (e.timestamp.abs_diff(anchor_ts), e.seq));
    chosen.into_iter().map(|e| e.id.clone()).collect()
}
