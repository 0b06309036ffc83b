//! Loading the normalized event and norm streams.
//!
//! Event records that cannot be used are dropped with a `warn!` and a
//! `DroppedEvent` entry; the rest of the log is still loaded. Norm documents
//! are all-or-nothing: the first malformed norm fails the load.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime};
use log::warn;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::cfg::{LoadCfg, TemporalMode};
use crate::error::{DropReason, DroppedEvent, EngineError};
use crate::event::{Event, EventLog, Millis, Value};
use crate::norm::{NormSet, NormSpec};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// One record of the normalized event stream, before validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    /// Explicit position, used in sequence mode.
    #[serde(default)]
    pub sequence: Option<i64>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Epoch milliseconds from an integer, a numeric string, RFC 3339, or a naive
/// `YYYY-MM-DD[ T]HH:MM:SS[.fff]` time read as UTC.
pub fn parse_timestamp(raw: &RawTimestamp) -> Result<Millis, DropReason> {
    let text = match raw {
        RawTimestamp::Millis(ms) => return Ok(*ms),
        RawTimestamp::Text(s) => s.trim(),
    };
    if let Ok(ms) = text.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| DropReason::BadTimestamp(text.to_string()))
}

/// A decoded record, or why it could not be decoded.
type Decoded = Result<RawEvent, (Option<String>, String)>;

fn resolve_mode(records: &[Decoded], cfg: &LoadCfg) -> TemporalMode {
    match cfg.temporal {
        TemporalMode::Auto => {
            if records.is_empty() {
                return TemporalMode::Sequence;
            }
            let stamped = records
                .iter()
                .filter(|r| matches!(r, Ok(raw) if raw.timestamp.is_some()))
                .count();
            let share = stamped as f32 / records.len() as f32;
            if share >= cfg.timestamp_threshold {
                TemporalMode::Timestamp
            } else {
                TemporalMode::Sequence
            }
        }
        mode => mode,
    }
}

fn required(field: Option<String>, name: &'static str) -> Result<String, DropReason> {
    match field {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(DropReason::MissingField(name)),
    }
}

struct Loader {
    mode: TemporalMode,
    seen: BTreeSet<String>,
    events: Vec<Event>,
    dropped: Vec<DroppedEvent>,
}

impl Loader {
    fn drop_record(&mut self, index: usize, id: Option<String>, reason: DropReason) {
        warn!(
            "dropping event #{index} ({}): {reason}",
            id.as_deref().unwrap_or("no id")
        );
        self.dropped.push(DroppedEvent { index, id, reason });
    }

    fn accept(&mut self, index: usize, raw: RawEvent) {
        let id_hint = raw.id.clone();
        if let Err(reason) = self.try_accept(index, raw) {
            self.drop_record(index, id_hint, reason);
        }
    }

    fn try_accept(&mut self, index: usize, raw: RawEvent) -> Result<(), DropReason> {
        let id = required(raw.id, "id")?;
        let actor = required(raw.actor, "actor")?;
        let action = required(raw.action, "action")?;

        let timestamp = match self.mode {
            TemporalMode::Sequence => raw.sequence.unwrap_or(index as i64),
            _ => match &raw.timestamp {
                Some(ts) => parse_timestamp(ts)?,
                None => return Err(DropReason::MissingField("timestamp")),
            },
        };

        if self.seen.contains(&id) {
            return Err(DropReason::DuplicateId);
        }

        let mut attributes = BTreeMap::new();
        for (key, value) in raw.attributes {
            match Value::from_json(&value) {
                Some(v) => {
                    attributes.insert(key, v);
                }
                None => warn!("event {id}: attribute `{key}` is not a scalar, ignored"),
            }
        }

        self.seen.insert(id.clone());
        self.events.push(Event {
            id,
            seq: index as u64,
            timestamp,
            actor,
            action,
            attributes,
        });
        Ok(())
    }
}

fn load_decoded(records: Vec<Decoded>, cfg: &LoadCfg) -> EventLog {
    let mode = resolve_mode(&records, cfg);
    let mut loader = Loader {
        mode,
        seen: BTreeSet::new(),
        events: Vec::with_capacity(records.len()),
        dropped: Vec::new(),
    };
    for (index, record) in records.into_iter().enumerate() {
        match record {
            Ok(raw) => loader.accept(index, raw),
            Err((id, msg)) => loader.drop_record(index, id, DropReason::Undecodable(msg)),
        }
    }

    let mut events = loader.events;
    events.sort_by_key(Event::order_key);
    EventLog {
        events,
        temporal_mode: mode,
        dropped: loader.dropped,
    }
}

/// Top-level array, or the array under one of `keys`.
fn records_of(doc: serde_json::Value, keys: &[&str]) -> Result<Vec<serde_json::Value>, EngineError> {
    match doc {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => {
            for key in keys {
                if let Some(serde_json::Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(EngineError::Json(serde_json::Error::custom(format!(
                "expected an array or an object with one of {keys:?}"
            ))))
        }
        _ => Err(EngineError::Json(serde_json::Error::custom(
            "expected an array of records",
        ))),
    }
}

/// Records of an event document: a bare array, or the array under `events`
/// or `entries`.
pub fn event_records(doc: &str) -> Result<Vec<serde_json::Value>, EngineError> {
    records_of(serde_json::from_str(doc)?, &["events", "entries"])
}

impl EventLog {
    /// Validate, sequence and order raw records. Never fails; unusable records
    /// end up in `dropped()`.
    pub fn load(records: Vec<RawEvent>, cfg: &LoadCfg) -> EventLog {
        load_decoded(records.into_iter().map(Ok).collect(), cfg)
    }

    /// Load a JSON document: an array of events, or `{"events": [...]}` /
    /// `{"entries": [...]}`. Fails only when the document itself is not JSON of
    /// that shape.
    pub fn load_json(doc: &str, cfg: &LoadCfg) -> Result<EventLog, EngineError> {
        let records = event_records(doc)?
            .into_iter()
            .map(|v| {
                let id = v.get("id").and_then(|id| id.as_str()).map(str::to_string);
                serde_json::from_value::<RawEvent>(v).map_err(|e| (id, e.to_string()))
            })
            .collect();
        Ok(load_decoded(records, cfg))
    }
}

/// Decode a norm document: an array of norms or `{"norms": [...]}`.
///
/// Norms are decoded one at a time so a bad condition (an invalid regex, an
/// unknown operator) is reported against the norm that carries it.
pub fn norms_from_json(doc: &str) -> Result<Vec<NormSpec>, EngineError> {
    let doc: serde_json::Value = serde_json::from_str(doc)?;
    records_of(doc, &["norms"])?
        .into_iter()
        .enumerate()
        .map(|(idx, v)| {
            let id = v
                .get("id")
                .or_else(|| v.get("norm_id"))
                .and_then(|id| id.as_str())
                .map_or_else(|| format!("#{idx}"), str::to_string);
            serde_json::from_value::<NormSpec>(v).map_err(|e| EngineError::malformed(id, e.to_string()))
        })
        .collect()
}

impl NormSet {
    pub fn from_json(doc: &str) -> Result<NormSet, EngineError> {
        NormSet::load(norms_from_json(doc)?)
    }
}
