use serde::{Deserialize, Serialize};

pub const DEFAULT_EVIDENCE_CAP: usize = 5;

/// How event time is read from the input stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalMode {
    /// Pick `Timestamp` when enough records carry one, else `Sequence`.
    #[default]
    Auto,
    /// Epoch millis or ISO-8601 timestamps; records without one are dropped.
    Timestamp,
    /// Time is the record's `sequence` field, or its position in the input.
    Sequence,
}

/// What happens to obligations still pending when the log runs out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfLogPolicy {
    #[default]
    Violate,
    Expire,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadCfg {
    pub temporal: TemporalMode,
    /// Share of records that must carry a timestamp for `Auto` to pick `Timestamp`.
    pub timestamp_threshold: f32,
}

impl Default for LoadCfg {
    fn default() -> Self {
        Self {
            temporal: TemporalMode::Auto,
            timestamp_threshold: 0.8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCfg {
    /// Upper bound on evidence event ids attached to one verdict.
    pub evidence_cap: usize,
    pub end_of_log: EndOfLogPolicy,
    /// Only let actors whose role matches a norm's `role` trigger it.
    pub role_gating: bool,
    /// Skip a trigger whose bindings equal a still pending instance of the same norm.
    pub coalesce_duplicate_triggers: bool,
    pub load: LoadCfg,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            evidence_cap: DEFAULT_EVIDENCE_CAP,
            end_of_log: EndOfLogPolicy::Violate,
            role_gating: true,
            coalesce_duplicate_triggers: false,
            load: LoadCfg::default(),
        }
    }
}

impl EngineCfg {
    /// Parse a partial override document; absent keys keep their defaults.
    pub fn from_json(doc: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(doc)
    }
}
