use serde::Serialize;
use thiserror::Error;

/// Errors that abort a run. Nothing partial is surfaced when one of these is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed norm `{norm_id}`: {reason}")]
    MalformedNorm { norm_id: String, reason: String },

    #[error("duplicate norm id `{0}`")]
    DuplicateNorm(String),

    #[error("no norms loaded")]
    NoNorms,

    #[error("shard {shard} failed before producing its verdicts")]
    ShardFailed { shard: usize },

    #[error("invalid document: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn malformed(norm_id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::MalformedNorm {
            norm_id: norm_id.into(),
            reason: reason.into(),
        }
    }
}

/// Per-norm failure. The norm is left out of evaluation and the report carries a marker for it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NormSkip {
    #[error("{clause} references unbound variable `{binding}`")]
    UnresolvedReference { clause: String, binding: String },
}

/// Why an input record was excluded from matching.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DropReason {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unparseable timestamp `{0}`")]
    BadTimestamp(String),

    #[error("duplicate event id")]
    DuplicateId,

    #[error("undecodable record: {0}")]
    Undecodable(String),
}

/// A record dropped at load time. `index` is its position in the input stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DroppedEvent {
    pub index: usize,
    pub id: Option<String>,
    pub reason: DropReason,
}
