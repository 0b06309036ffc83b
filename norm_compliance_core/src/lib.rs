pub mod cfg;
pub mod error;
pub mod event;
pub mod ingest;
pub mod matcher;
pub mod norm;
pub mod roles;

pub mod state;
pub mod tracker;
pub mod evidence;
pub mod report;
pub mod engine;

pub use cfg::{EndOfLogPolicy, EngineCfg, LoadCfg, TemporalMode, DEFAULT_EVIDENCE_CAP};
pub use error::{DropReason, DroppedEvent, EngineError, NormSkip};
pub use event::{Event, EventLog, Millis, Value};
pub use ingest::{event_records, norms_from_json, parse_timestamp, RawEvent, RawTimestamp};
pub use matcher::{like, matches, Bindings, Condition, Field, Pattern};
pub use norm::{BindSpec, Deadline, Modality, Norm, NormSet, NormSpec, ACTOR_BINDING};
pub use roles::{infer_role, RoleConfidence, RoleDirectory, RoleMatch};

pub use state::{Cause, NormInstance, Outcome, Resolution, Verdict};
pub use tracker::{track_norm, NormTracker};
pub use evidence::{select_evidence, EvidenceIndex, EvidenceQuery, TimeWindow};
pub use report::{ComplianceReport, NormOutcome, NormStatus, ReportBuilder, Summary, VerdictRecord};
pub use engine::{evaluate, evaluate_norm, log_totals};
