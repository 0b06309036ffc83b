//! norm_compliance_supervisor
//!
//! Outside-world facing orchestration layer for `norm_compliance_core`.
//!
//! Responsibilities:
//! - shard norms by `norm_id` (deterministic)
//! - adapt loosely-named log records into normalized events
//! - invoke the core tracker per norm and merge into one report
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no compliance semantics (lives in core)

pub mod adapter;
pub mod supervisor;

pub use adapter::{
    RecordNormalizer,
    BasicRecordNormalizer,
    FieldAliases,
    normalize_batch,
};

pub use supervisor::ComplianceSupervisor;
