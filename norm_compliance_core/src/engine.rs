//! Single-threaded evaluation entry points.

use log::{info, warn};

use crate::cfg::EngineCfg;
use crate::error::EngineError;
use crate::event::EventLog;
use crate::evidence::EvidenceIndex;
use crate::norm::{Norm, NormSet};
use crate::report::{ComplianceReport, NormOutcome, ReportBuilder};
use crate::roles::RoleDirectory;
use crate::tracker::track_norm;

/// Evaluate one norm over the whole log. A norm with unresolved references is
/// skipped, not evaluated.
pub fn evaluate_norm<'n>(
    norm: &'n Norm,
    log: &EventLog,
    roles: &RoleDirectory,
    cfg: &EngineCfg,
) -> NormOutcome<'n> {
    let result = match norm.check_references() {
        Ok(()) => Ok(track_norm(norm, log, cfg, roles)),
        Err(skip) => {
            warn!("norm {} skipped: {}", norm.id, skip);
            Err(skip)
        }
    };
    NormOutcome { norm, result }
}

/// Evaluate every norm against `log` and build the report.
pub fn evaluate(log: &EventLog, norms: &NormSet, cfg: &EngineCfg) -> Result<ComplianceReport, EngineError> {
    if norms.is_empty() {
        return Err(EngineError::NoNorms);
    }
    let index = EvidenceIndex::build(log);
    let roles = RoleDirectory::build(norms, log);

    let mut builder = ReportBuilder::new(&index, cfg);
    builder.extend(norms.iter().map(|n| evaluate_norm(n, log, &roles, cfg)));
    let report = builder.build(log);

    log_totals(&report, log, norms);
    Ok(report)
}

/// Emit the `info!` run summary line.
pub fn log_totals(report: &ComplianceReport, log: &EventLog, norms: &NormSet) {
    let s = &report.summary;
    info!(
        "evaluated {} norms over {} events ({:?}): {} fulfilled, {} violated, {} expired, {} permitted, {} norms skipped, {} events dropped",
        norms.len(),
        log.len(),
        report.temporal_mode,
        s.fulfilled,
        s.violated,
        s.expired,
        s.permitted,
        s.skipped_norms,
        s.dropped_events,
    );
}
