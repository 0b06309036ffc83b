//! Sharded compliance supervisor.
//!
//! Orchestration layer around `norm_compliance_core`:
//! - assigns norms to shards by a stable hash of the norm id
//! - runs each shard on a scoped thread over the shared, read-only event log
//! - merges shard output through the core report builder
//!
//! No IO. No async. Norm instances never interact across norms, so shards
//! share nothing mutable and the merged report does not depend on the shard count.

use std::thread;

use log::{debug, info};
use norm_compliance_core::{
    evaluate_norm, event_records, log_totals, ComplianceReport, EngineCfg, EngineError, EventLog,
    EvidenceIndex, NormOutcome, NormSet, ReportBuilder, RoleDirectory,
};

use crate::adapter::{normalize_batch, RecordNormalizer};

/// Deterministic FNV-1a hash (stable across runs and platforms).
fn fnv1a_u64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(norm_id: &str, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(norm_id) % shard_count as u64) as usize
}

/// Evaluates a norm set against one log, spread over `shards` worker threads.
///
/// - `shards == 1` runs inline on the caller's thread.
/// - Larger values spawn one scoped thread per non-empty shard.
#[derive(Clone, Debug)]
pub struct ComplianceSupervisor {
    cfg: EngineCfg,
    shards: usize,
}

impl ComplianceSupervisor {
    pub fn new(shards: usize, cfg: EngineCfg) -> Self {
        Self {
            cfg,
            shards: shards.max(1),
        }
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    pub fn cfg(&self) -> &EngineCfg {
        &self.cfg
    }

    /// Norm positions per shard, each list in declaration order.
    pub fn plan(&self, norms: &NormSet) -> Vec<Vec<usize>> {
        let mut plan: Vec<Vec<usize>> = vec![Vec::new(); self.shards];
        for (pos, norm) in norms.iter().enumerate() {
            plan[shard_index(&norm.id, self.shards)].push(pos);
        }
        plan
    }

    /// Evaluate `norms` over `log`. The run fails as a whole if any shard does.
    pub fn evaluate(&self, log: &EventLog, norms: &NormSet) -> Result<ComplianceReport, EngineError> {
        if norms.is_empty() {
            return Err(EngineError::NoNorms);
        }
        let index = EvidenceIndex::build(log);
        let roles = RoleDirectory::build(norms, log);
        let cfg = &self.cfg;
        let all = norms.norms();

        let outcomes: Vec<NormOutcome<'_>> = if self.shards == 1 {
            all.iter().map(|n| evaluate_norm(n, log, &roles, cfg)).collect()
        } else {
            let plan = self.plan(norms);
            let roles = &roles;
            let per_shard = thread::scope(|s| {
                let handles: Vec<_> = plan
                    .iter()
                    .enumerate()
                    .filter(|(_, members)| !members.is_empty())
                    .map(|(shard, members)| {
                        debug!("shard {shard}: {} norms", members.len());
                        let handle = s.spawn(move || {
                            members
                                .iter()
                                .map(|&pos| evaluate_norm(&all[pos], log, roles, cfg))
                                .collect::<Vec<_>>()
                        });
                        (shard, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(shard, h)| h.join().map_err(|_| EngineError::ShardFailed { shard }))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            per_shard.into_iter().flatten().collect()
        };

        let mut builder = ReportBuilder::new(&index, cfg);
        builder.extend(outcomes);
        let report = builder.build(log);

        log_totals(&report, log, norms);
        Ok(report)
    }

    /// Decode an event document and a norm document, then evaluate.
    ///
    /// Event records go through `normalizer` first, so alias field names are
    /// accepted. A malformed norm document fails the run; bad event records
    /// are only dropped.
    pub fn run_documents<N: RecordNormalizer>(
        &self,
        normalizer: &N,
        events_json: &str,
        norms_json: &str,
    ) -> Result<ComplianceReport, EngineError> {
        let norms = NormSet::from_json(norms_json)?;
        let records = event_records(events_json)?;
        let log = EventLog::load(normalize_batch(normalizer, &records), &self.cfg.load);
        info!(
            "loaded {} norms, {} of {} event records",
            norms.len(),
            log.len(),
            records.len()
        );
        self.evaluate(&log, &norms)
    }
}
