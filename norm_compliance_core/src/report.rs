use serde::Serialize;

use crate::cfg::{EngineCfg, TemporalMode};
use crate::error::{DroppedEvent, EngineError, NormSkip};
use crate::event::{EventLog, Millis};
use crate::evidence::{select_evidence, EvidenceIndex};
use crate::norm::{Modality, Norm};
use crate::state::{Cause, Outcome, Verdict};

/// Tracker output for one norm, before evidence is attached.
#[derive(Clone, Debug)]
pub struct NormOutcome<'n> {
    pub norm: &'n Norm,
    pub result: Result<Vec<Verdict>, NormSkip>,
}

/// One verdict with its evidence references, as serialized in `results`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerdictRecord {
    pub norm_id: String,
    pub instance_id: String,
    pub outcome: Outcome,
    pub cause: Cause,
    pub excused: bool,
    pub trigger_event_id: String,
    pub resolving_event_id: Option<String>,
    pub evidence_event_ids: Vec<String>,
    pub window: [Millis; 2],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NormStatus {
    Evaluated {
        norm_id: String,
        modality: Modality,
        instances: usize,
    },
    Skipped {
        norm_id: String,
        reason: String,
    },
}

impl NormStatus {
    pub fn norm_id(&self) -> &str {
        match self {
            NormStatus::Evaluated { norm_id, .. } | NormStatus::Skipped { norm_id, .. } => norm_id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub fulfilled: usize,
    pub violated: usize,
    pub expired: usize,
    pub permitted: usize,
    pub excused: usize,
    pub skipped_norms: usize,
    pub dropped_events: usize,
}

impl Summary {
    fn count(&mut self, r: &VerdictRecord) {
        match r.outcome {
            Outcome::Fulfilled => self.fulfilled += 1,
            Outcome::Violated => self.violated += 1,
            Outcome::Expired => self.expired += 1,
            Outcome::Permitted => self.permitted += 1,
        }
        if r.excused {
            self.excused += 1;
        }
    }
}

/// Deterministically ordered compliance report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub temporal_mode: TemporalMode,
    pub results: Vec<VerdictRecord>,
    pub norms: Vec<NormStatus>,
    pub dropped_events: Vec<DroppedEvent>,
    pub summary: Summary,
}

impl ComplianceReport {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn verdicts_for<'r>(&'r self, norm_id: &'r str) -> impl Iterator<Item = &'r VerdictRecord> + 'r {
        self.results.iter().filter(move |r| r.norm_id == norm_id)
    }

    pub fn violations(&self) -> impl Iterator<Item = &VerdictRecord> + '_ {
        self.results.iter().filter(|r| r.outcome == Outcome::Violated)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NormStatus> + '_ {
        self.norms
            .iter()
            .filter(|s| matches!(s, NormStatus::Skipped { .. }))
    }
}

/// Collects per-norm tracker output and produces the ordered report.
///
/// Order: norm declaration index, then trigger time (ingestion order on
/// ties), then instance creation sequence. Input arrival order does not
/// matter, so shard results can be pushed in any order.
pub struct ReportBuilder<'a, 'l> {
    index: &'a EvidenceIndex<'l>,
    cfg: &'a EngineCfg,
    outcomes: Vec<NormOutcome<'a>>,
}

impl<'a, 'l> ReportBuilder<'a, 'l> {
    pub fn new(index: &'a EvidenceIndex<'l>, cfg: &'a EngineCfg) -> Self {
        Self {
            index,
            cfg,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: NormOutcome<'a>) {
        self.outcomes.push(outcome);
    }

    pub fn extend<I>(&mut self, outcomes: I)
    where
        I: IntoIterator<Item = NormOutcome<'a>>,
    {
        self.outcomes.extend(outcomes);
    }

    pub fn build(mut self, log: &EventLog) -> ComplianceReport {
        self.outcomes.sort_by_key(|o| o.norm.declaration_index);

        let mut results = Vec::new();
        let mut norms = Vec::with_capacity(self.outcomes.len());
        let mut summary = Summary::default();

        for outcome in self.outcomes {
            let norm = outcome.norm;
            match outcome.result {
                Err(skip) => {
                    summary.skipped_norms += 1;
                    norms.push(NormStatus::Skipped {
                        norm_id: norm.id.clone(),
                        reason: format!("norm skipped: {skip}"),
                    });
                }
                Ok(mut verdicts) => {
                    verdicts.sort_by_key(|v| (v.trigger_ts, v.trigger_seq, v.creation_seq));
                    norms.push(NormStatus::Evaluated {
                        norm_id: norm.id.clone(),
                        modality: norm.modality,
                        instances: verdicts.len(),
                    });
                    for v in verdicts {
                        let evidence = select_evidence(self.index, norm, &v, self.cfg.evidence_cap);
                        let record = VerdictRecord {
                            norm_id: v.norm_id,
                            instance_id: v.instance_id,
                            outcome: v.outcome,
                            cause: v.cause,
                            excused: v.excused,
                            trigger_event_id: v.trigger_event_id,
                            resolving_event_id: v.resolving_event_id,
                            evidence_event_ids: evidence,
                            window: v.window,
                        };
                        summary.count(&record);
                        results.push(record);
                    }
                }
            }
        }

        summary.dropped_events = log.dropped().len();
        ComplianceReport {
            temporal_mode: log.temporal_mode(),
            results,
            norms,
            dropped_events: log.dropped().to_vec(),
            summary,
        }
    }
}
