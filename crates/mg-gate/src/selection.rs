use std::cmp::Ordering;

use chrono::Utc;

use crate::error::GateError;
use crate::evaluator::evaluate_at;
use crate::types::{Candidate, Decision, EvaluationReport, GateConfig};

/// Per-candidate gate result.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOutcome {
    pub id: String,
    pub result: Result<Decision, GateError>,
}

/// Result of comparing several candidates against one config.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Id of the promotable candidate that won the tie-break, if any passed.
    pub winner: Option<String>,
    /// One entry per input candidate, in input order.
    pub outcomes: Vec<CandidateOutcome>,
    /// Position of the winner in `outcomes`; ids are not required to be unique.
    winner_index: Option<usize>,
}

impl Selection {
    pub fn winning_decision(&self) -> Option<&Decision> {
        let outcome = self.outcomes.get(self.winner_index?)?;
        outcome.result.as_ref().ok()
    }

    /// Candidates the gate refused to decide on.
    pub fn errored(&self) -> impl Iterator<Item = (&str, &GateError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.id.as_str(), e)))
    }
}

/// Compare two promotable candidates. Returns the winner id by tie-break rules:
/// 1. Higher primary metric
/// 2. Lower worst fairness gap (no fairness metrics reported ranks last)
/// 3. More features in the explainability summary
/// 4. Lexicographic candidate id
pub fn pick_winner<'a>(
    a_id: &'a str,
    a: &EvaluationReport,
    b_id: &'a str,
    b: &EvaluationReport,
) -> &'a str {
    match rank(a_id, a, b_id, b) {
        Ordering::Less => b_id,
        _ => a_id,
    }
}

/// `Greater` when `a` ranks ahead of `b`; `Equal` only for identical ids and scores.
fn rank(a_id: &str, a: &EvaluationReport, b_id: &str, b: &EvaluationReport) -> Ordering {
    let a_gap = a.worst_fairness_gap().unwrap_or(f64::INFINITY);
    let b_gap = b.worst_fairness_gap().unwrap_or(f64::INFINITY);

    a.primary_metric
        .total_cmp(&b.primary_metric)
        .then_with(|| b_gap.total_cmp(&a_gap))
        .then_with(|| {
            a.explainability_summary
                .len()
                .cmp(&b.explainability_summary.len())
        })
        .then_with(|| b_id.cmp(a_id))
}

/// Evaluate every candidate and select the best promotable one.
///
/// Only candidates whose decision is `promote` compete. All candidates share
/// one evaluation timestamp. On a full tie (same id, same scores) the earlier
/// candidate is kept.
pub fn select_best(config: &GateConfig, candidates: &[Candidate]) -> Selection {
    let evaluated_at = Utc::now();
    let mut best: Option<usize> = None;
    let mut outcomes = Vec::with_capacity(candidates.len());

    for (i, c) in candidates.iter().enumerate() {
        let result = evaluate_at(&c.report, config, evaluated_at);
        if matches!(&result, Ok(d) if d.promote()) {
            best = match best {
                Some(j) => {
                    let prev = &candidates[j];
                    if rank(&c.id, &c.report, &prev.id, &prev.report) == Ordering::Greater {
                        Some(i)
                    } else {
                        Some(j)
                    }
                }
                None => Some(i),
            };
        }
        outcomes.push(CandidateOutcome {
            id: c.id.clone(),
            result,
        });
    }

    Selection {
        winner: best.map(|i| candidates[i].id.clone()),
        outcomes,
        winner_index: best,
    }
}
