mod config;
mod error;
mod evaluator;
mod pipeline;
mod selection;
mod types;

pub use error::{ConfigurationError, DataError, GateError, GateErrorKind};
pub use evaluator::{evaluate, evaluate_at, validate_config, validate_report};
pub use pipeline::{
    run_promotion_step, AuditSink, DecisionSink, PromotionError, PromotionReceipt,
    PromotionTarget, StepEvent, StepOutcome,
};
pub use selection::{pick_winner, select_best, CandidateOutcome, Selection};
pub use types::{
    Candidate, CheckName, CheckStatus, Decision, EvaluationReport, FailedStep, GateCheck,
    GateConfig,
};
