//! Fit evaluation: fingerprinting, verdict schema and parsing, message
//! rendering, and the LLM-backed decision engine.

mod decision;
mod fingerprint;
mod template;
mod verdict;

pub use decision::{DecisionEngine, EvaluationOutcome, Evaluator, UsageReport};
pub use fingerprint::{fingerprint, normalize};
pub use template::{SlotValues, render_message};
pub use verdict::{Decision, MAX_RATIONALE_CHARS, Verdict, parse_verdict};
