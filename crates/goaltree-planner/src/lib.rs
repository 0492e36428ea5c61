mod config;
mod driver;
mod engine;
mod error;
mod evaluator;
mod generator;
pub mod llm;

pub use config::{CriterionDefinitions, EvalConfig, FewShotExample, FewShotExamples, balance_few_shot};
pub use driver::{InMemorySessionStore, SessionDriver, SessionState, SessionStore};
pub use engine::{Planner, StepOutcome};
pub use error::PlannerError;
pub use evaluator::{CriterionJudge, EnsembleFactory, EvalSubject, EvaluationEnsemble};
pub use generator::{HistoryStep, StepGenerator, depth_limit_step};
