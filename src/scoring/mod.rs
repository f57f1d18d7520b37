//! Heuristic Scoring Engine
//!
//! Turns a finalized assistant reply plus its context window into the KPI
//! dimensions, from a declarative phrase-rule table and a few structural
//! measures.

pub mod engine;
pub mod kpi;
pub mod rules;
pub mod text;

pub use engine::{HeuristicScorer, ScoreOutcome};
pub use kpi::{
    clamp_score, Contribution, DimensionBreakdown, HumanlikenessBreakdown, KpiScore, KpiSnapshot,
    ScoreBreakdown, ScoreDelta, Trend,
};
pub use rules::{Dimension, Rule, RuleSet, RuleSpec, STANDARD_RULES};
pub use text::Transcript;
