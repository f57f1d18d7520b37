//! KPI score, trend and the per-dimension breakdown behind it.

use serde::Serialize;
use std::fmt::Write as _;

use crate::timing::EfficiencyScore;

/// Direction of the five-score average between two analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl Trend {
    /// Exactly one of up/down/stable for any pair of averages
    pub fn classify(previous_avg: f64, current_avg: f64, threshold: f64) -> Self {
        let diff = current_avg - previous_avg;
        if diff > threshold {
            Self::Up
        } else if diff < -threshold {
            Self::Down
        } else {
            Self::Stable
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Up => "↑",
            Self::Down => "↓",
            Self::Stable => "→",
        }
    }
}

/// Running quality score of the primary agent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiScore {
    pub accuracy: f64,
    pub helpfulness: f64,
    pub completeness: f64,
    pub humanlikeness: f64,
    pub efficiency: f64,
    /// Completed analyses
    pub changes: u64,
    pub trend: Trend,
}

impl KpiScore {
    pub fn average(&self) -> f64 {
        (self.accuracy + self.helpfulness + self.completeness + self.humanlikeness + self.efficiency)
            / 5.0
    }

    /// Apply a scored turn: replace the text dimensions, replace efficiency
    /// when a timing score exists, bump `changes` and recompute the trend.
    pub fn apply(&mut self, delta: &ScoreDelta, efficiency: Option<f64>, trend_threshold: f64) {
        let previous_avg = self.average();

        self.accuracy = clamp_score(delta.accuracy);
        self.helpfulness = clamp_score(delta.helpfulness);
        self.completeness = clamp_score(delta.completeness);
        self.humanlikeness = clamp_score(delta.humanlikeness);
        if let Some(efficiency) = efficiency {
            self.efficiency = clamp_score(efficiency);
        }

        self.changes += 1;
        self.trend = Trend::classify(previous_avg, self.average(), trend_threshold);
    }
}

pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 10.0)
}

/// One term of a dimension's calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub label: String,
    pub value: f64,
}

/// Base value plus contributions, before and after clamping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionBreakdown {
    pub base: f64,
    pub contributions: Vec<Contribution>,
    pub value: f64,
}

impl DimensionBreakdown {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            contributions: Vec::new(),
            value: clamp_score(base),
        }
    }

    pub fn add(&mut self, label: impl Into<String>, value: f64) {
        self.contributions.push(Contribution {
            label: label.into(),
            value,
        });
        self.value = clamp_score(self.raw());
    }

    /// Unclamped sum
    pub fn raw(&self) -> f64 {
        self.base + self.contributions.iter().map(|c| c.value).sum::<f64>()
    }
}

/// Sub-scores of human-likeness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumanlikenessBreakdown {
    pub naturalness: DimensionBreakdown,
    pub empathy: DimensionBreakdown,
    pub context_awareness: DimensionBreakdown,
    pub history_residual: DimensionBreakdown,
    pub value: f64,
}

/// Everything needed to reproduce a scored turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub accuracy: DimensionBreakdown,
    pub helpfulness: DimensionBreakdown,
    pub completeness: DimensionBreakdown,
    pub humanlikeness: HumanlikenessBreakdown,
    /// Keyword overlap with the latest user message
    pub relevance: f64,
    pub word_count: usize,
}

/// Text-derived scores for one assistant reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreDelta {
    pub accuracy: f64,
    pub helpfulness: f64,
    pub completeness: f64,
    pub humanlikeness: f64,
    pub breakdown: ScoreBreakdown,
}

/// What the host shows after a turn is scored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub turn: usize,
    pub score: KpiScore,
    pub previous_average: f64,
    pub breakdown: ScoreBreakdown,
    pub efficiency: Option<EfficiencyScore>,
}

impl KpiSnapshot {
    /// Plain-text details view
    pub fn render_details(&self) -> String {
        let mut out = String::new();
        let s = &self.score;
        let _ = writeln!(
            out,
            "Turn {} | average {:.2} {} (was {:.2}) | analyses: {}",
            self.turn,
            s.average(),
            s.trend.symbol(),
            self.previous_average,
            s.changes
        );
        let _ = writeln!(
            out,
            "Relevance {:.0}% | {} words",
            self.breakdown.relevance * 100.0,
            self.breakdown.word_count
        );

        render_dimension(&mut out, "Accuracy", &self.breakdown.accuracy);
        render_dimension(&mut out, "Helpfulness", &self.breakdown.helpfulness);
        render_dimension(&mut out, "Completeness", &self.breakdown.completeness);

        let h = &self.breakdown.humanlikeness;
        let _ = writeln!(out, "Human-likeness: {:.2}", h.value);
        render_dimension(&mut out, "  naturalness (25%)", &h.naturalness);
        render_dimension(&mut out, "  empathy (35%)", &h.empathy);
        render_dimension(&mut out, "  context awareness (25%)", &h.context_awareness);
        render_dimension(&mut out, "  history residual (15%)", &h.history_residual);

        match &self.efficiency {
            Some(e) => {
                let _ = writeln!(
                    out,
                    "Efficiency: {:.2} (avg {:.0} ms over {} replies: base {:.1}, consistency +{:.2}, penalty -{:.1})",
                    e.value, e.avg_response_time_ms, e.samples, e.base, e.consistency_bonus, e.penalty
                );
            }
            None => {
                let _ = writeln!(out, "Efficiency: {:.2} (no timed replies yet)", s.efficiency);
            }
        }
        out
    }
}

fn render_dimension(out: &mut String, name: &str, d: &DimensionBreakdown) {
    let _ = writeln!(out, "{}: {:.2} (base {:.2})", name, d.value, d.base);
    for c in &d.contributions {
        let _ = writeln!(out, "    {:+.2} {}", c.value, c.label);
    }
}
