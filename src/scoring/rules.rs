//! Declarative phrase rules for the heuristic scorer.
//!
//! Each rule is `(pattern → dimension → weight)`. A rule contributes its
//! weight once when its pattern matches anywhere in the reply, however many
//! times it matches. Patterns are case-insensitive and run on text whose
//! typographic apostrophes were folded to `'`.

use regex::{Regex, RegexBuilder};

use crate::error::{CompanionError, Result};

/// What a rule adjusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Accuracy,
    Helpfulness,
    Completeness,
    /// Human-likeness: language naturalness
    Naturalness,
    /// Human-likeness: empathy
    Empathy,
    /// Human-likeness: context awareness
    ContextAwareness,
    /// Human-likeness: callbacks to the longer history
    HistoryCallback,
}

/// Static description of a rule
pub struct RuleSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub dimension: Dimension,
    pub weight: f64,
    pub pattern: &'static str,
}

/// The standard rule table
pub const STANDARD_RULES: &[RuleSpec] = &[
    // Accuracy
    RuleSpec {
        id: "accuracy.hedging",
        label: "hedging phrases",
        dimension: Dimension::Accuracy,
        weight: -1.0,
        pattern: r"\b(i think|maybe|probably|perhaps|i guess|not sure)\b",
    },
    RuleSpec {
        id: "accuracy.confidence",
        label: "confident phrasing",
        dimension: Dimension::Accuracy,
        weight: 1.0,
        pattern: r"\b(definitely|certainly|specifically|precisely)\b",
    },
    RuleSpec {
        id: "accuracy.error_ack",
        label: "acknowledges an error",
        dimension: Dimension::Accuracy,
        weight: -1.5,
        pattern: r"\b(errors?|mistakes?|incorrect)\b",
    },
    // Helpfulness
    RuleSpec {
        id: "helpfulness.history",
        label: "builds on earlier conversation",
        dimension: Dimension::Helpfulness,
        weight: 1.5,
        pattern: r"\b(as mentioned|earlier|following up|as you said|as discussed)\b",
    },
    RuleSpec {
        id: "helpfulness.actionable",
        label: "actionable guidance",
        dimension: Dimension::Helpfulness,
        weight: 1.5,
        pattern: r"\b(here'?s how|here is how|you can|try this|you could try)\b",
    },
    RuleSpec {
        id: "helpfulness.steps",
        label: "step markers",
        dimension: Dimension::Helpfulness,
        weight: 1.0,
        pattern: r"\b(steps?|first|firstly|next)\b",
    },
    RuleSpec {
        id: "helpfulness.refusal",
        label: "refusal or uncertainty",
        dimension: Dimension::Helpfulness,
        weight: -1.0,
        pattern: r"\b(sorry|can'?t help|cannot help|don'?t know|unable to help)\b",
    },
    // Completeness
    RuleSpec {
        id: "completeness.examples",
        label: "gives examples",
        dimension: Dimension::Completeness,
        weight: 0.8,
        pattern: r"\b(example|examples|for instance|e\.g\.)",
    },
    RuleSpec {
        id: "completeness.brevity",
        label: "explicitly brief",
        dimension: Dimension::Completeness,
        weight: -1.0,
        pattern: r"\b(in short|briefly|in brief|tl;?dr|long story short)\b",
    },
    // Human-likeness: naturalness
    RuleSpec {
        id: "naturalness.contractions",
        label: "uses contractions",
        dimension: Dimension::Naturalness,
        weight: 1.5,
        pattern: r"\b[a-z]+'(s|re|ve|ll|d|t|m)\b",
    },
    RuleSpec {
        id: "naturalness.casual",
        label: "casual connectives",
        dimension: Dimension::Naturalness,
        weight: 1.5,
        pattern: r"\b(actually|anyway|by the way|honestly|so yeah|pretty much|you know)\b",
    },
    RuleSpec {
        id: "naturalness.robotic",
        label: "self-describes as a machine",
        dimension: Dimension::Naturalness,
        weight: -4.0,
        pattern: r"\b(as an ai|i am programmed|i'm programmed|as a language model|i am an ai)\b",
    },
    // Human-likeness: empathy
    RuleSpec {
        id: "empathy.acknowledgment",
        label: "acknowledges feelings",
        dimension: Dimension::Empathy,
        weight: 2.0,
        pattern: r"\b(i understand|i hear you|that sounds|sorry to hear|i can imagine|must be (hard|frustrating|difficult|stressful))\b",
    },
    RuleSpec {
        id: "empathy.supportive",
        label: "supportive phrasing",
        dimension: Dimension::Empathy,
        weight: 1.5,
        pattern: r"\b(happy to help|glad to help|don'?t worry|you'?ve got this|hope this helps|great question)\b",
    },
    RuleSpec {
        id: "empathy.cold",
        label: "cold or system language",
        dimension: Dimension::Empathy,
        weight: -2.0,
        pattern: r"\b(request processed|invalid input|error code|as per|the user|your query)\b",
    },
    // Human-likeness: context awareness
    RuleSpec {
        id: "context.earlier_turns",
        label: "references earlier turns",
        dimension: Dimension::ContextAwareness,
        weight: 2.0,
        pattern: r"\b(you mentioned|as we discussed|earlier|previously|last time|as you said)\b",
    },
    RuleSpec {
        id: "context.follow_up",
        label: "asks a follow-up question",
        dimension: Dimension::ContextAwareness,
        weight: 1.5,
        pattern: r"\?",
    },
    // Human-likeness: history callbacks
    RuleSpec {
        id: "history.callback",
        label: "explicit callback to the longer history",
        dimension: Dimension::HistoryCallback,
        weight: 2.0,
        pattern: r"\b(as mentioned|you mentioned|earlier|back when|as we discussed|going back to|at the start)\b",
    },
];

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: &'static str,
    pub label: &'static str,
    pub dimension: Dimension,
    pub weight: f64,
    pattern: Regex,
}

impl Rule {
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        let pattern = RegexBuilder::new(spec.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                CompanionError::Configuration(format!("invalid rule pattern '{}': {}", spec.id, e))
            })?;

        Ok(Self {
            id: spec.id,
            label: spec.label,
            dimension: spec.dimension,
            weight: spec.weight,
            pattern,
        })
    }

    /// Whether the rule fires on (already normalized) `text`
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// The compiled rule table
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs.iter().map(Rule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn standard() -> Result<Self> {
        Self::compile(STANDARD_RULES)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Rules for `dimension` that fire on `text`, in table order
    pub fn fired(&self, dimension: Dimension, text: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.dimension == dimension && r.matches(text))
            .collect()
    }

    /// Whether the rule `id` fires on `text` (false for unknown ids)
    pub fn fires(&self, id: &str, text: &str) -> bool {
        self.get(id).map(|r| r.matches(text)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
