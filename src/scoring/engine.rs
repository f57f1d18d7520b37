//! Heuristic scoring of assistant replies.
//!
//! Scores a finalized reply against the context window it was produced in.
//! Phrase checks come from the rule table in [`super::rules`]; the scorer
//! adds the structural terms (tone consistency, relevance to the latest
//! user message, length, question coverage, history callbacks).

use std::collections::BTreeSet;

use super::kpi::{clamp_score, DimensionBreakdown, HumanlikenessBreakdown, ScoreBreakdown, ScoreDelta};
use super::rules::{Dimension, RuleSet};
use super::text::{keywords, normalize, overlap, word_count, ToneSignature, Transcript};
use crate::error::Result;

pub const ACCURACY_BASE: f64 = 7.0;
pub const HELPFULNESS_BASE: f64 = 6.5;
pub const SUBSCORE_BASE: f64 = 5.0;

const TONE_MATCH_BONUS: f64 = 0.5;
const TONE_WINDOW: usize = 3;
const RELEVANCE_WEIGHT: f64 = 2.0;
const COVERAGE_WEIGHT: f64 = 2.0;
const WORDS_TO_COMPLETENESS: f64 = 0.15;
const SHORT_REPLY_WORDS: usize = 10;
const CONTEXT_RELEVANCE_WEIGHT: f64 = 1.0;
const HISTORY_KEYWORD_WEIGHT: f64 = 3.0;
const HISTORY_KEYWORD_SATURATION: usize = 5;

const NATURALNESS_SHARE: f64 = 0.25;
const EMPATHY_SHARE: f64 = 0.35;
const CONTEXT_SHARE: f64 = 0.25;
const RESIDUAL_SHARE: f64 = 0.15;

/// Result of scoring one reply
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(ScoreDelta),
    /// Nothing to score; the running KPI must stay untouched
    NoData { reason: String },
}

/// Stateless, deterministic scorer
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    rules: RuleSet,
}

impl HeuristicScorer {
    /// Scorer with the standard rule table
    pub fn new() -> Result<Self> {
        Ok(Self::with_rules(RuleSet::standard()?))
    }

    pub fn with_rules(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Score `assistant_message` against `context` (a `User:`/`Agent:` transcript)
    pub fn analyze(&self, assistant_message: &str, context: &str) -> ScoreOutcome {
        let response = normalize(assistant_message);
        if response.trim().is_empty() {
            return ScoreOutcome::NoData {
                reason: "no assistant content to score".to_string(),
            };
        }

        let transcript = Transcript::parse(&normalize(context));
        let response_keywords = keywords(&response);
        let last_user = transcript.last_user();
        let relevance = last_user
            .map(|u| overlap(&keywords(u), &response_keywords))
            .unwrap_or(0.0);
        let words = word_count(&response);

        let accuracy = self.accuracy(&response, &transcript, relevance);
        let helpfulness = self.helpfulness(&response);
        let completeness = self.completeness(&response, last_user, &response_keywords, words);
        let humanlikeness = self.humanlikeness(&response, &transcript, &response_keywords, relevance);

        ScoreOutcome::Scored(ScoreDelta {
            accuracy: accuracy.value,
            helpfulness: helpfulness.value,
            completeness: completeness.value,
            humanlikeness: humanlikeness.value,
            breakdown: ScoreBreakdown {
                accuracy,
                helpfulness,
                completeness,
                humanlikeness,
                relevance,
                word_count: words,
            },
        })
    }

    fn apply_rules(&self, breakdown: &mut DimensionBreakdown, dimension: Dimension, text: &str) {
        for rule in self.rules.fired(dimension, text) {
            breakdown.add(rule.label, rule.weight);
        }
    }

    fn accuracy(&self, response: &str, transcript: &Transcript, relevance: f64) -> DimensionBreakdown {
        let mut d = DimensionBreakdown::new(ACCURACY_BASE);

        let previous: Vec<ToneSignature> = transcript
            .previous_assistant_turns(response, TONE_WINDOW)
            .into_iter()
            .map(ToneSignature::of)
            .collect();
        if ToneSignature::majority(&previous) == Some(ToneSignature::of(response)) {
            d.add("tone consistent with recent replies", TONE_MATCH_BONUS);
        }

        if relevance > 0.0 {
            d.add(
                format!("relevance to latest user message ({:.0}%)", relevance * 100.0),
                RELEVANCE_WEIGHT * relevance,
            );
        }

        self.apply_rules(&mut d, Dimension::Accuracy, response);
        d
    }

    fn helpfulness(&self, response: &str) -> DimensionBreakdown {
        let mut d = DimensionBreakdown::new(HELPFULNESS_BASE);
        self.apply_rules(&mut d, Dimension::Helpfulness, response);
        d
    }

    fn completeness(
        &self,
        response: &str,
        last_user: Option<&str>,
        response_keywords: &BTreeSet<String>,
        words: usize,
    ) -> DimensionBreakdown {
        let mut d = DimensionBreakdown::new((words as f64 * WORDS_TO_COMPLETENESS).clamp(3.0, 8.0));

        if let Some(coverage) = last_user.and_then(|u| question_coverage(u, response_keywords)) {
            if coverage > 0.0 {
                d.add(
                    format!("covers {:.0}% of the question parts", coverage * 100.0),
                    COVERAGE_WEIGHT * coverage,
                );
            }
        }

        let brevity_id = "completeness.brevity";
        for rule in self.rules.fired(Dimension::Completeness, response) {
            if rule.id != brevity_id {
                d.add(rule.label, rule.weight);
            }
        }

        // Explicit brevity and a very short reply share one penalty
        let brevity_weight = self.rules.get(brevity_id).map(|r| r.weight).unwrap_or(-1.0);
        if self.rules.fires(brevity_id, response) {
            d.add("explicitly brief", brevity_weight);
        } else if words < SHORT_REPLY_WORDS {
            d.add(format!("very short reply ({} words)", words), brevity_weight);
        }

        d
    }

    fn humanlikeness(
        &self,
        response: &str,
        transcript: &Transcript,
        response_keywords: &BTreeSet<String>,
        relevance: f64,
    ) -> HumanlikenessBreakdown {
        let mut naturalness = DimensionBreakdown::new(SUBSCORE_BASE);
        self.apply_rules(&mut naturalness, Dimension::Naturalness, response);

        let mut empathy = DimensionBreakdown::new(SUBSCORE_BASE);
        self.apply_rules(&mut empathy, Dimension::Empathy, response);

        let mut context_awareness = DimensionBreakdown::new(SUBSCORE_BASE);
        self.apply_rules(&mut context_awareness, Dimension::ContextAwareness, response);
        if relevance > 0.0 {
            context_awareness.add("stays on the latest topic", CONTEXT_RELEVANCE_WEIGHT * relevance);
        }

        let mut history_residual = DimensionBreakdown::new(SUBSCORE_BASE);
        let earlier = transcript.earlier_user_turns();
        if !earlier.is_empty() {
            let latest: BTreeSet<String> = transcript.last_user().map(keywords).unwrap_or_default();
            let earlier_keywords: BTreeSet<String> = earlier
                .iter()
                .flat_map(|t| keywords(t))
                .filter(|k| !latest.contains(k))
                .collect();
            let callbacks = response_keywords.intersection(&earlier_keywords).count();
            if callbacks > 0 {
                let share = callbacks.min(HISTORY_KEYWORD_SATURATION) as f64
                    / HISTORY_KEYWORD_SATURATION as f64;
                history_residual.add(
                    format!("reuses {} topic(s) from earlier turns", callbacks),
                    HISTORY_KEYWORD_WEIGHT * share,
                );
            }
            self.apply_rules(&mut history_residual, Dimension::HistoryCallback, response);
        }

        let value = clamp_score(
            NATURALNESS_SHARE * naturalness.value
                + EMPATHY_SHARE * empathy.value
                + CONTEXT_SHARE * context_awareness.value
                + RESIDUAL_SHARE * history_residual.value,
        );

        HumanlikenessBreakdown {
            naturalness,
            empathy,
            context_awareness,
            history_residual,
            value,
        }
    }
}

/// Fraction of the `?`-separated parts of `question` the response addresses.
///
/// A part counts as addressed when at least half its keywords appear in the
/// response. None when the message has no keyword-bearing part.
fn question_coverage(question: &str, response_keywords: &BTreeSet<String>) -> Option<f64> {
    let parts: Vec<BTreeSet<String>> = question
        .split('?')
        .map(keywords)
        .filter(|k| !k.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }

    let covered = parts
        .iter()
        .filter(|part| overlap(part, response_keywords) >= 0.5)
        .count();
    Some(covered as f64 / parts.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> HeuristicScorer {
        HeuristicScorer::new().unwrap()
    }

    fn scored(message: &str, context: &str) -> ScoreDelta {
        match scorer().analyze(message, context) {
            ScoreOutcome::Scored(delta) => delta,
            ScoreOutcome::NoData { reason } => panic!("not scored: {}", reason),
        }
    }

    fn assert_in_range(delta: &ScoreDelta) {
        for v in [delta.accuracy, delta.helpfulness, delta.completeness, delta.humanlikeness] {
            assert!((0.0..=10.0).contains(&v), "out of range: {}", v);
        }
    }

    #[test]
    fn test_hedging_scenario() {
        let delta = scored("I think it might work, maybe.", "");
        assert!((delta.accuracy - 6.0).abs() < 1e-9);
        assert_eq!(delta.breakdown.accuracy.contributions.len(), 1);
    }

    #[test]
    fn test_no_content_is_no_data() {
        for empty in ["", "   \n\t"] {
            assert!(matches!(
                scorer().analyze(empty, "User: hi"),
                ScoreOutcome::NoData { .. }
            ));
        }
    }

    #[test]
    fn test_deterministic() {
        let context = "User: how do I install rust?\nAgent: Use rustup.\nUser: and update it?";
        let message = "You can run `rustup update`. As mentioned earlier, rustup manages toolchains.";
        assert_eq!(scorer().analyze(message, context), scorer().analyze(message, context));
    }

    #[test]
    fn test_relevance_raises_accuracy() {
        let context = "User: How do I configure the rust compiler cache?";
        let relevant = scored("Configure the compiler cache through sccache for rust builds.", context);
        let unrelated = scored("Bananas are yellow and grow in bunches on tall plants.", context);
        assert!(relevant.breakdown.relevance > 0.9);
        assert_eq!(unrelated.breakdown.relevance, 0.0);
        assert!(relevant.accuracy > unrelated.accuracy);
        assert!((relevant.accuracy - (ACCURACY_BASE + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_tone_match_bonus() {
        let context = "User: a\nAgent: I checked the logs.\nUser: b\nAgent: I restarted it.\nUser: c";
        let matching = scored("I updated the config file for the service.", context);
        assert!(matching
            .breakdown
            .accuracy
            .contributions
            .iter()
            .any(|c| c.value == TONE_MATCH_BONUS));

        let different = scored("The config file was updated; however, restart is pending.", context);
        assert!(different
            .breakdown
            .accuracy
            .contributions
            .iter()
            .all(|c| c.value != TONE_MATCH_BONUS));
    }

    #[test]
    fn test_confidence_and_error_ack() {
        let delta = scored("That was definitely a mistake on my side.", "");
        // 7.0 + 1.0 - 1.5
        assert!((delta.accuracy - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_helpfulness_rules() {
        let helpful = scored(
            "Following up on that: here's how. First, open the settings. Next, you can enable sync.",
            "",
        );
        // 6.5 + 1.5 + 1.5 + 1.0
        assert!((helpful.helpfulness - 10.0).abs() < 1e-9);

        let refusal = scored("Sorry, I don't know.", "");
        assert!((refusal.helpfulness - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_completeness_length_and_short_penalty() {
        let short = scored("Yes.", "");
        // base floor 3.0, short reply -1.0
        assert!((short.completeness - 2.0).abs() < 1e-9);

        let long_text = "word ".repeat(60);
        let long = scored(&long_text, "");
        // 60 * 0.15 = 9.0 capped to 8.0
        assert!((long.completeness - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_brevity_and_short_penalised_once() {
        let delta = scored("In short: no.", "");
        let penalties: Vec<_> = delta
            .breakdown
            .completeness
            .contributions
            .iter()
            .filter(|c| c.value < 0.0)
            .collect();
        assert_eq!(penalties.len(), 1);
    }

    #[test]
    fn test_question_coverage() {
        let context = "User: How do I install python? And where is the config stored?";
        let both = scored(
            "Install python with the official installer. The config is stored in your home directory under .config.",
            context,
        );
        let one = scored(
            "Install python with the official installer from the website, it takes a minute or two.",
            context,
        );
        assert!(both.completeness > one.completeness);
    }

    #[test]
    fn test_question_coverage_fraction() {
        let response = keywords("install python config stored");
        assert_eq!(question_coverage("install python? config stored?", &response), Some(1.0));
        assert_eq!(question_coverage("install python? weather tomorrow?", &response), Some(0.5));
        assert_eq!(question_coverage("?? ?", &response), None);
    }

    #[test]
    fn test_robotic_language_lowers_humanlikeness() {
        let natural = scored("Honestly, I understand, that's frustrating. Don't worry, we'll sort it out.", "");
        let robotic = scored("As an AI, I am programmed to process your query. Request processed.", "");
        assert!(natural.humanlikeness > robotic.humanlikeness);
        assert!(natural.breakdown.humanlikeness.empathy.value > 5.0);
        assert!(robotic.breakdown.humanlikeness.naturalness.value < 5.0);
    }

    #[test]
    fn test_history_callbacks_need_history() {
        let message = "Going back to your garden project, the tomatoes need more sun.";
        let with_history = scored(
            message,
            "User: I'm planting tomatoes in my garden project\nAgent: Nice.\nUser: What about watering?",
        );
        let without_history = scored(message, "User: What about watering?");

        let residual = &with_history.breakdown.humanlikeness.history_residual;
        assert!(residual.value > SUBSCORE_BASE);
        assert_eq!(
            without_history.breakdown.humanlikeness.history_residual.value,
            SUBSCORE_BASE
        );
        assert!(with_history.humanlikeness > without_history.humanlikeness);
    }

    #[test]
    fn test_humanlikeness_weights() {
        let delta = scored("Plain statement without any markers at all here today friend", "");
        let h = &delta.breakdown.humanlikeness;
        let expected = 0.25 * h.naturalness.value
            + 0.35 * h.empathy.value
            + 0.25 * h.context_awareness.value
            + 0.15 * h.history_residual.value;
        assert!((h.value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_all_dimensions_clamped() {
        let inputs = [
            ("x", ""),
            ("!!!", "garbage without speakers"),
            (
                "Definitely, certainly, specifically! Here's how: first step, next step, you can try this. \
                 For example, as mentioned earlier, following up. I understand, happy to help, that sounds hard. \
                 You mentioned this earlier? Actually it's fine, anyway you'll see.",
                "User: a?\nAgent: b\nUser: c? d?",
            ),
            (
                "As an AI I am programmed. Error, mistake, incorrect. Sorry, I can't help, I don't know. \
                 Maybe, probably, I think. In short: request processed, invalid input, error code.",
                "",
            ),
        ];
        for (message, context) in inputs {
            assert_in_range(&scored(message, context));
        }
    }
}
