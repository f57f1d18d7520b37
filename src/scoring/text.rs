//! Text helpers for the scorer: tokenising, keywords and transcript parsing.

use std::collections::BTreeSet;

use crate::types::Role;

/// Words too common to say anything about relevance
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "have",
    "has", "had", "was", "were", "will", "would", "can", "could", "should", "what", "when",
    "where", "which", "who", "why", "how", "does", "did", "from", "they", "them", "their",
    "there", "then", "than", "into", "about", "just", "also", "some", "any", "all", "its",
    "it's", "i'm", "i've", "i'll", "don't", "can't", "won't", "isn't", "our", "out", "get",
    "got", "been", "being", "very", "really", "like", "more", "most", "much", "many", "such",
    "only", "other", "over", "here", "these", "those", "too", "yes", "okay", "please", "thanks",
];

const FIRST_PERSON: &[&str] = &["i", "i'm", "i've", "i'll", "i'd", "me", "my", "mine", "myself"];

const FORMAL_CONNECTIVES: &[&str] = &[
    "however",
    "therefore",
    "furthermore",
    "moreover",
    "additionally",
    "consequently",
    "thus",
    "hence",
    "nevertheless",
    "accordingly",
];

const SPEAKER_PREFIXES: &[(&str, Role)] = &[
    ("User:", Role::User),
    ("Agent:", Role::Assistant),
    ("Assistant:", Role::Assistant),
];

/// Fold typographic apostrophes so patterns only need to handle `'`
pub fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
}

/// Lower-cased words, keeping inner apostrophes (`don't`)
pub fn words(text: &str) -> Vec<String> {
    normalize(text)
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Content-bearing words of at least three characters
pub fn keywords(text: &str) -> BTreeSet<String> {
    words(text)
        .into_iter()
        .map(|w| w.strip_suffix("'s").map(str::to_string).unwrap_or(w))
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Fraction of `needles` present in `haystack` (0 when there is nothing to match)
pub fn overlap(needles: &BTreeSet<String>, haystack: &BTreeSet<String>) -> f64 {
    if needles.is_empty() {
        return 0.0;
    }
    let matched = needles.iter().filter(|k| haystack.contains(*k)).count();
    matched as f64 / needles.len() as f64
}

/// Whether a reply speaks in first person and uses formal connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSignature {
    pub first_person: bool,
    pub formal: bool,
}

impl ToneSignature {
    pub fn of(text: &str) -> Self {
        let words = words(text);
        Self {
            first_person: words.iter().any(|w| FIRST_PERSON.contains(&w.as_str())),
            formal: words.iter().any(|w| FORMAL_CONNECTIVES.contains(&w.as_str())),
        }
    }

    /// Majority signature of several replies (ties count as present)
    pub fn majority(signatures: &[ToneSignature]) -> Option<Self> {
        if signatures.is_empty() {
            return None;
        }
        let n = signatures.len();
        let first_person = signatures.iter().filter(|s| s.first_person).count();
        let formal = signatures.iter().filter(|s| s.formal).count();
        Some(Self {
            first_person: first_person * 2 >= n,
            formal: formal * 2 >= n,
        })
    }
}

/// Continuation lines lose their indentation
fn push_line(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(line.trim());
}

/// One speaker turn recovered from a transcript
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// A formatted context window parsed back into turns.
///
/// Lines start with `User:` or `Agent:` (`Assistant:` is accepted too);
/// other lines continue the previous turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn parse(context: &str) -> Self {
        let mut turns: Vec<Turn> = Vec::new();

        for line in context.lines() {
            let trimmed = line.trim_start();
            let started = SPEAKER_PREFIXES
                .iter()
                .find_map(|&(prefix, role)| trimmed.strip_prefix(prefix).map(|rest| (role, rest.trim())));

            if let Some((role, rest)) = started {
                turns.push(Turn {
                    role,
                    text: rest.to_string(),
                });
            } else if let Some(last) = turns.last_mut() {
                push_line(&mut last.text, line);
            }
        }

        Self { turns }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_user(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }

    /// User turns before the most recent one
    pub fn earlier_user_turns(&self) -> Vec<&str> {
        let users: Vec<&str> = self
            .turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
            .collect();
        match users.split_last() {
            Some((_, earlier)) => earlier.to_vec(),
            None => Vec::new(),
        }
    }

    /// Up to `n` most recent assistant turns preceding `response`.
    ///
    /// When the transcript already ends with `response` itself, that turn is skipped.
    /// `response` is compared after the same per-line trimming `parse` applies.
    pub fn previous_assistant_turns(&self, response: &str, n: usize) -> Vec<&str> {
        let mut response_text = String::new();
        for line in response.lines() {
            push_line(&mut response_text, line);
        }

        let mut turns: &[Turn] = &self.turns;
        if let Some(last) = turns.last() {
            if last.role == Role::Assistant && last.text.trim() == response_text.trim() {
                turns = &turns[..turns.len() - 1];
            }
        }

        let mut previous: Vec<&str> = turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::Assistant)
            .take(n)
            .map(|t| t.text.as_str())
            .collect();
        previous.reverse();
        previous
    }
}
