//! Efficiency Timer
//!
//! Measures how long the primary agent takes to answer each user message
//! and turns the rolling average into the efficiency score.
//!
//! State machine: `Idle` → `Timing` when a user message is sent, back to
//! `Idle` when the assistant's reply is finalized.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::config::TimingConstants;

/// Response times kept for the consistency bonus
const RECENT_SAMPLES: usize = 5;

/// Timing state of the observed conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingRecord {
    pub conversation_start: Option<DateTime<Utc>>,
    pub last_user_message_at: Option<DateTime<Utc>>,
    /// Latency of the most recent reply
    pub response_time_ms: Option<u64>,
    /// Running mean over `message_count` replies
    pub avg_response_time_ms: f64,
    /// Number of timed replies
    pub message_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TimerState {
    Idle,
    Timing { since: DateTime<Utc> },
}

/// How the efficiency score was reached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyScore {
    pub value: f64,
    pub base: f64,
    pub consistency_bonus: f64,
    pub penalty: f64,
    pub avg_response_time_ms: f64,
    pub samples: u32,
}

pub struct EfficiencyTimer {
    record: TimingRecord,
    state: TimerState,
    recent: VecDeque<u64>,
    constants: TimingConstants,
}

impl EfficiencyTimer {
    pub fn new(constants: TimingConstants) -> Self {
        Self {
            record: TimingRecord::default(),
            state: TimerState::Idle,
            recent: VecDeque::with_capacity(RECENT_SAMPLES),
            constants,
        }
    }

    /// A user message was sent. While already timing, the earliest
    /// unanswered message keeps the clock.
    pub fn user_message_at(&mut self, at: DateTime<Utc>) {
        self.record.conversation_start.get_or_insert(at);
        self.record.last_user_message_at = Some(at);
        if self.state == TimerState::Idle {
            self.state = TimerState::Timing { since: at };
        }
    }

    /// The assistant's reply was finalized. Returns the measured latency,
    /// or None when no user message was pending (e.g. a greeting).
    pub fn assistant_finalized_at(&mut self, at: DateTime<Utc>) -> Option<u64> {
        self.record.conversation_start.get_or_insert(at);
        let TimerState::Timing { since } = self.state else {
            return None;
        };
        self.state = TimerState::Idle;

        let elapsed = (at - since).num_milliseconds().max(0) as u64;
        self.record.message_count += 1;
        let n = self.record.message_count as f64;
        self.record.avg_response_time_ms += (elapsed as f64 - self.record.avg_response_time_ms) / n;
        self.record.response_time_ms = Some(elapsed);

        if self.recent.len() == RECENT_SAMPLES {
            self.recent.pop_front();
        }
        self.recent.push_back(elapsed);

        tracing::debug!(
            elapsed_ms = elapsed,
            avg_ms = self.record.avg_response_time_ms,
            "assistant response timed"
        );
        Some(elapsed)
    }

    /// Efficiency score as of `now`, or None before the first timed reply
    pub fn score_at(&self, now: DateTime<Utc>) -> Option<EfficiencyScore> {
        if self.record.message_count == 0 {
            return None;
        }

        let avg = self.record.avg_response_time_ms;
        let base = base_score(avg, &self.constants);
        let samples: Vec<u64> = self.recent.iter().copied().collect();
        let consistency_bonus = consistency_bonus(&samples, &self.constants);

        let duration_ms = self
            .record
            .conversation_start
            .map(|start| (now - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        let penalty = if duration_ms > self.constants.unproductive_after_ms
            && self.record.message_count < self.constants.unproductive_min_messages
        {
            self.constants.unproductive_penalty
        } else {
            0.0
        };

        Some(EfficiencyScore {
            value: (base + consistency_bonus - penalty).clamp(0.0, 10.0),
            base,
            consistency_bonus,
            penalty,
            avg_response_time_ms: avg,
            samples: self.record.message_count,
        })
    }

    pub fn score(&self) -> Option<EfficiencyScore> {
        self.score_at(Utc::now())
    }

    pub fn is_timing(&self) -> bool {
        matches!(self.state, TimerState::Timing { .. })
    }

    pub fn record(&self) -> &TimingRecord {
        &self.record
    }

    pub fn reset(&mut self) {
        self.record = TimingRecord::default();
        self.state = TimerState::Idle;
        self.recent.clear();
    }
}

/// Step function over the configured breakpoints
pub fn base_score(avg_response_time_ms: f64, constants: &TimingConstants) -> f64 {
    constants
        .breakpoints
        .iter()
        .find(|bp| avg_response_time_ms <= bp.max_ms as f64)
        .map(|bp| bp.score)
        .unwrap_or(constants.floor)
}

/// Up to `consistency_bonus_max`, shrinking with the coefficient of variation
pub fn consistency_bonus(samples: &[u64], constants: &TimingConstants) -> f64 {
    if samples.len() < constants.consistency_min_samples.max(1) {
        return 0.0;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| *s as f64).sum::<f64>() / n;
    if mean <= 0.0 {
        return constants.consistency_bonus_max;
    }
    let variance = samples
        .iter()
        .map(|s| (*s as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let cv = variance.sqrt() / mean;

    constants.consistency_bonus_max * (1.0 - cv.min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn exchange(timer: &mut EfficiencyTimer, start: DateTime<Utc>, latency_ms: i64) -> DateTime<Utc> {
        timer.user_message_at(start);
        let end = start + Duration::milliseconds(latency_ms);
        timer.assistant_finalized_at(end);
        end
    }

    #[test]
    fn test_state_machine() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        assert!(!timer.is_timing());
        timer.user_message_at(t0());
        assert!(timer.is_timing());
        assert_eq!(timer.assistant_finalized_at(t0() + Duration::milliseconds(1200)), Some(1200));
        assert!(!timer.is_timing());
        assert_eq!(timer.record().response_time_ms, Some(1200));
    }

    #[test]
    fn test_reply_without_pending_user_message() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        assert_eq!(timer.assistant_finalized_at(t0()), None);
        assert_eq!(timer.record().message_count, 0);
        assert!(timer.score_at(t0()).is_none());
    }

    #[test]
    fn test_first_pending_message_keeps_clock() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        timer.user_message_at(t0());
        timer.user_message_at(t0() + Duration::seconds(5));
        assert_eq!(timer.assistant_finalized_at(t0() + Duration::seconds(6)), Some(6000));
    }

    #[test]
    fn test_running_mean() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        let mut at = t0();
        for latency in [1000, 3000, 5000] {
            at = exchange(&mut timer, at, latency) + Duration::seconds(1);
        }
        assert_eq!(timer.record().message_count, 3);
        assert!((timer.record().avg_response_time_ms - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn test_base_score_breakpoints() {
        let c = TimingConstants::default();
        assert_eq!(base_score(0.0, &c), 10.0);
        assert_eq!(base_score(2000.0, &c), 10.0);
        assert_eq!(base_score(2000.5, &c), 9.0);
        assert_eq!(base_score(5000.0, &c), 9.0);
        assert_eq!(base_score(10_000.0, &c), 8.0);
        assert_eq!(base_score(20_000.0, &c), 6.5);
        assert_eq!(base_score(30_000.0, &c), 5.0);
        assert_eq!(base_score(45_000.0, &c), 3.0);
        assert_eq!(base_score(45_001.0, &c), 1.0);
    }

    #[test]
    fn test_base_score_non_increasing() {
        let c = TimingConstants::default();
        let mut prev = base_score(0.0, &c);
        for ms in (0..60_000).step_by(250) {
            let score = base_score(ms as f64, &c);
            assert!(score <= prev);
            prev = score;
        }
    }

    #[test]
    fn test_fast_consistent_responses_clamped() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        let mut at = t0();
        for _ in 0..3 {
            at = exchange(&mut timer, at, 1500) + Duration::seconds(2);
        }
        let score = timer.score_at(at).unwrap();
        assert_eq!(score.base, 10.0);
        assert!((score.consistency_bonus - 0.5).abs() < 1e-9);
        assert_eq!(score.value, 10.0);
    }

    #[test]
    fn test_bonus_needs_three_samples() {
        let c = TimingConstants::default();
        assert_eq!(consistency_bonus(&[1000, 1000], &c), 0.0);
        assert!(consistency_bonus(&[1000, 1000, 1000], &c) > 0.49);
        let erratic = consistency_bonus(&[100, 10_000, 200], &c);
        assert!(erratic < 0.1);
    }

    #[test]
    fn test_unproductive_session_penalty() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        exchange(&mut timer, t0(), 4000);
        let later = t0() + Duration::minutes(11);
        let score = timer.score_at(later).unwrap();
        assert_eq!(score.base, 9.0);
        assert_eq!(score.penalty, 1.0);
        assert_eq!(score.value, 8.0);

        let early = timer.score_at(t0() + Duration::minutes(2)).unwrap();
        assert_eq!(early.penalty, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut timer = EfficiencyTimer::new(TimingConstants::default());
        exchange(&mut timer, t0(), 1000);
        timer.user_message_at(t0() + Duration::seconds(10));
        timer.reset();
        assert_eq!(timer.record(), &TimingRecord::default());
        assert!(!timer.is_timing());
    }
}
