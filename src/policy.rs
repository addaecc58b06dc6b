//! Candidate validation and the bounded retry loop.
//!
//! A candidate shorter than `acceptance_threshold` × the original character
//! count is rejected as truncated or degenerate output. The boundary is
//! inclusive: exactly 80% of the original is accepted. Rejections are retried
//! up to `retry_limit` attempts in total; running out of attempts leaves the
//! unit unmodified and is not an error.

use crate::errors::OracleError;
use crate::notes::NoteGroup;
use crate::oracle::{CorrectionOracle, collect_candidate};
use crate::segment::CorrectionUnit;

pub const DEFAULT_RETRY_LIMIT: u32 = 10;
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.8;

const BASIS_POINTS: u64 = 10_000;

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooShort {
        candidate_chars: usize,
        original_chars: usize,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::TooShort {
                candidate_chars,
                original_chars,
            } => write!(
                f,
                "candidate has {} characters, original has {}",
                candidate_chars, original_chars
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

/// Acceptance threshold and retry bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptancePolicy {
    threshold_bp: u64,
    retry_limit: u32,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_RETRY_LIMIT)
    }
}

impl AcceptancePolicy {
    /// `threshold` is a ratio in `0.0..=1.0`; it is stored in basis points so
    /// the boundary comparison is exact integer arithmetic.
    pub fn new(threshold: f64, retry_limit: u32) -> Self {
        let clamped = threshold.clamp(0.0, 1.0);
        Self {
            threshold_bp: (clamped * BASIS_POINTS as f64).round() as u64,
            retry_limit: retry_limit.max(1),
        }
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn accept(&self, original: &str, candidate: &str) -> Verdict {
        let original_chars = original.chars().count();
        let candidate_chars = candidate.chars().count();
        if (candidate_chars as u64) * BASIS_POINTS >= (original_chars as u64) * self.threshold_bp {
            Verdict::Accepted
        } else {
            Verdict::Rejected(Rejection::TooShort {
                candidate_chars,
                original_chars,
            })
        }
    }
}

/// Retry loop state for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// About to make attempt `n` (1-based).
    Attempting(u32),
    Accepted(String),
    RetriesExhausted,
}

impl RetryState {
    /// Transition after attempt `attempt` produced `candidate` with `verdict`.
    pub fn after(attempt: u32, limit: u32, verdict: &Verdict, candidate: String) -> Self {
        match verdict {
            Verdict::Accepted => RetryState::Accepted(candidate),
            Verdict::Rejected(_) if attempt >= limit => RetryState::RetriesExhausted,
            Verdict::Rejected(_) => RetryState::Attempting(attempt + 1),
        }
    }
}

/// Final result of the retry loop for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    /// Accepted candidate, already trimmed.
    Accepted(String),
    RetriesExhausted,
}

#[derive(Debug, Clone)]
pub struct CorrectionReport {
    pub correction: Correction,
    pub attempts: u32,
    /// One note per rejected candidate, in attempt order.
    pub rejections: Vec<NoteGroup>,
}

/// Drive `oracle` for `unit` until a candidate is accepted or the retry budget
/// is spent. Oracle failures abort immediately; they are not retried here.
pub async fn correct_unit(
    policy: &AcceptancePolicy,
    oracle: &dyn CorrectionOracle,
    unit: &CorrectionUnit,
) -> Result<CorrectionReport, OracleError> {
    let limit = policy.retry_limit();
    let mut rejections = Vec::new();
    let mut state = RetryState::Attempting(1);

    loop {
        match state {
            RetryState::Attempting(attempt) => {
                tracing::info!(unit = unit.index, part = %unit.label(), attempt, limit, "correcting unit");
                let raw = collect_candidate(oracle, &unit.text).await?;
                let candidate = raw.trim().to_string();
                let verdict = policy.accept(&unit.text, &candidate);
                if let Verdict::Rejected(reason) = &verdict {
                    tracing::warn!(unit = unit.index, attempt, limit, %reason, "candidate rejected");
                    rejections.push(NoteGroup::rejected_candidate(unit, attempt, limit, &candidate));
                }
                state = RetryState::after(attempt, limit, &verdict, candidate);
            }
            RetryState::Accepted(candidate) => {
                return Ok(CorrectionReport {
                    correction: Correction::Accepted(candidate),
                    attempts: rejections.len() as u32 + 1,
                    rejections,
                });
            }
            RetryState::RetriesExhausted => {
                tracing::warn!(unit = unit.index, limit, "retries exhausted, leaving unit unchanged");
                return Ok(CorrectionReport {
                    correction: Correction::RetriesExhausted,
                    attempts: limit,
                    rejections,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FragmentStream;
    use crate::segment::segment;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Returns scripted candidates in order, repeating the last one.
    struct ScriptedOracle {
        responses: Vec<String>,
        calls: Mutex<usize>,
    }

    impl ScriptedOracle {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: responses.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CorrectionOracle for ScriptedOracle {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn correct(&self, _text: &str) -> Result<FragmentStream, OracleError> {
            let mut calls = self.calls.lock().unwrap();
            let idx = (*calls).min(self.responses.len() - 1);
            *calls += 1;
            let response = self.responses[idx].clone();
            Ok(futures::stream::iter(vec![Ok(response)]).boxed())
        }
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let policy = AcceptancePolicy::default();
        let original = "a".repeat(1000);
        assert_eq!(policy.accept(&original, &"b".repeat(800)), Verdict::Accepted);
        assert_eq!(
            policy.accept(&original, &"b".repeat(799)),
            Verdict::Rejected(Rejection::TooShort {
                candidate_chars: 799,
                original_chars: 1000
            })
        );
    }

    #[test]
    fn test_threshold_counts_characters_not_bytes() {
        let policy = AcceptancePolicy::default();
        // 10 characters, 20 bytes.
        let original = "ääääääääää";
        assert_eq!(policy.accept(original, "abcdefgh"), Verdict::Accepted);
        assert!(matches!(
            policy.accept(original, "abcdefg"),
            Verdict::Rejected(_)
        ));
    }

    #[test]
    fn test_longer_candidate_is_accepted() {
        let policy = AcceptancePolicy::default();
        assert_eq!(policy.accept("short", "a much longer answer"), Verdict::Accepted);
        assert_eq!(policy.accept("", ""), Verdict::Accepted);
    }

    #[test]
    fn test_retry_state_transitions() {
        let rejected = Verdict::Rejected(Rejection::TooShort {
            candidate_chars: 1,
            original_chars: 10,
        });
        assert_eq!(
            RetryState::after(1, 10, &rejected, "x".into()),
            RetryState::Attempting(2)
        );
        assert_eq!(
            RetryState::after(10, 10, &rejected, "x".into()),
            RetryState::RetriesExhausted
        );
        assert_eq!(
            RetryState::after(3, 10, &Verdict::Accepted, "ok".into()),
            RetryState::Accepted("ok".into())
        );
    }

    #[test]
    fn test_policy_clamps_inputs() {
        let policy = AcceptancePolicy::new(1.5, 0);
        assert_eq!(policy.retry_limit(), 1);
        assert!(matches!(policy.accept("abc", "ab"), Verdict::Rejected(_)));
    }

    #[tokio::test]
    async fn test_correct_unit_accepts_first_good_candidate() {
        let units = segment("Teh quick brown fox.\n");
        let oracle = ScriptedOracle::new(&["  The quick brown fox.\n"]);
        let report = correct_unit(&AcceptancePolicy::default(), &oracle, &units[0])
            .await
            .unwrap();
        assert_eq!(
            report.correction,
            Correction::Accepted("The quick brown fox.".to_string())
        );
        assert_eq!(report.attempts, 1);
        assert!(report.rejections.is_empty());
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_correct_unit_retries_then_accepts() {
        let units = segment("Teh quick brown fox.\n");
        let oracle = ScriptedOracle::new(&["Teh", "", "The quick brown fox."]);
        let report = correct_unit(&AcceptancePolicy::default(), &oracle, &units[0])
            .await
            .unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.rejections.len(), 2);
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_correct_unit_exhausts_after_exactly_retry_limit_attempts() {
        let units = segment("A paragraph that the oracle keeps truncating.\n");
        let oracle = ScriptedOracle::new(&["A paragraph"]);
        let report = correct_unit(&AcceptancePolicy::default(), &oracle, &units[0])
            .await
            .unwrap();
        assert_eq!(report.correction, Correction::RetriesExhausted);
        assert_eq!(oracle.calls(), 10);
        assert_eq!(report.attempts, 10);
        assert_eq!(report.rejections.len(), 10);
        assert_eq!(
            report.rejections[9].0[0],
            crate::notes::NoteBlock::Paragraph {
                text: "retry 10 of 10 for part 1".to_string()
            }
        );
    }
}
