//! Job lifecycle state machine. A pure predicate over states; it performs no I/O and is
//! unit-testable in isolation from the store.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A job's lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Retrying,
    Dlq,
    /// Reserved for a future saga runner; never reached on the hot path.
    SagaRunning,
    SagaStepFailed,
    SagaCompensating,
    SagaCompensated,
}

impl JobState {
    pub const ALL: [JobState; 9] = [
        JobState::Queued,
        JobState::Processing,
        JobState::Done,
        JobState::Retrying,
        JobState::Dlq,
        JobState::SagaRunning,
        JobState::SagaStepFailed,
        JobState::SagaCompensating,
        JobState::SagaCompensated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Retrying => "retrying",
            JobState::Dlq => "dlq",
            JobState::SagaRunning => "saga_running",
            JobState::SagaStepFailed => "saga_step_failed",
            JobState::SagaCompensating => "saga_compensating",
            JobState::SagaCompensated => "saga_compensated",
        }
    }

    /// `true` once a job has reached `done` or `dlq`; no further transitions are permitted out
    /// of a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Dlq)
    }

    /// Whether moving from `self` to `to` is one of the permitted edges.
    pub fn can_transition(&self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Queued, Processing)
                | (Processing, Done)
                | (Processing, Retrying)
                | (Processing, Dlq)
                | (Retrying, Queued)
                | (SagaRunning, SagaStepFailed)
                | (SagaStepFailed, Retrying)
                | (SagaCompensating, SagaCompensated)
                | (SagaCompensated, Dlq)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized job state: {0}")]
pub struct ParseJobStateError(String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "processing" => Ok(JobState::Processing),
            "done" => Ok(JobState::Done),
            "retrying" => Ok(JobState::Retrying),
            "dlq" => Ok(JobState::Dlq),
            "saga_running" => Ok(JobState::SagaRunning),
            "saga_step_failed" => Ok(JobState::SagaStepFailed),
            "saga_compensating" => Ok(JobState::SagaCompensating),
            "saga_compensated" => Ok(JobState::SagaCompensated),
            other => Err(ParseJobStateError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permitted_edges_match_table() {
        assert!(JobState::Queued.can_transition(JobState::Processing));
        assert!(JobState::Processing.can_transition(JobState::Done));
        assert!(JobState::Processing.can_transition(JobState::Retrying));
        assert!(JobState::Processing.can_transition(JobState::Dlq));
        assert!(JobState::Retrying.can_transition(JobState::Queued));
        assert!(JobState::SagaRunning.can_transition(JobState::SagaStepFailed));
        assert!(JobState::SagaStepFailed.can_transition(JobState::Retrying));
        assert!(JobState::SagaCompensating.can_transition(JobState::SagaCompensated));
        assert!(JobState::SagaCompensated.can_transition(JobState::Dlq));
    }

    #[test]
    fn everything_else_is_rejected() {
        assert!(!JobState::Queued.can_transition(JobState::Done));
        assert!(!JobState::Done.can_transition(JobState::Queued));
        assert!(!JobState::Dlq.can_transition(JobState::Queued));
        assert!(!JobState::Processing.can_transition(JobState::Queued));
    }

    #[test]
    fn only_done_and_dlq_are_terminal() {
        for state in JobState::ALL {
            let expected = matches!(state, JobState::Done | JobState::Dlq);
            assert_eq!(state.is_terminal(), expected, "{state:?}");
        }
    }

    #[test]
    fn round_trips_through_string() {
        for state in JobState::ALL {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
    }

    #[test]
    fn rejects_unknown_string() {
        assert!("bogus".parse::<JobState>().is_err());
    }
}
