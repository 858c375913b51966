//! Job status state machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a compression job.
///
/// The only success path is
/// `Queued -> Processing -> Compressing -> Finalizing -> Done`.
/// `Error` is reachable from any non-terminal state. `Done` and `Error` are
/// terminal and reject every further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Uploaded and priced, awaiting payment confirmation
    #[default]
    Queued,
    /// Paid; probing and preparing the encode
    Processing,
    /// Main encode loop running
    Compressing,
    /// Container remux and output validation
    Finalizing,
    /// Output verified, download available
    Done,
    /// Terminal failure
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Compressing => "compressing",
            JobStatus::Finalizing => "finalizing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Self-transitions are allowed on non-terminal states so that progress
    /// ticks within a stage can reuse the same update path.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        match (self, next) {
            (_, Error) => true,
            (Queued, Processing) => true,
            (Processing, Compressing) => true,
            (Compressing, Finalizing) => true,
            (Finalizing, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
