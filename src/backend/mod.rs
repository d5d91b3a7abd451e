mod error;
mod gateway;
mod output;
mod runner;

pub use error::{FailureReason, GatewayError};
pub use gateway::ComputeGateway;
pub use output::parse as parse_output;
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};

use std::time::Duration;

use crate::podchaser::Episode;
use crate::transcript::Transcription;

/// Last known state of the remote app. Never persisted, re-probed each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendState {
    #[default]
    Unknown,
    Stopped,
    Starting,
    Ready,
}

/// Result of `ensure_ready`. `Unconfirmed` means the app was deployed but no smoke test
/// passed within the retry budget; callers may proceed, but nothing is guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Unconfirmed,
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    episode: Episode,
    language: String,
    timeout: Duration,
}

impl DispatchRequest {
    pub fn new(episode: Episode, language: impl Into<String>, timeout: Duration) -> Self {
        Self {
            episode,
            language: language.into(),
            timeout,
        }
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(Transcription),
    Failure(FailureReason),
}
