/// Failures that stop a run. Per-job problems are reported as `FailureReason` instead.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{action} failed with status {status:?}: {stderr}")]
    CommandFailed {
        action: &'static str,
        status: Option<i32>,
        stderr: String,
    },
}

/// Why a single job produced no transcript. The run carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("timeout")]
    Timeout,
    #[error("backend error")]
    BackendError {
        status: Option<i32>,
        stderr: String,
    },
    #[error("no transcript found")]
    NoTranscript,
    #[error("cancelled")]
    Cancelled,
}
