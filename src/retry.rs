use std::{fmt::Display, future::Future, time::Duration};

#[allow(unused_imports)]
use log::{info,warn,debug,error};

/// How often to try, how long to wait between tries and how long a single try may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

#[derive(Debug)]
pub enum AttemptError<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: Display> Display for AttemptError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Failed(e) => write!(f, "{}", e),
            AttemptError::TimedOut(d) => write!(f, "timed out after {:?}", d),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            attempt_timeout,
        }
    }

    /// Runs `op` (given the 1-based attempt number) until it returns `Ok` or the budget is
    /// spent, returning the last failure. An attempt running past `attempt_timeout` is dropped.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, AttemptError<E>>
        where
            F: FnMut(u32) -> Fut,
            Fut: Future<Output = Result<T, E>>,
            E: Display,
    {
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => AttemptError::Failed(e),
                Err(_) => AttemptError::TimedOut(self.attempt_timeout),
            };
            info!("attempt {}/{} failed: {}", attempt, self.max_attempts, err);
            if attempt >= self.max_attempts {
                return Err(err);
            }
            tokio::time::sleep(self.backoff).await;
            attempt += 1;
        }
    }
}
