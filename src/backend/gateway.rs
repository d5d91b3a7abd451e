use std::sync::{Arc, Mutex, PoisonError};

#[allow(unused_imports)]
use log::{info,warn,debug,error,trace};

use crate::config::BackendConfig;
use super::{
    output, BackendState, CommandRunner, DispatchRequest, FailureReason, GatewayError, Invocation,
    JobOutcome, Readiness,
};

const STDERR_LOG_LINES: usize = 20;

/// Drives the remote speech-to-text app through its CLI: status probe, deploy, smoke test,
/// per-episode runs and stop.
pub struct ComputeGateway {
    runner: Arc<dyn CommandRunner>,
    config: BackendConfig,
    state: Mutex<BackendState>,
}

impl ComputeGateway {
    pub fn new(runner: Arc<dyn CommandRunner>, config: BackendConfig) -> Self {
        Self {
            runner,
            config,
            state: Mutex::new(BackendState::Unknown),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn state(&self) -> BackendState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: BackendState) {
        debug!("backend state -> {:?}", state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
        where I: IntoIterator<Item = S>, S: Into<String> {
        args.into_iter()
            .fold(Invocation::new(&self.config.program), |inv, a| inv.arg(a))
            .env("PYTHONIOENCODING", "utf-8")
    }

    async fn run_checked(&self, action: &'static str, invocation: Invocation) -> Result<String, GatewayError> {
        let out = self.runner.run(&invocation).await.map_err(|source| GatewayError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        if !out.success() {
            return Err(GatewayError::CommandFailed {
                action,
                status: out.status,
                stderr: out.stderr.trim().to_owned(),
            });
        }
        Ok(out.stdout)
    }

    pub async fn probe(&self) -> BackendState {
        let state = match self.run_checked("status probe", self.invocation(["app", "list"])).await {
            Ok(listing) => app_state(&listing, &self.config.app_name),
            Err(e) => {
                warn!("could not probe backend status: {}", e);
                BackendState::Unknown
            }
        };
        self.set_state(state);
        state
    }

    pub async fn deploy(&self) -> Result<(), GatewayError> {
        let stdout = self.run_checked("deploy", self.invocation(["deploy", self.config.app_path.as_str()])).await?;
        debug!("deploy output:\n{}", stdout);
        Ok(())
    }

    pub async fn stop(&self, app_name: &str) -> Result<(), GatewayError> {
        self.run_checked("stop", self.invocation(["app", "stop", app_name])).await?;
        if app_name == self.config.app_name {
            self.set_state(BackendState::Stopped);
        }
        Ok(())
    }

    /// Makes sure the app is serving, deploying it when the probe says otherwise.
    ///
    /// Only a failed deploy is an error. A smoke test that never passes yields
    /// `Readiness::Unconfirmed`.
    pub async fn ensure_ready(&self) -> Result<Readiness, GatewayError> {
        info!("ensuring backend app '{}' is running", self.config.app_name);
        if self.probe().await == BackendState::Ready {
            info!("backend app is already running");
            return Ok(Readiness::Ready);
        }

        info!("backend app not running, deploying...");
        self.set_state(BackendState::Starting);
        if let Err(e) = self.deploy().await {
            error!("failed to deploy backend app: {}", e);
            self.set_state(BackendState::Unknown);
            return Err(e);
        }

        info!("backend app deployed, waiting {:?} before testing it", self.config.settle_delay());
        tokio::time::sleep(self.config.settle_delay()).await;

        let smoke = self.invocation(["run".to_owned(), self.config.entrypoint_ref()]);
        let runner = &self.runner;
        let smoke = &smoke;
        let res = self.config.readiness.policy()
            .run(|attempt| async move {
                debug!("smoke test attempt {}", attempt);
                match runner.run(smoke).await {
                    Ok(out) if out.success() => Ok(()),
                    Ok(out) => Err(format!("smoke test exited with {:?}", out.status)),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;

        match res {
            Ok(()) => {
                info!("backend app is ready to receive requests");
                self.set_state(BackendState::Ready);
                Ok(Readiness::Ready)
            }
            Err(e) => {
                warn!("backend app may not be fully ready ({}), proceeding anyway", e);
                Ok(Readiness::Unconfirmed)
            }
        }
    }

    /// One transcription job, bounded by the request's timeout. Never fails as a `Result`:
    /// every problem is folded into `JobOutcome::Failure`.
    pub async fn dispatch(&self, request: &DispatchRequest) -> JobOutcome {
        let episode = request.episode();
        let url = match episode.audio_url() {
            Some(url) => url,
            None => {
                error!("no audio URL for episode {}", episode);
                return JobOutcome::Failure(FailureReason::BackendError {
                    status: None,
                    stderr: "episode has no audio URL".to_owned(),
                });
            }
        };

        let mut invocation = self.invocation([
            "run".to_owned(),
            self.config.entrypoint_ref(),
            "--audio-url".to_owned(),
            url.to_owned(),
        ]);
        if !request.language().is_empty() {
            invocation = invocation.arg("--language").arg(request.language());
        }

        info!("transcribing {}", episode);
        debug!("audio url: {}", url);
        let out = match tokio::time::timeout(request.timeout(), self.runner.run(&invocation)).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                error!("could not start transcription for {}: {}", episode, e);
                return JobOutcome::Failure(FailureReason::BackendError {
                    status: None,
                    stderr: e.to_string(),
                });
            }
            Err(_) => {
                error!("transcription timed out after {:?} for {}", request.timeout(), episode);
                return JobOutcome::Failure(FailureReason::Timeout);
            }
        };

        if !out.success() {
            error!("transcription failed with status {:?} for {}", out.status, episode);
            debug!("stdout:\n{}", out.stdout);
            for line in out.stderr.lines().rev().take(STDERR_LOG_LINES).collect::<Vec<_>>().into_iter().rev() {
                error!("stderr: {}", line);
            }
            return JobOutcome::Failure(FailureReason::BackendError {
                status: out.status,
                stderr: out.stderr,
            });
        }

        match output::parse(&out.stdout, &self.config) {
            Some(t) => {
                info!("transcribed {}: {} chars, {} segments", episode, t.text.len(), t.chunks.len());
                JobOutcome::Success(t)
            }
            None => {
                error!("no transcription text found for {}", episode);
                debug!("raw output:\n{}", out.stdout);
                JobOutcome::Failure(FailureReason::NoTranscript)
            }
        }
    }

    /// Stops the app. Failures are logged and swallowed.
    pub async fn teardown(&self) {
        info!("stopping backend app '{}' to free resources", self.config.app_name);
        match self.stop(&self.config.app_name).await {
            Ok(()) => info!("backend app stopped"),
            Err(e) => warn!("could not stop backend app: {}", e),
        }
    }
}

/// Reads the app's state from an `app list` table: a row naming the app and marked
/// `stopped` means stopped, any other row naming it means running.
fn app_state(listing: &str, app_name: &str) -> BackendState {
    let rows: Vec<&str> = listing.lines().filter(|l| l.contains(app_name)).collect();
    if rows.is_empty() || rows.iter().any(|l| l.to_lowercase().contains("stopped")) {
        BackendState::Stopped
    } else {
        BackendState::Ready
    }
}

#[cfg(test)]
mod tests {
    use std::{io, time::Duration};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::backend::CommandOutput;
    use crate::podchaser::Episode;

    type Respond = Box<dyn Fn(&Invocation, usize) -> (Duration, io::Result<CommandOutput>) + Send + Sync>;

    struct FakeRunner {
        calls: Mutex<Vec<Invocation>>,
        respond: Respond,
    }

    impl FakeRunner {
        fn new(respond: impl Fn(&Invocation, usize) -> (Duration, io::Result<CommandOutput>) + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self { calls: Mutex::new(vec![]), respond: Box::new(respond) })
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(invocation.clone());
                calls.len() - 1
            };
            let (delay, res) = (self.respond)(invocation, n);
            tokio::time::sleep(delay).await;
            res
        }
    }

    fn exit(status: i32, stdout: &str) -> (Duration, io::Result<CommandOutput>) {
        (Duration::ZERO, Ok(CommandOutput { status: Some(status), stdout: stdout.to_owned(), stderr: String::new() }))
    }

    fn is(inv: &Invocation, args: &[&str]) -> bool {
        inv.args.iter().map(String::as_str).take(args.len()).eq(args.iter().copied())
    }

    const RUNNING: &str = "│ ap-123 │ example-base-whisper │ deployed │ 0 │\n│ ap-9 │ other │ stopped │ 0 │";
    const STOPPED: &str = "│ ap-123 │ example-base-whisper │ stopped │ 0 │";
    const RESULT: &str = "TRANSCRIPTION RESULT:\n=====\nhello world\n";

    fn gateway(runner: Arc<FakeRunner>) -> ComputeGateway {
        ComputeGateway::new(runner, BackendConfig::default())
    }

    fn request(timeout: Duration) -> DispatchRequest {
        DispatchRequest::new(Episode::new("Ep1", Some("2024-01-02"), Some("http://a/ep1.mp3")), "es", timeout)
    }

    #[test]
    fn reads_app_listing() {
        assert_eq!(app_state(RUNNING, "example-base-whisper"), BackendState::Ready);
        assert_eq!(app_state(STOPPED, "example-base-whisper"), BackendState::Stopped);
        assert_eq!(app_state("", "example-base-whisper"), BackendState::Stopped);
        assert_eq!(app_state("│ x │ Stopped │", "x"), BackendState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn running_app_is_fast_path() {
        let runner = FakeRunner::new(|_, _| exit(0, RUNNING));
        let gw = gateway(runner.clone());
        let start = Instant::now();
        assert_eq!(gw.ensure_ready().await.unwrap(), Readiness::Ready);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(gw.state(), BackendState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_start_polls_until_smoke_test_passes() {
        let runner = FakeRunner::new(|inv, n| {
            if is(inv, &["app", "list"]) {
                exit(0, STOPPED)
            } else if is(inv, &["deploy"]) {
                exit(0, "deployed")
            } else if n < 4 {
                exit(1, "")
            } else {
                exit(0, RESULT)
            }
        });
        let gw = gateway(runner.clone());
        let start = Instant::now();
        assert_eq!(gw.ensure_ready().await.unwrap(), Readiness::Ready);
        assert_eq!(start.elapsed(), Duration::from_secs(10 + 2 * 5));

        let calls = runner.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[1].args, ["deploy", "src/podcast_transcription/modal_client.py"]);
        assert_eq!(calls[4].args, ["run", "src/podcast_transcription/modal_client.py::main"]);
        assert!(calls.iter().all(|c| c.env.contains(&("PYTHONIOENCODING".to_owned(), "utf-8".to_owned()))));
        assert_eq!(gw.state(), BackendState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_smoke_test_is_unconfirmed() {
        let runner = FakeRunner::new(|inv, _| {
            if is(inv, &["run"]) {
                // hangs past the per-attempt timeout
                (Duration::from_secs(3600), Ok(CommandOutput::default()))
            } else if is(inv, &["app", "list"]) {
                exit(0, "")
            } else {
                exit(0, "")
            }
        });
        let gw = gateway(runner.clone());
        let start = Instant::now();
        assert_eq!(gw.ensure_ready().await.unwrap(), Readiness::Unconfirmed);
        assert_eq!(start.elapsed(), Duration::from_secs(10 + 3 * 60 + 2 * 5));
        assert_eq!(runner.calls().len(), 2 + 3);
        assert_eq!(gw.state(), BackendState::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_deploy_is_fatal() {
        let runner = FakeRunner::new(|inv, _| {
            if is(inv, &["deploy"]) {
                (Duration::ZERO, Ok(CommandOutput { status: Some(1), stdout: String::new(), stderr: "no token".into() }))
            } else {
                exit(0, STOPPED)
            }
        });
        let gw = gateway(runner.clone());
        match gw.ensure_ready().await {
            Err(GatewayError::CommandFailed { action, stderr, .. }) => {
                assert_eq!(action, "deploy");
                assert_eq!(stderr, "no token");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_probe_still_deploys() {
        let runner = FakeRunner::new(|inv, _| {
            if is(inv, &["app", "list"]) {
                (Duration::ZERO, Err(io::Error::new(io::ErrorKind::NotFound, "modal")))
            } else {
                exit(0, RESULT)
            }
        });
        let gw = gateway(runner.clone());
        assert_eq!(gw.ensure_ready().await.unwrap(), Readiness::Ready);
        assert!(is(&runner.calls()[1], &["deploy"]));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_passes_parameters() {
        let runner = FakeRunner::new(|_, _| exit(0, RESULT));
        let gw = gateway(runner.clone());
        let outcome = gw.dispatch(&request(Duration::from_secs(3600))).await;
        assert_eq!(
            outcome,
            JobOutcome::Success(crate::transcript::Transcription { text: "hello world".into(), chunks: vec![] })
        );
        assert_eq!(
            runner.calls()[0].args,
            ["run", "src/podcast_transcription/modal_client.py::main", "--audio-url", "http://a/ep1.mp3", "--language", "es"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_failures() {
        let gw = gateway(FakeRunner::new(|_, _| {
            (Duration::ZERO, Ok(CommandOutput { status: Some(2), stdout: RESULT.into(), stderr: "boom".into() }))
        }));
        assert_eq!(
            gw.dispatch(&request(Duration::from_secs(5))).await,
            JobOutcome::Failure(FailureReason::BackendError { status: Some(2), stderr: "boom".into() })
        );

        let gw = gateway(FakeRunner::new(|_, _| exit(0, "App completed.\n")));
        assert_eq!(gw.dispatch(&request(Duration::from_secs(5))).await, JobOutcome::Failure(FailureReason::NoTranscript));

        let gw = gateway(FakeRunner::new(|_, _| (Duration::from_secs(10), Ok(CommandOutput::default()))));
        let start = Instant::now();
        assert_eq!(gw.dispatch(&request(Duration::from_secs(5))).await, JobOutcome::Failure(FailureReason::Timeout));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_swallows_errors() {
        let runner = FakeRunner::new(|_, _| (Duration::ZERO, Err(io::Error::new(io::ErrorKind::Other, "gone"))));
        let gw = gateway(runner.clone());
        gw.teardown().await;
        assert_eq!(runner.calls()[0].args, ["app", "stop", "example-base-whisper"]);
        assert_eq!(gw.state(), BackendState::Unknown);

        let gw = gateway(FakeRunner::new(|_, _| exit(0, "")));
        gw.teardown().await;
        assert_eq!(gw.state(), BackendState::Stopped);
    }
}
