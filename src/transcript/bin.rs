use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
#[allow(unused_imports)]
use log::{debug, error, info, warn};
use podcast_transcriber::{
    backend::{ComputeGateway, ProcessRunner},
    config::Config,
    pipeline::{Pipeline, ShowRequest},
    podchaser::PodchaserClient,
    transcript::TranscriptStore,
};

const EXAMPLES: &str = "\
Examples:
  podscribe \"Super Data Science\" --max-episodes 1
  podscribe \"Taskmaster Podcast\" --max-episodes 3 --filter \"Series 19\"
  podscribe \"What Did You Do Yesterday\" --language en --auto-stop
  podscribe \"Radio Ambulante\" --language es --output-dir spanish_podcasts";

#[derive(Parser, Debug)]
#[command(name = "podscribe", about = "Transcribe podcast episodes on a remote Whisper backend", after_help = EXAMPLES)]
struct Args {
    /// Name of the podcast to search for and transcribe
    podcast_name: String,

    /// Maximum number of episodes to transcribe
    #[arg(short = 'n', long, default_value_t = 5)]
    max_episodes: usize,

    /// Only transcribe episodes whose title contains this text (case-insensitive)
    #[arg(short, long)]
    filter: Option<String>,

    /// Language code for transcription
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Directory for transcript files [default: transcriptions]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Stop the backend app once all episodes are processed
    #[arg(long)]
    auto_stop: bool,

    /// Jobs dispatched in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-episode timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file [default: podscribe.toml if present]
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    podcast_transcriber::init_logging();
    let args = Args::parse();

    match run(args).await {
        Ok(0) => {
            error!("no episodes were successfully transcribed");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<usize, Box<dyn std::error::Error>> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }
    if let Some(c) = args.concurrency {
        config.backend.concurrency = c;
    }
    if let Some(t) = args.timeout {
        config.backend.job_timeout_secs = t;
    }
    debug!("config: {:?}", config);

    let cli = Arc::new(reqwest::Client::new());
    let source = Arc::new(PodchaserClient::new(cli, &config.podchaser)?);
    let gateway = Arc::new(ComputeGateway::new(Arc::new(ProcessRunner), config.backend.clone()));
    let store = Arc::new(TranscriptStore::new(&config.output.dir)?);
    let pipeline = Pipeline::new(source, gateway, store, config.podchaser.scan_limit);

    let cancel = pipeline.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let summary = pipeline
        .process_show(&ShowRequest {
            name: args.podcast_name,
            max_episodes: args.max_episodes,
            filter: args.filter,
            language: args.language,
            auto_stop: args.auto_stop,
        })
        .await?;

    for f in &summary.failures {
        warn!("failed: '{}': {}", f.episode, f.reason);
    }
    if summary.succeeded() > 0 {
        println!("Transcribed {} episode(s) of '{}':", summary.succeeded(), summary.podcast_title);
        for path in &summary.transcripts {
            println!("  {}", path.display());
        }
    }
    Ok(summary.succeeded())
}
