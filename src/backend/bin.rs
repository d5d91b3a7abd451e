use std::{path::{Path, PathBuf}, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
#[allow(unused_imports)]
use log::{debug, error, info, warn};
use podcast_transcriber::{
    backend::{ComputeGateway, ProcessRunner},
    config::Config,
};

#[derive(Parser, Debug)]
#[command(name = "podscribe-backend", about = "Manage the remote transcription app")]
struct Args {
    /// Config file [default: podscribe.toml if present]
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy the app and show its state afterwards
    Deploy,
    /// Show whether the app is running
    Status,
    /// Stop an app (the configured one by default) so it stops costing money
    Stop {
        app: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    podcast_transcriber::init_logging();
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args.config.as_deref())?;
    let gateway = ComputeGateway::new(Arc::new(ProcessRunner), config.backend.clone());
    let app = config.backend.app_name.as_str();

    match args.command {
        Command::Deploy => {
            if !Path::new(&config.backend.app_path).exists() {
                return Err(format!("backend app not found at {}", config.backend.app_path).into());
            }
            info!("deploying {}", config.backend.app_path);
            gateway.deploy().await?;
            println!("{}: {:?}", app, gateway.probe().await);
        }
        Command::Status => {
            println!("{}: {:?}", app, gateway.probe().await);
        }
        Command::Stop { app: target } => {
            let target = target.as_deref().unwrap_or(app);
            gateway.stop(target).await?;
            println!("stopped {}", target);
        }
    }
    Ok(())
}
