use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use holocene_runtime::Config;
use holocene_server::Daemon;

/// Holocene daemon (holod): plugin runtime, archiving pipeline, and REST
/// surface for the personal knowledge base.
#[derive(Parser, Debug)]
#[command(name = "holod", about = "Holocene knowledge daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the device identifier used for plugin filtering.
    #[arg(long)]
    device: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground (default).
    Start,
    /// Print the daemon's status as JSON.
    Status,
    /// Signal a running daemon to stop.
    Stop,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(device) = cli.device {
        config.device = device;
    }

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => match Daemon::new(config).run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "daemon failed");
                ExitCode::FAILURE
            }
        },
        Commands::Status => {
            let status = Daemon::status(&config);
            println!("{status:#}");
            ExitCode::SUCCESS
        }
        Commands::Stop => {
            if Daemon::stop(&config) {
                println!("stop signal sent");
                ExitCode::SUCCESS
            } else {
                println!("holod is not running");
                ExitCode::FAILURE
            }
        }
    }
}

/// Log to stdout, teed into `holod.log` in the data directory when it can
/// be opened.
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_file = std::fs::create_dir_all(&config.data_dir)
        .ok()
        .and_then(|()| {
            std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(config.log_path())
                .ok()
        });

    match log_file {
        Some(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(std::sync::Arc::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
