// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use vidqueue::client::watch::{describe_error, render_status, Watcher};
use vidqueue::client::{ClientError, QueueClient};
use vidqueue::config::{self, Config};
use vidqueue::error::{ErrorBuilder, HELP_HINT};
use vidqueue::queue::{NewJob, QueueManager};
use vidqueue::server::Server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Data error - the server rejected the request
    pub const DATA_ERR: i32 = 65;
    /// Service unavailable - the vidqueue server is not reachable
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Configuration error - invalid or unreadable config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn finish_success(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        println!("\x1b[32m[OK]\x1b[0m {}", message);
    }

    pub fn finish_error(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        eprintln!("\x1b[31m[X]\x1b[0m {}", message);
    }
}

/// vidqueue - single-worker media download queue.
#[derive(Parser)]
#[command(name = "vidqueue")]
#[command(version = VERSION)]
#[command(about = "Single-worker media download queue backed by yt-dlp.")]
#[command(long_about = "vidqueue - single-worker media download queue\n\n\
    Start the server:    vidqueue\n\
    Queue a video:       vidqueue add <URL>\n\
    Follow progress:     vidqueue watch\n\
    Check status:        vidqueue status\n\
    Configure:           vidqueue config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Server URL for client commands (defaults to the configured bind address and port)
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the download worker (default)
    ///
    /// Examples:
    ///   vidqueue serve
    ///   vidqueue serve --port 8100 --download-dir ~/Videos
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind (0.0.0.0 exposes the API to the network)
        #[arg(long)]
        bind: Option<IpAddr>,
        /// Directory yt-dlp writes into
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
    },

    /// Add a download to the queue
    ///
    /// Examples:
    ///   vidqueue add https://example.com/watch?v=1
    ///   vidqueue add https://example.com/v --audio --title "Talk"
    Add {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Download right away, bypassing the queue
    Download {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Remove a pending job by id
    Remove {
        /// Job id as shown by `vidqueue status`
        id: String,
    },

    /// Remove every pending job (the current download keeps running)
    Clear,

    /// Forget finished jobs
    ClearHistory,

    /// Show the queue
    #[command(alias = "s")]
    Status {
        /// Print the raw JSON snapshot
        #[arg(long)]
        json: bool,
    },

    /// Follow the queue, printing a line for every change
    Watch {
        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List files in the server's download directory
    Files,

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args)]
struct JobArgs {
    /// Media URL
    url: String,
    /// Display title (looked up with yt-dlp when omitted)
    #[arg(short, long)]
    title: Option<String>,
    /// Page the media is embedded in
    #[arg(short, long)]
    referer: Option<String>,
    /// Extract audio as mp3 instead of downloading video
    #[arg(short, long)]
    audio: bool,
}

impl JobArgs {
    fn into_job(self) -> NewJob {
        let mut job = NewJob::new(self.url);
        if let Some(title) = self.title {
            job = job.with_title(title);
        }
        if let Some(referer) = self.referer {
            job = job.with_referer(referer);
        }
        if self.audio {
            job = job.audio();
        }
        job
    }
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "[✗]".red(), e);
            eprintln!("    Fix the file or run `vidqueue config init --force`.");
            std::process::exit(CONFIG);
        }
    };

    let code = match run(cli, config) {
        Ok(()) => SUCCESS,
        Err(e) => report(&e),
    };
    std::process::exit(code);
}

fn run(cli: Cli, config: Config) -> Result<()> {
    let server_url = cli.server.clone().unwrap_or_else(|| config.server_url());
    let client = QueueClient::new(server_url);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        bind: None,
        download_dir: None,
    }) {
        Commands::Serve {
            port,
            bind,
            download_dir,
        } => runtime.block_on(serve(config.with_overrides(port, bind, download_dir))),
        Commands::Add { job } => runtime.block_on(add(&client, job.into_job())),
        Commands::Download { job } => runtime.block_on(download(&client, job.into_job())),
        Commands::Remove { id } => runtime.block_on(remove(&client, &id)),
        Commands::Clear => runtime.block_on(clear(&client, false)),
        Commands::ClearHistory => runtime.block_on(clear(&client, true)),
        Commands::Status { json } => runtime.block_on(status(&client, json)),
        Commands::Watch { interval } => {
            let interval = interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.watch_interval());
            runtime.block_on(watch(client, interval))
        }
        Commands::Files => runtime.block_on(files(&client)),
        Commands::Config { command } => handle_config(command.unwrap_or(ConfigCommands::Show), &config),
    }
}

async fn serve(config: Config) -> Result<()> {
    println!(
        "{} vidqueue {} on {}",
        "[✓]".green(),
        VERSION,
        config.server_url().cyan()
    );

    let manager = Arc::new(QueueManager::start(
        config.queue_options(),
        Arc::new(config.fetcher()),
    ));

    Server::new(manager, config.port)
        .with_bind_address(config.bind)
        .with_download_dir(&config.download_dir)
        .start()
        .await
}

async fn add(client: &QueueClient, job: NewJob) -> Result<()> {
    let response = client.add(&job).await?;
    println!("{} {}", "[✓]".green(), response.message);
    println!("    id: {}", response.id.dimmed());
    Ok(())
}

async fn download(client: &QueueClient, job: NewJob) -> Result<()> {
    let spinner = spinner::create(&format!("Downloading {}", job.video_url));

    match client.download(&job).await {
        Ok(response) => {
            let message = match &response.destination {
                Some(path) => format!("Saved {}", path),
                None => "Download finished".to_string(),
            };
            spinner::finish_success(&spinner, &message);
            Ok(())
        }
        Err(e) => {
            spinner::finish_error(&spinner, "Download failed");
            if let ClientError::Rejected {
                output: Some(output),
                ..
            } = &e
            {
                eprintln!("{}", output.dimmed());
            }
            Err(e.into())
        }
    }
}

async fn remove(client: &QueueClient, id: &str) -> Result<()> {
    let response = client.remove(id).await?;
    if response.removed {
        println!("{} Removed {}", "[✓]".green(), id);
    } else {
        println!("{} {} is not pending; nothing removed", "[!]".yellow(), id);
    }
    Ok(())
}

async fn clear(client: &QueueClient, history: bool) -> Result<()> {
    let response = if history {
        client.clear_history().await?
    } else {
        client.clear_queue().await?
    };
    println!("{} {}", "[✓]".green(), response.message);
    Ok(())
}

async fn status(client: &QueueClient, json: bool) -> Result<()> {
    let snapshot = client.status().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", render_status(&snapshot));
    }
    Ok(())
}

async fn watch(client: QueueClient, interval: Duration) -> Result<()> {
    let mut watcher = Watcher::new(client, interval);
    tokio::select! {
        _ = watcher.run(|line| println!("{}", line)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

async fn files(client: &QueueClient) -> Result<()> {
    let files = client.files().await?;
    if files.is_empty() {
        println!("No files downloaded yet.");
        return Ok(());
    }
    for file in files {
        let modified = file
            .modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{:>10}  {}  {}", format_size(file.size), modified.dimmed(), file.name);
    }
    Ok(())
}

fn handle_config(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            println!("{}", config::config_path()?.display());
        }
        ConfigCommands::Init { force } => {
            let path = config::config_path()?;
            if path.exists() && !force {
                println!(
                    "{} {} already exists (use --force to overwrite)",
                    "[!]".yellow(),
                    path.display()
                );
                return Ok(());
            }
            config::save_config(&Config::default())?;
            println!("{} Wrote {}", "[✓]".green(), path.display());
        }
    }
    Ok(())
}

/// Print a failure and pick the exit code.
fn report(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ClientError>() {
        Some(e @ ClientError::Connectivity { url, .. }) => {
            let message = ErrorBuilder::new(format!("Cannot reach vidqueue server at {}", url))
                .cause(e.to_string())
                .cause("The server is not running or listens on another port")
                .fix("Start it with: vidqueue serve")
                .fix("Or point the client elsewhere: vidqueue --server http://HOST:PORT status")
                .build();
            eprintln!("{}", message);
            SERVICE_UNAVAILABLE
        }
        Some(e @ ClientError::Rejected { .. }) => {
            eprintln!("{} {}", "[✗]".red(), describe_error(e));
            DATA_ERR
        }
        _ => {
            eprintln!("{} {:#}", "[✗]".red(), error);
            eprintln!("    {}", HELP_HINT);
            ERROR
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_job_args_into_job() {
        let args = JobArgs {
            url: "https://example.com/v".into(),
            title: Some("Talk".into()),
            referer: None,
            audio: true,
        };
        let job = args.into_job();
        assert_eq!(job.title.as_deref(), Some("Talk"));
        assert_eq!(job.download_type, vidqueue::queue::DownloadType::Audio);
    }

    #[test]
    fn test_cli_parses_default_and_subcommands() {
        let cli = Cli::try_parse_from(["vidqueue"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["vidqueue", "--server", "http://h:1", "status", "--json"]).unwrap();
        assert_eq!(cli.server.as_deref(), Some("http://h:1"));
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));

        assert!(Cli::try_parse_from(["vidqueue", "-v", "-q"]).is_err());
    }
}
