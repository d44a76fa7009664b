//! A small CLI front end for the recovery engine. Argument parsing, logging
//! setup, and token acquisition live here — the library itself only consumes
//! an already-built `RecoveryConfig` (§6: these are external collaborators).

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use colored::Colorize;
use dangling_recovery::cancel::CancellationToken;
use dangling_recovery::config::{RecoveryConfig, Server as RecoveryServer, Verbosity};
use dangling_recovery::orchestrator;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServerArg {
    Github,
    Gitlab,
    AzureDevops,
}

impl From<ServerArg> for RecoveryServer {
    fn from(value: ServerArg) -> Self {
        match value {
            ServerArg::Github => RecoveryServer::GitHub,
            ServerArg::Gitlab => RecoveryServer::GitLab,
            ServerArg::AzureDevops => RecoveryServer::AzureDevOps,
        }
    }
}

/// Recovers dangling git objects from a remote forge into the local repository.
#[derive(Debug, Parser)]
#[command(name = "dangling-recovery", group(ArgGroup::new("verbosity").args(["debug", "quiet"])))]
struct Cli {
    /// Path to the local git repository.
    #[arg(long, default_value = ".")]
    git_dir: PathBuf,

    /// Forge dialect; inferred from the origin remote's host when omitted.
    #[arg(long, value_enum)]
    server: Option<ServerArg>,

    /// Emit dangling_objects.json in the working directory.
    #[arg(long)]
    save: bool,

    /// Forge auth token, overriding GITHUB_TOKEN/gh auth token/GITLAB_TOKEN.
    #[arg(long)]
    token: Option<String>,

    #[arg(short, long)]
    debug: bool,

    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbosity: Verbosity) {
    let default_level = match verbosity {
        Verbosity::Debug => "debug",
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbosity = if cli.debug {
        Verbosity::Debug
    } else if cli.quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Normal
    };
    init_logging(verbosity);

    let config = RecoveryConfig {
        git_dir: cli.git_dir,
        server: cli.server.map(RecoveryServer::from),
        save_summary: cli.save,
        verbosity,
        token: cli.token,
        ..RecoveryConfig::default()
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    match orchestrator::run(&config, &cancel).await {
        Ok(summary) => {
            println!(
                "{} {} commits, {} trees, {} blobs recovered ({} forged, {} erased, {} dangling branches)",
                "recovered:".green().bold(),
                summary.recovered_commits,
                summary.recovered_trees,
                summary.recovered_blobs,
                summary.forged_commits,
                summary.erased_commits,
                summary.dangling_branches,
            );
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}
