use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use reqwest::Url;
use tokio::sync::mpsc;

mod engine;
mod env;
mod error;
mod installer;
mod networking;
mod process;
mod storage;
mod util;

use engine::UpdateOrchestrator;
use engine::state::UpdateState;
use env::InstallLayout;
use error::LauncherResult;
use installer::PayloadInstaller;
use installer::external::HeadlessInstaller;
use networking::{NetworkClient, RemoteManifestClient};
use process::LaunchSupervisor;
use storage::{JsonFileStore, VersionStore};

const DEFAULT_MANIFEST_URL: &str = "https://raw.githubusercontent.com/grivhar/industricraft.github.io/refs/heads/main/launcher_update/manifest.json";

#[derive(Parser, Debug)]
#[command(
    name = "Industricraft Launcher",
    author,
    version,
    about = "Self-updating launcher for the Industricraft modded Minecraft pack"
)]
struct Cli {
    /// Installation directory; defaults to the per-user data directory.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Location of the update manifest (https:// or file://).
    #[arg(long, default_value = DEFAULT_MANIFEST_URL)]
    manifest_url: Url,

    /// Player name passed to the game; falls back to the saved one.
    #[arg(long)]
    username: Option<String>,

    /// Report pending updates and exit without installing.
    #[arg(long)]
    check_only: bool,

    /// Exit immediately on fatal errors instead of waiting for Enter.
    #[arg(long)]
    no_pause: bool,

    /// Print launcher version and exit.
    #[arg(long)]
    version_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.version_only {
        println!("Industricraft Launcher {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal: {err}");
            eprintln!("Error: {err}");
            if !cli.no_pause {
                wait_for_enter();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> LauncherResult<()> {
    let layout = cli
        .base_dir
        .clone()
        .map(InstallLayout::new)
        .unwrap_or_default();
    layout.ensure_base_dirs().map_err(|source| error::LauncherError::Config {
        path: layout.root().to_path_buf(),
        source,
    })?;
    info!("launcher: base directory {}", layout.root().display());

    let store = JsonFileStore::new(layout.root());
    let mut config = store.load()?;
    info!("launcher: config {}", store.path().display());

    let network = NetworkClient::new();
    let orchestrator = UpdateOrchestrator::new(
        store,
        RemoteManifestClient::new(network.clone(), cli.manifest_url.clone()),
        PayloadInstaller::new(network, layout.staging_dir(), HeadlessInstaller::default()),
        layout.clone(),
    );

    if cli.check_only {
        let plan = orchestrator.preview(&config).await?;
        if plan.is_empty() {
            println!("{}", UpdateState::UpToDate);
        } else {
            println!(
                "{}",
                UpdateState::PlanReady {
                    components: plan.components().to_vec(),
                }
            );
        }
        return Ok(());
    }

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(state) = updates_rx.recv().await {
            println!("{state}");
        }
    });

    let outcome = if config.first_launch {
        println!("First launch: installing Industricraft...");
        orchestrator.first_time_setup(&mut config, &updates_tx).await
    } else {
        orchestrator.check_and_update(&mut config, &updates_tx).await
    };
    drop(updates_tx);
    printer.await.ok();
    let outcome = outcome?;

    if outcome.restart_required() {
        let _ = io::stdout().flush();
        match process::restart()? {}
    }

    let username = cli
        .username
        .clone()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| Some(config.username.clone()).filter(|name| !name.trim().is_empty()));
    let Some(username) = username else {
        println!("Ready to launch. Pass --username <name> to start the game.");
        return Ok(());
    };

    LaunchSupervisor::new(layout).launch(orchestrator.store(), &mut config, &username)?;
    println!("Game started for {username}.");
    Ok(())
}

fn wait_for_enter() {
    eprint!("Press Enter to exit...");
    let _ = io::stderr().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_published_manifest() {
        let cli = Cli::try_parse_from(["launcher"]).unwrap();
        assert_eq!(cli.manifest_url.as_str(), DEFAULT_MANIFEST_URL);
        assert!(cli.base_dir.is_none());
        assert!(!cli.check_only);
    }

    #[test]
    fn cli_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "launcher",
            "--base-dir",
            "/tmp/ic",
            "--manifest-url",
            "file:///srv/mirror/manifest.json",
            "--username",
            "Steve",
            "--no-pause",
        ])
        .unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/ic")));
        assert_eq!(cli.manifest_url.scheme(), "file");
        assert_eq!(cli.username.as_deref(), Some("Steve"));
        assert!(cli.no_pause);
    }
}
