use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use console::style;

use yeti_session::config::{AppConfig, StorageBackend};
use yeti_session::logging::{self, TerminalProgress};
use yeti_session::session::{
    self, model::mask_token, Credentials, Endpoints, FileSettingsStore, Outcome,
    SessionOrchestrator, SettingsStore, YetiClient,
};

#[derive(Parser)]
#[command(name = "yeti-session")]
#[command(about = "Sign in to Yettel TV and keep the session fresh", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "YETI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store credentials if given and make sure a valid session exists
    Login {
        #[arg(short, long, env = "YETI_USERNAME")]
        username: Option<String>,
        #[arg(short, long, env = "YETI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Show persisted state
    Status,
    /// Print the current KS token
    Token,
    /// List devices registered to the household
    Devices,
    /// Remove a device from the household
    RemoveDevice { udid: String },
    /// Register a new device id and retire the current one
    RotateDevice,
    /// Forget tokens, keep credentials and device id
    Reset,
    /// Forget everything
    Logout,
    /// Print the effective configuration
    Config,
}

type Orchestrator = SessionOrchestrator<YetiClient, Arc<dyn SettingsStore>>;

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SettingsStore>> {
    match config.storage.backend {
        StorageBackend::File => {
            let path = match &config.storage.path {
                Some(path) => path.clone(),
                None => FileSettingsStore::default_path()?,
            };
            Ok(Arc::new(FileSettingsStore::new(path)?))
        }
        #[cfg(feature = "keyring")]
        StorageBackend::Keyring => {
            use yeti_session::session::storage::KeyringSettingsStore;
            if !KeyringSettingsStore::is_available() {
                bail!("no keyring backend is available on this machine");
            }
            Ok(Arc::new(KeyringSettingsStore::default()))
        }
        #[cfg(not(feature = "keyring"))]
        StorageBackend::Keyring => {
            bail!("storage.backend = \"keyring\" needs a build with the `keyring` feature")
        }
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let endpoints = Endpoints::resolve_with(&config.endpoints)?;
    let store = open_store(config)?;
    let orchestrator = session::connect(
        endpoints,
        config.profile.clone(),
        config.http.timeout(),
        store,
    )
    .await?;
    Ok(orchestrator)
}

fn format_ts(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => ts.to_string(),
    }
}

fn expiry_line(label: &str, expires_at: Option<i64>, now: i64) {
    match expires_at {
        Some(ts) if ts > now => println!("{label:<14} valid until {}", format_ts(ts)),
        Some(ts) => println!(
            "{label:<14} {} since {}",
            style("expired").yellow(),
            format_ts(ts)
        ),
        None => println!("{label:<14} {}", style("none").dim()),
    }
}

async fn login(
    orchestrator: Orchestrator,
    username: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    match (username, password) {
        (Some(username), Some(password)) => {
            orchestrator
                .state()
                .save_credentials(&Credentials::new(username, password))
                .await?;
        }
        (None, None) => {}
        _ => bail!("--username and --password must be given together"),
    }

    let orchestrator = orchestrator.with_progress(Arc::new(TerminalProgress::new()));
    let outcome = orchestrator.ensure_authenticated().await;
    drop(orchestrator);

    match outcome.context("sign-in failed")? {
        Outcome::MissingCredentials => {
            bail!("no credentials stored; run `yeti-session login --username U --password P`")
        }
        Outcome::AlreadyValid => println!("Session is still valid"),
        Outcome::Refreshed => println!("Session refreshed"),
        Outcome::Escalated => println!("Signed in"),
        Outcome::Recovered { refresh } => {
            println!("Signed in again (session refresh failed: {refresh:?})")
        }
    }
    Ok(())
}

async fn status(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let state = orchestrator.state();
    let summary = state.summary().await?;
    let now = Utc::now().timestamp();

    println!(
        "{:<14} {}",
        "credentials",
        if summary.has_credentials { "stored" } else { "none" }
    );
    println!(
        "{:<14} {}",
        "device",
        summary.device_id.as_deref().unwrap_or("none")
    );
    expiry_line("oauth", summary.oauth_expires_at, now);
    expiry_line("session", summary.session_expires_at, now);
    if let Some(ks) = orchestrator.current_ks_token().await? {
        println!("{:<14} {}", "ks token", mask_token(&ks));
    }
    match summary.household {
        Some(binding) => println!(
            "{:<14} {} (user {})",
            "household", binding.household_id, binding.user_id
        ),
        None => println!("{:<14} none", "household"),
    }
    Ok(())
}

async fn devices(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let own = orchestrator.state().device_identity().await?;
    let devices = orchestrator.list_devices().await?;
    if devices.is_empty() {
        println!("No devices registered");
        return Ok(());
    }
    for device in devices {
        let marker = if own.as_ref().map(|d| d.as_str()) == Some(device.udid.as_str()) {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        let activated = device.activated_on.map(format_ts).unwrap_or_default();
        println!(
            "{marker} {:<18} {:<24} {:<12} {activated}",
            device.udid,
            device.name,
            device.state.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    let _log_guard = logging::init(&config.logging);
    tracing::debug!(version = yeti_session::VERSION, "starting");

    if let Command::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let orchestrator = connect(&config).await?;

    match cli.command {
        Command::Login { username, password } => login(orchestrator, username, password).await?,
        Command::Status => status(&orchestrator).await?,
        Command::Token => {
            orchestrator.require_session().await?;
            match orchestrator.current_ks_token().await? {
                Some(ks) => println!("{ks}"),
                None => bail!("no session"),
            }
        }
        Command::Devices => devices(&orchestrator).await?,
        Command::RemoveDevice { udid } => {
            orchestrator.remove_device(&udid).await?;
            println!("Removed {udid}");
        }
        Command::RotateDevice => {
            let device = orchestrator.rotate_device().await?;
            println!("Now registered as {device}");
        }
        Command::Reset => {
            orchestrator.reset_session().await?;
            println!("Session cleared");
        }
        Command::Logout => {
            orchestrator.logout().await?;
            println!("Logged out");
        }
        Command::Config => {}
    }
    Ok(())
}
