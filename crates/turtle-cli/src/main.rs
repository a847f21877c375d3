use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::io::{self, BufRead};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use turtle_core::audio::output::create_output;
use turtle_core::{
    Coach, GeminiClient, Mode, ModeChange, PlaybackController, PlaybackState, Screen,
};
use turtle_store::{DayStatus, Gender, ProfileStore, StateDb};

mod config;

use config::TurtleConfig;

#[derive(Parser)]
#[command(name = "turtle")]
#[command(version)]
#[command(about = "Sprint & Turtle - one small step a day")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Show the active profile and current screen
    Status,

    /// List profiles
    Profiles,

    /// Create a profile and get its first step
    Create {
        /// Your name
        name: String,
        /// The goal you are walking towards
        goal: String,
        /// male or female; selects the narration voice
        #[arg(short, long, default_value = "female")]
        gender: Gender,
    },

    /// Make a profile active
    Select {
        /// Profile id
        id: String,
    },

    /// Leave the active profile
    Home,

    /// Delete a profile and its history
    Delete {
        /// Profile id
        id: String,
    },

    /// Show today's message, step and inspiration
    Today,

    /// Record how today went: minimum, partial, failed-returned or none
    CheckIn {
        status: DayStatus,
    },

    /// Ask for a new step, optionally switching mode
    Refresh {
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Show check-in history
    History {
        /// Erase the active profile's history
        #[arg(long)]
        clear: bool,
    },

    /// Biographies of self-made people
    Bios,

    /// Read today's step aloud (p = pause/resume, s = stop)
    Speak,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Turtle,
    Sprint,
    Chaos,
}

impl From<ModeArg> for ModeChange {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Turtle => ModeChange::Turtle,
            ModeArg::Sprint => ModeChange::Sprint,
            ModeArg::Chaos => ModeChange::Chaos,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        command => {
            let cfg = TurtleConfig::load(&cli.config)?;
            run(&cfg, command).await
        }
    }
}

async fn run(cfg: &TurtleConfig, command: Commands) -> Result<()> {
    let gemini = Arc::new(gemini_client(cfg)?);
    let mut coach = open_coach(cfg, gemini.clone()).await?;

    match command {
        Commands::Status => cmd_status(&coach),
        Commands::Profiles => cmd_profiles(&coach),
        Commands::Create { name, goal, gender } => {
            let profile = coach.create_profile(&name, &goal, gender).await?;
            println!("Created profile {} ({})", profile.user_name, profile.id);
            cmd_today(&coach)
        }
        Commands::Select { id } => {
            coach.select_profile(&id).await?;
            cmd_today(&coach)
        }
        Commands::Home => {
            coach.go_home().await?;
            cmd_profiles(&coach)
        }
        Commands::Delete { id } => {
            let removed = coach.delete_profile(&id).await?;
            println!("Deleted {} and {} check-ins", removed.user_name, removed.history.len());
            Ok(())
        }
        Commands::Today => cmd_today(&coach),
        Commands::CheckIn { status } => {
            let entry = coach.check_in(status).await?;
            println!("Recorded '{}' for: {}", entry.status, entry.step);
            cmd_today(&coach)
        }
        Commands::Refresh { mode } => {
            let change = mode.map(ModeChange::from).unwrap_or(ModeChange::Keep);
            coach.refresh_plan(change).await?;
            cmd_today(&coach)
        }
        Commands::History { clear } => {
            if clear {
                coach.clear_history().await?;
                println!("History cleared");
                return Ok(());
            }
            cmd_history(&mut coach)
        }
        Commands::Bios => {
            for bio in coach.load_biographies().await? {
                println!("{}\n  «{}»\n  {}\n  Инструменты: {}\n", bio.person, bio.quote, bio.bio, bio.tools);
            }
            Ok(())
        }
        Commands::Speak => cmd_speak(cfg, &coach, gemini).await,
        Commands::Init | Commands::Config => Err(anyhow!("command does not open the profile store")),
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Sprint & Turtle initialized at {}", config_dir.display());
    println!("Set GEMINI_API_KEY or edit {} to add your key.", config_path.display());
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TurtleConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn gemini_client(cfg: &TurtleConfig) -> Result<GeminiClient> {
    if cfg.gemini.api_key.is_empty() {
        warn!("No Gemini API key configured; set GEMINI_API_KEY before asking the coach");
    }
    Ok(GeminiClient::new(
        cfg.gemini.api_key.clone(),
        Duration::from_secs(cfg.gemini.timeout_secs),
    )?
    .with_base_url(cfg.gemini.base_url.clone())
    .with_text_model(cfg.gemini.text_model.clone())
    .with_speech_model(cfg.gemini.speech_model.clone()))
}

async fn open_coach(cfg: &TurtleConfig, gemini: Arc<GeminiClient>) -> Result<Coach> {
    let db_path = shellexpand(&cfg.storage.db_path);
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
    }
    let db = StateDb::open(&db_path)?;
    let store = ProfileStore::load(db).await?;
    Ok(Coach::new(store, gemini))
}

fn cmd_status(coach: &Coach) -> Result<()> {
    println!("Screen: {}", coach.view().screen());
    match coach.active() {
        Some(p) => {
            println!("Active: {} ({})", p.user_name, p.id);
            println!("Goal:   {}", p.main_goal);
            println!("Mode:   {}", Mode::of(p));
            println!("Today:  {}", if p.completed_today() { "done" } else { "open" });
            println!("Days:   {}", p.history.len());
        }
        None => println!("No active profile"),
    }
    Ok(())
}

fn cmd_profiles(coach: &Coach) -> Result<()> {
    let active_id = coach.active().map(|p| p.id.as_str());
    if coach.store().profiles().is_empty() {
        println!("No profiles yet. Create one with `turtle create <name> <goal>`.");
    }
    for p in coach.store().profiles() {
        let marker = if Some(p.id.as_str()) == active_id { "*" } else { " " };
        println!("{} {}  {} - {} ({} days)", marker, p.id, p.user_name, p.main_goal, p.history.len());
    }
    Ok(())
}

fn cmd_today(coach: &Coach) -> Result<()> {
    let profile = coach
        .active()
        .ok_or_else(|| anyhow!("No active profile. Use `turtle select <id>` or `turtle create`."))?;

    println!("{}  [{} mode]\n", profile.user_name, Mode::of(profile));
    println!("{}", profile.current_message);
    if profile.completed_today() {
        println!("\nToday is done.");
    } else if !profile.current_step.is_empty() {
        println!("\nStep: {}", profile.current_step);
    }
    if let Some(insp) = &profile.daily_inspiration {
        println!("\n«{}» - {}", insp.quote, insp.person);
        println!("{}", insp.bio);
        println!("Инструменты: {}", insp.tools);
    }
    Ok(())
}

/// Open the history panel on the active path and print it
fn cmd_history(coach: &mut Coach) -> Result<()> {
    coach.view_mut().navigate(Screen::ActivePath);
    if !coach.view().history_visible() {
        coach.view_mut().toggle_history();
    }
    let profile = coach.active().ok_or_else(|| anyhow!("No active profile"))?;
    if profile.history.is_empty() {
        println!("No check-ins yet");
    }
    for entry in profile.history.iter().rev() {
        println!("{}  {:<16} {}", entry.local_day(), entry.status, entry.step);
    }
    Ok(())
}

async fn cmd_speak(cfg: &TurtleConfig, coach: &Coach, gemini: Arc<GeminiClient>) -> Result<()> {
    let (text, voice) = coach
        .narration()
        .ok_or_else(|| anyhow!("Nothing to narrate: no active profile or empty plan"))?;

    let output = create_output(cfg.voice.output, &shellexpand(&cfg.voice.wav_dir))?;
    let (diag_tx, mut diag_rx) = mpsc::unbounded_channel();
    let mut controller = PlaybackController::new(gemini, output).with_diagnostics(diag_tx);

    println!("Preparing narration ({} voice)...", voice);
    controller.start(
        text,
        voice,
        || println!("Playing. p + Enter = pause/resume, s + Enter = stop"),
        || println!("Narration finished"),
    );

    let mut commands = spawn_stdin_reader();
    drive_narration(&mut controller, &mut commands).await;

    if let Ok(err) = diag_rx.try_recv() {
        return Err(anyhow!(err).context("Narration failed"));
    }
    Ok(())
}

/// Forward stdin lines from a plain thread. A blocking read on the runtime's
/// pool would hold up shutdown until the next line arrives.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Apply transport commands until the narration is over or stopped
async fn drive_narration(
    controller: &mut PlaybackController,
    commands: &mut mpsc::UnboundedReceiver<String>,
) {
    let mut input_open = true;
    loop {
        tokio::select! {
            state = controller.next_event() => {
                if state == PlaybackState::Idle {
                    break;
                }
            }
            command = commands.recv(), if input_open => {
                match command.as_deref() {
                    Some("") => {}
                    Some("p") => {
                        let toggled = if controller.state() == PlaybackState::Paused {
                            controller.resume()
                        } else {
                            controller.pause()
                        };
                        if toggled {
                            println!("{}", controller.state());
                        }
                    }
                    Some("s") => {
                        controller.stop();
                        println!("Stopped");
                        break;
                    }
                    Some(other) => println!("Unknown command '{}'", other),
                    None => input_open = false,
                }
            }
        }
    }
}

// Utility: expand ~ in paths
fn shellexpand(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
