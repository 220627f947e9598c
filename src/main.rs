use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use workflow_runner::config::Config;
use workflow_runner::logging;
use workflow_runner::rest;
use workflow_runner::session::{SessionInit, SessionManager};
use workflow_runner::share::ShareProjector;
use workflow_runner::store::{CheckpointStore, FileStore};
use workflow_runner::telemetry::TelemetryService;
use workflow_runner::types::{CheckpointType, RunSnapshot, RunStatus, Step, StepStatus};
use workflow_runner::workflow::WorkflowDefinition;

#[derive(Parser)]
#[command(name = "workflow-runner")]
#[command(about = "Run step-by-step workflows with resumable sessions and share links")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a run from a workflow definition file
    New {
        /// Definition file (.yaml, .yml, .json), absolute or under the workflows dir
        workflow: String,

        /// Run title (defaults to the workflow title)
        #[arg(short, long)]
        title: Option<String>,

        /// Run description
        #[arg(long)]
        description: Option<String>,

        /// Label for the session bound to the new run
        #[arg(long)]
        session_name: Option<String>,
    },

    /// Show a run's checklist as last checkpointed
    Show { run_id: Uuid },

    /// Start or resume working on a run
    Start { run_id: Uuid },

    /// Set a step's status (pending, in_progress, completed, skipped, failed)
    Step {
        run_id: Uuid,

        /// 1-based step number
        step: u32,

        status: String,

        /// Notes to store on the step
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Toggle a step's acknowledgment checkbox
    Check {
        run_id: Uuid,

        /// 1-based step number
        step: u32,
    },

    /// Pause a run and its session
    Pause {
        run_id: Uuid,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Mark a run completed and close its session
    Complete { run_id: Uuid },

    /// Print a read-only share token for a run
    Share {
        run_id: Uuid,

        /// Revoke the current token instead
        #[arg(long)]
        revoke: bool,
    },

    /// Show the run behind a share token
    Resolve { token: String },

    /// List sessions that can still be resumed
    Sessions {
        /// Only sessions with this owner label
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Start the REST API server
    Serve {
        /// Port to listen on (default: 7018)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let mut config = Config::load(cli.config.as_deref())?;

    let is_server_mode = matches!(cli.command, Commands::Serve { .. });

    // Initialize logging (file-based for the server, stderr for CLI)
    let _logging_handle = logging::init_logging(&config, is_server_mode, cli.debug)?;

    // Each CLI command saves explicitly before exiting
    if !is_server_mode {
        config.autosave.enabled = false;
    }

    let store: Arc<dyn CheckpointStore> = Arc::new(
        FileStore::open(&config.state_path())
            .await
            .context("Failed to open checkpoint store")?,
    );

    match cli.command {
        Commands::New {
            workflow,
            title,
            description,
            session_name,
        } => {
            cmd_new(&config, store, &workflow, title, description, session_name).await?;
        }
        Commands::Show { run_id } => {
            cmd_show(&config, store, run_id).await?;
        }
        Commands::Start { run_id } => {
            cmd_start(&config, store, run_id).await?;
        }
        Commands::Step {
            run_id,
            step,
            status,
            notes,
        } => {
            cmd_step(&config, store, run_id, step, &status, notes).await?;
        }
        Commands::Check { run_id, step } => {
            cmd_check(&config, store, run_id, step).await?;
        }
        Commands::Pause { run_id, reason } => {
            cmd_pause(&config, store, run_id, reason).await?;
        }
        Commands::Complete { run_id } => {
            cmd_complete(&config, store, run_id).await?;
        }
        Commands::Share { run_id, revoke } => {
            cmd_share(&config, store, run_id, revoke).await?;
        }
        Commands::Resolve { token } => {
            cmd_resolve(&config, store, &token).await?;
        }
        Commands::Sessions { owner } => {
            cmd_sessions(&config, store, owner).await?;
        }
        Commands::Serve { port } => {
            cmd_serve(config, store, port).await?;
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────
// Session key storage
// ─────────────────────────────────────────────────────────────────────────

/// The CLI is the client: it keeps one session key per run on disk
fn key_path(config: &Config, run_id: Uuid) -> PathBuf {
    config
        .state_path()
        .join("keys")
        .join(format!("{}.key", run_id))
}

fn load_key(config: &Config, run_id: Uuid) -> Option<String> {
    std::fs::read_to_string(key_path(config, run_id))
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

fn save_key(config: &Config, run_id: Uuid, key: &str) -> Result<()> {
    let path = key_path(config, run_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, key)
        .with_context(|| format!("Failed to write session key: {}", path.display()))
}

/// Bind a session for `run_id`, resuming the stored key when possible
async fn open_session(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    run_id: Uuid,
    session_name: Option<&str>,
) -> Result<SessionManager> {
    let telemetry = TelemetryService::from_config(&config.telemetry);
    let mut manager = SessionManager::new(store, config, telemetry);

    let existing = load_key(config, run_id);
    let init = manager
        .open(run_id, existing.as_deref(), session_name)
        .await?;
    if init == SessionInit::Fresh {
        if let Some(session) = manager.session() {
            save_key(config, run_id, &session.session_key)?;
        }
    }
    tracing::debug!(run_id = %run_id, init = ?init, "Session bound");
    Ok(manager)
}

/// Write a manual checkpoint and unbind
async fn close_session(mut manager: SessionManager) -> Result<()> {
    manager.save(CheckpointType::Manual).await?;
    manager.teardown().await;
    Ok(())
}

fn resolve_workflow_path(config: &Config, workflow: &str) -> PathBuf {
    let direct = PathBuf::from(workflow);
    if direct.exists() {
        return direct;
    }
    config.workflows_path().join(workflow)
}

// ─────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────

async fn cmd_new(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    workflow: &str,
    title: Option<String>,
    description: Option<String>,
    session_name: Option<String>,
) -> Result<()> {
    let path = resolve_workflow_path(config, workflow);
    let definition = WorkflowDefinition::from_path(&path)?;
    let title = title.unwrap_or_else(|| definition.title.clone());

    let telemetry = TelemetryService::from_config(&config.telemetry);
    let manager = SessionManager::new(store.clone(), config, telemetry);
    let run_id = manager
        .create_run(&definition, &title, description.as_deref())
        .await?;
    drop(manager);

    let manager = open_session(config, store, run_id, session_name.as_deref()).await?;
    close_session(manager).await?;

    println!("Created run {}", run_id);
    println!("  Workflow: {} ({} steps)", definition.id, definition.steps.len());
    println!("  Title:    {}", title);
    Ok(())
}

async fn cmd_show(config: &Config, store: Arc<dyn CheckpointStore>, run_id: Uuid) -> Result<()> {
    let snapshot = workflow_runner::store::bounded(config.store.timeout(), store.load_run(run_id))
        .await?;
    print_run(&snapshot);
    Ok(())
}

async fn cmd_start(config: &Config, store: Arc<dyn CheckpointStore>, run_id: Uuid) -> Result<()> {
    let mut manager = open_session(config, store, run_id, None).await?;
    let status = manager.view()?.run.status;
    match status {
        RunStatus::Running => println!("Run is already running"),
        _ => {
            manager.start_run()?;
            println!("Run started");
        }
    }
    close_session(manager).await
}

async fn cmd_step(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    run_id: Uuid,
    step_number: u32,
    status: &str,
    notes: Option<String>,
) -> Result<()> {
    let status: StepStatus = status.parse().map_err(anyhow::Error::msg)?;
    let manager = open_session(config, store, run_id, None).await?;

    let step_id = step_id(&manager, step_number)?;
    let change = manager.transition(step_id, status, notes, None)?;
    let progress = manager.view()?.progress;

    if change.changed() {
        println!(
            "Step {}: {} → {} ({}% complete)",
            step_number, change.from, change.to, progress
        );
    } else {
        println!("Step {} already {}", step_number, change.to);
    }
    close_session(manager).await
}

async fn cmd_check(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    run_id: Uuid,
    step_number: u32,
) -> Result<()> {
    let manager = open_session(config, store, run_id, None).await?;
    let step_id = step_id(&manager, step_number)?;
    let checked = manager.toggle_checked(step_id)?;
    println!(
        "Step {} {}",
        step_number,
        if checked { "checked" } else { "unchecked" }
    );
    close_session(manager).await
}

async fn cmd_pause(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    run_id: Uuid,
    reason: Option<String>,
) -> Result<()> {
    let mut manager = open_session(config, store, run_id, None).await?;
    manager.pause(reason.as_deref()).await?;
    manager.teardown().await;
    println!("Run paused; resume with `workflow-runner start {}`", run_id);
    Ok(())
}

async fn cmd_complete(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    run_id: Uuid,
) -> Result<()> {
    let mut manager = open_session(config, store, run_id, None).await?;
    if manager.view()?.run.status != RunStatus::Completed {
        manager.complete_run().await?;
    }
    manager.complete().await?;
    manager.teardown().await;
    println!("Run completed");
    Ok(())
}

async fn cmd_share(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    run_id: Uuid,
    revoke: bool,
) -> Result<()> {
    let mut manager = open_session(config, store, run_id, None).await?;
    if revoke {
        manager.revoke_share_token().await?;
        println!("Share link revoked");
    } else {
        let token = manager.issue_share_token().await?;
        println!("Share token: {}", token);
        println!(
            "  http://{}:{}/api/v1/share/{}",
            config.api.host, config.api.port, token
        );
    }
    manager.teardown().await;
    Ok(())
}

async fn cmd_resolve(config: &Config, store: Arc<dyn CheckpointStore>, token: &str) -> Result<()> {
    let shares = ShareProjector::new(store, config.store.timeout());
    let shared = shares.resolve(token).await?;
    print_run(&RunSnapshot {
        run: shared.run,
        steps: shared.steps,
    });
    Ok(())
}

async fn cmd_sessions(
    config: &Config,
    store: Arc<dyn CheckpointStore>,
    owner: Option<String>,
) -> Result<()> {
    let sessions = workflow_runner::store::bounded(
        config.store.timeout(),
        store.list_active_sessions(owner.as_deref()),
    )
    .await?;

    if sessions.is_empty() {
        println!("No resumable sessions");
        return Ok(());
    }

    println!("Resumable Sessions ({})", sessions.len());
    println!("{}", "─".repeat(60));

    for session in &sessions {
        println!(
            "{} [{}] {} {}%",
            session.run_id,
            session.status,
            session.run_title.as_deref().unwrap_or("(run missing)"),
            session.progress.unwrap_or(0)
        );
        if let Some(name) = &session.session_name {
            println!("    Name: {}", name);
        }
        match session.last_checkpoint_at {
            Some(at) => println!("    Saved: {}", at),
            None => println!("    Saved: never"),
        }
        println!("    Expires: {}", session.expires_at);
    }

    Ok(())
}

async fn cmd_serve(
    mut config: Config,
    store: Arc<dyn CheckpointStore>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(port) = port {
        config.api.port = port;
    }

    println!("Starting REST API server...");
    println!("  Address: {}:{}", config.api.host, config.api.port);
    println!("  Endpoints:");
    println!("    GET  /api/v1/health               Health check");
    println!("    GET  /api/v1/status               Server status");
    println!("    GET  /api/v1/share/:token         Resolve a share link");
    println!("    GET  /api/v1/runs/:id             Run with steps");
    println!("    GET  /api/v1/sessions/active      Resumable sessions");
    println!("    POST /api/v1/sessions/:id/beacon  Unload beacon");
    println!();

    rest::serve(rest::ApiState::new(store, config)).await
}

// ─────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────

fn step_id(manager: &SessionManager, step_number: u32) -> Result<Uuid> {
    let view = manager.view()?;
    match view.steps.iter().find(|s| s.step_number == step_number) {
        Some(step) => Ok(step.id),
        None => bail!(
            "Run has no step {} (steps 1-{})",
            step_number,
            view.steps.len()
        ),
    }
}

fn status_icon(step: &Step) -> &'static str {
    match step.status {
        StepStatus::Pending => "○",
        StepStatus::InProgress => "▶",
        StepStatus::Completed => "✓",
        StepStatus::Skipped => "↷",
        StepStatus::Failed => "✗",
    }
}

fn print_run(snapshot: &RunSnapshot) {
    let run = &snapshot.run;
    println!("{} [{}] {}%", run.title, run.status, run.progress);
    println!("{}", "─".repeat(60));

    for step in &snapshot.steps {
        let check = if step.is_checked { "[x]" } else { "[ ]" };
        println!(
            "{} {} {:>2}. {}",
            status_icon(step),
            check,
            step.step_number,
            step.title
        );
        if let Some(notes) = &step.notes {
            println!("        {}", notes);
        }
    }

    println!();
    println!(
        "{}/{} steps completed",
        run.completed_steps, run.total_steps
    );
    if let Some(reason) = &run.failure_reason {
        println!("Failed: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_key_path_is_per_run() {
        let config = Config::default();
        let id = Uuid::new_v4();
        let path = key_path(&config, id);
        assert!(path.ends_with(format!("keys/{}.key", id)));
    }

    #[test]
    fn test_resolve_workflow_path_falls_back_to_workflows_dir() {
        let config = Config::default();
        let path = resolve_workflow_path(&config, "definitely-not-here.yaml");
        assert_eq!(path, config.workflows_path().join("definitely-not-here.yaml"));
    }

    #[test]
    fn test_save_and_load_key_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.state = dir.path().to_string_lossy().to_string();
        let id = Uuid::new_v4();

        assert!(load_key(&config, id).is_none());
        save_key(&config, id, "sk_abc\n").unwrap();
        assert_eq!(load_key(&config, id).as_deref(), Some("sk_abc"));
    }
}
