//! `coder`: an iterative LLM code-editing agent.
//!
//! Sends the task and accumulated project context to a chat model, applies the
//! file writes and edits it asks for, runs optional lint/compile checks, and
//! repeats until the model signals `done` or the turn budget runs out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use coder::core::context::ContextAccumulator;
use coder::core::state::RunOutcome;
use coder::exit_codes;
use coder::io::config::load_config;
use coder::io::context::preload_mentions;
use coder::io::model::OpenAiClient;
use coder::io::process::ShellCommandRunner;
use coder::io::prompt::PromptBuilder;
use coder::io::transcript::Transcript;
use coder::io::workspace::ProjectWorkspace;
use coder::logging::{self, LogConfig};
use coder::looping::run_agent;
use coder::turn::{TurnConfig, TurnDeps};

#[derive(Parser)]
#[command(
    name = "coder",
    version,
    about = "Iterative LLM code-editing agent"
)]
struct Cli {
    /// Task to accomplish. `@path` mentions are pre-loaded into context.
    #[arg(short, long)]
    prompt: String,

    /// Config file (TOML).
    #[arg(short, long, default_value = "coder.toml")]
    config: PathBuf,

    /// Project root (overrides `project_root` from the config).
    #[arg(long)]
    project: Option<PathBuf>,

    /// Log at debug level and write full prompts/responses per turn.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{err:#}");
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("read current directory")?;
    let config_path = cwd.join(&cli.config);
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.clone());
    let cfg = load_config(&config_path)?;

    let log = logging::init(&LogConfig {
        log_dir: cwd.join(&cfg.log_dir),
        verbose: cli.verbose,
    })?;
    info!(run_id = %log.run_id, log = %log.log_path.display(), "run started");

    let project_root = match &cli.project {
        Some(dir) => cwd.join(dir),
        None => cfg.resolve_project_root(&cwd),
    };
    let workspace = ProjectWorkspace::new(&project_root)
        .with_context(|| format!("open project {}", project_root.display()))?
        .with_headers_dir(cfg.resolve_headers_dir(&config_dir));
    info!(project_root = %project_root.display(), "project opened");

    let model = OpenAiClient::from_config(&cfg.model)?;
    let commands = ShellCommandRunner::new(
        Duration::from_secs(cfg.command_timeout_secs),
        cfg.output_limit_bytes,
    );
    let prompts = PromptBuilder::new(cfg.load_system_prompt(&config_dir)?);
    let transcript = cli
        .verbose
        .then(|| Transcript::new(log.transcript_dir.clone()));

    let mut ctx = ContextAccumulator::new();
    preload_mentions(&cli.prompt, &cwd, &workspace, &mut ctx);

    let deps = TurnDeps {
        model: &model,
        workspace: &workspace,
        commands: &commands,
        prompts: &prompts,
        transcript: transcript.as_ref(),
    };
    let turn_cfg = TurnConfig::from_agent_config(&cfg, log.run_id.as_str());
    let outcome = run_agent(&deps, &turn_cfg, &cli.prompt, ctx, |report| {
        println!("turn {}: {}", report.turn, report.summary);
    })?;

    info!(log = %log.log_path.display(), "run finished");
    let code = match &outcome.outcome {
        RunOutcome::Completed { message } => {
            if !message.is_empty() {
                println!("{message}");
            }
            exit_codes::OK
        }
        RunOutcome::Exhausted { turns } => {
            eprintln!("turn budget exhausted after {turns} turns without done");
            exit_codes::EXHAUSTED
        }
        RunOutcome::Failed { error } => {
            eprintln!("{error}");
            exit_codes::FAILED
        }
    };
    Ok(code)
}
