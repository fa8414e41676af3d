mod terminal;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use llmagent_agents::{
    AgentRuntime, EditorHost, NullHost, SummarizeOutcome, Summarizer, TurnOutcome,
    create_provider,
};
use llmagent_config::{AgentConfig, ConfigLoader, LogLevel};
use llmagent_security::RedactingWriter;
use llmagent_session::SessionStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::terminal::{TerminalHost, read_line};

#[derive(Parser)]
#[command(name = "llmagent", version, about = "Coding agent with tools, plans and session memory")]
struct Cli {
    /// Project root; tools are confined to it.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Extra TOML config file, applied after the user and project configs.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider override (openai, anthropic, gemini, ollama, openrouter).
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model override for the selected provider.
    #[arg(long, global = true)]
    model: Option<String>,

    /// No display and no prompts; every approval is denied.
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one prompt, or start an interactive session when none is given.
    Chat { prompt: Option<String> },
    /// Fold older history into the session summary.
    Summarize,
    /// Inspect or discard the active plan.
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },
}

#[derive(Subcommand)]
enum PlanAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project = match &cli.project {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    let config = load_config(&cli, &project)?;
    let store = SessionStore::open(&project)?;
    init_logging(&config, &store)?;
    info!(project = %project.display(), provider = %config.provider, "llmagent starting");

    match cli.command {
        Command::Chat { prompt } => chat(config, &project, cli.headless, prompt).await,
        Command::Summarize => summarize(config, store).await,
        Command::Plan { action } => plan(&store, action),
    }
}

fn load_config(cli: &Cli, project: &Path) -> Result<AgentConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = ConfigLoader::default_user_path() {
        loader.merge_file(&path)?;
    }
    loader.merge_file(&SessionStore::resolve_dir(project).join("config.toml"))?;
    if let Some(path) = &cli.config {
        if !loader.merge_file(path)? {
            bail!("config file not found: {}", path.display());
        }
    }
    let mut config = loader.load()?;
    apply_overrides(&mut config, cli.provider.as_deref(), cli.model.as_deref());
    if cli.headless {
        config.suppress_display = true;
    }
    Ok(config)
}

fn apply_overrides(config: &mut AgentConfig, provider: Option<&str>, model: Option<&str>) {
    if let Some(provider) = provider {
        config.provider = provider.trim().to_ascii_lowercase();
    }
    if let Some(model) = model {
        let slot = match config.provider.as_str() {
            "anthropic" => &mut config.anthropic.model,
            "gemini" => &mut config.gemini.model,
            "ollama" => &mut config.ollama.model,
            "openrouter" => &mut config.openrouter.model,
            _ => &mut config.openai.model,
        };
        *slot = model.to_string();
    }
}

/// Log to the project's `debug.log`, with credentials redacted. Silent
/// unless `log_level` or `RUST_LOG` asks for output.
fn init_logging(config: &AgentConfig, store: &SessionStore) -> Result<()> {
    let from_env = std::env::var_os("RUST_LOG").is_some();
    if config.log_level == LogLevel::Off && !from_env {
        return Ok(());
    }
    let writer = RedactingWriter::append_to(&store.debug_log_path())
        .with_context(|| format!("cannot open {}", store.debug_log_path().display()))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    Ok(())
}

async fn chat(config: AgentConfig, project: &Path, headless: bool, prompt: Option<String>) -> Result<()> {
    let host: Arc<dyn EditorHost> = if headless {
        Arc::new(NullHost)
    } else {
        Arc::new(TerminalHost)
    };
    let mut agent = AgentRuntime::new(config, project, host)?;

    if let Some(prompt) = prompt {
        return match agent.run_turn(&prompt).await {
            TurnOutcome::Failed(reason) => bail!(reason),
            _ => Ok(()),
        };
    }

    println!("llmagent: /approvals, /clear-approvals, /exit");
    loop {
        print!("\n> ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let Some(line) = read_line().await else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/approvals" => {
                let decisions = agent.approvals().snapshot();
                if decisions.is_empty() {
                    println!("No stored tool approvals.");
                }
                for (tool, status) in decisions {
                    println!("  {tool}: {}", status.as_str());
                }
            }
            "/clear-approvals" => {
                agent.approvals_mut().clear();
                println!("Tool approvals cleared.");
            }
            prompt => {
                let outcome = agent.run_turn(prompt).await;
                info!(?outcome, "interactive turn finished");
            }
        }
    }
    Ok(())
}

async fn summarize(config: AgentConfig, store: SessionStore) -> Result<()> {
    let provider = create_provider(&config)?;
    let summarizer = Summarizer::new(provider, store, &config);
    match summarizer.summarize().await? {
        SummarizeOutcome::NoHistory => println!("No conversation history to summarize."),
        SummarizeOutcome::UpToDate { cutoff } => {
            println!("Summary is up to date (cutoff at byte {cutoff}).")
        }
        SummarizeOutcome::Summarized {
            from,
            cutoff,
            plan_extracted,
        } => {
            println!("Summarized history bytes {from}..{cutoff}.");
            if plan_extracted {
                println!("Saved the active plan found in history.");
            }
        }
    }
    Ok(())
}

fn plan(store: &SessionStore, action: PlanAction) -> Result<()> {
    let plans = store.plan();
    match action {
        PlanAction::Show => match plans.load()? {
            Some(plan) => println!("{plan}"),
            None => println!("No active plan."),
        },
        PlanAction::Clear => {
            if plans.clear()? {
                println!("Plan cleared.");
            } else {
                println!("No active plan.");
            }
        }
    }
    Ok(())
}
