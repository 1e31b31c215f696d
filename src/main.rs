//! Persona Coordinator binary
//!
//! Serves the persona HTTP API and exposes the summary cache operations
//! (preflight, single summary, listing, lock recovery) as CLI commands.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use persona_coordinator::config::{self, CoordinatorConfig, LoggingSettings};
use persona_coordinator::summary::{CacheStatus, EnsureReport};
use persona_coordinator::{logging, server, version, AppContext, Error, Result};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            let quiet_logging = LoggingSettings {
                level: "warn".to_string(),
                ..Default::default()
            };
            let _log_guards = logging::init_logging(&quiet_logging, cli.verbose, cli.quiet)?;
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let config = CoordinatorConfig::load(cli.command.config_path())?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        persona_dir = %config.persona_dir().display(),
        model = %config.llm.model,
        "Starting Persona Coordinator"
    );

    let ctx = Arc::new(AppContext::from_config(config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("persona-coord")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    match cli.command {
        Commands::Serve { skip_preflight, .. } => runtime.block_on(run_server(ctx, skip_preflight)),
        Commands::Preflight {
            timeout_secs,
            poll_ms,
            ..
        } => runtime.block_on(run_preflight(&ctx, timeout_secs, poll_ms)),
        Commands::Summary { persona, .. } => runtime.block_on(print_summary(&ctx, persona)),
        Commands::Personas { .. } => {
            list_personas(&ctx);
            Ok(())
        }
        Commands::Unlock { .. } => {
            unlock(&ctx);
            Ok(())
        }
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────

async fn run_server(ctx: Arc<AppContext>, skip_preflight: bool) -> Result<()> {
    if ctx.config.llm.check_model_on_start {
        ctx.model.ensure_model_available().await?;
        info!(model = %ctx.model.model(), "Model available");
    }

    if skip_preflight {
        warn!("Skipping summary preflight; first requests may wait on generation");
    } else {
        let report = ctx.preflight().await?;
        log_report(&report);
    }

    server::serve(ctx).await
}

async fn run_preflight(ctx: &AppContext, timeout_secs: Option<u64>, poll_ms: Option<u64>) -> Result<()> {
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.preflight_timeout());
    let poll = poll_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.preflight_poll_interval());

    // nothing to generate means nothing to ask the model for
    let needs_model = ctx
        .personas
        .list()
        .iter()
        .any(|p| ctx.summaries.status(p) != CacheStatus::Fresh);
    if needs_model && ctx.config.llm.check_model_on_start {
        ctx.model.ensure_model_available().await?;
    }

    let report = ctx.summaries.ensure_all(timeout, poll).await?;
    log_report(&report);

    let (built, skipped) = report.counts();
    println!("built: {}, up-to-date: {}", built, skipped);

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(Error::Generation {
            persona: report.failed.join(", "),
            message: "summary generation failed".to_string(),
            retryable: true,
        })
    }
}

async fn print_summary(ctx: &AppContext, persona: Option<String>) -> Result<()> {
    let entry = ctx.summaries.get_or_build(persona.as_deref()).await?;
    println!("{}", entry.summary);
    Ok(())
}

fn list_personas(ctx: &AppContext) {
    let personas = ctx.personas.list();
    if personas.is_empty() {
        println!("No personas found in {}", ctx.personas.dir().display());
        return;
    }

    println!("{:<20} {:<8} LABEL", "KEY", "CACHE");
    for p in personas.iter() {
        println!(
            "{:<20} {:<8} {}",
            p.key,
            ctx.summaries.status(p).as_str(),
            p.label()
        );
    }
}

fn unlock(ctx: &AppContext) {
    let lock = ctx.summaries.lock();
    if !lock.is_present() {
        println!("No summary lock present.");
        return;
    }

    let holder = lock.holder();
    lock.release();
    warn!(holder = ?holder, "Summary lock removed by hand");
    match holder {
        Some(holder) => println!("Removed summary lock held by {}", holder),
        None => println!("Removed unlabelled summary lock"),
    }
}

fn log_report(report: &EnsureReport) {
    if !report.ran {
        warn!("Another process holds the summary lock; preflight skipped");
    }
    for key in &report.failed {
        warn!(persona = %key, "Summary still missing after preflight");
    }
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = CoordinatorConfig::load(config.as_deref())?;
            println!("{}", cfg.to_toml()?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            CoordinatorConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
