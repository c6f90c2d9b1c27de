//! gameforge - LLM pipeline for small browser arcade games
//!
//! CLI entry point: generate games, and run the validator, rule checker and
//! merger on files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use gameforge::cli::{Cli, Command, OutputFormat, generate_after_help};
use gameforge::config::Config;
use gameforge::design::StageContext;
use gameforge::events::{PipelineEvent, create_event_bus, spawn_event_logger};
use gameforge::llm::create_gateway;
use gameforge::merge::merge;
use gameforge::pipeline::{CancelToken, GameBundle, Orchestrator, PipelineError, PipelineState};
use gameforge::prompts::PromptLoader;
use gameforge::validation::{self, CodeValidator, POLICY_VERSION, ScopeValidator};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gameforge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("gameforge.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "gameforge loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Generate {
            seed,
            out,
            events,
            count,
        } => cmd_generate(&config, seed, &out, events, count).await,
        Command::Validate { file, format } => cmd_validate(&file, format),
        Command::Check { file, format } => cmd_check(&file, format),
        Command::Merge { accumulated, fragment } => cmd_merge(&accumulated, &fragment),
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Run the pipeline `count` times concurrently and write every finished game
async fn cmd_generate(config: &Config, seed: Option<String>, out: &Path, json: bool, count: usize) -> Result<()> {
    debug!(?seed, ?out, json, count, "cmd_generate: called");
    config.validate()?;

    let gateway = Arc::new(create_gateway(&config.llm).context("Failed to create LLM gateway")?);
    let prompts = Arc::new(match &config.pipeline.prompts_dir {
        Some(dir) => PromptLoader::new(dir),
        None => PromptLoader::embedded_only(),
    });
    let orchestrator = Orchestrator::new(StageContext::new(gateway, prompts), config.pipeline.clone());

    let bus = create_event_bus(config.pipeline.event_capacity);
    let logger = spawn_event_logger(bus.clone(), &config.pipeline.runs_dir)?;
    let printer = tokio::spawn(print_events(bus.subscribe(), json));

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cmd_generate: interrupted, cancelling runs");
            on_ctrl_c.cancel();
        }
    });

    let runs = (0..count.max(1)).map(|_| {
        let state = PipelineState::new();
        let emitter = bus.emitter_for(state.run_id.clone());
        let orchestrator = &orchestrator;
        let cancel = &cancel;
        let seed = seed.clone();
        async move { orchestrator.run(state, seed, &emitter, cancel).await }
    });
    let results: Vec<Result<GameBundle, PipelineError>> = futures::future::join_all(runs).await;

    // Closing the bus lets the printer and logger drain and exit
    drop(bus);
    let _ = printer.await;
    let _ = logger.await;

    let total = results.len();
    let failed = report_results(results, out);
    if failed > 0 {
        return Err(eyre::eyre!("{} of {} run(s) failed", failed, total));
    }
    Ok(())
}

/// Write every finished bundle and print a line per run; returns how many runs failed
///
/// A bundle that cannot be written counts as failed without stopping the rest.
fn report_results(results: Vec<Result<GameBundle, PipelineError>>, out: &Path) -> usize {
    let mut failed = 0;
    for result in results {
        match result {
            Ok(bundle) => match bundle.write_to(out) {
                Ok(dir) => print_summary(&bundle, &dir),
                Err(e) => {
                    failed += 1;
                    warn!(run_id = %bundle.run_id, error = %e, "report_results: failed to write bundle");
                    eprintln!("{} {}: {:#}", "✗".red(), bundle.definition.title, e);
                }
            },
            Err(e) => {
                failed += 1;
                eprintln!("{} {}", "✗".red(), e);
            }
        }
    }
    failed
}

fn short_id(run_id: &str) -> &str {
    run_id.get(run_id.len().saturating_sub(8)..).unwrap_or(run_id)
}

async fn print_events(mut rx: broadcast::Receiver<PipelineEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "print_events: failed to serialize event"),
            },
            Ok(PipelineEvent::PipelineStatus {
                run_id,
                progress,
                phase,
                token_count,
                ..
            }) => {
                println!(
                    "{} {:>3.0}% {:<16} {}",
                    short_id(&run_id).dimmed(),
                    progress * 100.0,
                    phase.name.cyan(),
                    format!("{} tokens", token_count).dimmed()
                );
            }
            Ok(PipelineEvent::PipelineError {
                run_id, stage, message, ..
            }) => {
                println!("{} {} {}: {}", short_id(&run_id).dimmed(), "error".red().bold(), stage, message);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "print_events: lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_summary(bundle: &GameBundle, dir: &Path) {
    println!(
        "{} {} written to {}",
        "✓".green(),
        bundle.definition.title.bold(),
        dir.display().to_string().cyan()
    );
    println!(
        "  {} steps, {} tokens, feedback: {}",
        bundle.plan.len(),
        bundle.token_count,
        match &bundle.feedback {
            gameforge::build::Feedback::Accept => "accept".green(),
            gameforge::build::Feedback::Repair { .. } => "repair".yellow(),
            gameforge::build::Feedback::Replan { .. } => "replan".yellow(),
        }
    );
    for reason in bundle.feedback.reasons() {
        println!("    - {}", reason);
    }
    for warning in &bundle.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn cmd_validate(file: &Path, format: OutputFormat) -> Result<()> {
    debug!(?file, %format, "cmd_validate: called");
    let code = read_source(file)?;
    let validator = ScopeValidator::default();
    let diagnostics = validator.validate(&code);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diagnostics)?),
        OutputFormat::Text => {
            if diagnostics.is_empty() {
                println!("{} {}: no problems found", "✓".green(), file.display());
            }
            for diagnostic in &diagnostics {
                println!("{} {}", "✗".red(), diagnostic);
            }
        }
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(eyre::eyre!("{} problem(s) found by {}", diagnostics.len(), validator.name()))
    }
}

fn cmd_check(file: &Path, format: OutputFormat) -> Result<()> {
    debug!(?file, %format, "cmd_check: called");
    let code = read_source(file)?;
    let report = validation::check(&code);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if report.compliant {
                println!("{} {}: compliant with policy v{}", "✓".green(), file.display(), POLICY_VERSION);
            }
            for violation in &report.violations {
                println!("{} {}", "✗".red(), violation.rule.bold());
                for line in &violation.lines {
                    println!("    {}", line);
                }
            }
        }
    }

    if report.compliant {
        Ok(())
    } else {
        Err(eyre::eyre!("{} rule(s) violated", report.violations.len()))
    }
}

fn cmd_merge(accumulated: &Path, fragment: &Path) -> Result<()> {
    debug!(?accumulated, ?fragment, "cmd_merge: called");
    let outcome = merge(&read_source(accumulated)?, &read_source(fragment)?);
    if let Some(reason) = &outcome.fallback {
        eprintln!("{} merge fell back to concatenation: {}", "warning:".yellow(), reason);
    }
    print!("{}", outcome.code);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gameforge::build::{Feedback, ProbeReport, SanityReport};
    use gameforge::design::{BuildStep, GameDefinition, Plan, Playability};
    use gameforge::validation::ComplianceReport;
    use tempfile::tempdir;

    fn bundle(title: &str, run_id: &str) -> GameBundle {
        GameBundle {
            run_id: run_id.into(),
            definition: GameDefinition {
                title: title.into(),
                description: "Grab coins.".into(),
                mechanics: vec!["move".into()],
                win_condition: "Collect all coins.".into(),
                entities: vec!["player".into()],
                playability: Playability::Valid,
            },
            plan: Plan::new(vec![BuildStep::new(1, "Set up canvas")]),
            code: "init();\n".into(),
            sanity: SanityReport {
                parses: true,
                entry_point: Some("init ( )".into()),
                problems: vec![],
            },
            probe: ProbeReport::default(),
            compliance: ComplianceReport {
                compliant: true,
                violations: vec![],
            },
            feedback: Feedback::Accept,
            warnings: vec![],
            token_count: 15,
        }
    }

    #[test]
    fn test_unwritable_bundle_does_not_stop_the_rest() {
        let temp = tempdir().unwrap();
        let blocked = bundle("Coin Dash", "run-0000000a");
        let written = bundle("Rock Hop", "run-0000000b");
        // A plain file where the first bundle's directory should go
        fs::write(temp.path().join(blocked.dir_name()), "taken").unwrap();

        let results = vec![
            Ok(blocked),
            Err(PipelineError::Cancelled { stage: "idea".into() }),
            Ok(written.clone()),
        ];
        assert_eq!(report_results(results, temp.path()), 2);

        let dir = temp.path().join(written.dir_name());
        assert_eq!(fs::read_to_string(dir.join("game.js")).unwrap(), "init();\n");
    }
}
