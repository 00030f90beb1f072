mod cli;
mod ui;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{AnalyzeArgs, Cli, Command, SchemaKind};
use dam_compliance::gemini::create_gemini_client;
use dam_compliance::schema::{findings_schema, job_aid_schema};
use dam_compliance::{AnalyzerConfig, AnalyzerError, Step, WorkflowEngine, WorkflowState};
use ui::WorkflowProgress;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Analyze(args) => {
            let config = load_config(cli.model, cli.max_retries)?;
            analyze(args, config).await
        }
        Command::Schema { kind } => {
            println!("{}", schema_json(kind)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let config = load_config(cli.model, cli.max_retries)?;
            health(config).await
        }
    }
}

fn schema_json(kind: SchemaKind) -> Result<String> {
    let schema = match kind {
        SchemaKind::JobAid => job_aid_schema(),
        SchemaKind::Findings => findings_schema(),
    };
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Config file plus the global flag overrides.
fn load_config(model: Option<String>, max_retries: Option<u32>) -> Result<AnalyzerConfig> {
    let mut config = AnalyzerConfig::load()?;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(max_retries) = max_retries {
        config.max_retries = max_retries;
    }
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn analyze(args: AnalyzeArgs, config: AnalyzerConfig) -> Result<ExitCode> {
    let image_bytes = read_image(&args.image)?;
    let metadata = args.metadata.as_deref().map(read_metadata).transpose()?;
    let mut previous = args.state.as_deref().map(read_state).transpose()?;
    let mut start_step = Step::from_number(args.from_step)
        .ok_or_else(|| AnalyzerError::Config(format!("invalid step {}", args.from_step)))?;

    let mut engine = WorkflowEngine::new(None, config);
    let progress = WorkflowProgress::start(&args.image.display().to_string());

    let mut attempt = 0;
    let state = loop {
        let state = engine
            .execute_workflow(&image_bytes, metadata.clone(), start_step, previous.take())
            .await;
        if attempt >= args.retry_failed {
            break state;
        }
        let Some(failed) = resume_point(&state) else {
            break state;
        };
        attempt += 1;
        progress.retry(
            attempt,
            args.retry_failed,
            failed,
            state.error.as_deref().unwrap_or_default(),
        );
        info!(attempt, step = %failed, "Retrying workflow from failed step");
        start_step = failed;
        previous = Some(state);
    };

    progress.complete(&state);
    progress.print_report(&engine.get_workflow_results(), args.json);

    if let Some(path) = &args.save_state {
        let json = serde_json::to_string_pretty(&state)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(if state.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Step to retry from: only step failures resume, validation and setup
/// errors would fail the same way again.
fn resume_point(state: &WorkflowState) -> Option<Step> {
    if state.error.is_none() || state.is_complete() {
        return None;
    }
    state.error_step
}

async fn health(config: AnalyzerConfig) -> Result<ExitCode> {
    let client = create_gemini_client(&config).map_err(AnalyzerError::from)?;
    if client.health_check().await {
        println!("{} is reachable", client.model());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} did not respond", client.model());
        Ok(ExitCode::FAILURE)
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>, AnalyzerError> {
    if !path.is_file() {
        return Err(AnalyzerError::ImageNotFound(path.display().to_string()));
    }
    Ok(std::fs::read(path)?)
}

fn read_metadata(path: &Path) -> Result<Value, AnalyzerError> {
    let contents = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&contents)?;
    if !value.is_object() {
        return Err(AnalyzerError::Metadata(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

fn read_state(path: &Path) -> Result<WorkflowState> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_compliance::ProcessorResult;
    use serde_json::json;

    #[test]
    fn schema_output_needs_no_config() {
        let job_aid: Value = serde_json::from_str(&schema_json(SchemaKind::JobAid).unwrap()).unwrap();
        assert_eq!(job_aid, job_aid_schema());
        let findings: Value =
            serde_json::from_str(&schema_json(SchemaKind::Findings).unwrap()).unwrap();
        assert_eq!(findings, findings_schema());
    }

    #[test]
    fn step_failure_resumes_at_failed_step() {
        let mut state = WorkflowState::new();
        state.mark_step_complete(Step::Step1, ProcessorResult::success(json!({})));
        state.mark_step_failed(Step::Step2, "Workflow execution error: Step 2 failed: timeout");

        assert_eq!(resume_point(&state), Some(Step::Step2));
    }

    #[test]
    fn unattributed_errors_do_not_resume() {
        let mut state = WorkflowState::new();
        state.error = Some("Workflow validation error: Image bytes cannot be empty".into());

        assert_eq!(resume_point(&state), None);
    }

    #[test]
    fn finished_run_does_not_resume() {
        let mut state = WorkflowState::new();
        for step in Step::ALL {
            state.mark_step_complete(step, ProcessorResult::success(json!({})));
        }

        assert_eq!(resume_point(&state), None);
        assert_eq!(resume_point(&WorkflowState::new()), None);
    }
}
