use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::classifier::Classifier;
use crate::classifier::ClassifierError;
use crate::classifier::Outcome;
use crate::cli::Cli;
use crate::config::Config;
use crate::config::ConfigError;
use crate::config::RawConfig;
use crate::outputter::OutPutter;
use crate::outputter::Summary;
use crate::runner::RunnerError;
use crate::runner::ScenarioRun;
use crate::runner::run_scenarios;
use crate::scenario::PlanError;
use crate::scenario::Scenario;

mod classifier;
mod cli;
mod config;
mod inspect;
mod outputter;
mod profile;
mod runner;
mod scenario;

#[derive(Error, Debug, Diagnostic)]
pub enum EnsekQuestError {
    #[error("Failed to read config file")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse config file")]
    TomlParsing(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    PlanError(#[from] PlanError),
}

/// Loads the configuration file and validates its contents.
///
/// Configuration problems are the only errors that abort the whole run, and
/// they do so here, before a single request has been sent.
fn load_and_validate_config() -> Result<(Cli, Config), EnsekQuestError> {
    let cli = Cli::parse();

    let contents = std::fs::read_to_string(&cli.path).map_err(EnsekQuestError::FileError)?;
    let raw: RawConfig = toml::from_str(&contents).map_err(EnsekQuestError::TomlParsing)?;

    let config = config::validate(&raw, &contents, &cli.path)?;

    Ok((cli, config))
}

/// Spawns the concurrent pipeline tasks: runner, classifier, and outputter.
///
/// - **Runner:** Executes each scenario over HTTP, strictly in plan order,
///   and sends the captured runs to the classifier.
/// - **Classifier:** Turns runs into Pass/Fail/Skip outcomes.
/// - **Outputter:** Prints outcomes as they arrive and accumulates the
///   summary counts.
///
/// Each stage runs in its own Tokio task with unbounded flume channels in
/// between. The scenarios themselves never run concurrently; only the
/// pipeline stages do.
fn run_pipeline_tasks(
    plan: Vec<Scenario>,
    config: Config,
    path: &str,
    detail: bool,
) -> (
    JoinHandle<Result<(), RunnerError>>,
    JoinHandle<Result<(), ClassifierError>>,
    JoinHandle<Summary>,
) {
    let n_scenarios = plan.len();
    let (runner_tx, classifier_rx) = flume::unbounded::<ScenarioRun>();
    let (classifier_tx, outputter_rx) = flume::unbounded::<Outcome>();

    // Outputter Task
    let outputter_path = path.to_owned();
    let outputter_handle = tokio::spawn(async move {
        OutPutter::start(outputter_rx, &outputter_path, n_scenarios, detail).await
    });

    // Runner Task
    let runner_jh = tokio::spawn(async move { run_scenarios(plan, config, runner_tx).await });

    // Classifier Task
    let classifier_jh =
        tokio::spawn(async move { Classifier::run(classifier_rx, classifier_tx).await });

    (runner_jh, classifier_jh, outputter_handle)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load the CLI arguments and read the configuration file. Anything
    // wrong with the config is fatal and reported as a miette diagnostic
    // pointing into the file.
    let (cli, config) = load_and_validate_config()?;

    // Build the parameterized scenario table and order it by its explicit
    // dependencies: reset before purchases, purchases before order reads.
    let suite = scenario::suite(&config);
    let plan = scenario::plan(suite).map_err(EnsekQuestError::PlanError)?;

    // Spawn the pipeline and wait for all three stages to drain. The
    // channels close in sequence as each upstream stage finishes.
    let (runner_jh, classifier_jh, outputter_handle) =
        run_pipeline_tasks(plan, config, &cli.path, cli.detail);

    let (runner_result, classifier_result, outputter_result) =
        futures::join!(runner_jh, classifier_jh, outputter_handle);

    // A stage failure means the report above is incomplete. Say so rather
    // than ending on a clean-looking summary.
    let failures = [
        stage_failure("runner", runner_result),
        stage_failure("classifier", classifier_result),
    ];
    for failure in failures.into_iter().flatten() {
        eprintln!("{} {failure}", console::style("error:").red().bold());
    }

    if let Err(error) = outputter_result {
        eprintln!(
            "{} outputter task aborted: {error}",
            console::style("error:").red().bold()
        );
    }

    Ok(())
}

/// Folds one pipeline stage's join result into a printable failure, if any.
/// Covers both the stage returning an error and the task itself aborting.
fn stage_failure<E: std::fmt::Display>(
    stage: &str,
    result: Result<Result<(), E>, tokio::task::JoinError>,
) -> Option<String> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(format!("{stage} stage failed: {error}")),
        Err(error) => Some(format!("{stage} task aborted: {error}")),
    }
}

#[cfg(test)]
mod test {
    use super::stage_failure;

    #[test]
    fn clean_stage_produces_no_failure() {
        let result: Result<Result<(), std::io::Error>, tokio::task::JoinError> = Ok(Ok(()));

        assert!(stage_failure("runner", result).is_none());
    }

    #[test]
    fn stage_error_is_reported_with_its_stage_name() {
        let result: Result<Result<(), std::io::Error>, tokio::task::JoinError> =
            Ok(Err(std::io::Error::other("connection pool exhausted")));

        let failure = stage_failure("runner", result).unwrap();
        assert!(failure.contains("runner stage failed"));
        assert!(failure.contains("connection pool exhausted"));
    }
}
