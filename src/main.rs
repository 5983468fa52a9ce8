use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod command;
mod config;
mod dispatch;
mod error;
mod host;
mod parser;
mod tree;

use command::{executable_line, CommandSynthesizer};
use config::RunnerConfig;
use host::{CliDocument, DocumentAccess, ExecutionContext};

#[derive(Parser, Debug)]
#[command(
    name = "cukerun",
    version,
    about = "Run Cucumber features and scenarios with the configured test runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a whole feature file with the configured tool
    Feature(FeatureArgs),
    /// Run the single scenario selected by line number
    Scenario(ScenarioArgs),
    /// List the scenarios found in a feature file
    List(ListArgs),
    /// Discover feature files under a directory and run every scenario
    RunAll(RunAllArgs),
}

#[derive(Parser, Debug)]
struct FeatureArgs {
    /// Feature file to run (the active file)
    file: Option<PathBuf>,

    /// Project root holding .vscode/settings.json (default: nearest ancestor)
    #[arg(long, value_name = "PATH")]
    project_root: Option<PathBuf>,

    /// Answer Ok to the terminate-running-command prompt
    #[arg(long)]
    yes: bool,
}

#[derive(Parser, Debug)]
struct ScenarioArgs {
    /// Feature file containing the scenario
    file: PathBuf,

    /// 1-based line of the Scenario heading or tag line (the selection)
    #[arg(long)]
    line: usize,

    /// Project root holding .vscode/settings.json (default: nearest ancestor)
    #[arg(long, value_name = "PATH")]
    project_root: Option<PathBuf>,

    /// Answer Ok to the terminate-running-command prompt
    #[arg(long)]
    yes: bool,
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Feature file to scan
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct RunAllArgs {
    /// Directory to scan for .feature files
    dir: PathBuf,

    /// Project root holding .vscode/settings.json (default: nearest ancestor)
    #[arg(long, value_name = "PATH")]
    project_root: Option<PathBuf>,

    /// Answer Ok to the terminate-running-command prompt
    #[arg(long)]
    yes: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Feature(args) => cmd_feature(args),
        Commands::Scenario(args) => cmd_scenario(args),
        Commands::List(args) => cmd_list(args),
        Commands::RunAll(args) => cmd_run_all(args),
    };
    // Surface the reason to the user before rethrowing to the shell.
    if let Err(err) = &result {
        tracing::error!("{err:#}");
    }
    result
}

fn cmd_feature(args: FeatureArgs) -> Result<()> {
    let docs = CliDocument::new(args.file, None);
    let file = docs.current_file_path();
    let project_root =
        resolve_project_root(args.project_root, file.as_deref().and_then(Path::parent));
    let config = RunnerConfig::load(&project_root)?;
    let synthesizer = CommandSynthesizer::new(&config, &project_root);
    let command = synthesizer.feature_command(file.as_deref())?;

    tracing::info!("running the current feature with {}", config.tool);
    let line = executable_line(&config, &command);
    let mut context = ExecutionContext::new(&project_root, args.yes);
    context.dispatcher().dispatch(&line, &config.tool)?;
    context.wait_until_idle();
    context.shutdown();
    Ok(())
}

fn cmd_scenario(args: ScenarioArgs) -> Result<()> {
    let docs = CliDocument::new(Some(args.file.clone()), Some(args.line));
    let selected = docs
        .current_selection_line_text()
        .with_context(|| format!("no line {} in {}", args.line, args.file.display()))?;
    let name = parser::scenario_name_from_line(&selected)?;

    let project_root = resolve_project_root(args.project_root, args.file.parent());
    let config = RunnerConfig::load(&project_root)?;
    let synthesizer = CommandSynthesizer::new(&config, &project_root);
    let command = synthesizer.scenario_command(&name, &args.file)?;

    tracing::info!("running scenario {name:?} with {}", config.tool);
    let line = executable_line(&config, &command);
    let mut context = ExecutionContext::new(&project_root, args.yes);
    context.dispatcher().dispatch(&line, &config.tool)?;
    context.wait_until_idle();
    context.shutdown();
    Ok(())
}

fn cmd_list(args: ListArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    let mut count = 0;
    for heading in parser::scenario_headings(&text) {
        println!(
            "{:>5}  {}",
            heading.line_number + 1,
            heading.label.trim_end()
        );
        count += 1;
    }
    tracing::info!("found {count} scenario(s) in {}", args.file.display());
    Ok(())
}

fn cmd_run_all(args: RunAllArgs) -> Result<()> {
    let project_root = resolve_project_root(args.project_root, Some(&args.dir));
    let config = RunnerConfig::load(&project_root)?;
    let files = tree::discover_feature_files(&args.dir)
        .with_context(|| format!("discover feature files under {}", args.dir.display()))?;
    if files.is_empty() {
        tracing::warn!("no feature files under {}", args.dir.display());
        return Ok(());
    }

    let docs = CliDocument::new(None, None);
    let mut nodes: Vec<tree::FeatureNode> = files.into_iter().map(tree::FeatureNode::new).collect();
    for node in &mut nodes {
        node.resolve(&docs, &config);
    }

    let request = tree::RunRequest::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, request.cancel_flag())
        .context("register SIGINT handler")?;

    let mut context = ExecutionContext::new(&project_root, args.yes);
    let mut dispatcher = context.dispatcher();
    let started = tree::run_queued(&nodes, &request, &project_root, &mut dispatcher)?;
    context.wait_until_idle();
    context.shutdown();
    tracing::info!("started {started} scenario run(s)");
    Ok(())
}

fn resolve_project_root(explicit: Option<PathBuf>, start: Option<&Path>) -> PathBuf {
    match (explicit, start) {
        (Some(root), _) => root,
        (None, Some(start)) => config::find_project_root(start),
        (None, None) => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
