//! tfws CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tfws_model::{InMemoryStore, ModelWorkspace, WorkspaceBuilder};

mod config;

#[derive(Parser)]
#[command(name = "tfws")]
#[command(about = "tfws - transfer-factor workspace builder")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a workspace from region histograms
    Build {
        /// Input histograms (JSON store: {"regions": {region: {key: hist}}})
        #[arg(short, long)]
        input: PathBuf,

        /// Builder configuration (YAML or JSON). Defaults to the monojet layout.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output workspace (JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a parametric yield
    Eval {
        /// Workspace JSON produced by `build`
        #[arg(short, long)]
        workspace: PathBuf,

        /// Yield name (e.g. WJets_model_we)
        #[arg(long = "yield")]
        yield_name: String,

        /// Parameter override NAME=VALUE (repeatable)
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, f64)>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarise a workspace
    Inspect {
        /// Workspace JSON produced by `build`
        #[arg(short, long)]
        workspace: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the default builder configuration (YAML)
    DefaultConfig,
}

fn parse_assignment(s: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = s.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let value = value.trim().parse::<f64>().map_err(|e| format!("bad value in '{s}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build { input, config, output } => {
            cmd_build(&input, config.as_ref(), output.as_ref())
        }
        Commands::Eval { workspace, yield_name, set, output } => {
            cmd_eval(&workspace, &yield_name, &set, output.as_ref())
        }
        Commands::Inspect { workspace, output } => cmd_inspect(&workspace, output.as_ref()),
        Commands::DefaultConfig => {
            print!("{}", config::default_config_yaml()?);
            Ok(())
        }
    }
}

fn cmd_build(input: &PathBuf, config: Option<&PathBuf>, output: Option<&PathBuf>) -> Result<()> {
    let config = config::read_config(config.map(PathBuf::as_path))?;

    tracing::info!(path = %input.display(), "loading histograms");
    let store = InMemoryStore::from_path(input)
        .with_context(|| format!("failed to load histograms from {}", input.display()))?;

    let ws = WorkspaceBuilder::new(config).build_workspace(&store).context("workspace build failed")?;
    tracing::info!(
        data = ws.data_names().count(),
        yields = ws.yield_names().count(),
        nodes = ws.registry().len(),
        "workspace built"
    );

    match output {
        Some(path) => ws
            .save_json(path)
            .with_context(|| format!("failed to write workspace {}", path.display()))?,
        None => println!("{}", ws.to_json_string()?),
    }
    Ok(())
}

fn load_workspace(path: &PathBuf) -> Result<ModelWorkspace> {
    tracing::info!(path = %path.display(), "loading workspace");
    ModelWorkspace::load_json(path)
        .with_context(|| format!("failed to load workspace {}", path.display()))
}

fn cmd_eval(
    workspace: &PathBuf,
    yield_name: &str,
    set: &[(String, f64)],
    output: Option<&PathBuf>,
) -> Result<()> {
    let mut ws = load_workspace(workspace)?;
    for (name, value) in set {
        ws.set_parameter(name, *value).with_context(|| format!("cannot set '{name}'"))?;
    }
    let bins = ws.evaluate_yield(yield_name).with_context(|| format!("cannot evaluate '{yield_name}'"))?;
    let total = ws.total_yield(yield_name)?;

    let output_json = serde_json::json!({
        "yield": yield_name,
        "bins": bins,
        "total": total,
    });
    write_json(output, output_json)
}

fn cmd_inspect(workspace: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let ws = load_workspace(workspace)?;
    let reg = ws.registry();
    let free = reg.parameters().filter(|p| !p.constant).count();
    let constant = reg.parameters().filter(|p| p.constant).count();

    let output_json = serde_json::json!({
        "name": ws.name(),
        "data": ws.data_names().collect::<Vec<_>>(),
        "yields": ws.yield_names().collect::<Vec<_>>(),
        "n_nodes": reg.len(),
        "n_free_parameters": free,
        "n_constant_parameters": constant,
        "scalars": ws.scalars(),
        "domain": ws.domain(),
    });
    write_json(output, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
