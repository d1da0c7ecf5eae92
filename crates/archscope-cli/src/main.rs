mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archscope_core::analysis::CommandAnalyzer;
use archscope_core::llm::{Provider, LLM};
use archscope_core::{
    Config, FactSet, GraphElements, HierarchyStore, IngestOutcome, IngestService, IngestSource,
    JobRunner, MemoryStore, Project, QueryEngine, SurrealStore, Workspace,
};

use serve::ServeConfig;

#[derive(Parser)]
#[command(name = "archscope")]
#[command(about = "Explore a codebase as a zoomable architecture graph", long_about = None)]
struct Cli {
    /// Config file (defaults to ./archscope.toml, then the user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default archscope.toml into the current directory
    Init,
    /// List all projects
    Projects,
    /// Create a project from an analyzer fact file
    Ingest { name: String, facts: PathBuf },
    /// Create a project from an exported graph document
    Import { name: String, graph: PathBuf },
    /// Run the static analyzer over a source tree and ingest the result
    Analyze { name: String, dir: PathBuf },
    /// Continue an ingestion paused on unresolved includes
    Continue { id: String },
    /// Show the includes the analyzer could not resolve
    Unresolved { id: String },
    /// Show the top of a project's hierarchy
    Roots { id: String },
    /// Show the children of a node
    Children { id: String, parent: String },
    /// Lift relation edges onto a set of visible nodes
    Aggregate {
        id: String,
        #[arg(required = true)]
        visible: Vec<String>,
    },
    /// Annotate every node with an AI summary
    Summarize { id: String },
    /// Delete a project and its files
    Delete { id: String },
    /// Start the JSON API for the visualizer
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Keep everything in memory instead of the on-disk database
        #[arg(long)]
        memory: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,archscope_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init(),
        Commands::Serve { port, host, memory } => {
            let config = load_config(cli.config.as_deref())?;
            let store: Arc<dyn HierarchyStore> = if memory {
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(open_store(&config).await?)
            };
            let serve_config = ServeConfig {
                host: host.unwrap_or_else(|| config.server.host.clone()),
                port: port.unwrap_or(config.server.port),
            };
            serve::start_server(serve_config, job_runner(&config, store)).await?;
            Ok(())
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            let store: Arc<dyn HierarchyStore> = Arc::new(open_store(&config).await?);
            run(command, job_runner(&config, store)).await
        }
    }
}

async fn run(command: Commands, jobs: JobRunner) -> Result<()> {
    let queries = QueryEngine::new(Arc::clone(jobs.store()));

    match command {
        Commands::Projects => {
            let projects = jobs.store().list_projects().await?;
            if projects.is_empty() {
                println!("No projects found. Use 'archscope ingest <name> <facts.json>' to create one.");
            }
            for project in projects {
                print_project(&project);
            }
        }
        Commands::Ingest { name, facts } => {
            let facts = FactSet::load(&facts)?;
            ingest(&jobs, &name, IngestSource::Facts(facts)).await?;
        }
        Commands::Import { name, graph } => {
            let content = std::fs::read_to_string(&graph)
                .wrap_err_with(|| format!("Failed to read {}", graph.display()))?;
            let doc: GraphElements = serde_json::from_str(&content)?;
            ingest(&jobs, &name, IngestSource::Elements(doc)).await?;
        }
        Commands::Analyze { name, dir } => {
            if !dir.is_dir() {
                bail!("Not a directory: {}", dir.display());
            }
            ingest(&jobs, &name, IngestSource::Analyze(dir)).await?;
        }
        Commands::Continue { id } => {
            let project = jobs.ingest().prepare_resume(&id).await?;
            let spinner = spinner("Resuming ingestion...")?;
            let result = jobs.run_ingest(&project, IngestSource::Resume).await;
            spinner.finish_and_clear();
            print_outcome(&project, result?);
        }
        Commands::Unresolved { id } => {
            let includes = jobs.ingest().unresolved_includes(&id).await?;
            if includes.is_empty() {
                println!("No unresolved includes.");
            }
            for include in includes {
                println!("{include}");
            }
        }
        Commands::Roots { id } => print_json(&queries.roots(&id).await?)?,
        Commands::Children { id, parent } => print_json(&queries.children(&id, &parent).await?)?,
        Commands::Aggregate { id, visible } => {
            print_json(&queries.aggregate_edges(&id, &visible).await?)?
        }
        Commands::Summarize { id } => {
            let project = jobs.prepare_annotation(&id).await?;
            let spinner = spinner("Summarizing architecture with AI...")?;
            let result = jobs.run_annotation(&project).await;
            spinner.finish_and_clear();
            let report = result?;
            println!(
                "Annotated {} nodes ({} failed, {} skipped, {} provisional summaries)",
                report.summarized, report.failed, report.skipped, report.shallow
            );
        }
        Commands::Delete { id } => {
            jobs.run_delete(&id).await?;
            println!("Deleted project {id}");
        }
        Commands::Init | Commands::Serve { .. } => bail!("not a one-shot command"),
    }

    Ok(())
}

// =============================================================================
// Setup
// =============================================================================

fn init() -> Result<()> {
    let path = Path::new("archscope.toml");
    if path.exists() {
        bail!("archscope.toml already exists");
    }
    std::fs::write(path, Config::default_config_string())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Ok(match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    })
}

async fn open_store(config: &Config) -> Result<SurrealStore> {
    let path = config.storage.database_path();
    SurrealStore::open(&path)
        .await
        .wrap_err_with(|| format!("Failed to open database at {}", path.display()))
}

fn job_runner(config: &Config, store: Arc<dyn HierarchyStore>) -> JobRunner {
    let ingest = IngestService::new(
        store,
        Workspace::new(&config.storage),
        config.graph.clone(),
    );
    let mut runner = JobRunner::new(ingest, config.annotation.clone());

    match Provider::from_config(&config.llm).and_then(|p| p.build(&config.llm)) {
        Ok(llm) => runner = runner.with_llm(Arc::<dyn LLM>::from(llm)),
        Err(e) => debug!(error = %e, "No LLM provider available; summarization disabled"),
    }

    if !config.analysis.command.is_empty() {
        let analyzer = CommandAnalyzer::from_config(&config.analysis, config.storage.facts_file.clone());
        runner = runner.with_analyzer(Arc::new(analyzer));
    }

    runner
}

// =============================================================================
// Output
// =============================================================================

async fn ingest(jobs: &JobRunner, name: &str, source: IngestSource) -> Result<()> {
    let spinner = spinner(&format!("Ingesting {name}..."))?;
    let result = jobs.ingest_new(name, source).await;
    spinner.finish_and_clear();
    let (project, outcome) = result?;
    print_outcome(&project, outcome);
    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn print_outcome(project: &Project, outcome: IngestOutcome) {
    match outcome {
        IngestOutcome::Imported { nodes, edges } => {
            println!("Project {} ({})", project.name, project.id);
            println!("  Imported {nodes} nodes and {edges} edges");
        }
        IngestOutcome::Unresolved { count } => {
            println!("Project {} ({})", project.name, project.id);
            println!("  {count} unresolved includes found.");
            println!("  Review them with 'archscope unresolved {}'", project.id);
            println!("  then run 'archscope continue {}'", project.id);
        }
    }
}

fn print_project(project: &Project) {
    println!("{}  {}  [{}]", project.id, project.name, project.status);
    if let Some(description) = &project.description {
        println!("    {description}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
