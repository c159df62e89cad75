//! biopm CLI entrypoint
//! Parses command-line arguments and dispatches to the store,
//! project, and template services.
#![deny(unsafe_code)]
mod application;
mod core;
mod infrastructure;
mod lifecycle;
mod render;
mod state;
mod store;

// Internal imports (std, crate)
use application::project as project_ops;
use lifecycle::invoker::StoreScriptInvoker;
use lifecycle::{Mode, RenderOptions, TemplateService};
use render::{PlanItem, RenderResult};
use state::project::OnExists;
use std::path::PathBuf;
use store::{ActiveStore, StoreRegistry};

// External imports (alphabetized)
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "biopm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Manage cached resource stores
    Store {
        #[command(subcommand)]
        action: StoreCommands,
    },
    /// Initialize and inspect projects
    Project {
        #[command(subcommand)]
        action: ProjectCommands,
    },
    /// Render, run, and publish templates from the active store
    Template {
        #[command(subcommand)]
        action: TemplateCommands,
    },
    /// Render and run workflows from the active store
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum StoreCommands {
    /// Add a store from a local directory snapshot
    Add {
        /// Directory containing a store.yaml manifest
        path: PathBuf,
        /// Make this the active store right away
        #[arg(long)]
        activate: bool,
    },
    /// Set the active store
    Activate { id: String },
    /// List known stores
    List,
    /// Remove a store and its cached snapshot
    Remove { id: String },
    /// Refresh a store's cached version/commit metadata
    Update { id: String },
    /// Show details for one store
    Info { id: String },
}

#[derive(clap::Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project directory with its project.yaml
    Init {
        name: String,
        /// Parent directory for the new project folder
        #[arg(long, default_value = ".")]
        outdir: PathBuf,
        /// Host-aware project path, e.g. nextgen:/projects/NAME
        #[arg(long)]
        path: Option<String>,
        /// Author ids from the store's authors.yaml
        #[arg(long = "author", value_delimiter = ',')]
        authors: Vec<String>,
        /// Ad-hoc directories to adopt after init (repeatable)
        #[arg(long = "adopt")]
        adopt: Vec<PathBuf>,
    },
    /// Show the project header
    Info {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Show per-template status
    Status {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Fold ad-hoc output directories into the project
    Adopt {
        /// Source directory carrying biopm.meta.yaml (repeatable)
        #[arg(long = "from", required = true)]
        from: Vec<PathBuf>,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// What to do when the entry id already exists
        #[arg(long = "on-exists", value_enum, default_value = "merge")]
        on_exists: OnExists,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum TemplateCommands {
    /// Render a template's files and record the instance
    Render {
        id: String,
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Parameter override KEY=VALUE (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
        /// Compute the plan without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Render ad-hoc into this directory instead of a project
        #[arg(long)]
        out: Option<PathBuf>,
        /// Record the instance under a different id
        #[arg(long)]
        alias: Option<String>,
    },
    /// Execute a rendered instance's entry script
    Run {
        id: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Resolve and record the instance's published outputs
    Publish {
        id: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum WorkflowCommands {
    /// Render a workflow's files into the project
    Render {
        id: String,
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Parameter override KEY=VALUE (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
        /// Compute the plan without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Execute a rendered workflow's entry script
    Run {
        id: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Store { action } => run_store(action)?,
        Commands::Project { action } => run_project(action)?,
        Commands::Template { action } => run_template(action)?,
        Commands::Workflow { action } => run_workflow(action)?,
    }
    Ok(())
}

fn run_store(action: StoreCommands) -> anyhow::Result<()> {
    let registry = StoreRegistry::open_default()?;
    match action {
        StoreCommands::Add { path, activate } => {
            let record = registry.add(&path, activate)?;
            println!("Added store '{}' ({})", record.id, record.version);
            if activate {
                println!("Active store: {}", record.id);
            }
        }
        StoreCommands::Activate { id } => {
            registry.activate(&id)?;
            println!("Active store: {id}");
        }
        StoreCommands::List => {
            let index = registry.load_index()?;
            if index.stores.is_empty() {
                println!("No stores registered. Use `biopm store add <path>`.");
            }
            for (id, record) in &index.stores {
                let marker = if index.active.as_deref() == Some(id) {
                    " *"
                } else {
                    ""
                };
                println!("{id} {}{marker}", record.version);
            }
        }
        StoreCommands::Remove { id } => {
            registry.remove(&id)?;
            println!("Removed store '{id}'");
        }
        StoreCommands::Update { id } => {
            let record = registry.update(&id)?;
            println!("Updated store '{}' to {}", record.id, record.version);
        }
        StoreCommands::Info { id } => {
            let record = registry.info(&id)?;
            println!("Id:       {}", record.id);
            println!("Version:  {}", record.version);
            println!("Source:   {}", record.source);
            println!("Cache:    {}", record.cache_path);
            if let Some(commit) = &record.commit {
                println!("Commit:   {commit}");
            }
            if let Some(updated) = &record.last_updated {
                println!("Updated:  {updated}");
            }
        }
    }
    Ok(())
}

fn run_project(action: ProjectCommands) -> anyhow::Result<()> {
    match action {
        ProjectCommands::Init {
            name,
            outdir,
            path,
            authors,
            adopt,
        } => {
            let registry = StoreRegistry::open_default()?;
            let store = ActiveStore::from_registry(&registry)?;
            let opts = project_ops::InitOptions {
                outdir,
                path,
                authors,
                adopt,
            };
            let dir = project_ops::init(&store, &name, &opts)?;
            println!("Initialized project '{name}' at {}", dir.display());
        }
        ProjectCommands::Info { dir } => print!("{}", project_ops::info_text(&dir)?),
        ProjectCommands::Status { dir } => print!("{}", project_ops::status_text(&dir)?),
        ProjectCommands::Adopt {
            from,
            dir,
            on_exists,
        } => {
            for (id, outcome) in project_ops::adopt(&dir, &from, on_exists)? {
                println!("{id}: {}", outcome.as_str());
            }
        }
    }
    Ok(())
}

fn run_template(action: TemplateCommands) -> anyhow::Result<()> {
    let registry = StoreRegistry::open_default()?;
    let store = ActiveStore::from_registry(&registry)?;
    let invoker = StoreScriptInvoker::new(store.root());
    let service = TemplateService::new(&store, &invoker);

    match action {
        TemplateCommands::Render {
            id,
            dir,
            params,
            dry_run,
            out,
            alias,
        } => {
            let mode = mode_for(dir, out);
            let opts = RenderOptions {
                params,
                dry_run,
                alias,
            };
            let result = service.render(&id, &mode, &opts)?;
            print_render_result(&result, dry_run);
        }
        TemplateCommands::Run { id, dir, out } => {
            let mode = mode_for(dir, out);
            let output = service.run(&id, &mode)?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            println!("Run of '{id}' completed");
        }
        TemplateCommands::Publish { id, dir, out } => {
            let mode = mode_for(dir, out);
            let resolved = service.publish(&id, &mode)?;
            for (key, value) in &resolved {
                println!("{key}: {value}");
            }
        }
    }
    Ok(())
}

fn run_workflow(action: WorkflowCommands) -> anyhow::Result<()> {
    let registry = StoreRegistry::open_default()?;
    let store = ActiveStore::from_registry(&registry)?;
    let invoker = StoreScriptInvoker::new(store.root());
    let service = TemplateService::new(&store, &invoker);

    match action {
        WorkflowCommands::Render {
            id,
            dir,
            params,
            dry_run,
        } => {
            let opts = RenderOptions {
                params,
                dry_run,
                alias: None,
            };
            let result = service.render_workflow(&id, &dir, &opts)?;
            print_render_result(&result, dry_run);
        }
        WorkflowCommands::Run { id, dir } => {
            let output = service.run_workflow(&id, &dir)?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            println!("Workflow '{id}' completed");
        }
    }
    Ok(())
}

fn print_render_result(result: &RenderResult, dry_run: bool) {
    let verb = if dry_run { "Would write" } else { "Wrote" };
    // chmod steps are part of the plan but not written files
    let written = result
        .files
        .iter()
        .filter(|item| !matches!(item, PlanItem::Chmod { .. }))
        .count();
    println!("{verb} {written} file(s) under {}", result.target_dir.display());
    for item in &result.files {
        println!("  {:<6} {}", plan_verb(item), item.dst().display());
    }
}

fn mode_for(dir: PathBuf, out: Option<PathBuf>) -> Mode {
    match out {
        Some(out) => Mode::AdHoc { out },
        None => Mode::Project { dir },
    }
}

fn plan_verb(item: &PlanItem) -> &'static str {
    match item {
        PlanItem::Render { .. } => "render",
        PlanItem::Copy { .. } => "copy",
        PlanItem::Chmod { .. } => "chmod",
    }
}
