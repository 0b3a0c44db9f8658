//! janitor: cloud resource janitor worker and operator CLI
//!
//! `run` starts a worker process against the shared store. The other
//! subcommands inspect or adjust that store without starting any agents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use janitor_common::{Clock, SystemClock};
use janitor_engine::collaborators::{
    LogNotifier, NoopTagger, OwnerResolverChain, TagOwnerResolver,
};
use janitor_engine::config::JanitorConfig;
use janitor_engine::inventory::FileInventory;
use janitor_engine::janitor::{Collaborators, Janitor};
use janitor_engine::lock::SqliteLockingService;
use janitor_engine::metrics::Metrics;
use janitor_engine::model::WorkItem;
use janitor_engine::rules::RuleRegistry;
use janitor_engine::store::{DbPool, Repositories, SqliteStore, default_db_path, open_db};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "janitor")]
#[command(about = "Marks, reports and deletes unused cloud resources")]
#[command(version)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, env = "JANITOR_CONFIG", default_value = "janitor.json")]
    config: PathBuf,

    /// Shared store (default: platform data directory)
    #[arg(long, env = "JANITOR_DB")]
    db: Option<PathBuf>,

    /// JSON resource inventory standing in for the cloud provider
    #[arg(long, env = "JANITOR_INVENTORY", default_value = "inventory.json")]
    inventory: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a worker until interrupted
    Run,

    /// Load and validate the config, listing the work configurations it yields
    Validate,

    /// Show the shared work queue
    Queue {
        /// Seed one item per configuration and action
        #[arg(long, conflicts_with = "clear")]
        seed: bool,

        /// Drop every queued item
        #[arg(long)]
        clear: bool,
    },

    /// List resources currently marked for deletion
    Marked {
        /// Only this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Print the state history of a resource as JSON
    State { namespace: String, resource_id: String },

    /// Exclude a resource from all further automated processing
    OptOut { namespace: String, resource_id: String },

    /// Re-admit a previously opted-out resource
    ClearOptOut { namespace: String, resource_id: String },

    /// List submitted deletion tasks
    Tasks,
}

/// Print error with full chain of causes
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match &args.command {
        Command::Validate => {
            let config = load_config(&args.config)?;
            let configurations = config.work_configurations();
            println!(
                "{} is valid: {} work configuration(s)",
                args.config.display(),
                configurations.len()
            );

            let mut table = table(&["Namespace", "Retention", "Rules", "Notify", "Dry run"]);
            for c in &configurations {
                table.add_row(vec![
                    Cell::new(&c.namespace),
                    Cell::new(format!("{}d", c.retention_days)),
                    Cell::new(c.rules.len()),
                    Cell::new(c.notification.enabled),
                    Cell::new(c.dry_run),
                ]);
            }
            println!("{table}");
        }
        Command::Run => {
            let janitor = open_janitor(&args).await?;
            let metrics = janitor.context().metrics.clone();
            janitor.membership().up();

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, finishing in-flight work");
                    signal.cancel();
                }
            });

            janitor.run(shutdown).await;

            for sample in metrics.snapshot() {
                info!(metric = %sample.key, kind = ?sample.kind, value = sample.value, "Final metric");
            }
        }
        Command::Queue { seed, clear } => {
            let repos = open_repositories(&args).await?;
            if *clear {
                repos.work_queue.clear().await?;
                println!("Work queue cleared");
            }
            if *seed {
                let config = load_config(&args.config)?;
                let items = WorkItem::all_for(&config.work_configurations());
                repos.work_queue.seed(&items).await?;
                println!("Seeded {} item(s)", items.len());
            }

            let items = repos.work_queue.items().await?;
            println!("{} item(s) queued", items.len());
            for item in items {
                println!("  {}", item.id());
            }
        }
        Command::Marked { namespace } => {
            let repos = open_repositories(&args).await?;
            let marked = match namespace {
                Some(ns) => repos.tracking.marked_resources_in(ns).await?,
                None => repos.tracking.marked_resources().await?,
            };
            if marked.is_empty() {
                println!("No marked resources");
                return Ok(());
            }

            let mut table = table(&["Namespace", "Resource", "Owner", "Deletes", "Notified"]);
            for m in marked {
                let deletion = m
                    .deletion_date_time()
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "?".to_string());
                table.add_row(vec![
                    Cell::new(&m.namespace),
                    Cell::new(m.resource.type_and_name()),
                    Cell::new(&m.resource_owner),
                    Cell::new(deletion),
                    Cell::new(if m.is_notified() { "yes" } else { "no" }),
                ]);
            }
            println!("{table}");
        }
        Command::State {
            namespace,
            resource_id,
        } => {
            let repos = open_repositories(&args).await?;
            let state = repos
                .state
                .get(resource_id, namespace)
                .await?
                .with_context(|| format!("No state for {resource_id} in {namespace}"))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            println!("lifecycle: {}", state.lifecycle());
        }
        Command::OptOut {
            namespace,
            resource_id,
        } => {
            let janitor = open_janitor(&args).await?;
            let config = janitor
                .configuration(namespace)
                .with_context(|| format!("Unknown namespace: {namespace}"))?;
            if janitor.context().opt_out(resource_id, config).await? {
                println!("Opted out {resource_id} in {namespace}");
            } else {
                anyhow::bail!("{resource_id} is not known in {namespace}");
            }
        }
        Command::ClearOptOut {
            namespace,
            resource_id,
        } => {
            let janitor = open_janitor(&args).await?;
            if janitor
                .context()
                .events
                .clear_opt_out(resource_id, namespace)
                .await?
            {
                println!("Cleared opt-out of {resource_id} in {namespace}");
            } else {
                anyhow::bail!("{resource_id} is not opted out in {namespace}");
            }
        }
        Command::Tasks => {
            let repos = open_repositories(&args).await?;
            let tasks = repos.tasks.all().await?;
            if tasks.is_empty() {
                println!("No tasks");
                return Ok(());
            }

            let mut table = table(&["Task", "Action", "Status", "Resources", "Namespace"]);
            for task in tasks {
                table.add_row(vec![
                    Cell::new(&task.task_id),
                    Cell::new(task.action),
                    Cell::new(task.status),
                    Cell::new(task.resource_ids.len()),
                    Cell::new(&task.namespace),
                ]);
            }
            println!("{table}");
        }
    }

    Ok(())
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(Cell::new));
    table
}

fn load_config(path: &std::path::Path) -> Result<JanitorConfig> {
    let config = JanitorConfig::load(path)?;
    config.validate(&RuleRegistry::with_defaults())?;
    Ok(config)
}

async fn open_pool(args: &Args) -> Result<DbPool> {
    let path = match &args.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!(path = %path.display(), "Opening store");
    open_db(&path).await
}

async fn open_repositories(args: &Args) -> Result<Repositories> {
    let pool = open_pool(args).await?;
    Ok(Repositories::sqlite(SqliteStore::new(
        pool,
        Arc::new(SystemClock),
    )))
}

async fn open_janitor(args: &Args) -> Result<Janitor> {
    let config = load_config(&args.config)?;
    let pool = open_pool(args).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let inventory = Arc::new(FileInventory::new(&args.inventory));
    let collaborators = Collaborators {
        provider: inventory.clone(),
        notifier: Arc::new(LogNotifier),
        tagger: Arc::new(NoopTagger),
        cache: inventory,
        owners: OwnerResolverChain::new(vec![Arc::new(TagOwnerResolver::default())]),
    };

    Ok(Janitor::new(
        config,
        Repositories::sqlite(SqliteStore::new(pool.clone(), clock.clone())),
        Arc::new(SqliteLockingService::new(pool, clock.clone())),
        collaborators,
        Arc::new(Metrics::new()),
        clock,
    ))
}
