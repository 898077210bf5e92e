mod mirror_commands;
mod skill_commands;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    skillshelf_config::ShelfConfig,
    skillshelf_skills::{Catalog, CatalogOptions, CliGitClient, MemoryIndex},
    tracing::{debug, info},
    tracing_subscriber::{
        EnvFilter, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
    },
};

#[derive(Parser)]
#[command(name = "skillshelf", about = "Skillshelf, a local catalog of agent skills")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Skills root (overrides config and SKILLSHELF_DIR).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Explicit config file. Discovered from standard locations when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every visible skill.
    List,
    /// Show one skill, including its body.
    Show {
        /// Skill id (`name` or `mirror/name`).
        id: String,
    },
    /// Full-text search over names, descriptions and bodies.
    Search { query: String },
    /// List the scripts, references and assets of a skill.
    Resources { id: String },
    /// Print one resource file.
    Cat {
        id: String,
        /// Path relative to the skill root, e.g. `scripts/run.py`.
        path: String,
    },
    /// Export a skill as a gzip tarball.
    Export {
        id: String,
        /// Output file. Defaults to `<name>.tar.gz` in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a skill from a gzip tarball.
    Import { file: PathBuf },
    /// Create a new local skill.
    Create {
        name: String,
        #[arg(long)]
        description: String,
        /// Markdown file used as the skill body.
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Delete a local skill.
    Delete { id: String },
    /// Git mirror management.
    Mirror {
        #[command(subcommand)]
        action: mirror_commands::MirrorAction,
    },
    /// Run the background mirror sync until Ctrl-C.
    Watch,
}

/// Run `f` with a temporary stderr subscriber so warnings emitted before
/// [`init_telemetry`] (config parsing, env overrides) are not lost.
fn with_bootstrap_logging<T, W>(filter: EnvFilter, writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

fn init_telemetry(cli: &Cli, config: &ShelfConfig) {
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs || config.logging.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn open_catalog(cli: &Cli, config: &ShelfConfig) -> anyhow::Result<Arc<Catalog>> {
    let root = cli
        .dir
        .clone()
        .unwrap_or_else(|| config.skills.resolved_dir());
    debug!(root = %root.display(), "opening catalog");

    let options = CatalogOptions {
        root,
        seed_urls: config.mirrors.urls.clone(),
        sync_interval: Duration::from_secs(config.mirrors.sync_interval_secs),
        sync_on_start: config.mirrors.sync_on_start,
    };
    let catalog = Catalog::new(
        options,
        Arc::new(MemoryIndex::new()),
        Arc::new(CliGitClient::new()),
    )
    .await?;
    Ok(catalog)
}

/// Pretty-print any serializable value to stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let bootstrap_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let config = with_bootstrap_logging(bootstrap_filter, std::io::stderr, || {
        skillshelf_config::load(cli.config.as_deref())
    })?;
    init_telemetry(&cli, &config);
    debug!(version = env!("CARGO_PKG_VERSION"), "skillshelf starting");

    let catalog = open_catalog(&cli, &config).await?;

    match cli.command {
        Commands::Mirror { action } => mirror_commands::handle_mirror(&catalog, action).await,
        Commands::Watch => watch(&catalog).await,
        command => skill_commands::handle_skill(&catalog, command).await,
    }
}

async fn watch(catalog: &Arc<Catalog>) -> anyhow::Result<()> {
    catalog.start_sync().await?;
    info!(root = %catalog.root().display(), "watching skills root, press Ctrl-C to stop");

    #[cfg(feature = "file-watcher")]
    {
        use skillshelf_skills::watcher::{SkillWatchEvent, SkillWatcher};

        let (_watcher, mut events) = SkillWatcher::start(catalog.root())?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                Some(SkillWatchEvent::Changed { paths }) = events.recv() => {
                    info!(count = paths.len(), "manifests changed on disk, rebuilding index");
                    if let Err(e) = catalog.rebuild_index().await {
                        tracing::warn!(error = %e, "index rebuild failed");
                    }
                },
            }
        }
    }

    #[cfg(not(feature = "file-watcher"))]
    tokio::signal::ctrl_c().await?;

    catalog.stop_sync().await;
    info!("stopped");
    Ok(())
}
