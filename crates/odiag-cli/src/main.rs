use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use odiag::{JsonSink, SnapshotController, SnapshotOutcome};
use odiag_config::{ExplorerMode, NestedContainers, OdiagConfig, SharedReferences};
use odiag_remote::{MockAsyncRemote, MockHeap, MockRemote, ThreadId};

/// Render the object diagram of a suspended thread from a JSON heap dump.
///
/// The diagram is written to stdout as one JSON document.
#[derive(Debug, Parser)]
#[command(name = "odiag", version, about)]
struct Cli {
    /// Heap dump in the `odiag-remote` fixture format.
    #[arg(long)]
    heap: PathBuf,

    /// Suspended thread to snapshot. Defaults to the first thread in the dump.
    #[arg(long)]
    thread: Option<ThreadId>,

    /// Path to a TOML config file.
    ///
    /// If unset, `ODIAG_CONFIG` is used as a fallback. When neither are
    /// provided the built-in defaults apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured explorer.
    #[arg(long, value_enum)]
    explorer: Option<Explorer>,

    /// Override the asynchronous explorer's loading depth.
    #[arg(long)]
    depth: Option<u32>,

    /// Draw a link for every path to an already emitted object.
    #[arg(long)]
    link_existing: bool,

    /// Attach container elements to the owning object instead of a container node.
    #[arg(long)]
    inline_containers: bool,

    /// Pretty-print the diagram.
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Explorer {
    Sync,
    Async,
}

impl From<Explorer> for ExplorerMode {
    fn from(value: Explorer) -> Self {
        match value {
            Explorer::Sync => ExplorerMode::Sync,
            Explorer::Async => ExplorerMode::Async,
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.clone());
    apply_overrides(&cli, &mut config);
    odiag_config::init_tracing(&config.logging);

    run(&cli, config, std::io::stdout()).await
}

fn load_config(cli_path: Option<PathBuf>) -> OdiagConfig {
    let path = cli_path.or_else(|| std::env::var_os("ODIAG_CONFIG").map(PathBuf::from));
    let Some(path) = path else {
        return OdiagConfig::default();
    };

    match OdiagConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "odiag: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            OdiagConfig::default()
        }
    }
}

fn apply_overrides(cli: &Cli, config: &mut OdiagConfig) {
    // An explicit invocation always wants a diagram.
    config.active = true;
    if let Some(explorer) = cli.explorer {
        config.explorer = explorer.into();
    }
    if let Some(depth) = cli.depth {
        config.loading_depth = depth;
    }
    if cli.link_existing {
        config.shared_references = SharedReferences::LinkExisting;
    }
    if cli.inline_containers {
        config.nested_containers = NestedContainers::Inline;
    }
}

fn read_heap(path: &Path) -> anyhow::Result<MockHeap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read heap dump {}", path.display()))?;
    MockHeap::from_json(&text)
        .with_context(|| format!("failed to parse heap dump {}", path.display()))
}

async fn run<W>(cli: &Cli, config: OdiagConfig, out: W) -> anyhow::Result<()>
where
    W: Write + Send,
{
    let heap = Arc::new(read_heap(&cli.heap)?);
    let thread = match cli.thread.or_else(|| heap.threads.keys().next().copied()) {
        Some(thread) => thread,
        None => bail!("heap dump {} has no threads", cli.heap.display()),
    };
    tracing::info!(
        target: "odiag.cli",
        heap = %cli.heap.display(),
        thread,
        explorer = ?config.explorer,
        "taking snapshot"
    );

    let mut remote = MockRemote::new(MockHeap::clone(&heap));
    let async_remote = Arc::new(MockAsyncRemote::from_shared(heap));
    let controller = SnapshotController::new(config, JsonSink::new(out).pretty(cli.pretty));

    match controller.on_suspend(&mut remote, &async_remote, thread).await {
        SnapshotOutcome::Published { .. } => Ok(()),
        SnapshotOutcome::Failed { error, .. } => {
            Err(anyhow::Error::new(error).context(format!("snapshot of thread {thread} failed")))
        }
        SnapshotOutcome::Inactive => bail!("snapshots are inactive"),
    }
}
