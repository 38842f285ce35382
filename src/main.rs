mod cache;
mod config;
mod error;
mod net;
mod proxy;
mod server;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cache::{CacheLayer, CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
use config::{CacheBackend, Config};
use net::{HttpNetwork, ProxyRequest};
use proxy::{Generation, InstallOutcome, LoggingHooks, Manifest, Router, Worker};

#[derive(Parser, Debug)]
#[command(name = "pokecache")]
#[command(about = "Offline-first cache proxy for the Pokemon database front-end")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./pokecache.yaml or $XDG_CONFIG_HOME/pokecache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Override the generation counter from the config file
  #[arg(long, global = true)]
  generation: Option<u32>,

  /// Write logs to daily files in this directory
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install, activate and serve intercepted requests over HTTP
  Serve {
    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,
  },
  /// Seed the static cache of the current generation
  Install,
  /// Install if needed, then sweep caches of other generations
  Activate,
  /// Route a single GET request through the proxy and print the response body
  Fetch {
    /// Absolute URL, or a path relative to the static origin
    url: String,
  },
  /// List cache stores and their entry counts
  Caches,
  /// Delete every cache store not owned by the current generation (refused until it is installed)
  Sweep,
  /// Forward a background-sync event
  Sync {
    #[arg(default_value = "background-sync")]
    tag: String,
  },
  /// Forward a push event with an optional JSON payload
  Push { payload: Option<String> },
}

/// Initialize the tracing subscriber for logging.
///
/// Returns the appender guard when logging to files; keep it alive until exit.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pokecache=info"));

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "pokecache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
      None
    }
  }
}

fn open_storage(config: &Config) -> Result<Arc<dyn CacheStorage>> {
  Ok(match config.cache.backend {
    CacheBackend::Sqlite => {
      let path = match &config.cache.path {
        Some(path) => path.clone(),
        None => SqliteStorage::default_path()?,
      };
      Arc::new(SqliteStorage::open(&path)?)
    }
    CacheBackend::Memory => Arc::new(MemoryStorage::new()),
    CacheBackend::None => Arc::new(NoopStorage),
  })
}

fn build_worker(config: &Config) -> Result<Worker> {
  let caches = CacheLayer::new(open_storage(config)?);
  let network = HttpNetwork::new(config.network.timeout())?;
  let generation = Generation::new(config.app_name.clone(), config.version);
  let manifest = Manifest::resolve(&config.static_origin_url()?, &config.manifest)
    .map_err(|e| eyre!("Invalid manifest entry: {}", e))?;

  let router = Router::new(caches, Arc::new(network), generation, config.api_host.clone());
  Ok(Worker::new(router, manifest, Arc::new(LoggingHooks)))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(generation) = args.generation {
    config.version = generation;
  }
  if let Some(dir) = args.log_dir {
    config.log_dir = Some(dir);
  }

  let _guard = init_tracing(config.log_dir.as_ref());
  let mut worker = build_worker(&config)?;
  info!(
    app = %config.app_name,
    version = worker.generation().version(),
    "pokecache starting"
  );

  match args.command {
    Command::Serve { listen } => {
      worker.start().await?;
      let listen = listen.unwrap_or(config.server.listen);
      server::serve(Arc::new(worker), config.static_origin_url()?, listen).await?;
    }
    Command::Install => match worker.install().await? {
      InstallOutcome::Seeded(count) => {
        println!("Installed {} assets into {}", count, worker.generation().static_store())
      }
      InstallOutcome::AlreadyInstalled => {
        println!("{} already installed", worker.generation().static_store())
      }
    },
    Command::Activate => {
      for name in worker.start().await? {
        println!("Deleted {}", name);
      }
      println!("{} is {}", worker.generation(), worker.state().as_str());
    }
    Command::Fetch { url } => {
      worker.start().await?;
      let url = config
        .static_origin_url()?
        .join(&url)
        .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
      let result = worker.fetch(ProxyRequest::get(url)).await?;
      eprintln!("{} ({})", result.response.status, result.source.as_str());
      println!("{}", String::from_utf8_lossy(&result.response.body));
    }
    Command::Caches => {
      let caches = worker.router().caches();
      for name in caches.keys().await? {
        let marker = if worker.generation().owns(&name) { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, caches.open(&name).len().await?);
      }
    }
    Command::Sweep => {
      for name in worker.sweep().await? {
        println!("Deleted {}", name);
      }
    }
    Command::Sync { tag } => worker.sync(&tag).await,
    Command::Push { payload } => {
      let payload = payload
        .map(|p| serde_json::from_str(&p).map_err(|e| eyre!("Invalid push payload: {}", e)))
        .transpose()?;
      worker.push(payload).await;
    }
  }

  Ok(())
}
