use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gitsift::backend::{ElasticBackend, MemoryBackend, SearchBackend};
use gitsift::config::ServerConfig;
use gitsift::server::{AppState, create_router};
use gitsift::store::IndexStore;
use gitsift::tenant::{SqliteTenantRegistry, TenantRegistry};
use gitsift::upstream::GithubClient;

#[derive(Parser)]
#[command(name = "gitsift")]
#[command(about = "Per-tenant search over repositories and commits", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// TOML config file; flags below override its values
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the tenant registry database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Base URL of the search backend, or `memory:` for an in-process one
        #[arg(long)]
        search_url: Option<String>,

        /// Base URL of the provider API
        #[arg(long)]
        upstream_url: Option<String>,
    },
}

fn load_config(
    path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    search_url: Option<String>,
    upstream_url: Option<String>,
) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::from_file(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    if let Some(url) = search_url {
        config.search.url = url;
    }
    if let Some(url) = upstream_url {
        config.upstream.api_url = url;
    }
    config.validate()?;
    Ok(config)
}

fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    fs::create_dir_all(&config.data_dir)?;

    let registry = SqliteTenantRegistry::new(config.db_path())?;
    registry.initialize()?;

    let backend: Arc<dyn SearchBackend> = if config.search.is_in_memory() {
        warn!("Using the in-memory search backend; indexes are lost on exit");
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(ElasticBackend::new(
            &config.search.url,
            config.search.timeout(),
        )?)
    };
    let upstream = GithubClient::new(&config.upstream)?;

    let index = IndexStore::new(backend, Arc::new(upstream), Arc::new(registry))
        .with_suggest_size(config.search.suggest_size);
    Ok(Arc::new(AppState::new(Arc::new(index))))
}

async fn serve(config: ServerConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// Blocking HTTP clients must be built, and finally dropped, outside the async runtime.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gitsift=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            search_url,
            upstream_url,
        } => {
            let config = load_config(config, host, port, data_dir, search_url, upstream_url)?;
            let state = build_state(&config)?;

            info!("Tenant registry at {}", config.db_path().display());
            info!("Search backend at {}", config.search.url);

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(serve(config, Arc::clone(&state)))?;
        }
    }

    Ok(())
}
