//! Vocab Agent
//!
//! Runs the caching proxy, the score monitor and the health/metrics
//! listeners for one application origin.
//!
//! ```text
//!   app ──► proxy :8090 ──► Agent ──► origin
//!                             │
//!                             └──► score ledger (every 30s)
//!
//!   checks ──► health :8081      scrapers ──► metrics :8080
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vocab_agent::{
    Agent, AgentConfig, ApiServer, ApiServerConfig, Error, LedgerKind, Result, StorageBackendKind,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Vocab Agent - offline cache and score monitor for the vocabulary app
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Proxy and control API bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8090")]
    listen_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// YAML configuration file
    #[arg(long, short = 'c', env = "AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Application origin, overrides the config file
    #[arg(long, env = "ORIGIN")]
    origin: Option<String>,

    /// Cache generation name, overrides the config file
    #[arg(long, env = "CACHE_VERSION")]
    cache_version: Option<String>,

    /// Cache storage backend (memory, local)
    #[arg(long, env = "STORAGE_BACKEND")]
    storage_backend: Option<StorageBackendKind>,

    /// Root directory for the local storage backend
    #[arg(long, env = "STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Score ledger REST endpoint; selects the REST ledger
    #[arg(long, env = "LEDGER_URL")]
    ledger_url: Option<String>,

    /// Score ledger API key
    #[arg(long, env = "LEDGER_API_KEY", hide_env_values = true)]
    ledger_api_key: Option<String>,

    /// Run with the in-memory ledger regardless of other ledger settings
    #[arg(long, env = "STANDALONE")]
    standalone: bool,

    /// Do not start score monitoring on activation
    #[arg(long, env = "NO_MONITOR")]
    no_monitor: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args).await?;

    info!("Starting Vocab Agent");
    info!("  Version: {}", vocab_agent::VERSION);
    info!("  Proxy: {}", args.listen_addr);
    info!("  Origin: {}", config.dispatch.origin);
    info!("  Cache generation: {}", config.cache.version);
    info!("  Monitoring: {}", config.monitor.enabled);
    info!("  Standalone mode: {}", args.standalone);

    let agent = Agent::from_config(&config).await?;

    // Install and activate in the background; requests pass through meanwhile
    let lifecycle_agent = agent.clone();
    tokio::spawn(async move {
        match lifecycle_agent.start_with_retry().await {
            Ok(report) => info!(
                generation = %report.generation,
                evicted = report.evicted.len(),
                clients = report.clients_claimed,
                "Agent active"
            ),
            Err(e) => error!("Agent activation failed: {}", e),
        }
    });

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_agent = agent.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_agent).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_agent = agent.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_agent).await {
            error!("Metrics server error: {}", e);
        }
    });

    let api_config = ApiServerConfig {
        listen_addr: args.listen_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid listen address: {}", e))
        })?,
        ..Default::default()
    };

    let api_server = ApiServer::new(api_config, agent.clone());
    let shutdown = api_server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = shutdown.send(());
        }
    });

    api_server.run().await?;
    agent.shutdown().await;

    info!("Agent shutdown complete");
    Ok(())
}

async fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path).await?,
        None => AgentConfig::default(),
    };

    if let Some(origin) = &args.origin {
        config.dispatch.origin = origin.clone();
    }
    if let Some(version) = &args.cache_version {
        config.cache.version = version.clone();
    }
    if let Some(backend) = args.storage_backend {
        config.cache.backend = backend;
    }
    if let Some(path) = &args.storage_path {
        config.cache.path = path.clone();
    }
    if let Some(url) = &args.ledger_url {
        config.ledger.kind = LedgerKind::Rest;
        config.ledger.rest.base_url = url.clone();
    }
    if args.ledger_api_key.is_some() {
        config.ledger.rest.api_key = args.ledger_api_key.clone();
    }
    if args.standalone {
        config.ledger.kind = LedgerKind::Memory;
    }
    if args.no_monitor {
        config.monitor.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "tower=warn", "axum=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn plain(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, agent: Arc<Agent>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let agent = agent.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let agent = agent.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => plain(StatusCode::OK, "ok"),
                        "/readyz" if agent.is_ready() => plain(StatusCode::OK, "ok"),
                        "/readyz" => plain(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
                        _ => plain(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Internal(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, agent: Arc<Agent>) -> Result<()> {
    use hyper::header::CONTENT_TYPE;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let agent = agent.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let agent = agent.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match agent.metrics().encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = content_type.parse() {
                                    response.headers_mut().insert(CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Metrics encoding failed: {}", e);
                                plain(StatusCode::INTERNAL_SERVER_ERROR, "encoding failed")
                            }
                        },
                        _ => plain(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Internal(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
