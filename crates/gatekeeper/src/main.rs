//! Gatekeeper
//!
//! Demo server: `/hello` and `/me` behind OIDC authentication, `/public`
//! open when listed in `PUBLIC_URL_PREFIXES`.

use clap::Parser;
use gatekeeper::config::{Config, LogFormat};
use gatekeeper::handlers::{get_me, hello_public, hello_root};
use gatekeeper::observability::metrics::init_metrics_recorder;
use gatekeeper::{GateServer, Routes};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about = "OIDC-authenticated HTTP server")]
struct Cli {
    /// Print the registered routes as JSON and exit.
    #[arg(long)]
    routes: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gatekeeper=info,gk=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::from_env().inspect_err(|e| {
        eprintln!("Failed to load configuration: {e}");
    })?;

    init_tracing(config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = option_env!("GIT_COMMIT").unwrap_or("unknown"),
        build_date = option_env!("BUILD_DATE").unwrap_or("unknown"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "Starting Gatekeeper"
    );

    info!(
        bind_address = %config.bind_address,
        shutdown_timeout_seconds = config.shutdown_timeout_seconds,
        oidc_enabled = config.oidc.is_some(),
        "Configuration loaded successfully"
    );

    let metrics_handle = match init_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let routes = Routes::new()
        .get("/hello", hello_root)
        .get("/public", hello_public)
        .get("/me", get_me);

    let server = GateServer::new(routes, config, metrics_handle);

    if cli.routes {
        println!("{}", serde_json::to_string_pretty(server.route_docs())?);
        return Ok(());
    }

    server.run().await.inspect_err(|e| {
        error!("Server failed: {}", e);
    })?;

    Ok(())
}
