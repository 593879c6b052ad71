use std::path::{Path, PathBuf};

use vane_config::load_config;
use vane_server::observability;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From VANE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (vane.toml), present in the working directory
    Default,
    /// No file; defaults and environment only
    BuiltIn,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (VANE_CONFIG)"),
            Self::Default => write!(f, "default (vane.toml)"),
            Self::BuiltIn => write!(f, "built-in defaults"),
        }
    }
}

fn resolve_config_path() -> (Option<PathBuf>, ConfigSource) {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (Some(PathBuf::from(path)), ConfigSource::CliArgument);
            }
        }
    }
    if let Ok(path) = std::env::var("VANE_CONFIG") {
        return (Some(PathBuf::from(path)), ConfigSource::EnvironmentVariable);
    }
    let default = Path::new("vane.toml");
    if default.exists() {
        return (Some(default.to_path_buf()), ConfigSource::Default);
    }
    (None, ConfigSource::BuiltIn)
}

#[tokio::main]
async fn main() {
    // Load .env if present; useful for local development, optional otherwise
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    observability::init_tracing(&config.logging);
    tracing::info!(source = %source, "Configuration loaded");

    let runtime = vane_server::bootstrap(&config);
    let router = vane_server::build_router(runtime.state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "HTTP server listening");

    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "Server error");
    }

    runtime.shutdown();
    tracing::info!("Controller stopped");
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("Failed to listen for shutdown signal");
    }
}
