pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod maintenance;
pub mod services;
pub mod state;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::Config;
use db::{CreateOutcome, Store};
use domain::Role;
use state::SharedState;

pub async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;

    match cli.command.unwrap_or(cli::Commands::Serve) {
        cli::Commands::Serve => run_server(config, prometheus_handle).await,

        cli::Commands::CreateUser {
            username,
            password,
            role,
        } => cmd_create_user(&config, &username, &password, &role).await,

        cli::Commands::InitConfig => {
            if Config::create_default_if_missing()? {
                println!("Wrote config.toml");
            } else {
                println!("config.toml already exists, leaving it alone");
            }
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key, value)?;
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("deskd v{} starting...", env!("CARGO_PKG_VERSION"));

    let port = config.server.port;

    let shared = Arc::new(SharedState::new(config).await?);
    let state = api::create_app_state(shared.clone(), prometheus_handle);

    let _scheduler = maintenance::start(shared.store.clone()).await?;

    let app = api::router(state).await?;
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let server_handle = tokio::spawn(async move {
        info!("API server listening on http://{addr}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {e}");
        }
    });

    info!("Server running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    server_handle.abort();
    info!("Server stopped");

    Ok(())
}

async fn cmd_create_user(
    config: &Config,
    username: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<()> {
    let role: Role = role
        .parse()
        .map_err(|e: domain::role::UnknownRole| anyhow::anyhow!(e))?;

    let store = Store::new(&config.general.database_path).await?;

    if let Some(existing) = store.get_user_by_username(username).await? {
        store
            .update_user_password(existing.id, password, &config.security)
            .await?;
        store.set_user_role(existing.id, role).await?;
        println!("Updated existing user '{username}' (role: {role})");
        return Ok(());
    }

    match store
        .create_user(username, password, &config.security)
        .await?
    {
        CreateOutcome::Created(user) => {
            if role != Role::User {
                store.set_user_role(user.id, role).await?;
            }
            println!("Created user '{username}' (role: {role})");
            Ok(())
        }
        CreateOutcome::UsernameTaken => anyhow::bail!("Username '{username}' was taken concurrently"),
    }
}
