use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use metrond_crypto::Decryptor;
use metrond_server::audit::{FileAuditor, WebhookAuditor};
use metrond_server::config::ServerConfig;
use metrond_server::service::MetricsService;
use metrond_server::state::AppState;
use metrond_server::app;
use metrond_storage::{MemStorage, PgStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("metrond={}", config.log_level).parse()?),
        )
        .init();

    run_server(config).await
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let shutdown = CancellationToken::new();

    let storage: Arc<dyn Storage> = if config.use_database() {
        Arc::new(
            PgStorage::connect(&config.database_dsn, shutdown.clone())
                .await
                .context("cannot open database storage")?,
        )
    } else {
        Arc::new(MemStorage::new())
    };

    let mut service = MetricsService::new(storage, &config);
    if !config.audit_file.is_empty() {
        service.register_auditor(Arc::new(FileAuditor::new(&config.audit_file)));
    }
    if !config.audit_url.is_empty() {
        service.register_auditor(Arc::new(WebhookAuditor::new(&config.audit_url)));
    }
    let service = Arc::new(service);

    if config.restore_enabled() {
        if let Err(e) = service.restore_from_file().await {
            tracing::info!(error = %e, "error while restoring from file");
        }
    }

    let save_handle = if config.store_periodically() {
        Some(tokio::spawn(
            service
                .clone()
                .run_periodic_save(config.store_interval, shutdown.clone()),
        ))
    } else {
        None
    };

    let decryptor = if config.crypto_key.is_empty() {
        None
    } else {
        Some(Decryptor::from_pem_file(&config.crypto_key).context("cannot initialize decryptor")?)
    };

    let state = AppState::new(service.clone(), Some(config.key.clone()), decryptor);
    let router = app::build_router(state);

    tracing::info!(
        address = %config.address,
        log_level = %config.log_level,
        store_interval = config.store_interval,
        file_storage_path = %config.file_storage_path,
        restore = config.restore_enabled(),
        use_database = config.use_database(),
        store_on_update = config.store_on_update(),
        store_periodically = config.store_periodically(),
        "running server"
    );

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("cannot bind {}", config.address))?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
    .context("http server error")?;

    tracing::info!("shutting down gracefully");
    shutdown.cancel();
    if let Some(handle) = save_handle {
        handle.await.ok();
    }
    service.close().await;
    tracing::info!("server stopped");
    Ok(())
}
