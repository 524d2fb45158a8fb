use std::{process, sync::Arc};

use cachefront::{
    cache::{Caches, NamespaceStrategy, build_storage},
    config::{self, OriginSettings, Settings},
    error::AppError,
    infra::{
        error::InfraError,
        http::{ProxyState, build_router},
        telemetry,
    },
    worker::{Fetcher, HttpFetcher, ReadThroughWorker, RetryingFetcher, WorkerHost, purge_all},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(_) => run_purge(settings).await,
        config::Command::Namespaces(_) => run_namespaces(settings).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let origin = settings.origin.require_url()?.clone();
    let precache = settings.precache_urls()?;
    let fetcher = build_fetcher(&settings.origin)?;

    let caches = Caches::new(build_storage(&settings.cache));
    let worker = ReadThroughWorker::new(caches, Arc::clone(&fetcher))
        .with_strategy(NamespaceStrategy::from(&settings.cache))
        .with_precache(precache);
    let host = Arc::new(WorkerHost::new(Arc::new(worker.clone()), fetcher));

    host.install().await;
    host.activate().await;

    let router = build_router(ProxyState {
        host,
        origin: origin.clone(),
        max_body_bytes: settings.server.max_body_bytes.get(),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, origin = %origin, "proxy listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    let in_flight = worker.population().in_flight();
    if in_flight > 0 {
        info!(in_flight, "waiting for pending cache writes");
    }
    worker.settle_population().await;

    result
}

async fn run_purge(settings: Settings) -> Result<(), AppError> {
    settings.require_persistent_cache()?;
    let caches = Caches::new(build_storage(&settings.cache));
    let mut report = purge_all(&caches).await;

    if let Some(err) = report.listing_error.take() {
        return Err(err.into());
    }

    for name in &report.purged {
        println!("purged\t{name}");
    }
    for (name, err) in &report.failed {
        println!("failed\t{name}\t{err}");
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "{} namespace(s) could not be purged",
            report.failed.len()
        )))
    }
}

async fn run_namespaces(settings: Settings) -> Result<(), AppError> {
    settings.require_persistent_cache()?;
    let caches = Caches::new(build_storage(&settings.cache));
    for name in caches.keys().await? {
        println!("{name}");
    }
    Ok(())
}

fn build_fetcher(origin: &OriginSettings) -> Result<Arc<dyn Fetcher>, AppError> {
    let http = HttpFetcher::new(origin.timeout)?;
    if origin.retry_attempts.get() > 1 {
        Ok(Arc::new(RetryingFetcher::new(
            http,
            origin.retry_attempts,
            origin.retry_backoff,
        )))
    } else {
        Ok(Arc::new(http))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
