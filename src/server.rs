use crate::{
    directory::KubeDirectory,
    filter::NamespaceFilter,
    metrics::Metrics,
    scan::{ScanConfig, Scanner},
    tls::TlsProber,
};
use anyhow::{Context, Result};
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::watch, task};
use tracing::{error, info};

/// Start the scanner and the metrics/health endpoint
///
/// # Errors
///
/// Returns an error if the listener cannot be bound, the cluster directory is
/// unavailable, or the scan loop stops
pub async fn start(
    config: ScanConfig,
    timeout: Duration,
    filter: NamespaceFilter,
    listen: Option<IpAddr>,
    port: u16,
) -> Result<()> {
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let app = router(Arc::clone(&metrics));

    let (listener, bind_addr) = bind(listen, port).await?;

    info!(
        address = %bind_addr,
        frequency = ?config.interval,
        timeout = ?timeout,
        skip_namespace_regex = filter.pattern().unwrap_or_default(),
        "listening for metrics and healthchecks"
    );

    let directory = KubeDirectory::try_default().await?;
    let scanner = Scanner::new(
        directory,
        TlsProber::new(timeout),
        filter,
        Arc::clone(&metrics),
        config,
    );

    // never signalled in production, the loop runs until the process exits
    let (stop_tx, stop_rx) = watch::channel(false);

    let scan_handle = task::spawn(async move { scanner.run(stop_rx).await });

    let server = axum::serve(listener, app.into_make_service());

    tokio::select! {
        result = server => {
            result?;
        }
        result = scan_handle => {
            match result {
                Ok(Ok(())) => {
                    error!("scan loop exited unexpectedly");
                    anyhow::bail!("scan loop stopped");
                }
                Ok(Err(e)) => {
                    error!("scan loop failed: {e:#}");
                    return Err(e);
                }
                Err(e) => {
                    error!("scan loop panicked: {e}");
                    anyhow::bail!("scan loop panicked: {e}");
                }
            }
        }
    }

    drop(stop_tx);
    Ok(())
}

/// Routes served next to the scan loop
#[must_use]
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/livez", get(health_handler))
        .route("/healthz", get(health_handler))
        .with_state(metrics)
}

/// Bind with smart fallback: explicit address, else `[::]`, else `0.0.0.0`
async fn bind(listen: Option<IpAddr>, port: u16) -> Result<(TcpListener, String)> {
    match listen {
        Some(addr) => {
            let socket_addr = match addr {
                IpAddr::V4(v4) => format!("{v4}:{port}"),
                IpAddr::V6(v6) => format!("[{v6}]:{port}"),
            };
            let listener = TcpListener::bind(&socket_addr)
                .await
                .with_context(|| format!("failed to bind {socket_addr}"))?;
            Ok((listener, socket_addr))
        }
        None => {
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                Ok((l, format!("[::]:{port}")))
            } else {
                // Fallback to IPv4 if IPv6 fails
                let socket_addr = format!("0.0.0.0:{port}");
                let listener = TcpListener::bind(&socket_addr)
                    .await
                    .with_context(|| format!("failed to bind {socket_addr}"))?;
                Ok((listener, socket_addr))
            }
        }
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
