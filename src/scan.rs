use crate::{
    directory::{ServiceDirectory, ServiceTarget},
    filter::NamespaceFilter,
    metrics::Metrics,
    tls::{Prober, certificate},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::{Serialize, Serializer};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Loop settings that do not belong to a collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Sleep between the end of a cycle and the start of the next one
    pub interval: Duration,
    /// Probes in flight at once, 1 probes sequentially
    pub concurrency: usize,
    /// Suffix of `<service>.<namespace>.svc.`
    pub cluster_domain: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2 * 60 * 60),
            concurrency: DEFAULT_CONCURRENCY,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
        }
    }
}

/// Outcome of probing one (service, port) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    /// Certificates presented by the peer, parseable or not
    pub peer_certificates: usize,
}

/// Aggregates of one scan cycle
#[derive(Debug, Clone, Serialize)]
pub struct ScanCycleSummary {
    pub started_at: DateTime<Utc>,
    pub services: usize,
    pub skipped_services: usize,
    pub probes: usize,
    pub failed_probes: usize,
    /// Every certificate presented by successful probes, including ones
    /// that could not be parsed into an expiration series
    pub discovered_certificates: usize,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl ScanCycleSummary {
    #[must_use]
    pub const fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            services: 0,
            skipped_services: 0,
            probes: 0,
            failed_probes: 0,
            discovered_certificates: 0,
            duration: Duration::ZERO,
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Discovery loop: directory -> filter -> probe -> extract -> metrics
pub struct Scanner<D, P> {
    directory: D,
    prober: P,
    filter: NamespaceFilter,
    metrics: Arc<Metrics>,
    config: ScanConfig,
}

impl<D, P> Scanner<D, P>
where
    D: ServiceDirectory,
    P: Prober,
{
    #[must_use]
    pub const fn new(
        directory: D,
        prober: P,
        filter: NamespaceFilter,
        metrics: Arc<Metrics>,
        config: ScanConfig,
    ) -> Self {
        Self {
            directory,
            prober,
            filter,
            metrics,
            config,
        }
    }

    #[must_use]
    pub const fn directory(&self) -> &D {
        &self.directory
    }

    #[must_use]
    pub const fn prober(&self) -> &P {
        &self.prober
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Scan until `stop` turns true
    ///
    /// The stop signal is only looked at between cycles, a running cycle
    /// always completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster directory cannot be listed, there is
    /// no degraded mode without a service list.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *stop.borrow_and_update() {
                info!("stop requested, leaving scan loop");
                return Ok(());
            }

            self.run_cycle().await?;

            info!(interval = ?self.config.interval, "sleeping until the next scan");
            let sleep = time::sleep(self.config.interval);
            tokio::pin!(sleep);
            let stopped = tokio::select! {
                () = &mut sleep => None,
                stopped = stop.wait_for(|stop| *stop) => Some(stopped.is_ok()),
            };

            match stopped {
                Some(true) => {
                    info!("stop requested, leaving scan loop");
                    return Ok(());
                }
                // sender gone: nobody can stop us anymore, finish the interval
                Some(false) => sleep.await,
                None => {}
            }
        }
    }

    /// Run exactly one scan cycle and publish its metrics
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster directory cannot be listed
    pub async fn run_cycle(&self) -> Result<ScanCycleSummary> {
        let mut summary = ScanCycleSummary::new(Utc::now());
        let start = Instant::now();

        let services = self
            .directory
            .list_services()
            .await
            .context("cluster directory query failed")?;
        summary.services = services.len();

        info!(
            services = services.len(),
            "scanning services for expiring TLS certificates"
        );

        let mut pairs: Vec<(ServiceTarget, u16)> = Vec::new();
        for target in services {
            if self.filter.should_skip(&target.namespace) {
                info!(
                    service = %target.name,
                    namespace = %target.namespace,
                    "skipping service"
                );
                summary.skipped_services += 1;
                continue;
            }
            pairs.extend(target.ports.iter().map(|&port| (target.clone(), port)));
        }
        summary.probes = pairs.len();

        let results: Vec<ProbeResult> = stream::iter(pairs)
            .map(|(target, port)| self.probe_target(target, port))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for result in &results {
            if result.success {
                summary.discovered_certificates += result.peer_certificates;
            } else {
                summary.failed_probes += 1;
            }
        }

        summary.duration = start.elapsed();
        self.metrics.record_cycle(&summary);

        match serde_json::to_string(&summary) {
            Ok(serialized) => info!(summary = %serialized, "scan cycle finished"),
            Err(e) => debug!("could not serialize scan summary: {e}"),
        }

        Ok(summary)
    }

    async fn probe_target(&self, target: ServiceTarget, port: u16) -> ProbeResult {
        let host = target.host(&self.config.cluster_domain);

        match self.prober.probe(&host, port).await {
            Ok(chain) => {
                if let Some(err) = &chain.write_error {
                    warn!(
                        service = %target.name,
                        namespace = %target.namespace,
                        port,
                        kind = err.kind(),
                        "{err}"
                    );
                }

                let certificates = certificate::extract(&chain.certificates);
                for record in &certificates {
                    self.metrics.record_certificate(&target, port, record);
                }

                let expiry_dates: Vec<String> = certificates
                    .iter()
                    .map(|record| record.not_after.format("%Y-%B-%d").to_string())
                    .collect();
                info!(
                    address = %format!("{host}:{port}"),
                    certificates = certificates.len(),
                    expiration_dates = ?expiry_dates,
                    "TLS connection was successful"
                );

                ProbeResult {
                    success: true,
                    peer_certificates: chain.certificates.len(),
                }
            }
            Err(err) => {
                warn!(
                    service = %target.name,
                    namespace = %target.namespace,
                    port,
                    kind = err.kind(),
                    "{err}"
                );

                ProbeResult {
                    success: false,
                    peer_certificates: 0,
                }
            }
        }
    }
}
