use crate::{directory::ServiceTarget, scan::ScanCycleSummary, tls::CertificateRecord};
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, opts,
    register_gauge_vec_with_registry, register_histogram_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry,
};

pub const SECONDS_TO_EXPIRATION: &str = "tls_verifier_seconds_to_expiration_tls_certificate";
pub const DISCOVERED_CERTIFICATES: &str = "tls_verifier_discovered_tls_certificates_of_services";
pub const HEARTBEAT: &str = "tls_verifier_heartbeat";
pub const SCAN_DURATION: &str = "tls_verifier_scan_duration_seconds";

/// Label names of the expiration gauge, in `with_label_values` order
pub const EXPIRATION_LABELS: [&str; 5] = ["namespace", "service", "port", "issuer", "serialnumber"];

/// Metric set of the process, created once and shared by the scanner and
/// the HTTP endpoint
///
/// Series are never removed: a certificate that disappears keeps its last
/// reported value.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub seconds_to_expiration: GaugeVec,
    pub discovered_certificates: IntGauge,
    pub heartbeat: IntCounter,
    pub scan_duration: Histogram,
}

impl Metrics {
    /// Register all metrics in a fresh registry
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be created or registered
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let seconds_to_expiration = register_gauge_vec_with_registry!(
            opts!(
                SECONDS_TO_EXPIRATION,
                "Seconds to expiration for the TLS certificate of the service"
            ),
            &EXPIRATION_LABELS,
            &registry
        )?;

        let discovered_certificates = register_int_gauge_with_registry!(
            DISCOVERED_CERTIFICATES,
            "How many TLS certificates have been discovered across all the services",
            &registry
        )?;

        let heartbeat = register_int_counter_with_registry!(
            HEARTBEAT,
            "heartbeat counter that keeps increasing if service is healthy",
            &registry
        )?;

        let scan_duration = register_histogram_with_registry!(
            HistogramOpts::new(SCAN_DURATION, "Duration of a full scan cycle in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
            &registry
        )?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            seconds_to_expiration,
            discovered_certificates,
            heartbeat,
            scan_duration,
        })
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Overwrite the expiration series of one certificate
    pub fn record_certificate(&self, target: &ServiceTarget, port: u16, record: &CertificateRecord) {
        let port = port.to_string();
        self.seconds_to_expiration
            .with_label_values(&[
                target.namespace.as_str(),
                target.name.as_str(),
                port.as_str(),
                record.issuer_common_name.as_str(),
                record.issuer_serial_number.as_str(),
            ])
            .set(record.seconds_to_expiration);
    }

    /// Publish the per-cycle aggregates, advancing the heartbeat once
    pub fn record_cycle(&self, summary: &ScanCycleSummary) {
        self.discovered_certificates
            .set(i64::try_from(summary.discovered_certificates).unwrap_or(i64::MAX));
        self.scan_duration.observe(summary.duration.as_secs_f64());
        self.heartbeat.inc();
    }

    /// Encode and return metrics for HTTP export
    ///
    /// # Errors
    ///
    /// Returns an error if metrics encoding fails
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        let mut buffer = Vec::new();
        let encoder = prometheus::TextEncoder::new();

        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| format!("could not encode metrics: {e}"))?;

        Ok(buffer)
    }
}
