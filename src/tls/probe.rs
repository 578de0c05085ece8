use super::NoVerifier;
use async_trait::async_trait;
use rustls::{
    ClientConfig,
    pki_types::{CertificateDer, ServerName},
};
use std::{
    io::{self, ErrorKind},
    net::IpAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    time::{self, Instant},
};
use tokio_rustls::{TlsConnector, client::TlsStream};

/// Written after a successful handshake so the peer sees a complete exchange
const LIVENESS_PAYLOAD: &[u8] = b"ping\n";

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// This should be called before any TLS operations. It's safe to call
/// multiple times as initialization only happens once.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        // Err only means a provider is already installed for this process
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Why a probe produced no usable chain (or, for `Write`, why the
/// post-handshake exchange failed)
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("could not send data to {address}: {source}")]
    Write {
        address: String,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    /// Short classification used as a structured log field
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Handshake { .. } => "handshake",
            Self::Write { .. } => "write",
        }
    }

    /// `host:port` of the probed target
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::Connect { address, .. }
            | Self::Handshake { address, .. }
            | Self::Write { address, .. } => address,
        }
    }
}

/// Peer certificate chain obtained from a completed handshake
#[derive(Debug, Default)]
pub struct PeerChain {
    /// Certificates in the order the server sent them (leaf first)
    pub certificates: Vec<CertificateDer<'static>>,
    /// Set when the liveness write failed; the chain is still valid
    pub write_error: Option<ProbeError>,
}

/// Anything able to fetch the certificate chain of `host:port`
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe a single target
    ///
    /// # Errors
    ///
    /// Returns a `ProbeError` if the connection or the handshake fails
    async fn probe(&self, host: &str, port: u16) -> Result<PeerChain, ProbeError>;
}

/// Prober that performs a real TCP connect and TLS handshake
#[derive(Clone)]
pub struct TlsProber {
    connector: TlsConnector,
    timeout: Duration,
}

impl std::fmt::Debug for TlsProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsProber")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TlsProber {
    /// Create a prober whose connect + handshake is bounded by `timeout`
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            connector: build_tls_connector(),
            timeout,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(&self, host: &str, port: u16) -> Result<PeerChain, ProbeError> {
        self.probe_with(host, port, TcpStream::connect((host, port))).await
    }
}

impl TlsProber {
    /// Handshake over the stream produced by `connect`, which shares the
    /// deadline with the handshake
    async fn probe_with<C>(
        &self,
        host: &str,
        port: u16,
        connect: C,
    ) -> Result<PeerChain, ProbeError>
    where
        C: Future<Output = io::Result<TcpStream>> + Send,
    {
        let address = format!("{host}:{port}");
        let deadline = Instant::now() + self.timeout;

        let stream = match time::timeout_at(deadline, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProbeError::Connect { address, source }),
            Err(_) => {
                return Err(ProbeError::Connect {
                    address,
                    source: timed_out(self.timeout),
                });
            }
        };

        let server_name = match server_name_from_host(host) {
            Ok(name) => name,
            Err(source) => return Err(ProbeError::Handshake { address, source }),
        };

        let mut tls_stream =
            match time::timeout_at(deadline, self.connector.connect(server_name, stream)).await {
                Ok(Ok(tls_stream)) => tls_stream,
                Ok(Err(source)) => return Err(ProbeError::Handshake { address, source }),
                Err(_) => {
                    return Err(ProbeError::Handshake {
                        address,
                        source: timed_out(self.timeout),
                    });
                }
            };

        let certificates = peer_certificates(&tls_stream);

        let write_error = match time::timeout(self.timeout, send_liveness(&mut tls_stream)).await
        {
            Ok(Ok(())) => None,
            Ok(Err(source)) => Some(ProbeError::Write {
                address: address.clone(),
                source,
            }),
            Err(_) => Some(ProbeError::Write {
                address: address.clone(),
                source: timed_out(self.timeout),
            }),
        };

        // close_notify is best effort, the stream is dropped either way
        let _ = time::timeout(self.timeout, tls_stream.shutdown()).await;

        Ok(PeerChain {
            certificates,
            write_error,
        })
    }
}

fn build_tls_connector() -> TlsConnector {
    ensure_crypto_provider();

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

async fn send_liveness(stream: &mut TlsStream<TcpStream>) -> io::Result<()> {
    stream.write_all(LIVENESS_PAYLOAD).await?;
    stream.flush().await
}

fn peer_certificates(stream: &TlsStream<TcpStream>) -> Vec<CertificateDer<'static>> {
    let (_, connection) = stream.get_ref();
    connection
        .peer_certificates()
        .map(<[CertificateDer<'static>]>::to_vec)
        .unwrap_or_default()
}

fn server_name_from_host(host: &str) -> io::Result<ServerName<'static>> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string()).map_err(|_| {
                io::Error::new(ErrorKind::InvalidInput, format!("invalid server name: {host}"))
            })
        },
        |ip| Ok(ServerName::from(ip)),
    )
}

fn timed_out(timeout: Duration) -> io::Error {
    io::Error::new(ErrorKind::TimedOut, format!("timed out after {timeout:?}"))
}
