#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, date_time_ymd};
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tls_verifier::{
    directory::{ServiceDirectory, ServiceTarget},
    metrics::{Metrics, SECONDS_TO_EXPIRATION},
    tls::{PeerChain, ProbeError, Prober, ensure_crypto_provider},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
    time::sleep,
};
use tokio_rustls::TlsAcceptor;

pub const ROOT_CN: &str = "Test Root CA";
pub const ROOT_SERIAL: &str = "ROOT-42";
pub const INTERMEDIATE_CN: &str = "Test Intermediate CA";

/// Certificates in the order a server presents them, plus the leaf key
pub struct TestChain {
    pub certificates: Vec<CertificateDer<'static>>,
    pub leaf_key: PrivateKeyDer<'static>,
}

fn ca_params(common_name: &str, serial: Option<&str>, year: i32) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    if let Some(serial) = serial {
        params
            .distinguished_name
            .push(DnType::CustomDnType(vec![2, 5, 4, 5]), serial);
    }
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.not_after = date_time_ymd(year, 1, 1);
    params
}

fn pkcs8(key: &KeyPair) -> PrivateKeyDer<'static> {
    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()))
}

/// A single self-signed certificate whose issuer is itself
pub fn self_signed(common_name: &str, year: i32) -> TestChain {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.not_after = date_time_ymd(year, 6, 1);
    let cert = params.self_signed(&key).unwrap();

    TestChain {
        certificates: vec![cert.der().clone()],
        leaf_key: pkcs8(&key),
    }
}

/// leaf <- intermediate <- root, leaf expiring on January 1st of `leaf_year`
pub fn three_level_chain(leaf_year: i32) -> TestChain {
    let root_key = KeyPair::generate().unwrap();
    let root = ca_params(ROOT_CN, Some(ROOT_SERIAL), 2045)
        .self_signed(&root_key)
        .unwrap();

    let intermediate_key = KeyPair::generate().unwrap();
    let intermediate = ca_params(INTERMEDIATE_CN, None, 2040)
        .signed_by(&intermediate_key, &root, &root_key)
        .unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    leaf_params.not_after = date_time_ymd(leaf_year, 1, 1);
    let leaf = leaf_params
        .signed_by(&leaf_key, &intermediate, &intermediate_key)
        .unwrap();

    TestChain {
        certificates: vec![
            leaf.der().clone(),
            intermediate.der().clone(),
            root.der().clone(),
        ],
        leaf_key: pkcs8(&leaf_key),
    }
}

/// TLS server on 127.0.0.1 presenting `chain`, reading until the client closes
pub async fn spawn_tls_server(chain: TestChain) -> (SocketAddr, JoinHandle<()>) {
    ensure_crypto_provider();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain.certificates, chain.leaf_key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let mut buf = Vec::new();
                    let _ = tls.read_to_end(&mut buf).await;
                }
            });
        }
    });

    (addr, handle)
}

/// Accepts connections and never answers
pub async fn spawn_silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            held.push(stream);
        }
    });

    (addr, handle)
}

/// Answers every connection with plain-text HTTP and hangs up
pub async fn spawn_plaintext_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0_u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, handle)
}

/// A port on 127.0.0.1 nothing listens on
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// In-memory directory whose content and health tests can change between cycles
#[derive(Default)]
pub struct FakeDirectory {
    services: Mutex<Vec<ServiceTarget>>,
    unavailable: AtomicBool,
}

impl FakeDirectory {
    pub fn new(services: Vec<ServiceTarget>) -> Self {
        Self {
            services: Mutex::new(services),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_services(&self, services: Vec<ServiceTarget>) {
        *self.services.lock().unwrap() = services;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceDirectory for FakeDirectory {
    async fn list_services(&self) -> anyhow::Result<Vec<ServiceTarget>> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("connection to the API server refused");
        }
        Ok(self.services.lock().unwrap().clone())
    }
}

/// What the scripted prober answers for one `host:port`
#[derive(Clone)]
pub enum Script {
    Chain(Vec<CertificateDer<'static>>),
    ChainWithWriteFailure(Vec<CertificateDer<'static>>),
    Refused,
    /// Answers after `delay`, used to observe overlapping probes
    Slow(Vec<CertificateDer<'static>>, Duration),
}

/// Prober answering from a table, unknown targets are refused
#[derive(Default)]
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn with(self, address: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn io_error(kind: ErrorKind, message: &str) -> io::Error {
    io::Error::new(kind, message.to_string())
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, host: &str, port: u16) -> Result<PeerChain, ProbeError> {
        let address = format!("{host}:{port}");
        self.calls.lock().unwrap().push(address.clone());
        let script = self.scripts.lock().unwrap().get(&address).cloned();

        match script {
            Some(Script::Chain(certificates)) => Ok(PeerChain {
                certificates,
                write_error: None,
            }),
            Some(Script::ChainWithWriteFailure(certificates)) => Ok(PeerChain {
                certificates,
                write_error: Some(ProbeError::Write {
                    address,
                    source: io_error(ErrorKind::BrokenPipe, "broken pipe"),
                }),
            }),
            Some(Script::Slow(certificates, delay)) => {
                sleep(delay).await;
                Ok(PeerChain {
                    certificates,
                    write_error: None,
                })
            }
            Some(Script::Refused) | None => Err(ProbeError::Connect {
                address,
                source: io_error(ErrorKind::ConnectionRefused, "connection refused"),
            }),
        }
    }
}

/// Label sets of every exported expiration series
pub fn expiration_series(metrics: &Metrics) -> Vec<HashMap<String, String>> {
    metrics
        .registry()
        .gather()
        .into_iter()
        .find(|family| family.name() == SECONDS_TO_EXPIRATION)
        .map_or_else(Vec::new, |family| {
            family
                .get_metric()
                .iter()
                .map(|metric| {
                    metric
                        .get_label()
                        .iter()
                        .map(|lp| (lp.name().to_string(), lp.value().to_string()))
                        .collect()
                })
                .collect()
        })
}

pub fn has_series(metrics: &Metrics, labels: &[(&str, &str)]) -> bool {
    expiration_series(metrics).iter().any(|series| {
        labels
            .iter()
            .all(|(name, value)| series.get(*name).map(String::as_str) == Some(*value))
    })
}
