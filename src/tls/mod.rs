//! TLS probing and certificate expiration extraction
//!
//! # Module Organization
//!
//! - `probe` - TCP connect + TLS handshake against a single target
//! - `verifier` - Accept-everything certificate verifier used by the probe
//! - `certificate` - Maps a peer chain to expiration records
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tls_verifier::tls::{Prober, TlsProber, certificate};
//!
//! let prober = TlsProber::new(Duration::from_millis(400));
//! let chain = prober.probe("api.default.svc.cluster.local", 443).await?;
//! for record in certificate::extract(&chain.certificates) {
//!     println!("{} expires in {}s", record.issuer_common_name, record.seconds_to_expiration);
//! }
//! ```

pub mod certificate;
pub mod probe;
pub mod verifier;

// Re-export commonly used types
pub use certificate::{CertificateRecord, extract, extract_at};
pub use probe::{PeerChain, ProbeError, Prober, TlsProber, ensure_crypto_provider};
pub use verifier::NoVerifier;
