use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use x509_parser::{
    oid_registry::OID_X509_SERIALNUMBER,
    prelude::{FromDer, X509Certificate},
    x509::AttributeTypeAndValue,
};

/// Expiration data of one certificate in a peer chain
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateRecord {
    /// First CN of the issuer DN, empty if absent
    pub issuer_common_name: String,
    /// `serialNumber` attribute (2.5.4.5) of the issuer DN, empty if absent
    pub issuer_serial_number: String,
    pub not_after: DateTime<Utc>,
    /// `not_after - now`, negative once the certificate has expired
    pub seconds_to_expiration: f64,
}

/// Map every certificate of `chain` to a record, relative to the current time
#[must_use]
pub fn extract(chain: &[CertificateDer<'_>]) -> Vec<CertificateRecord> {
    extract_at(chain, Utc::now())
}

/// Map every certificate of `chain` to a record, relative to `now`
///
/// Order follows the chain (leaf first). Certificates that cannot be parsed
/// are left out.
#[must_use]
pub fn extract_at(chain: &[CertificateDer<'_>], now: DateTime<Utc>) -> Vec<CertificateRecord> {
    chain
        .iter()
        .filter_map(|der| parse_record(der.as_ref(), now))
        .collect()
}

fn parse_record(der: &[u8], now: DateTime<Utc>) -> Option<CertificateRecord> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let issuer = cert.issuer();

    let raw = cert.validity().not_after.to_datetime();
    let not_after = DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())?;

    Some(CertificateRecord {
        issuer_common_name: first_value(issuer.iter_common_name()),
        issuer_serial_number: first_value(issuer.iter_by_oid(&OID_X509_SERIALNUMBER)),
        not_after,
        seconds_to_expiration: seconds_between(now, not_after),
    })
}

fn first_value<'a, 'b: 'a>(
    mut attributes: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> String {
    attributes
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
