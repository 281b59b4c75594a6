//! Decoded view of a certificate as seen on the wire.
//!
//! Only the fields needed to classify expiry and match the queried host are
//! kept. Decoding goes through `x509-parser` so the record can be built from the
//! raw DER bytes OpenSSL hands back after the handshake.

use std::net::IpAddr;

use chrono::{DateTime, TimeZone, Utc};
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate, X509Name};

use crate::error::CheckError;

/// A single certificate from a peer chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Raw signature bytes, used to spot the same certificate twice in a chain
    pub signature: Vec<u8>,
    /// Basic constraints CA flag
    pub is_ca: bool,
    pub common_name: String,
    /// DNS subject alternative names, in certificate order
    pub alt_names: Vec<String>,
    /// IP subject alternative names
    pub ip_addresses: Vec<IpAddr>,
    pub issuer_common_name: String,
    pub not_after: DateTime<Utc>,
}

impl CertificateRecord {
    /// Decodes a DER encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<CertificateRecord, CheckError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| CheckError::CertificateParse {
            reason: format!("failed to parse certificate: {}", e),
        })?;

        let is_ca = cert
            .basic_constraints()
            .ok()
            .flatten()
            .map(|ext| ext.value.ca)
            .unwrap_or(false);

        let mut alt_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => alt_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        let expiry = cert.validity().not_after.timestamp();
        let not_after = Utc
            .timestamp_opt(expiry, 0)
            .single()
            .ok_or_else(|| CheckError::CertificateParse {
                reason: format!("expiry timestamp {} is out of range", expiry),
            })?;

        Ok(CertificateRecord {
            signature: cert.signature_value.data.to_vec(),
            is_ca,
            common_name: common_name(cert.subject()),
            alt_names,
            ip_addresses,
            issuer_common_name: common_name(cert.issuer()),
            not_after,
        })
    }

    /// Checks whether this certificate is valid for `host`.
    ///
    /// IP literals are matched against the IP SANs only. Names are matched
    /// against the DNS SANs, case-insensitively, with a wildcard allowed as the
    /// whole left-most label. The subject common name is not consulted.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.ip_addresses.contains(&ip);
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.alt_names
            .iter()
            .any(|pattern| matches_pattern(&pattern.to_ascii_lowercase(), &host))
    }
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

fn matches_pattern(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    if pattern.is_empty() || host.is_empty() {
        return false;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => {
            // the wildcard covers exactly one non-empty label
            match host.split_once('.') {
                Some((label, rest)) => !label.is_empty() && !suffix.is_empty() && rest == suffix,
                None => false,
            }
        }
        None => pattern == host,
    }
}
