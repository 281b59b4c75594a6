//! Error types for certificate checks and notification delivery.
//!
//! [`CheckError`] is scoped to a single host: the run loop logs it and moves on
//! to the next host. [`NotifyError`] is raised by the final webhook delivery and
//! propagates to the caller.

use std::fmt;
use std::io;

use crate::ClassificationResult;

/// Error returned when checking the certificate of a single host fails.
#[derive(Debug)]
pub enum CheckError {
    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// The dial deadline elapsed before the connection or handshake completed
    Timeout {
        /// The address (host:port) being dialed
        address: String,
    },

    /// TLS handshake failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// The platform rejected the certificate chain during the handshake
    VerificationFailed {
        /// The host being checked
        hostname: String,
        /// The verification result reported by OpenSSL
        reason: String,
    },

    /// The server completed the handshake without presenting a certificate
    NoCertificate {
        /// The host being checked
        hostname: String,
    },

    /// A certificate on the wire could not be decoded
    CertificateParse {
        /// Description of what went wrong
        reason: String,
    },

    /// A leaf certificate does not cover the queried host.
    ///
    /// The classification of the chain is still carried so it can be reported.
    HostnameMismatch {
        /// The host being checked
        hostname: String,
        /// Common name of the first mismatching certificate
        common_name: String,
        /// Best-effort classification of every leaf certificate in the chain
        results: Vec<ClassificationResult>,
    },

    /// OpenSSL error occurred
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },
}

impl CheckError {
    /// Returns true when the TCP/TLS connection itself could not be established.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::DnsResolution { .. }
                | Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
                | Self::HandshakeFailed { .. }
                | Self::VerificationFailed { .. }
        )
    }

    /// Classification results that survived the failure, if any.
    pub fn partial_results(&self) -> &[ClassificationResult] {
        match self {
            Self::HostnameMismatch { results, .. } => results,
            _ => &[],
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { hostname, .. } => {
                write!(f, "failed to resolve hostname: {}", hostname)
            }
            Self::ConnectionFailed { address, source } => {
                write!(f, "connection failed to {}: {}", address, source)
            }
            Self::Timeout { address } => {
                write!(f, "timed out connecting to {}", address)
            }
            Self::HandshakeFailed { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::VerificationFailed { hostname, reason } => {
                write!(f, "certificate verification failed for {}: {}", hostname, reason)
            }
            Self::NoCertificate { hostname } => {
                write!(f, "{} did not present a certificate", hostname)
            }
            Self::CertificateParse { reason } => {
                write!(f, "certificate error: {}", reason)
            }
            Self::HostnameMismatch {
                hostname,
                common_name,
                ..
            } => {
                write!(
                    f,
                    "certificate for {} is not valid for host {}",
                    common_name, hostname
                )
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<openssl::error::ErrorStack> for CheckError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

/// Error returned by the final webhook delivery.
#[derive(Debug)]
pub enum NotifyError {
    /// The payload could not be encoded as JSON
    Serialization(serde_json::Error),
    /// The request never got a response
    Delivery(reqwest::Error),
    /// The endpoint answered with a status of 400 or above
    Rejected {
        /// HTTP status returned by the endpoint
        status: reqwest::StatusCode,
    },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(e) => {
                write!(f, "error marshalling json for slack message: {}", e)
            }
            Self::Delivery(e) => write!(f, "error posting message to slack: {}", e),
            Self::Rejected { status } => {
                write!(f, "error sending message to slack, got status: {}", status)
            }
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(e) => Some(e),
            Self::Delivery(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Delivery(e)
    }
}
