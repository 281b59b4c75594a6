//! TLS certificate expiry checks with chat webhook notifications.
//!
//! The crate is split in two halves:
//!
//! - [`inspect`] connects to each host, decodes the peer chain and classifies
//!   every leaf certificate against a warning and a critical threshold.
//! - [`notify`] folds classification results into a single webhook message and
//!   posts it once all hosts have been checked.
//!
//! [`run`] ties both together the way the `sslcheck` binary does.
//!
//! ```no_run
//! use sslcheck::inspect::{Inspector, InspectorConfig};
//!
//! let inspector = Inspector::new(InspectorConfig::default());
//! for result in inspector.inspect("example.com")? {
//!     println!("{} - {:?}", result.host, result.status);
//! }
//! # Ok::<(), sslcheck::CheckError>(())
//! ```

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Span};

pub mod certificate;
pub mod config;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod notify;

pub use certificate::CertificateRecord;
pub use error::{CheckError, NotifyError};

use config::Settings;
use inspect::Inspector;
use notify::{Aggregator, Deliver};

/// Expiry status of a certificate.
///
/// The numeric values are part of the log and notification format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The certificate is not due to expire soon
    Ok = 0,
    /// The certificate expires within the warning threshold
    Warning = 1,
    /// The certificate expires within the critical threshold, or has expired
    Critical = 2,
    /// The expiry could not be determined
    Unknown = 3,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Warning and critical validity thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: Duration,
    pub critical: Duration,
}

impl Thresholds {
    /// Thresholds expressed in whole days.
    ///
    /// Panics if either value is out of range for a [`Duration`], see
    /// [`Thresholds::try_days`].
    pub fn days(warning: i64, critical: i64) -> Thresholds {
        Thresholds {
            warning: Duration::days(warning),
            critical: Duration::days(critical),
        }
    }

    /// Like [`Thresholds::days`], but returns `None` when either value does
    /// not fit in a [`Duration`].
    pub fn try_days(warning: i64, critical: i64) -> Option<Thresholds> {
        Some(Thresholds {
            warning: Duration::try_days(warning)?,
            critical: Duration::try_days(critical)?,
        })
    }

    /// Classifies the time left before expiry. Critical wins over warning.
    pub fn classify(&self, remaining: Duration) -> Status {
        if remaining < self.critical {
            Status::Critical
        } else if remaining < self.warning {
            Status::Warning
        } else {
            Status::Ok
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds::days(30, 14)
    }
}

/// Expiry classification of one leaf certificate served by a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub host: String,
    pub status: Status,
    /// Time left before expiry, negative once expired
    #[serde(serialize_with = "serialize_seconds")]
    pub remaining: Duration,
    pub common_name: String,
    pub alt_names: Vec<String>,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
}

fn serialize_seconds<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

/// Classifies every unique, non-CA certificate of a chain.
///
/// Certificates are deduplicated by signature. The returned results keep the
/// chain order. When `verify_host` is set, each leaf is also matched against
/// `host` and a mismatch is returned as [`CheckError::HostnameMismatch`]
/// carrying all the results.
pub fn classify_chain(
    host: &str,
    chain: &[CertificateRecord],
    thresholds: &Thresholds,
    now: DateTime<Utc>,
    verify_host: bool,
) -> Result<Vec<ClassificationResult>, CheckError> {
    let mut checked: HashSet<&[u8]> = HashSet::with_capacity(chain.len());
    let mut results = Vec::new();
    let mut mismatch = None;

    for cert in chain {
        if !checked.insert(cert.signature.as_slice()) {
            continue;
        }
        if cert.is_ca {
            debug!(
                host,
                cert_common_name = %cert.common_name,
                expiry = %cert.not_after.to_rfc3339(),
                "{:<15} - ignoring CA certificate {}",
                host,
                cert.common_name
            );
            continue;
        }
        let remaining = cert.not_after - now;
        results.push(ClassificationResult {
            host: host.to_string(),
            status: thresholds.classify(remaining),
            remaining,
            common_name: cert.common_name.clone(),
            alt_names: cert.alt_names.clone(),
            issuer: cert.issuer_common_name.clone(),
            not_after: cert.not_after,
        });
        if verify_host && mismatch.is_none() && !cert.matches_host(host) {
            mismatch = Some(cert.common_name.clone());
        }
    }

    match mismatch {
        Some(common_name) => Err(CheckError::HostnameMismatch {
            hostname: host.to_string(),
            common_name,
            results,
        }),
        None => Ok(results),
    }
}

/// Renders the time left as whole days, e.g. `"12d remaining"`.
pub fn format_remaining(remaining: Duration) -> String {
    if remaining < Duration::zero() {
        return "expired".to_string();
    }
    format!("{}d remaining", remaining.num_days())
}

/// Outcome counters of a [`run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Hosts that were checked, successfully or not
    pub checked: usize,
    /// Hosts whose check failed
    pub failed: usize,
    /// Whether a notification was delivered
    pub notified: bool,
}

/// Checks every configured host in order and sends one notification at the end.
///
/// A failing host is logged and never stops the remaining ones. Only the
/// delivery error is returned.
pub fn run(settings: &Settings, sink: &dyn Deliver) -> Result<RunSummary, NotifyError> {
    let inspector = Inspector::new(settings.inspector.clone());
    let mut aggregator = Aggregator::new(settings.notify.policy, settings.notify.format);
    let mut summary = RunSummary::default();

    for host in &settings.hosts {
        let _span = check_span(host).entered();
        summary.checked += 1;
        match inspector.inspect(host) {
            Ok(results) => {
                if results.is_empty() {
                    warn!(host = %host, "{} - no leaf certificate presented", host);
                }
                for result in &results {
                    log_result(result);
                    aggregator.accumulate(result);
                }
            }
            Err(err) => {
                summary.failed += 1;
                let partial = err.partial_results();
                if partial.is_empty() {
                    error!(host = %host, error = %err, "{} - {}", host, err);
                }
                for result in partial {
                    error!(
                        host = %result.host,
                        common_name = %result.common_name,
                        error = %err,
                        "{} ({}) - {}",
                        result.host,
                        result.common_name,
                        err
                    );
                    aggregator.accumulate_failed(result);
                }
            }
        }
    }

    summary.notified = aggregator.deliver_if(settings.notify.enabled, sink)?;
    Ok(summary)
}

/// Span wrapping every record logged while checking `host`.
///
/// JSON output only prints the innermost span, so it repeats `app` and
/// `version` from the root span.
pub(crate) fn check_span(host: &str) -> Span {
    info_span!(
        "check",
        app = config::APP_NAME,
        version = env!("CARGO_PKG_VERSION"),
        host = %host
    )
}

fn log_result(result: &ClassificationResult) {
    let message = format_remaining(result.remaining);
    let expiry = result.not_after.to_rfc3339();
    // seconds, negative once expired
    let remaining = result.remaining.num_seconds();
    match result.status {
        Status::Warning | Status::Critical => warn!(
            host = %result.host,
            common_name = %result.common_name,
            alt_names = ?result.alt_names,
            expiry = %expiry,
            remaining,
            status = result.status.code(),
            issuer = %result.issuer,
            "{} - {}",
            result.host,
            message
        ),
        _ => info!(
            host = %result.host,
            common_name = %result.common_name,
            alt_names = ?result.alt_names,
            expiry = %expiry,
            remaining,
            status = result.status.code(),
            issuer = %result.issuer,
            "{} - {}",
            result.host,
            message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(signature: u8, is_ca: bool, days: i64, now: DateTime<Utc>) -> CertificateRecord {
        CertificateRecord {
            signature: vec![signature; 8],
            is_ca,
            common_name: format!("cert-{}", signature),
            alt_names: vec!["example.com".to_string()],
            ip_addresses: Vec::new(),
            issuer_common_name: "Test CA".to_string(),
            not_after: now + Duration::days(days),
        }
    }

    #[test]
    fn test_classify_boundaries() {
        let t = Thresholds::days(30, 14);
        assert_eq!(t.classify(Duration::days(14) - Duration::seconds(1)), Status::Critical);
        assert_eq!(t.classify(Duration::days(14)), Status::Warning);
        assert_eq!(t.classify(Duration::days(30) - Duration::seconds(1)), Status::Warning);
        assert_eq!(t.classify(Duration::days(30)), Status::Ok);
    }

    #[test]
    fn test_classify_holds_for_any_remaining() {
        for (warn, crit) in [(30, 14), (7, 0), (90, 89), (1, 0)] {
            let t = Thresholds::days(warn, crit);
            for hours in -2000i64..3000 {
                let r = Duration::hours(hours);
                let expected = if r < t.critical {
                    Status::Critical
                } else if r < t.warning {
                    Status::Warning
                } else {
                    Status::Ok
                };
                assert_eq!(t.classify(r), expected, "warn={} crit={} r={}", warn, crit, r);
            }
        }
    }

    #[test]
    fn test_try_days_rejects_out_of_range() {
        assert_eq!(Thresholds::try_days(30, 14), Some(Thresholds::days(30, 14)));
        assert_eq!(Thresholds::try_days(i64::MAX / 2, 14), None);
        assert_eq!(Thresholds::try_days(30, i64::MIN), None);
    }

    #[test]
    fn test_expired_is_critical() {
        let t = Thresholds::days(30, 0);
        assert_eq!(t.classify(Duration::seconds(-1)), Status::Critical);
        assert_eq!(t.classify(Duration::days(-400)), Status::Critical);
    }

    #[test]
    fn test_end_to_end_examples() {
        let now = Utc::now();
        let t = Thresholds::days(30, 14);
        let expected = [(10, Status::Critical), (20, Status::Warning), (100, Status::Ok)];
        for (days, status) in expected {
            let results =
                classify_chain("example.com", &[cert(1, false, days, now)], &t, now, true).unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].status, status);
            assert_eq!(results[0].remaining, Duration::days(days));
        }
    }

    #[test]
    fn test_duplicates_are_classified_once() {
        let now = Utc::now();
        let chain = vec![
            cert(1, false, 10, now),
            cert(2, true, 5, now),
            cert(1, false, 10, now),
        ];
        let results = classify_chain("example.com", &chain, &Thresholds::default(), now, false)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].common_name, "cert-1");
    }

    #[test]
    fn test_ca_certificates_are_never_reported() {
        let now = Utc::now();
        let chain = vec![cert(3, true, -10, now), cert(4, true, 1000, now)];
        let results =
            classify_chain("example.com", &chain, &Thresholds::default(), now, true).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_hostname_mismatch_keeps_results() {
        let now = Utc::now();
        let chain = vec![cert(5, false, 20, now)];
        let err = classify_chain("other.org", &chain, &Thresholds::default(), now, true)
            .unwrap_err();
        match err {
            CheckError::HostnameMismatch {
                hostname,
                common_name,
                results,
            } => {
                assert_eq!(hostname, "other.org");
                assert_eq!(common_name, "cert-5");
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].status, Status::Warning);
            }
            other => panic!("expected HostnameMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_hostname_not_checked_when_disabled() {
        let now = Utc::now();
        let chain = vec![cert(6, false, 200, now)];
        let results =
            classify_chain("other.org", &chain, &Thresholds::default(), now, false).unwrap();
        assert_eq!(results[0].status, Status::Ok);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::hours(24 * 12 + 23)), "12d remaining");
        assert_eq!(format_remaining(Duration::hours(5)), "0d remaining");
        assert_eq!(format_remaining(Duration::seconds(-1)), "expired");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Warning.code(), 1);
        assert_eq!(Status::Critical.code(), 2);
        assert_eq!(Status::Unknown.code(), 3);
        assert_eq!(Status::Critical.to_string(), "CRITICAL");
    }
}
