//! TLS connection handling and certificate chain retrieval.
//!
//! [`Inspector::inspect`] dials a host, hands the peer chain to
//! [`classify_chain`](crate::classify_chain) and returns the classification of
//! every leaf certificate. The connection never outlives [`fetch_chain`].

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use chrono::Utc;
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslVerifyMode};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::CheckError;
use crate::{classify_chain, CertificateRecord, ClassificationResult, Thresholds};

/// Port used when a host does not name one.
pub const DEFAULT_PORT: u16 = 443;

/// Extra time granted on top of the connect timeout for the TLS handshake.
pub const DIAL_GRACE: Duration = Duration::from_secs(5);

/// How the peer chain is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerifyMode {
    /// Accept any chain at connect time, then match each leaf against the host.
    ///
    /// A mismatch still yields the classification, wrapped in
    /// [`CheckError::HostnameMismatch`].
    #[default]
    Skip,
    /// Let OpenSSL verify the chain and host name against the system trust
    /// store during the handshake and inspect the verified chain only.
    Platform,
}

/// Settings for an [`Inspector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorConfig {
    pub connect_timeout: Duration,
    pub thresholds: Thresholds,
    pub verify: VerifyMode,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        InspectorConfig {
            connect_timeout: Duration::from_secs(30),
            thresholds: Thresholds::default(),
            verify: VerifyMode::Skip,
        }
    }
}

/// A host to dial, with its port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 address is taken as a host without a port.
    pub fn parse(input: &str) -> Result<Target, CheckError> {
        let input = input.trim();
        let invalid = |reason: &str| CheckError::DnsResolution {
            hostname: input.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, reason.to_string()),
        };

        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid("invalid port"))?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(invalid("unexpected text after ']'")),
            };
            return Ok(Target {
                host: host.to_string(),
                port,
            });
        }

        if input.parse::<IpAddr>().is_ok() {
            return Ok(Target {
                host: input.to_string(),
                port: DEFAULT_PORT,
            });
        }

        match input.rsplit_once(':') {
            Some((host, port)) => Ok(Target {
                host: host.to_string(),
                port: port.parse().map_err(|_| invalid("invalid port"))?,
            }),
            None if input.is_empty() => Err(invalid("empty host")),
            None => Ok(Target {
                host: input.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }

    fn is_ip(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Checks the certificates served by hosts, one host at a time.
#[derive(Debug, Clone)]
pub struct Inspector {
    config: InspectorConfig,
}

impl Inspector {
    pub fn new(config: InspectorConfig) -> Inspector {
        Inspector { config }
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Connects to `host` and classifies every leaf certificate it presents.
    ///
    /// `host` may carry an explicit port (`example.com:8443`). The results use
    /// the host name without the port.
    pub fn inspect(&self, host: &str) -> Result<Vec<ClassificationResult>, CheckError> {
        let target = Target::parse(host)?;
        let chain = fetch_chain(&target, self.config.connect_timeout, self.config.verify)?;
        let records = chain
            .iter()
            .map(|der| CertificateRecord::from_der(der))
            .collect::<Result<Vec<_>, _>>()?;
        classify_chain(
            &target.host,
            &records,
            &self.config.thresholds,
            Utc::now(),
            self.config.verify == VerifyMode::Skip,
        )
    }
}

/// Dials `target` and returns the DER encoded peer chain, leaf first.
///
/// The TCP connect and the handshake share a single deadline of `timeout` plus
/// [`DIAL_GRACE`], enforced on every socket read and write. The connection is
/// closed before returning.
pub fn fetch_chain(
    target: &Target,
    timeout: Duration,
    verify: VerifyMode,
) -> Result<Vec<Vec<u8>>, CheckError> {
    let address = target.to_string();
    let deadline = Instant::now()
        .checked_add(timeout)
        .and_then(|deadline| deadline.checked_add(DIAL_GRACE))
        .ok_or_else(|| CheckError::ConnectionFailed {
            address: address.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "connect timeout is too large"),
        })?;

    let tcp_stream = DeadlineStream {
        inner: dial(target, &address, timeout, deadline)?,
        deadline,
    };

    let mut builder = SslConnector::builder(SslMethod::tls())?;
    if verify == VerifyMode::Skip {
        builder.set_verify(SslVerifyMode::NONE);
    }
    let connector = builder.build();
    let mut config = connector.configure()?;
    config.set_use_server_name_indication(!target.is_ip());
    config.set_verify_hostname(verify == VerifyMode::Platform);

    let mut stream = config
        .connect(&target.host, tcp_stream)
        .map_err(|e| handshake_error(e, target, &address))?;

    let ssl = stream.ssl();
    let chain = match verify {
        VerifyMode::Skip => ssl.peer_cert_chain(),
        VerifyMode::Platform => ssl.verified_chain(),
    };
    let der = match chain {
        Some(chain) if !chain.is_empty() => chain
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()?,
        _ => match ssl.peer_certificate() {
            Some(cert) => vec![cert.to_der()?],
            None => {
                return Err(CheckError::NoCertificate {
                    hostname: target.host.clone(),
                })
            }
        },
    };

    // close_notify is best effort, the socket is dropped either way
    let _ = stream.shutdown();
    Ok(der)
}

fn dial(
    target: &Target,
    address: &str,
    timeout: Duration,
    deadline: Instant,
) -> Result<TcpStream, CheckError> {
    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|source| CheckError::DnsResolution {
            hostname: target.host.clone(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(CheckError::DnsResolution {
            hostname: target.host.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        });
    }

    let mut last_error = None;
    for addr in addrs {
        let budget = remaining_until(deadline, address)?.min(timeout);
        match TcpStream::connect_timeout(&addr, budget) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    match last_error {
        Some(e) if e.kind() == io::ErrorKind::TimedOut => Err(CheckError::Timeout {
            address: address.to_string(),
        }),
        Some(source) => Err(CheckError::ConnectionFailed {
            address: address.to_string(),
            source,
        }),
        None => Err(CheckError::Timeout {
            address: address.to_string(),
        }),
    }
}

fn remaining_until(deadline: Instant, address: &str) -> Result<Duration, CheckError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(CheckError::Timeout {
            address: address.to_string(),
        });
    }
    Ok(left)
}

/// A socket that stops reading and writing once `deadline` has passed.
///
/// The socket timeout is narrowed to the time left before every call, so a
/// peer sending one byte at a time cannot hold the handshake open.
#[derive(Debug)]
struct DeadlineStream {
    inner: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn time_left(&self) -> io::Result<Duration> {
        let left = self.deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        }
        Ok(left)
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.time_left()?;
        self.inner.set_read_timeout(Some(left))?;
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let left = self.time_left()?;
        self.inner.set_write_timeout(Some(left))?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn handshake_error(e: HandshakeError<DeadlineStream>, target: &Target, address: &str) -> CheckError {
    match e {
        HandshakeError::SetupFailure(stack) => stack.into(),
        HandshakeError::Failure(mid) => {
            let verify_result = mid.ssl().verify_result();
            if verify_result.as_raw() != 0 {
                return CheckError::VerificationFailed {
                    hostname: target.host.clone(),
                    reason: verify_result.error_string().to_string(),
                };
            }
            let timed_out = mid
                .error()
                .io_error()
                .map(|io| matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock))
                .unwrap_or(false);
            if timed_out {
                return CheckError::Timeout {
                    address: address.to_string(),
                };
            }
            CheckError::HandshakeFailed {
                details: mid.error().to_string(),
            }
        }
        HandshakeError::WouldBlock(_) => CheckError::Timeout {
            address: address.to_string(),
        },
    }
}
