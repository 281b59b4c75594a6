//! Notification aggregation and webhook delivery.
//!
//! The [`Aggregator`] collects one [`NotificationEntry`] per reported
//! certificate while hosts are checked, then builds a single message once the
//! run is over. Delivery goes through the [`Deliver`] trait; [`Webhook`] is the
//! HTTP implementation.
//!
//! # Submodules
//!
//! - `slack` - Slack incoming-webhook message formats

pub mod slack;

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{debug, info};
use url::Url;

use crate::error::NotifyError;
use crate::{format_remaining, ClassificationResult, Status};
use slack::{Attachment, Block, Msg};

/// Which results end up in the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotifyPolicy {
    /// Only warning and critical certificates
    #[default]
    Escalations,
    /// Every classified certificate
    All,
}

/// Layout of the webhook message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageFormat {
    /// Colored attachments, one per host
    #[default]
    Attachments,
    /// A header block followed by one section per host
    Blocks,
}

/// One host line of the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEntry {
    pub host: String,
    /// Human readable time left, e.g. `"12d remaining"`
    pub remaining: String,
    /// Numeric [`Status`] code
    pub severity: i32,
}

impl NotificationEntry {
    pub fn from_result(result: &ClassificationResult) -> NotificationEntry {
        NotificationEntry::with_severity(result, result.status)
    }

    fn with_severity(result: &ClassificationResult, status: Status) -> NotificationEntry {
        NotificationEntry {
            host: result.host.clone(),
            remaining: format_remaining(result.remaining),
            severity: status.code(),
        }
    }
}

/// Collects entries for the end-of-run notification.
#[derive(Debug, Clone)]
pub struct Aggregator {
    policy: NotifyPolicy,
    format: MessageFormat,
    entries: Vec<NotificationEntry>,
}

impl Aggregator {
    pub fn new(policy: NotifyPolicy, format: MessageFormat) -> Aggregator {
        Aggregator {
            policy,
            format,
            entries: Vec::new(),
        }
    }

    /// Appends `result` if the policy reports its status.
    pub fn accumulate(&mut self, result: &ClassificationResult) {
        let reported = match self.policy {
            NotifyPolicy::All => true,
            NotifyPolicy::Escalations => {
                matches!(result.status, Status::Warning | Status::Critical)
            }
        };
        if reported {
            self.entries.push(NotificationEntry::from_result(result));
        }
    }

    /// Appends `result` as critical whatever its status, for checks that failed
    /// after the certificate was classified.
    pub fn accumulate_failed(&mut self, result: &ClassificationResult) {
        self.entries
            .push(NotificationEntry::with_severity(result, Status::Critical));
    }

    pub fn entries(&self) -> &[NotificationEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the message holding every accumulated entry, in order.
    pub fn finalize(&self) -> Msg {
        match self.format {
            MessageFormat::Attachments => Msg::with_attachments(
                self.entries
                    .iter()
                    .map(|e| Attachment::new(format!("{} - {}", e.host, e.remaining), e.severity))
                    .collect(),
            ),
            MessageFormat::Blocks => Msg::with_blocks(
                self.entries
                    .iter()
                    .map(|e| Block::status(&e.host, &e.remaining, e.severity))
                    .collect(),
            ),
        }
    }

    /// Delivers the message once when `enabled` and at least one entry exists.
    ///
    /// Returns whether a delivery was attempted and succeeded.
    pub fn deliver_if(&self, enabled: bool, sink: &dyn Deliver) -> Result<bool, NotifyError> {
        if !enabled {
            debug!("notification disabled");
            return Ok(false);
        }
        if self.entries.is_empty() {
            debug!("nothing to notify");
            return Ok(false);
        }
        sink.deliver(&self.finalize())?;
        info!(entries = self.entries.len(), "notification sent");
        Ok(true)
    }
}

/// Sends a finished message somewhere.
pub trait Deliver {
    fn deliver(&self, msg: &Msg) -> Result<(), NotifyError>;
}

/// A sink that drops every message, used when notification is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl Deliver for Discard {
    fn deliver(&self, _msg: &Msg) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Posts messages as JSON to an incoming-webhook URL.
#[derive(Debug, Clone)]
pub struct Webhook {
    client: Client,
    endpoint: Url,
}

impl Webhook {
    pub fn new(endpoint: Url) -> Result<Webhook, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Webhook { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Deliver for Webhook {
    /// Single POST, no retry. Any status of 400 or above is a failure.
    fn deliver(&self, msg: &Msg) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(msg)?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(NotifyError::Rejected { status });
        }
        Ok(())
    }
}
