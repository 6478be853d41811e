//! Delivery channels for escalation pages.
//!
//! This module provides the [`DeliveryChannel`] trait, the implementations
//! shipped with the crate, and the [`ChannelRegistry`] that maps each
//! [`ChannelKind`] named by a policy step to the channel that carries it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{EscalationError, Result};
use crate::roster::Contact;
use crate::types::{AlertInstance, AlertKind, ChannelKind, DispatchReason, Severity};

/// A page for one contact about one alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// The alert being escalated.
    pub alert_id: String,
    /// The subject of the alert.
    pub subject_id: String,
    /// The kind of alert.
    pub kind: AlertKind,
    /// The severity of the alert.
    pub severity: Severity,
    /// The level being notified.
    pub level: usize,
    /// The tier being notified.
    pub tier: String,
    /// The channel this page goes out on.
    pub channel: ChannelKind,
    /// Why the page is being sent.
    pub reason: DispatchReason,
    /// The reading that triggered the alert.
    pub trigger_value: f64,
    /// The threshold it crossed.
    pub threshold_value: f64,
    /// Who is being paged.
    pub contact: Contact,
}

impl Notification {
    /// Builds a page for `contact` from an alert snapshot.
    #[must_use]
    pub fn for_contact(
        alert: &AlertInstance,
        tier: impl Into<String>,
        channel: ChannelKind,
        reason: DispatchReason,
        contact: Contact,
    ) -> Self {
        Self {
            alert_id: alert.id.clone(),
            subject_id: alert.subject_id.clone(),
            kind: alert.kind,
            severity: alert.severity,
            level: alert.level,
            tier: tier.into(),
            channel,
            reason,
            trigger_value: alert.trigger_value,
            threshold_value: alert.threshold_value,
            contact,
        }
    }

    /// One-line human summary of the page.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} {} on {}: value {} crossed {} (level {}, {})",
            self.severity,
            self.kind,
            match self.reason {
                DispatchReason::Initial => "alert",
                DispatchReason::Escalation => "escalation",
                DispatchReason::Repeat => "reminder",
                DispatchReason::Manual => "manual escalation",
            },
            self.subject_id,
            self.trigger_value,
            self.threshold_value,
            self.level,
            self.tier,
        )
    }
}

/// Result of handing a page to a channel.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Whether the channel accepted the page.
    pub success: bool,
    /// The channel that processed the page.
    pub channel: String,
    /// Optional message or error description.
    pub message: Option<String>,
}

impl DeliveryReceipt {
    /// Creates a successful receipt.
    #[must_use]
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: None,
        }
    }

    /// Creates a failed receipt.
    #[must_use]
    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message: Some(message.into()),
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

/// Trait for delivery channels.
///
/// Implement this trait to page staff through a new transport. A channel
/// sends one page per call; the dispatcher owns retries.
#[async_trait]
pub trait DeliveryChannel: Send + Sync + fmt::Debug {
    /// Returns the name of this channel.
    fn name(&self) -> &str;

    /// Sends a page.
    ///
    /// Either an `Err` or a receipt with `success == false` counts as a
    /// failed attempt.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::DeliveryFailed` if the page cannot be sent.
    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt>;

    /// Returns true if this channel is enabled.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Configuration for a webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The name of this webhook.
    pub name: String,
    /// The URL pages are posted to.
    pub url: String,
    /// HTTP headers to include with requests.
    pub headers: HashMap<String, String>,
    /// Timeout in seconds for HTTP requests.
    pub timeout_secs: u64,
    /// Whether this channel is enabled.
    pub enabled: bool,
}

impl WebhookConfig {
    /// Creates a new webhook configuration.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::InvalidPolicy` if the URL is empty.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(EscalationError::InvalidPolicy {
                reason: "webhook URL cannot be empty".to_string(),
            });
        }

        Ok(Self {
            name: name.into(),
            url,
            headers: HashMap::new(),
            timeout_secs: 10,
            enabled: true,
        })
    }

    /// Adds a header to the configuration.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A webhook delivery channel for paging gateways.
///
/// Posts each page as a JSON document. Any non-2xx answer from the gateway
/// is a failed attempt.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Creates a new webhook channel with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::InvalidPolicy` if the HTTP client cannot be
    /// built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EscalationError::InvalidPolicy {
                reason: format!("webhook {} client: {e}", config.name),
            })?;
        Ok(Self { config, client })
    }

    /// Returns the webhook URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Formats the page as JSON.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Serialization` if serialization fails.
    pub fn format_payload(&self, notification: &Notification) -> Result<String> {
        let payload = WebhookPayload::from_notification(notification);
        serde_json::to_string(&payload).map_err(EscalationError::from)
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt> {
        if !self.is_enabled() {
            debug!(channel = %self.name(), "channel is disabled, skipping");
            return Ok(DeliveryReceipt::failure(self.name(), "channel disabled"));
        }

        let body = self.format_payload(notification)?;
        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        debug!(
            channel = %self.name(),
            url = %self.config.url,
            alert_id = %notification.alert_id,
            contact = %notification.contact.contact_id,
            level = notification.level,
            "posting page to webhook"
        );

        let response = request
            .send()
            .await
            .map_err(|e| EscalationError::DeliveryFailed {
                contact: notification.contact.to_string(),
                reason: format!("{}: {e}", self.name()),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryReceipt::success(self.name())
                .with_message(format!("gateway answered {status}")));
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            channel = %self.name(),
            alert_id = %notification.alert_id,
            status = %status,
            body = %body,
            "webhook rejected page"
        );
        Ok(DeliveryReceipt::failure(
            self.name(),
            format!("gateway answered {status}: {body}"),
        ))
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// The JSON document posted by [`WebhookChannel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Payload version.
    pub version: String,
    /// The alert being escalated.
    pub alert_id: String,
    /// The subject of the alert.
    pub subject_id: String,
    /// The kind of alert.
    pub kind: AlertKind,
    /// The severity of the alert.
    pub severity: Severity,
    /// The level being notified.
    pub level: usize,
    /// The tier being notified.
    pub tier: String,
    /// The channel the gateway should use.
    pub channel: ChannelKind,
    /// Who to page.
    pub contact_id: String,
    /// Where to page them.
    pub address: String,
    /// Human-readable text.
    pub message: String,
}

impl WebhookPayload {
    /// Creates a payload from a page.
    #[must_use]
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            version: "1".to_string(),
            alert_id: notification.alert_id.clone(),
            subject_id: notification.subject_id.clone(),
            kind: notification.kind,
            severity: notification.severity,
            level: notification.level,
            tier: notification.tier.clone(),
            channel: notification.channel,
            contact_id: notification.contact.contact_id.clone(),
            address: notification.contact.address.clone(),
            message: notification.summary(),
        }
    }
}

/// A channel that writes pages to `tracing`.
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
    enabled: bool,
}

impl LogChannel {
    /// Creates a new log channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt> {
        if !self.is_enabled() {
            return Ok(DeliveryReceipt::failure(self.name(), "channel disabled"));
        }

        error!(
            alert_id = %notification.alert_id,
            subject = %notification.subject_id,
            kind = %notification.kind,
            severity = %notification.severity,
            level = notification.level,
            tier = %notification.tier,
            channel = %notification.channel,
            contact = %notification.contact,
            "PAGE {}",
            notification.summary()
        );

        Ok(DeliveryReceipt::success(self.name()).with_message("logged to tracing"))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Maps channel kinds to the channels that carry them.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<ChannelKind, Arc<dyn DeliveryChannel>>>,
    fallback: RwLock<Option<Arc<dyn DeliveryChannel>>>,
}

impl ChannelRegistry {
    /// Creates an empty registry. Kinds without a channel fail delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that logs every kind it has no channel for.
    #[must_use]
    pub fn with_log_fallback() -> Self {
        let registry = Self::new();
        registry.set_fallback(Arc::new(LogChannel::default()));
        registry
    }

    /// Registers the channel for a kind, replacing any previous one.
    pub fn register(&self, kind: ChannelKind, channel: Arc<dyn DeliveryChannel>) {
        info!(%kind, channel = %channel.name(), "registered delivery channel");
        self.channels.write().insert(kind, channel);
    }

    /// Sets the channel used for unregistered kinds.
    pub fn set_fallback(&self, channel: Arc<dyn DeliveryChannel>) {
        *self.fallback.write() = Some(channel);
    }

    /// Returns the channel for a kind, or the fallback.
    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn DeliveryChannel>> {
        self.channels
            .read()
            .get(&kind)
            .cloned()
            .or_else(|| self.fallback.read().clone())
    }

    /// Returns the number of registered kinds (fallback excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Returns true if no kind is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}
