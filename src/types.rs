//! Types for push subscriptions and notifications.

use serde::{Deserialize, Serialize};

/// Keys for a push subscription (from the browser's `PushSubscription`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// The p256dh key for encryption: a 65-byte uncompressed P-256 point,
    /// base64url encoded.
    pub p256dh: String,
    /// The 16-byte auth secret, base64url encoded.
    pub auth: String,
}

/// A recipient's push registration.
///
/// The endpoint URL is the subscription's identity. A subscription is either
/// active or permanently retired; rows are soft-deleted only (an inactive row
/// is evidence and becomes reusable if the user re-subscribes with the same
/// endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// The push service endpoint URL (globally unique).
    pub endpoint: String,
    /// Encryption keys.
    pub keys: SubscriptionKeys,
    /// Whether the subscription still receives notifications.
    #[serde(default = "default_true")]
    pub active: bool,
    /// When the subscription was created.
    pub created_at: String,
}

fn default_true() -> bool {
    true
}

impl Subscription {
    /// Create an active subscription timestamped now.
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
            active: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Plaintext payload for a push notification.
///
/// Constructed fresh per dispatch cycle and never persisted; only the
/// per-recipient encrypted form ever leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Notification title
    pub title: String,
    /// Notification body text
    pub body: String,
    /// Icon URL (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Badge URL for mobile (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Tag for notification grouping/replacement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Additional data for client-side routing on receipt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NotificationPayload {
    /// Create a new notification payload
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: Some("/pwa-192x192.png".to_string()),
            badge: Some("/pwa-192x192.png".to_string()),
            tag: None,
            data: None,
        }
    }

    /// Add a tag for notification grouping
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Add routing data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Per-subscription delivery result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The push service accepted the message.
    Delivered,
    /// The endpoint no longer exists (HTTP 404/410). The only outcome that
    /// mutates subscription state.
    Gone,
    /// Anything else: non-success status or a network failure. Not retried
    /// in-process; the next scheduled cycle retries naturally.
    TransientFailure,
}

impl DeliveryOutcome {
    /// Classify a push-service HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => DeliveryOutcome::Delivered,
            404 | 410 => DeliveryOutcome::Gone,
            _ => DeliveryOutcome::TransientFailure,
        }
    }
}

/// Result of one dispatch cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Notifications accepted by the push service
    pub sent: usize,
    /// Endpoints the push service reported gone
    pub gone: usize,
    /// Transient delivery failures
    pub failed: usize,
    /// Recipients skipped before any delivery attempt (bad key material)
    pub skipped: usize,
    /// Gone subscriptions successfully marked inactive
    pub deactivated: usize,
}
