//! Dispatch orchestrator: fans one notification out to every active
//! subscription.
//!
//! Each recipient gets its own task with its own encryption, VAPID header,
//! and delivery attempt; per-recipient failures are absorbed at the task
//! boundary and never cancel siblings. The cycle itself fails only when the
//! subscription list cannot be fetched.

use crate::encrypt::encrypt;
use crate::error::PushError;
use crate::store::SubscriptionStore;
use crate::types::{DeliveryOutcome, DispatchSummary, NotificationPayload, Subscription};
use crate::vapid::{build_auth_header, AuthHeaders, VapidKeys};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Default `TTL` header: push services may hold the message for a day.
const DEFAULT_TTL_SECS: u32 = 86_400;

/// Per-request timeout so one unreachable push service cannot stall the
/// join for the whole batch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Byte-level POST to a push service endpoint. Seam for tests.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Deliver one encrypted record; returns the HTTP status code.
    async fn deliver(
        &self,
        endpoint: &str,
        auth: &AuthHeaders,
        body: &[u8],
        ttl_secs: u32,
    ) -> Result<u16, PushError>;
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn deliver(
        &self,
        endpoint: &str,
        auth: &AuthHeaders,
        body: &[u8],
        ttl_secs: u32,
    ) -> Result<u16, PushError> {
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", &auth.authorization)
            .header("Crypto-Key", &auth.crypto_key)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Encoding", "aes128gcm")
            .header("TTL", ttl_secs.to_string())
            .body(body.to_vec())
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

/// Outcome of one recipient's pipeline within a cycle.
enum RecipientOutcome {
    Sent,
    Gone,
    Failed,
    Skipped,
}

/// Orchestrates one full fan-out per call to [`dispatch`](Self::dispatch).
pub struct PushDispatcher {
    store: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn DeliveryTransport>,
    vapid: VapidKeys,
    ttl_secs: u32,
}

impl PushDispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn DeliveryTransport>,
        vapid: VapidKeys,
    ) -> Self {
        Self {
            store,
            transport,
            vapid,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    /// Override the `TTL` hint sent to push services.
    pub fn with_ttl(self, ttl_secs: u32) -> Self {
        Self { ttl_secs, ..self }
    }

    /// Run one dispatch cycle: encrypt and deliver `payload` to every
    /// active subscription, then retire the endpoints reported gone.
    ///
    /// Fails only if the subscription list cannot be fetched; every other
    /// failure is recipient-scoped and reflected in the summary.
    pub async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<DispatchSummary, PushError> {
        // One wire-level plaintext, shared read-only across all tasks.
        let plaintext: Arc<[u8]> = serde_json::to_vec(payload)?.into();

        let subscriptions = self.store.list_active().await?;
        if subscriptions.is_empty() {
            log::debug!("No active push subscriptions, skipping dispatch");
            return Ok(DispatchSummary::default());
        }

        log::debug!("Dispatching push to {} subscriptions", subscriptions.len());

        let mut handles = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let transport = Arc::clone(&self.transport);
            let vapid = self.vapid.clone();
            let plaintext = Arc::clone(&plaintext);
            let ttl_secs = self.ttl_secs;
            let endpoint = subscription.endpoint.clone();

            let handle = tokio::spawn(async move {
                send_to_subscription(
                    transport.as_ref(),
                    &vapid,
                    &subscription,
                    &plaintext,
                    ttl_secs,
                )
                .await
            });
            handles.push((endpoint, handle));
        }

        // Join barrier: results merge only after every task finishes.
        let mut summary = DispatchSummary::default();
        let mut gone_endpoints = Vec::new();
        for (endpoint, handle) in handles {
            match handle.await {
                Ok(RecipientOutcome::Sent) => summary.sent += 1,
                Ok(RecipientOutcome::Gone) => {
                    summary.gone += 1;
                    gone_endpoints.push(endpoint);
                }
                Ok(RecipientOutcome::Failed) => summary.failed += 1,
                Ok(RecipientOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    log::warn!("Delivery task for {} did not complete: {}", endpoint, e);
                    summary.failed += 1;
                }
            }
        }

        // Deactivations run concurrently and independently; a failed one is
        // logged and retried naturally when the endpoint next reports gone.
        let results = join_all(
            gone_endpoints
                .iter()
                .map(|endpoint| self.store.deactivate(endpoint)),
        )
        .await;
        for (endpoint, result) in gone_endpoints.iter().zip(results) {
            match result {
                Ok(()) => summary.deactivated += 1,
                Err(e) => log::warn!("Failed to deactivate {}: {}", endpoint, e),
            }
        }

        log::info!(
            "Push dispatch result: {} sent, {} gone, {} failed, {} skipped, {} deactivated",
            summary.sent,
            summary.gone,
            summary.failed,
            summary.skipped,
            summary.deactivated
        );

        Ok(summary)
    }
}

/// One recipient's pipeline: encrypt, sign, deliver, classify.
///
/// Never returns an error; all failures collapse into the outcome so the
/// batch keeps going.
async fn send_to_subscription(
    transport: &dyn DeliveryTransport,
    vapid: &VapidKeys,
    subscription: &Subscription,
    plaintext: &[u8],
    ttl_secs: u32,
) -> RecipientOutcome {
    let record = match encrypt(
        plaintext,
        &subscription.keys.p256dh,
        &subscription.keys.auth,
    ) {
        Ok(record) => record,
        Err(e) => {
            // Bad key material is permanent but does not retire the
            // subscription; only an explicit gone status does.
            log::warn!("Skipping {}: {}", subscription.endpoint, e);
            return RecipientOutcome::Skipped;
        }
    };

    let auth = match build_auth_header(&subscription.endpoint, vapid) {
        Ok(auth) => auth,
        Err(e) => {
            log::warn!("Skipping {}: {}", subscription.endpoint, e);
            return RecipientOutcome::Skipped;
        }
    };

    match transport
        .deliver(&subscription.endpoint, &auth, &record, ttl_secs)
        .await
    {
        Ok(status) => match DeliveryOutcome::from_status(status) {
            DeliveryOutcome::Delivered => {
                log::debug!("Delivered push to {}", subscription.endpoint);
                RecipientOutcome::Sent
            }
            DeliveryOutcome::Gone => {
                log::info!("Push endpoint gone ({}): {}", status, subscription.endpoint);
                RecipientOutcome::Gone
            }
            DeliveryOutcome::TransientFailure => {
                log::warn!(
                    "Push service returned {} for {}",
                    status,
                    subscription.endpoint
                );
                RecipientOutcome::Failed
            }
        },
        Err(e) => {
            log::warn!("Push delivery to {} failed: {}", subscription.endpoint, e);
            RecipientOutcome::Failed
        }
    }
}
