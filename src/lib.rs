//! Web Push dispatch engine for the daily mission backend.
//!
//! Encrypts notification payloads per recipient (RFC 8291 `aes128gcm`),
//! authenticates to push services with VAPID (RFC 8292), and fans a single
//! notification out to every active subscription, deactivating the ones the
//! push service reports as gone.

pub mod codec;
pub mod dispatch;
pub mod encrypt;
mod error;
pub mod store;
pub mod types;
pub mod vapid;

pub use dispatch::{DeliveryTransport, HttpTransport, PushDispatcher};
pub use encrypt::encrypt;
pub use error::PushError;
pub use store::{SqliteStore, SubscriptionStore};
pub use types::{
    DeliveryOutcome, DispatchSummary, NotificationPayload, Subscription, SubscriptionKeys,
};
pub use vapid::{AuthHeaders, VapidKeys};
