//! Subscription repository.
//!
//! The dispatch engine only needs a narrow contract against the store: list
//! the active subscriptions and soft-retire one by endpoint. Rows are never
//! physically deleted; an inactive row is reusable if the user re-subscribes
//! with the same endpoint.

use crate::error::PushError;
use crate::types::{Subscription, SubscriptionKeys};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Read/write contract the dispatch engine expects from the store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Every subscription with `active = true`. Ordering is irrelevant.
    async fn list_active(&self) -> Result<Vec<Subscription>, PushError>;

    /// Set `active = false` for the row matching `endpoint`. Idempotent:
    /// deactivating an already-inactive or unknown endpoint is not an error.
    async fn deactivate(&self, endpoint: &str) -> Result<(), PushError>;
}

/// SQLite-backed subscription store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PushError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, PushError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), PushError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS push_subscriptions (
                endpoint TEXT PRIMARY KEY,
                p256dh TEXT NOT NULL,
                auth TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PushError> {
        self.conn
            .lock()
            .map_err(|_| PushError::Repository("connection lock poisoned".to_string()))
    }

    /// Insert or update a subscription row. Re-registering an endpoint
    /// refreshes its keys and reactivates it.
    pub fn upsert(&self, subscription: &Subscription) -> Result<(), PushError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO push_subscriptions (endpoint, p256dh, auth, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(endpoint) DO UPDATE SET
                 p256dh = excluded.p256dh,
                 auth = excluded.auth,
                 active = excluded.active",
            params![
                subscription.endpoint,
                subscription.keys.p256dh,
                subscription.keys.auth,
                subscription.active as i64,
                subscription.created_at,
            ],
        )?;
        log::info!("Saved push subscription");
        Ok(())
    }

    /// Total row count, active or not. Used by tests to verify soft delete.
    pub fn count_all(&self) -> Result<usize, PushError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM push_subscriptions", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn list_active(&self) -> Result<Vec<Subscription>, PushError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT endpoint, p256dh, auth, created_at
             FROM push_subscriptions WHERE active = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Subscription {
                endpoint: row.get(0)?,
                keys: SubscriptionKeys {
                    p256dh: row.get(1)?,
                    auth: row.get(2)?,
                },
                active: true,
                created_at: row.get(3)?,
            })
        })?;

        let mut subscriptions = Vec::new();
        for row in rows {
            subscriptions.push(row?);
        }
        Ok(subscriptions)
    }

    async fn deactivate(&self, endpoint: &str) -> Result<(), PushError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE push_subscriptions SET active = 0 WHERE endpoint = ?1",
            params![endpoint],
        )?;
        if changed > 0 {
            log::info!("Deactivated push subscription");
        } else {
            log::debug!("Deactivate matched no active row (already retired or unknown)");
        }
        Ok(())
    }
}
