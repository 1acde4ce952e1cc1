use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::supabase::SupabaseClient;

const LOCK_TIMEOUT_SECONDS: i64 = 30;
const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// Serialized critical section backed by the `scheduling_locks` table.
/// Insert-if-absent acts as acquire; expired rows are swept so a crashed
/// holder cannot wedge the key forever.
pub struct SchedulingLock<'a> {
    supabase: &'a SupabaseClient,
}

impl<'a> SchedulingLock<'a> {
    pub fn new(supabase: &'a SupabaseClient) -> Self {
        Self { supabase }
    }

    /// Acquire the named lock, retrying with backoff while another holder
    /// has it. Returns an error once the attempts are exhausted.
    pub async fn acquire(&self, lock_key: &str) -> Result<()> {
        for attempt in 1..=MAX_ACQUIRE_ATTEMPTS {
            if self.try_acquire(lock_key).await? {
                debug!("Scheduling lock acquired: {}", lock_key);
                return Ok(());
            }

            if attempt < MAX_ACQUIRE_ATTEMPTS {
                warn!(
                    "Lock {} contended, retrying attempt {}/{}",
                    lock_key, attempt, MAX_ACQUIRE_ATTEMPTS
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
            }
        }

        Err(anyhow!("Could not acquire scheduling lock: {}", lock_key))
    }

    pub async fn release(&self, lock_key: &str) -> Result<()> {
        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key);
        let _: Value = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await?;

        debug!("Scheduling lock released: {}", lock_key);
        Ok(())
    }

    /// One insert-if-absent round: a failed insert means the key is held, in
    /// which case an expired holder is swept and the insert tried once more.
    async fn try_acquire(&self, lock_key: &str) -> Result<bool> {
        if self.insert_lock_row(lock_key).await? {
            return Ok(true);
        }

        if self.cleanup_if_expired(lock_key).await? {
            return self.insert_lock_row(lock_key).await;
        }

        Ok(false)
    }

    async fn insert_lock_row(&self, lock_key: &str) -> Result<bool> {
        let lock_data = json!({
            "lock_key": lock_key,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(LOCK_TIMEOUT_SECONDS)).to_rfc3339(),
            "holder": format!("scheduler_{}", Uuid::new_v4())
        });

        match self
            .supabase
            .request::<Value>(Method::POST, "/rest/v1/scheduling_locks", None, Some(lock_data))
            .await
        {
            Ok(_) => Ok(true),
            // unique violation on lock_key: someone else holds it
            Err(_) => Ok(false),
        }
    }

    async fn cleanup_if_expired(&self, lock_key: &str) -> Result<bool> {
        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        let Some(row) = rows.first() else {
            // holder released between our insert failure and this read
            return Ok(true);
        };

        let expired = row
            .get("expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc) < Utc::now())
            .unwrap_or(false);

        if expired {
            self.release(lock_key).await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Sweep every expired lock row. Meant for periodic maintenance.
    pub async fn cleanup_expired(&self) -> Result<u32> {
        let path = format!(
            "/rest/v1/scheduling_locks?expires_at=lt.{}",
            Utc::now().to_rfc3339()
        );
        let response: Value = self.supabase.request(Method::DELETE, &path, None, None).await?;

        let cleaned = response.as_array().map(|arr| arr.len() as u32).unwrap_or(0);
        if cleaned > 0 {
            info!("Cleaned up {} expired scheduling locks", cleaned);
        }

        Ok(cleaned)
    }
}
