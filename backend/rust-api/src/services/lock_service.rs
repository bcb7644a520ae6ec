use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::time::Duration;
use uuid::Uuid;

/// Short-lived Redis lock that serializes quiz submissions of one user on one
/// quiz. Purely advisory: attempt numbering is still enforced by the store.
#[derive(Clone)]
pub struct AdvisoryLock {
    redis: ConnectionManager,
    ttl: Duration,
    wait: Duration,
}

/// Proof of ownership, needed to release the lock
#[derive(Debug)]
pub struct LockToken {
    key: String,
    value: String,
}

pub fn quiz_attempt_key(user_id: &str, quiz_id: &str) -> String {
    format!("lock:quiz_attempt:{}:{}", user_id, quiz_id)
}

impl AdvisoryLock {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            ttl: Duration::from_secs(5),
            wait: Duration::from_secs(2),
        }
    }

    /// Polls until the lock is free or the wait budget is spent.
    /// Returns `None` on timeout.
    pub async fn acquire(&self, key: &str) -> Result<Option<LockToken>> {
        let mut conn = self.redis.clone();
        let value = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.wait;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(&value)
                .arg("NX")
                .arg("PX")
                .arg(self.ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .context("Failed to acquire advisory lock")?;

            if acquired.is_some() {
                return Ok(Some(LockToken {
                    key: key.to_string(),
                    value,
                }));
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("Advisory lock {} still held after {:?}", key, self.wait);
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    // Compare-and-delete so an expired holder never frees someone else's lock
    pub async fn release(&self, token: LockToken) -> Result<()> {
        let mut conn = self.redis.clone();

        let lua_script = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
        "#;

        let _: i32 = redis::Script::new(lua_script)
            .key(&token.key)
            .arg(&token.value)
            .invoke_async(&mut conn)
            .await
            .context("Failed to release advisory lock")?;

        Ok(())
    }
}
