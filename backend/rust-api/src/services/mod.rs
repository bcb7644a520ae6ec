use crate::config::Config;
use crate::error::{EngineError, EngineResult, TxError};
use crate::metrics::{record_engine_error, TRANSACTION_REPLAYS_TOTAL};
use crate::store::LearningStore;
use crate::utils::retry::{retry_async_when, RetryConfig};
use redis::aio::ConnectionManager;

pub mod enrollment_service;
pub mod lock_service;
pub mod points_service;
pub mod progress_service;
pub mod quiz_service;

#[cfg(test)]
pub(crate) mod fixtures;

use enrollment_service::EnrollmentAggregator;
use lock_service::AdvisoryLock;
use points_service::PointsEngine;
use progress_service::ProgressLedger;
use quiz_service::QuizEngine;

pub struct AppState<S: LearningStore> {
    pub config: Config,
    pub store: S,
    pub redis: Option<ConnectionManager>,
}

impl<S: LearningStore> AppState<S> {
    pub fn new(config: Config, store: S) -> Self {
        Self {
            config,
            store,
            redis: None,
        }
    }

    /// Attaches Redis for advisory locks; fails if the server does not answer PING
    pub async fn with_redis(mut self, redis_client: redis::Client) -> anyhow::Result<Self> {
        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        self.redis = Some(redis);
        Ok(self)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.config.max_tx_attempts)
    }

    pub fn progress_ledger(&self) -> ProgressLedger<S> {
        ProgressLedger::new(self.store.clone()).with_retry(self.retry_config())
    }

    pub fn enrollment_aggregator(&self) -> EnrollmentAggregator<S> {
        EnrollmentAggregator::new(self.store.clone()).with_retry(self.retry_config())
    }

    pub fn points_engine(&self) -> PointsEngine<S> {
        PointsEngine::new(self.store.clone()).with_retry(self.retry_config())
    }

    pub fn quiz_engine(&self) -> QuizEngine<S> {
        let engine = QuizEngine::new(self.store.clone()).with_retry(self.retry_config());
        match &self.redis {
            Some(redis) => engine.with_lock(AdvisoryLock::new(redis.clone())),
            None => engine,
        }
    }
}

/// Runs one transactional unit of work, replaying it from scratch when the
/// store reports a write conflict. Other errors are returned as-is.
pub(crate) async fn replay_on_conflict<F, Fut, T>(
    operation: &'static str,
    retry: RetryConfig,
    f: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TxError>>,
{
    let should_replay = |err: &TxError| {
        let conflict = err.is_conflict();
        if conflict {
            TRANSACTION_REPLAYS_TOTAL
                .with_label_values(&[operation])
                .inc();
            tracing::warn!("Write conflict in {}, replaying: {:?}", operation, err);
        }
        conflict
    };

    retry_async_when(retry, should_replay, f)
        .await
        .map_err(|err| {
            let err = EngineError::from(err);
            record_engine_error(operation, &err);
            err
        })
}
