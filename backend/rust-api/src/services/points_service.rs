use super::replay_on_conflict;
use crate::error::{EngineError, EngineResult, TxError};
use crate::metrics::{BADGE_PROMOTIONS_TOTAL, POINTS_AWARDED_TOTAL};
use crate::models::gamification::{Badge, GamificationProfile, PointsAward};
use crate::store::{LearningStore, StoreTx};
use crate::utils::retry::RetryConfig;

/// Awards points and keeps the badge in step with the running total
pub struct PointsEngine<S> {
    store: S,
    retry: RetryConfig,
}

impl<S: LearningStore> PointsEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn award_points(&self, user_id: &str, amount: i64) -> EngineResult<PointsAward> {
        let amount = u64::try_from(amount).map_err(|_| {
            tracing::warn!("Rejected negative award of {} points for {}", amount, user_id);
            EngineError::Validation(format!("Cannot award a negative amount ({})", amount))
        })?;

        let award = replay_on_conflict("award_points", self.retry.clone(), || {
            self.try_award(user_id, amount)
        })
        .await?;

        record_award(amount, &award);
        Ok(award)
    }

    async fn try_award(&self, user_id: &str, amount: u64) -> Result<PointsAward, TxError> {
        let mut tx = self.store.begin().await?;
        let award = award_in_tx(&mut tx, user_id, amount).await?;
        tx.commit().await?;
        Ok(award)
    }

    pub async fn get_profile(&self, user_id: &str) -> EngineResult<GamificationProfile> {
        let mut tx = self.store.begin().await?;
        let points = tx
            .get_user_points(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("User {} not found", user_id)))?;
        tx.rollback().await?;

        Ok(GamificationProfile::from_points(points))
    }
}

/// Atomically increments the total inside `tx` and persists a new badge when
/// the total crossed a threshold. The caller owns the commit.
pub(crate) async fn award_in_tx<T: StoreTx>(
    tx: &mut T,
    user_id: &str,
    amount: u64,
) -> Result<PointsAward, TxError> {
    let before = tx
        .increment_points(user_id, amount)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("User {} not found", user_id)))?;

    let new_total = before.total_points.saturating_add(amount);
    let previous_badge = before.current_badge;
    let new_badge = Badge::for_points(new_total);
    let badge_changed = new_badge != previous_badge;

    if badge_changed {
        tx.set_badge(user_id, new_badge).await?;
    }

    Ok(PointsAward {
        user_id: user_id.to_string(),
        new_total,
        new_badge,
        previous_badge,
        badge_changed,
    })
}

/// Metrics and logs for a committed award
pub(crate) fn record_award(amount: u64, award: &PointsAward) {
    POINTS_AWARDED_TOTAL.inc_by(amount);
    tracing::info!(
        "Awarded {} points to {} (total {})",
        amount,
        award.user_id,
        award.new_total
    );
    if award.badge_changed {
        BADGE_PROMOTIONS_TOTAL
            .with_label_values(&[award.new_badge.as_str()])
            .inc();
        tracing::info!(
            "User {} badge changed: {} -> {}",
            award.user_id,
            award.previous_badge.as_str(),
            award.new_badge.as_str()
        );
    }
}
