use chrono::{DateTime, Utc};

use super::replay_on_conflict;
use crate::error::{EngineError, EngineResult, TxError};
use crate::metrics::ENROLLMENTS_COMPLETED_TOTAL;
use crate::models::enrollment::{Enrollment, EnrollmentStatus};
use crate::store::{LearningStore, StoreTx};
use crate::utils::retry::RetryConfig;

/// Keeps enrollment counters and status consistent with lesson progress
pub struct EnrollmentAggregator<S> {
    store: S,
    retry: RetryConfig,
}

impl<S: LearningStore> EnrollmentAggregator<S> {
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

    /// Enrolls a user in a course. Enrolling twice returns the existing row.
    pub async fn enroll(&self, user_id: &str, course_id: &str) -> EngineResult<Enrollment> {
        tracing::info!("Enrolling user={} in course={}", user_id, course_id);

        let (enrollment, created) = replay_on_conflict("enroll", self.retry.clone(), || {
            self.try_enroll(user_id, course_id)
        })
        .await?;

        if created {
            tracing::info!(
                "Enrollment created: id={}, total_lessons={}",
                enrollment.id,
                enrollment.total_lessons
            );
        }
        Ok(enrollment)
    }

    async fn try_enroll(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<(Enrollment, bool), TxError> {
        let mut tx = self.store.begin().await?;

        if tx.get_course(course_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("Course {} not found", course_id)).into());
        }

        if let Some(existing) = tx.find_enrollment(user_id, course_id).await? {
            tx.rollback().await?;
            return Ok((existing, false));
        }

        let total_lessons = tx.count_lessons(course_id).await?;
        let enrollment = Enrollment::new(user_id, course_id, total_lessons, Utc::now());
        tx.insert_enrollment(&enrollment).await?;
        tx.commit().await?;

        Ok((enrollment, true))
    }

    /// Recomputes counters, percentage and status of one enrollment
    pub async fn recompute_enrollment(&self, enrollment_id: &str) -> EngineResult<Enrollment> {
        replay_on_conflict("recompute_enrollment", self.retry.clone(), || {
            self.try_recompute(enrollment_id)
        })
        .await
    }

    async fn try_recompute(&self, enrollment_id: &str) -> Result<Enrollment, TxError> {
        let mut tx = self.store.begin().await?;

        let enrollment = tx.get_enrollment(enrollment_id).await?.ok_or_else(|| {
            EngineError::NotFound(format!("Enrollment {} not found", enrollment_id))
        })?;
        let was_completed = enrollment.status == EnrollmentStatus::Completed;

        let enrollment = recompute_in_tx(&mut tx, enrollment, Utc::now()).await?;
        tx.commit().await?;

        record_completion(was_completed, &enrollment);
        Ok(enrollment)
    }
}

/// Re-derives the enrollment from the progress rows visible in `tx` and
/// writes it back when anything changed. The caller owns the commit.
pub(crate) async fn recompute_in_tx<T: StoreTx>(
    tx: &mut T,
    mut enrollment: Enrollment,
    now: DateTime<Utc>,
) -> Result<Enrollment, TxError> {
    let completed = tx
        .count_completed_lessons(&enrollment.user_id, &enrollment.course_id)
        .await?;
    let total = tx.count_lessons(&enrollment.course_id).await?;

    if enrollment.apply_counts(completed, total, now) {
        tx.update_enrollment(&enrollment).await?;
        tracing::debug!(
            "Enrollment {} recomputed: {}/{} lessons ({}%), status={}",
            enrollment.id,
            enrollment.completed_lessons,
            enrollment.total_lessons,
            enrollment.completion_percentage,
            enrollment.status.as_str()
        );
    }

    Ok(enrollment)
}

/// Counts enrollments that just reached `completed`. Call after commit.
pub(crate) fn record_completion(was_completed: bool, enrollment: &Enrollment) {
    if !was_completed && enrollment.status == EnrollmentStatus::Completed {
        ENROLLMENTS_COMPLETED_TOTAL.inc();
        tracing::info!(
            "User {} completed course {}",
            enrollment.user_id,
            enrollment.course_id
        );
    }
}
