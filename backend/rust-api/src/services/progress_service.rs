use chrono::Utc;

use super::enrollment_service::{recompute_in_tx, record_completion};
use super::replay_on_conflict;
use crate::error::{EngineError, EngineResult, TxError};
use crate::metrics::LESSONS_COMPLETED_TOTAL;
use crate::models::enrollment::{
    Enrollment, EnrollmentStatus, LessonCompletion, LessonProgress,
};
use crate::store::{LearningStore, StoreTx};
use crate::utils::retry::RetryConfig;

/// Course progress for one user, as returned by the progress endpoint
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CourseProgress {
    pub enrollment: Option<Enrollment>,
    pub lessons: Vec<LessonProgress>,
}

pub struct ProgressLedger<S> {
    store: S,
    retry: RetryConfig,
}

impl<S: LearningStore> ProgressLedger<S> {
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

    /// Marks a lesson complete and refreshes the enrollment in the same
    /// transaction. Marking an already completed lesson is a no-op.
    pub async fn mark_lesson_complete(
        &self,
        user_id: &str,
        lesson_id: &str,
        enrollment_id: &str,
    ) -> EngineResult<LessonCompletion> {
        let (completion, was_completed) =
            replay_on_conflict("mark_lesson_complete", self.retry.clone(), || {
                self.try_mark_complete(user_id, lesson_id, enrollment_id)
            })
            .await?;

        if completion.newly_completed {
            LESSONS_COMPLETED_TOTAL.inc();
            tracing::info!(
                "Lesson {} completed by user {} ({}%)",
                lesson_id,
                user_id,
                completion.enrollment.completion_percentage
            );
            record_completion(was_completed, &completion.enrollment);
        } else {
            tracing::debug!(
                "Lesson {} already completed by user {}, nothing to do",
                lesson_id,
                user_id
            );
        }

        Ok(completion)
    }

    async fn try_mark_complete(
        &self,
        user_id: &str,
        lesson_id: &str,
        enrollment_id: &str,
    ) -> Result<(LessonCompletion, bool), TxError> {
        let mut tx = self.store.begin().await?;

        let enrollment = tx.get_enrollment(enrollment_id).await?.ok_or_else(|| {
            EngineError::NotFound(format!("Enrollment {} not found", enrollment_id))
        })?;
        if enrollment.user_id != user_id {
            tracing::warn!(
                "User {} tried to record progress on enrollment {} owned by {}",
                user_id,
                enrollment_id,
                enrollment.user_id
            );
            return Err(EngineError::Forbidden(format!(
                "Enrollment {} belongs to another user",
                enrollment_id
            ))
            .into());
        }

        let lesson = tx
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Lesson {} not found", lesson_id)))?;
        if lesson.course_id != enrollment.course_id {
            return Err(EngineError::Validation(format!(
                "Lesson {} is not part of course {}",
                lesson_id, enrollment.course_id
            ))
            .into());
        }

        let now = Utc::now();
        let was_completed = enrollment.status == EnrollmentStatus::Completed;

        let progress = match tx.get_lesson_progress(user_id, lesson_id).await? {
            Some(existing) if existing.is_completed => {
                tx.rollback().await?;
                return Ok((
                    LessonCompletion {
                        progress: existing,
                        enrollment,
                        newly_completed: false,
                    },
                    was_completed,
                ));
            }
            Some(mut existing) => {
                existing.mark_completed(now);
                existing
            }
            None => LessonProgress::completed(user_id, lesson_id, &lesson.course_id, now),
        };

        tx.upsert_lesson_progress(&progress).await?;
        let enrollment = recompute_in_tx(&mut tx, enrollment, now).await?;
        tx.commit().await?;

        Ok((
            LessonCompletion {
                progress,
                enrollment,
                newly_completed: true,
            },
            was_completed,
        ))
    }

    /// Progress rows of a user within one course, ordered by lesson id.
    /// Empty when nothing was started.
    pub async fn get_progress_for_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> EngineResult<Vec<LessonProgress>> {
        let mut tx = self.store.begin().await?;
        let lessons = tx.list_lesson_progress(user_id, course_id).await?;
        tx.rollback().await?;
        Ok(lessons)
    }

    /// Enrollment (if any) together with the progress rows, read in one snapshot
    pub async fn get_course_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> EngineResult<CourseProgress> {
        let mut tx = self.store.begin().await?;
        let enrollment = tx.find_enrollment(user_id, course_id).await?;
        let lessons = tx.list_lesson_progress(user_id, course_id).await?;
        tx.rollback().await?;

        Ok(CourseProgress {
            enrollment,
            lessons,
        })
    }
}
