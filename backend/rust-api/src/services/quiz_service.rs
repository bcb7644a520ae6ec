use chrono::Utc;
use uuid::Uuid;

use super::lock_service::{quiz_attempt_key, AdvisoryLock};
use super::points_service::{award_in_tx, record_award};
use super::replay_on_conflict;
use crate::error::{EngineError, EngineResult, TxError};
use crate::metrics::QUIZ_ATTEMPTS_TOTAL;
use crate::models::quiz::{QuizAttempt, QuizResult, SelectedAnswers};
use crate::store::{LearningStore, StoreTx};
use crate::utils::retry::RetryConfig;

/// Grades quiz submissions, numbers attempts and pays out attempt-based rewards
pub struct QuizEngine<S> {
    store: S,
    retry: RetryConfig,
    lock: Option<AdvisoryLock>,
}

impl<S: LearningStore> QuizEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
            lock: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lock(mut self, lock: AdvisoryLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub async fn submit_quiz_attempt(
        &self,
        quiz_id: &str,
        enrollment_id: &str,
        user_id: &str,
        selected: &SelectedAnswers,
    ) -> EngineResult<QuizResult> {
        let token = match &self.lock {
            Some(lock) => match lock.acquire(&quiz_attempt_key(user_id, quiz_id)).await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!("Advisory lock unavailable, relying on store: {:?}", e);
                    None
                }
            },
            None => None,
        };

        let result = replay_on_conflict("submit_quiz_attempt", self.retry.clone(), || {
            self.try_submit(quiz_id, enrollment_id, user_id, selected)
        })
        .await;

        if let (Some(lock), Some(token)) = (&self.lock, token) {
            if let Err(e) = lock.release(token).await {
                tracing::warn!("Failed to release advisory lock: {:?}", e);
            }
        }

        let result = result?;

        let perfect = result.correct_count == result.total_questions;
        QUIZ_ATTEMPTS_TOTAL
            .with_label_values(&[if perfect { "true" } else { "false" }])
            .inc();
        tracing::info!(
            "Quiz {} attempt {} by {}: {}/{} correct, {} points",
            quiz_id,
            result.attempt_number,
            user_id,
            result.correct_count,
            result.total_questions,
            result.points_earned
        );
        if let Some(award) = &result.award {
            record_award(u64::from(result.points_earned), award);
        }

        Ok(result)
    }

    async fn try_submit(
        &self,
        quiz_id: &str,
        enrollment_id: &str,
        user_id: &str,
        selected: &SelectedAnswers,
    ) -> Result<QuizResult, TxError> {
        let mut tx = self.store.begin().await?;

        let quiz = tx
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Quiz {} not found", quiz_id)))?;
        let enrollment = tx.get_enrollment(enrollment_id).await?.ok_or_else(|| {
            EngineError::NotFound(format!("Enrollment {} not found", enrollment_id))
        })?;
        if enrollment.user_id != user_id {
            return Err(EngineError::Forbidden(format!(
                "Enrollment {} belongs to another user",
                enrollment_id
            ))
            .into());
        }
        if enrollment.course_id != quiz.course_id {
            return Err(EngineError::Validation(format!(
                "Quiz {} is not part of course {}",
                quiz_id, enrollment.course_id
            ))
            .into());
        }

        let grade = quiz.grade(selected)?;

        let attempt_number = tx.count_quiz_attempts(user_id, quiz_id).await? + 1;
        let points_earned = quiz.reward_schedule.points_for_attempt(attempt_number);

        let attempt = QuizAttempt {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz_id.to_string(),
            enrollment_id: enrollment_id.to_string(),
            user_id: user_id.to_string(),
            attempt_number,
            selected_answers: selected.clone(),
            correct_count: grade.correct_count,
            total_questions: grade.total_questions,
            score_percentage: grade.score_percentage,
            points_earned,
            created_at: Utc::now(),
        };
        tx.insert_quiz_attempt(&attempt).await?;

        let award = if points_earned > 0 {
            Some(award_in_tx(&mut tx, user_id, u64::from(points_earned)).await?)
        } else {
            None
        };

        tx.commit().await?;

        Ok(QuizResult {
            attempt_id: attempt.id,
            attempt_number,
            correct_count: grade.correct_count,
            total_questions: grade.total_questions,
            score_percentage: grade.score_percentage,
            points_earned,
            award,
        })
    }

    /// Attempts of one user on one quiz, oldest first
    pub async fn list_attempts(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> EngineResult<Vec<QuizAttempt>> {
        let mut tx = self.store.begin().await?;
        if tx.get_quiz(quiz_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("Quiz {} not found", quiz_id)));
        }
        let attempts = tx.list_quiz_attempts(user_id, quiz_id).await?;
        tx.rollback().await?;
        Ok(attempts)
    }
}
