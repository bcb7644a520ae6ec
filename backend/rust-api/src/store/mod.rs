//! Persistence boundary for the engines.
//!
//! Every engine operation opens one transaction with [`LearningStore::begin`],
//! performs its reads and writes through [`StoreTx`], and commits once. Writes
//! become visible only on commit; dropping a transaction discards them.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::course::{Course, Lesson};
use crate::models::enrollment::{Enrollment, LessonProgress};
use crate::models::gamification::{Badge, UserPoints};
use crate::models::quiz::{Quiz, QuizAttempt};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness violation or concurrent write; the transaction may be replayed
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait LearningStore: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Liveness probe used by the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait StoreTx: Send {
    // Catalog (read-only here)
    async fn get_course(&mut self, course_id: &str) -> StoreResult<Option<Course>>;
    async fn get_lesson(&mut self, lesson_id: &str) -> StoreResult<Option<Lesson>>;
    async fn count_lessons(&mut self, course_id: &str) -> StoreResult<u32>;

    // Enrollments
    async fn get_enrollment(&mut self, enrollment_id: &str) -> StoreResult<Option<Enrollment>>;
    async fn find_enrollment(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Enrollment>>;
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()>;
    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()>;

    // Lesson progress
    async fn get_lesson_progress(
        &mut self,
        user_id: &str,
        lesson_id: &str,
    ) -> StoreResult<Option<LessonProgress>>;
    /// Insert-or-update keyed by (user_id, lesson_id)
    async fn upsert_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()>;
    async fn count_completed_lessons(&mut self, user_id: &str, course_id: &str)
        -> StoreResult<u32>;
    async fn list_lesson_progress(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Vec<LessonProgress>>;

    // Points
    async fn get_user_points(&mut self, user_id: &str) -> StoreResult<Option<UserPoints>>;
    /// Atomically adds `amount` and returns the state *before* the increment.
    /// `None` when the user does not exist.
    async fn increment_points(
        &mut self,
        user_id: &str,
        amount: u64,
    ) -> StoreResult<Option<UserPoints>>;
    async fn set_badge(&mut self, user_id: &str, badge: Badge) -> StoreResult<()>;

    // Quizzes
    async fn get_quiz(&mut self, quiz_id: &str) -> StoreResult<Option<Quiz>>;
    async fn count_quiz_attempts(&mut self, user_id: &str, quiz_id: &str) -> StoreResult<u32>;
    /// Fails with [`StoreError::Conflict`] when (user, quiz, attempt_number) is taken
    async fn insert_quiz_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()>;
    async fn list_quiz_attempts(
        &mut self,
        user_id: &str,
        quiz_id: &str,
    ) -> StoreResult<Vec<QuizAttempt>>;

    async fn commit(self) -> StoreResult<()>;
    async fn rollback(self) -> StoreResult<()>;
}
