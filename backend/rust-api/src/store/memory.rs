//! In-process store used by tests and `STORE_BACKEND=memory` local runs.
//! Local runs load their catalog from a JSON seed file (see [`CatalogSeed`]).
//!
//! A single async mutex guards all tables. A transaction holds the lock for its
//! whole lifetime and works on a private copy, so transactions are fully
//! serialized and a commit swaps the copy in atomically.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LearningStore, StoreError, StoreResult, StoreTx};
use crate::models::course::{Course, Lesson};
use crate::models::enrollment::{Enrollment, LessonProgress};
use crate::models::gamification::{Badge, UserPoints};
use crate::models::quiz::{Quiz, QuizAttempt};

#[derive(Debug, Clone, Default)]
struct Tables {
    courses: HashMap<String, Course>,
    lessons: HashMap<String, Lesson>,
    enrollments: HashMap<String, Enrollment>,
    /// keyed by (user_id, lesson_id)
    progress: HashMap<(String, String), LessonProgress>,
    users: HashMap<String, UserPoints>,
    quizzes: HashMap<String, Quiz>,
    attempts: Vec<QuizAttempt>,
}

/// Catalog rows owned by course authoring and identity
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSeed {
    pub courses: Vec<Course>,
    pub lessons: Vec<Lesson>,
    pub users: Vec<UserPoints>,
    pub quizzes: Vec<Quiz>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    conflict_next_attempt: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail with a backend error (rollback testing)
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Simulates a concurrent writer on the next quiz attempt insert: a row
    /// with the same attempt number is committed behind the transaction's
    /// back and the insert fails with [`StoreError::Conflict`].
    pub fn conflict_next_attempt_insert(&self) {
        self.conflict_next_attempt.store(true, Ordering::SeqCst);
    }

    pub async fn load_seed(&self, seed: CatalogSeed) {
        let mut tables = self.tables.lock().await;
        for course in seed.courses {
            tables.courses.insert(course.id.clone(), course);
        }
        for lesson in seed.lessons {
            tables.lessons.insert(lesson.id.clone(), lesson);
        }
        for user in seed.users {
            tables.users.insert(user.user_id.clone(), user);
        }
        for quiz in seed.quizzes {
            tables.quizzes.insert(quiz.id.clone(), quiz);
        }
    }

    pub async fn load_seed_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: CatalogSeed = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid seed file {}", path.display()))?;
        tracing::info!(
            "Seeded memory store from {}: {} courses, {} lessons, {} users, {} quizzes",
            path.display(),
            seed.courses.len(),
            seed.lessons.len(),
            seed.users.len(),
            seed.quizzes.len()
        );
        self.load_seed(seed).await;
        Ok(())
    }

    // Catalog seeding. Course authoring lives outside this service, so these
    // bypass transactions.

    pub async fn insert_course(&self, course: Course) {
        let mut tables = self.tables.lock().await;
        tables.courses.insert(course.id.clone(), course);
    }

    pub async fn insert_lesson(&self, lesson: Lesson) {
        let mut tables = self.tables.lock().await;
        tables.lessons.insert(lesson.id.clone(), lesson);
    }

    pub async fn remove_lesson(&self, lesson_id: &str) {
        let mut tables = self.tables.lock().await;
        tables.lessons.remove(lesson_id);
    }

    pub async fn insert_user(&self, user: UserPoints) {
        let mut tables = self.tables.lock().await;
        tables.users.insert(user.user_id.clone(), user);
    }

    pub async fn insert_quiz(&self, quiz: Quiz) {
        let mut tables = self.tables.lock().await;
        tables.quizzes.insert(quiz.id.clone(), quiz);
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_commit: bool,
    conflict_next_attempt: Arc<AtomicBool>,
}

impl MemoryTx {
    fn in_course(&self, lesson_id: &str, course_id: &str) -> bool {
        self.working
            .lessons
            .get(lesson_id)
            .is_some_and(|lesson| lesson.course_id == course_id)
    }
}

#[async_trait]
impl LearningStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
            conflict_next_attempt: self.conflict_next_attempt.clone(),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn get_course(&mut self, course_id: &str) -> StoreResult<Option<Course>> {
        Ok(self.working.courses.get(course_id).cloned())
    }

    async fn get_lesson(&mut self, lesson_id: &str) -> StoreResult<Option<Lesson>> {
        Ok(self.working.lessons.get(lesson_id).cloned())
    }

    async fn count_lessons(&mut self, course_id: &str) -> StoreResult<u32> {
        Ok(self
            .working
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .count() as u32)
    }

    async fn get_enrollment(&mut self, enrollment_id: &str) -> StoreResult<Option<Enrollment>> {
        Ok(self.working.enrollments.get(enrollment_id).cloned())
    }

    async fn find_enrollment(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .working
            .enrollments
            .values()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        let duplicate = self.working.enrollments.contains_key(&enrollment.id)
            || self
                .working
                .enrollments
                .values()
                .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "enrollment for user {} in course {} already exists",
                enrollment.user_id, enrollment.course_id
            )));
        }
        self.working
            .enrollments
            .insert(enrollment.id.clone(), enrollment.clone());
        Ok(())
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        match self.working.enrollments.get_mut(&enrollment.id) {
            Some(existing) => {
                *existing = enrollment.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "enrollment {} vanished during update",
                enrollment.id
            ))),
        }
    }

    async fn get_lesson_progress(
        &mut self,
        user_id: &str,
        lesson_id: &str,
    ) -> StoreResult<Option<LessonProgress>> {
        Ok(self
            .working
            .progress
            .get(&(user_id.to_string(), lesson_id.to_string()))
            .cloned())
    }

    async fn upsert_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()> {
        self.working.progress.insert(
            (progress.user_id.clone(), progress.lesson_id.clone()),
            progress.clone(),
        );
        Ok(())
    }

    async fn count_completed_lessons(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<u32> {
        Ok(self
            .working
            .progress
            .values()
            .filter(|p| {
                p.user_id == user_id && p.is_completed && self.in_course(&p.lesson_id, course_id)
            })
            .count() as u32)
    }

    async fn list_lesson_progress(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Vec<LessonProgress>> {
        let mut rows: Vec<LessonProgress> = self
            .working
            .progress
            .values()
            .filter(|p| p.user_id == user_id && self.in_course(&p.lesson_id, course_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.lesson_id.cmp(&b.lesson_id));
        Ok(rows)
    }

    async fn get_user_points(&mut self, user_id: &str) -> StoreResult<Option<UserPoints>> {
        Ok(self.working.users.get(user_id).cloned())
    }

    async fn increment_points(
        &mut self,
        user_id: &str,
        amount: u64,
    ) -> StoreResult<Option<UserPoints>> {
        Ok(self.working.users.get_mut(user_id).map(|user| {
            let before = user.clone();
            user.total_points = user.total_points.saturating_add(amount);
            before
        }))
    }

    async fn set_badge(&mut self, user_id: &str, badge: Badge) -> StoreResult<()> {
        match self.working.users.get_mut(user_id) {
            Some(user) => {
                user.current_badge = badge;
                Ok(())
            }
            None => Err(StoreError::Backend(format!("user {} vanished", user_id))),
        }
    }

    async fn get_quiz(&mut self, quiz_id: &str) -> StoreResult<Option<Quiz>> {
        Ok(self.working.quizzes.get(quiz_id).cloned())
    }

    async fn count_quiz_attempts(&mut self, user_id: &str, quiz_id: &str) -> StoreResult<u32> {
        Ok(self
            .working
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.quiz_id == quiz_id)
            .count() as u32)
    }

    async fn insert_quiz_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        if self.conflict_next_attempt.swap(false, Ordering::SeqCst) {
            let competing = QuizAttempt {
                id: format!("{}-competing", attempt.id),
                ..attempt.clone()
            };
            self.guard.attempts.push(competing.clone());
            self.working.attempts.push(competing);
        }

        let taken = self.working.attempts.iter().any(|a| {
            a.user_id == attempt.user_id
                && a.quiz_id == attempt.quiz_id
                && a.attempt_number == attempt.attempt_number
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "attempt {} for user {} on quiz {} already recorded",
                attempt.attempt_number, attempt.user_id, attempt.quiz_id
            )));
        }
        self.working.attempts.push(attempt.clone());
        Ok(())
    }

    async fn list_quiz_attempts(
        &mut self,
        user_id: &str,
        quiz_id: &str,
    ) -> StoreResult<Vec<QuizAttempt>> {
        let mut rows: Vec<QuizAttempt> = self
            .working
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.quiz_id == quiz_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.attempt_number);
        Ok(rows)
    }

    async fn commit(self) -> StoreResult<()> {
        if self.fail_commit {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }
        let MemoryTx {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        store.insert_user(UserPoints::new("u1")).await;

        let mut tx = store.begin().await.unwrap();
        tx.increment_points("u1", 50).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        let user = tx.get_user_points("u1").await.unwrap().unwrap();
        assert_eq!(user.total_points, 0);
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let store = MemoryStore::new();
        store.insert_user(UserPoints::new("u1")).await;

        let mut tx = store.begin().await.unwrap();
        let before = tx.increment_points("u1", 50).await.unwrap().unwrap();
        assert_eq!(before.total_points, 0);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let user = tx.get_user_points("u1").await.unwrap().unwrap();
        assert_eq!(user.total_points, 50);
    }

    #[tokio::test]
    async fn injected_failure_rolls_back() {
        let store = MemoryStore::new();
        store.insert_user(UserPoints::new("u1")).await;
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.increment_points("u1", 50).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Backend(_))));

        let mut tx = store.begin().await.unwrap();
        let user = tx.get_user_points("u1").await.unwrap().unwrap();
        assert_eq!(user.total_points, 0);
    }

    fn attempt(number: u32) -> QuizAttempt {
        QuizAttempt {
            id: format!("attempt-{}", number),
            quiz_id: "q1".to_string(),
            enrollment_id: "e1".to_string(),
            user_id: "u1".to_string(),
            attempt_number: number,
            selected_answers: Default::default(),
            correct_count: 0,
            total_questions: 0,
            score_percentage: 0,
            points_earned: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_attempt_number_conflicts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_quiz_attempt(&attempt(1)).await.unwrap();
        assert!(matches!(
            tx.insert_quiz_attempt(&attempt(1)).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn injected_conflict_leaves_competing_row() {
        let store = MemoryStore::new();
        store.conflict_next_attempt_insert();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_quiz_attempt(&attempt(1)).await,
            Err(StoreError::Conflict(_))
        ));
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_quiz_attempts("u1", "q1").await.unwrap(), 1);
        tx.insert_quiz_attempt(&attempt(2)).await.unwrap();
    }

    #[tokio::test]
    async fn seed_file_populates_catalog() {
        let seed: CatalogSeed = serde_json::from_str(
            r#"{
                "courses": [{ "id": "c1", "title": "Course" }],
                "lessons": [
                    { "id": "l1", "course_id": "c1", "title": "One", "position": 1 },
                    { "id": "l2", "course_id": "c1", "title": "Two" }
                ],
                "users": [{ "id": "u1", "total_points": 45 }]
            }"#,
        )
        .unwrap();
        assert!(seed.quizzes.is_empty());

        let store = MemoryStore::new();
        store.load_seed(seed).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_course("c1").await.unwrap().is_some());
        assert_eq!(tx.count_lessons("c1").await.unwrap(), 2);
        let user = tx.get_user_points("u1").await.unwrap().unwrap();
        assert_eq!(user.total_points, 45);
    }

    #[tokio::test]
    async fn missing_seed_file_is_an_error() {
        let store = MemoryStore::new();
        assert!(store.load_seed_file("does/not/exist.json").await.is_err());
    }

    #[tokio::test]
    async fn progress_follows_current_lesson_set() {
        let store = MemoryStore::new();
        for id in ["l1", "l2"] {
            store
                .insert_lesson(Lesson {
                    id: id.to_string(),
                    course_id: "c1".to_string(),
                    title: id.to_string(),
                    position: 0,
                })
                .await;
        }

        let mut tx = store.begin().await.unwrap();
        for id in ["l1", "l2"] {
            tx.upsert_lesson_progress(&LessonProgress::completed(
                "u1",
                id,
                "c1",
                chrono::Utc::now(),
            ))
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        // l2 moved to another course by authoring
        store
            .insert_lesson(Lesson {
                id: "l2".to_string(),
                course_id: "c2".to_string(),
                title: "l2".to_string(),
                position: 0,
            })
            .await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_completed_lessons("u1", "c1").await.unwrap(), 1);
        let rows = tx.list_lesson_progress("u1", "c1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lesson_id, "l1");
    }

    #[tokio::test]
    async fn increment_unknown_user_returns_none() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.increment_points("ghost", 5).await.unwrap().is_none());
    }
}
