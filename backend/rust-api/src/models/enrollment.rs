use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rounded_percentage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    YetToStart,
    InProgress,
    Completed,
}

impl EnrollmentStatus {
    /// Status is a pure function of the lesson counts.
    pub fn from_counts(completed_lessons: u32, total_lessons: u32) -> Self {
        if total_lessons == 0 || completed_lessons == 0 {
            EnrollmentStatus::YetToStart
        } else if completed_lessons >= total_lessons {
            EnrollmentStatus::Completed
        } else {
            EnrollmentStatus::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::YetToStart => "yet_to_start",
            EnrollmentStatus::InProgress => "in_progress",
            EnrollmentStatus::Completed => "completed",
        }
    }
}

/// Enrollment stored in the "enrollments" collection, one per (user, course)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub completed_lessons: u32,
    pub total_lessons: u32,
    /// 0..=100, derived from the lesson counts
    pub completion_percentage: u8,
    pub enrolled_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(user_id: &str, course_id: &str, total_lessons: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            status: EnrollmentStatus::YetToStart,
            completed_lessons: 0,
            total_lessons,
            completion_percentage: 0,
            enrolled_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Applies fresh lesson counts and runs the status state machine.
    ///
    /// `started_at` is written once, the first time the enrollment leaves
    /// `yet_to_start`. `completed_at` is written every time the status enters
    /// `completed` from another state. Returns true when anything changed.
    pub fn apply_counts(
        &mut self,
        completed_lessons: u32,
        total_lessons: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let before = self.clone();

        let completed_lessons = completed_lessons.min(total_lessons);
        let status = EnrollmentStatus::from_counts(completed_lessons, total_lessons);

        self.completed_lessons = completed_lessons;
        self.total_lessons = total_lessons;
        self.completion_percentage = rounded_percentage(completed_lessons, total_lessons);

        if status != EnrollmentStatus::YetToStart && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status == EnrollmentStatus::Completed && self.status != EnrollmentStatus::Completed {
            self.completed_at = Some(now);
        }
        self.status = status;

        *self != before
    }
}

/// Per-lesson completion record stored in the "lesson_progress" collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: String,
    pub user_id: String,
    pub lesson_id: String,
    /// Owning course, denormalized for per-course listing
    pub course_id: String,
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    pub fn completed(user_id: &str, lesson_id: &str, course_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            lesson_id: lesson_id.to_string(),
            course_id: course_id.to_string(),
            is_completed: true,
            completed_at: Some(now),
        }
    }

    /// Marks the lesson complete. Completion is monotonic: an already completed
    /// row keeps its original timestamp and false is returned.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(now);
        true
    }
}

/// Result of marking a lesson complete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonCompletion {
    pub progress: LessonProgress,
    pub enrollment: Enrollment,
    /// False when the lesson was already complete (idempotent replay)
    pub newly_completed: bool,
}
