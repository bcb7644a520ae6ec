use serde::{Deserialize, Serialize};

/// Course catalog entry stored in the "courses" collection.
/// Authored by the course-authoring side of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
}

/// Lesson stored in the "lessons" collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub course_id: String,
    pub title: String,
    /// Ordering inside the course (1-based)
    #[serde(default)]
    pub position: u32,
}
