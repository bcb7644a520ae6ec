//! Seed data shared by the engine unit tests.

use std::collections::BTreeSet;

use crate::models::course::{Course, Lesson};
use crate::models::gamification::UserPoints;
use crate::models::quiz::{Quiz, QuizOption, QuizQuestion, RewardSchedule, SelectedAnswers};
use crate::store::MemoryStore;

pub const USER_ID: &str = "user-1";
pub const OTHER_USER_ID: &str = "user-2";
pub const COURSE_ID: &str = "course-1";
pub const OTHER_COURSE_ID: &str = "course-2";
pub const EMPTY_COURSE_ID: &str = "course-empty";
pub const QUIZ_ID: &str = "quiz-1";
pub const OTHER_COURSE_QUIZ_ID: &str = "quiz-2";

/// Correct option per question of `QUIZ_ID`; q5 needs both options.
const ANSWER_KEY: [(&str, &[&str]); 5] = [
    ("q1", &["a"]),
    ("q2", &["b"]),
    ("q3", &["c"]),
    ("q4", &["d"]),
    ("q5", &["a", "b"]),
];

fn option_set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn quiz(id: &str, course_id: &str) -> Quiz {
    Quiz {
        id: id.to_string(),
        course_id: course_id.to_string(),
        title: format!("Quiz {}", id),
        questions: ANSWER_KEY
            .iter()
            .map(|(question_id, correct)| QuizQuestion {
                id: question_id.to_string(),
                prompt: format!("Prompt for {}", question_id),
                options: ["a", "b", "c", "d"]
                    .iter()
                    .map(|option| QuizOption {
                        id: option.to_string(),
                        text: option.to_uppercase(),
                    })
                    .collect(),
                correct_option_ids: option_set(correct),
            })
            .collect(),
        reward_schedule: RewardSchedule {
            first: 10,
            second: 7,
            third: 5,
            fourth_plus: 2,
        },
    }
}

/// course-1 with four lessons, course-2 with one, an empty course, two users
/// and a five-question quiz per populated course.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();

    for (course_id, lessons) in [(COURSE_ID, 4), (OTHER_COURSE_ID, 1), (EMPTY_COURSE_ID, 0)] {
        store
            .insert_course(Course {
                id: course_id.to_string(),
                title: format!("Course {}", course_id),
            })
            .await;
        for position in 1..=lessons {
            let id = if course_id == COURSE_ID {
                format!("lesson-{}", position)
            } else {
                format!("{}-lesson-{}", course_id, position)
            };
            store
                .insert_lesson(Lesson {
                    id,
                    course_id: course_id.to_string(),
                    title: format!("Lesson {}", position),
                    position,
                })
                .await;
        }
    }

    store.insert_user(UserPoints::new(USER_ID)).await;
    store.insert_user(UserPoints::new(OTHER_USER_ID)).await;
    store.insert_quiz(quiz(QUIZ_ID, COURSE_ID)).await;
    store
        .insert_quiz(quiz(OTHER_COURSE_QUIZ_ID, OTHER_COURSE_ID))
        .await;

    store
}

/// Answers to `QUIZ_ID` with exactly the first `correct` questions right and
/// the remaining ones answered with a wrong option.
pub fn answers_with_correct(correct: usize) -> SelectedAnswers {
    ANSWER_KEY
        .iter()
        .enumerate()
        .map(|(index, (question_id, right))| {
            let selected = if index < correct {
                option_set(right)
            } else {
                option_set(&["c", "d"])
            };
            (question_id.to_string(), selected)
        })
        .collect()
}
