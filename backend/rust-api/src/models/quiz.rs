use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

use super::rounded_percentage;
use crate::error::EngineError;

/// question id -> selected option ids
pub type SelectedAnswers = BTreeMap<String, BTreeSet<String>>;

/// Points granted per attempt number. Values are independent: no ordering
/// between tiers is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    pub first: u32,
    pub second: u32,
    pub third: u32,
    pub fourth_plus: u32,
}

impl RewardSchedule {
    pub fn points_for_attempt(&self, attempt_number: u32) -> u32 {
        match attempt_number.min(4) {
            0 | 1 => self.first,
            2 => self.second,
            3 => self.third,
            _ => self.fourth_plus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
    pub correct_option_ids: BTreeSet<String>,
}

impl QuizQuestion {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }

    /// Exact set match: no partial credit, extra selections fail.
    pub fn is_answered_correctly(&self, selected: &BTreeSet<String>) -> bool {
        *selected == self.correct_option_ids
    }
}

/// Quiz stored in the "quizzes" collection with its questions embedded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub reward_schedule: RewardSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizGrade {
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percentage: u8,
}

impl Quiz {
    fn question(&self, question_id: &str) -> Option<&QuizQuestion> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Rejects answers referencing questions or options outside this quiz
    pub fn validate_selection(&self, selected: &SelectedAnswers) -> Result<(), EngineError> {
        for (question_id, option_ids) in selected {
            let question = self.question(question_id).ok_or_else(|| {
                EngineError::Validation(format!(
                    "Question {} does not belong to quiz {}",
                    question_id, self.id
                ))
            })?;

            if let Some(unknown) = option_ids.iter().find(|id| !question.has_option(id)) {
                return Err(EngineError::Validation(format!(
                    "Option {} does not belong to question {}",
                    unknown, question_id
                )));
            }
        }
        Ok(())
    }

    /// Grades a selection. Questions missing from `selected` count as
    /// answered with an empty set.
    pub fn grade(&self, selected: &SelectedAnswers) -> Result<QuizGrade, EngineError> {
        self.validate_selection(selected)?;

        let empty = BTreeSet::new();
        let correct_count = self
            .questions
            .iter()
            .filter(|question| {
                let answer = selected.get(&question.id).unwrap_or(&empty);
                question.is_answered_correctly(answer)
            })
            .count() as u32;
        let total_questions = self.questions.len() as u32;

        Ok(QuizGrade {
            correct_count,
            total_questions,
            score_percentage: rounded_percentage(correct_count, total_questions),
        })
    }
}

/// One graded submission, stored in the "quiz_attempts" collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: String,
    pub quiz_id: String,
    pub enrollment_id: String,
    pub user_id: String,
    /// 1-based, unique per (user, quiz)
    pub attempt_number: u32,
    pub selected_answers: SelectedAnswers,
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percentage: u8,
    pub points_earned: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(length(min = 1, message = "enrollment_id is required"))]
    pub enrollment_id: String,
    #[serde(default)]
    pub answers: SelectedAnswers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    pub attempt_id: String,
    pub attempt_number: u32,
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percentage: u8,
    pub points_earned: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award: Option<super::gamification::PointsAward>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn question(id: &str, correct: &[&str]) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            prompt: format!("Question {}", id),
            options: ["a", "b", "c", "d"]
                .iter()
                .map(|o| QuizOption {
                    id: o.to_string(),
                    text: o.to_uppercase(),
                })
                .collect(),
            correct_option_ids: set(correct),
        }
    }

    fn quiz(questions: Vec<QuizQuestion>) -> Quiz {
        Quiz {
            id: "quiz-1".to_string(),
            course_id: "course-1".to_string(),
            title: "Basics".to_string(),
            questions,
            reward_schedule: RewardSchedule {
                first: 10,
                second: 7,
                third: 5,
                fourth_plus: 2,
            },
        }
    }

    #[test]
    fn exact_match_is_required() {
        let q = question("q1", &["b"]);
        assert!(q.is_answered_correctly(&set(&["b"])));
        assert!(!q.is_answered_correctly(&set(&["a", "b"])));
        assert!(!q.is_answered_correctly(&set(&[])));
    }

    #[test]
    fn multi_answer_order_is_irrelevant() {
        let q = question("q1", &["a", "c"]);
        assert!(q.is_answered_correctly(&set(&["c", "a"])));
        assert!(!q.is_answered_correctly(&set(&["a"])));
    }

    #[test]
    fn grade_counts_missing_questions_as_wrong() {
        let quiz = quiz(vec![
            question("q1", &["a"]),
            question("q2", &["b"]),
            question("q3", &["c"]),
        ]);
        let mut selected = SelectedAnswers::new();
        selected.insert("q1".to_string(), set(&["a"]));
        selected.insert("q2".to_string(), set(&["b"]));

        let grade = quiz.grade(&selected).unwrap();
        assert_eq!(grade.correct_count, 2);
        assert_eq!(grade.total_questions, 3);
        assert_eq!(grade.score_percentage, 67);
    }

    #[test]
    fn grade_rejects_unknown_question() {
        let quiz = quiz(vec![question("q1", &["a"])]);
        let mut selected = SelectedAnswers::new();
        selected.insert("q9".to_string(), set(&["a"]));
        assert!(matches!(
            quiz.grade(&selected),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn grade_rejects_unknown_option() {
        let quiz = quiz(vec![question("q1", &["a"])]);
        let mut selected = SelectedAnswers::new();
        selected.insert("q1".to_string(), set(&["a", "z"]));
        assert!(matches!(
            quiz.grade(&selected),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn empty_quiz_scores_zero() {
        let quiz = quiz(vec![]);
        let grade = quiz.grade(&SelectedAnswers::new()).unwrap();
        assert_eq!(grade.total_questions, 0);
        assert_eq!(grade.score_percentage, 0);
    }

    #[test]
    fn reward_lookup_clamps_to_fourth_tier() {
        let schedule = quiz(vec![]).reward_schedule;
        assert_eq!(schedule.points_for_attempt(1), 10);
        assert_eq!(schedule.points_for_attempt(2), 7);
        assert_eq!(schedule.points_for_attempt(3), 5);
        assert_eq!(schedule.points_for_attempt(4), 2);
        assert_eq!(schedule.points_for_attempt(17), 2);
    }

    #[test]
    fn reward_schedule_is_not_required_to_decrease() {
        let schedule = RewardSchedule {
            first: 1,
            second: 5,
            third: 5,
            fourth_plus: 9,
        };
        assert_eq!(schedule.points_for_attempt(2), 5);
        assert_eq!(schedule.points_for_attempt(6), 9);
    }
}
