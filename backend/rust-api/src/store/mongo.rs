//! MongoDB adapter. Each [`MongoTx`] wraps a `ClientSession` running a
//! multi-document transaction (requires a replica set). Uniqueness is
//! enforced by the indexes created in [`MongoStore::ensure_indexes`].

use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::options::{
    Acknowledgment, FindOneAndUpdateOptions, IndexOptions, ReadConcern, ReplaceOptions,
    ReturnDocument, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};

use super::{LearningStore, StoreError, StoreResult, StoreTx};
use crate::metrics::track_store_operation;
use crate::models::course::{Course, Lesson};
use crate::models::enrollment::{Enrollment, LessonProgress};
use crate::models::gamification::{Badge, UserPoints};
use crate::models::quiz::{Quiz, QuizAttempt};

const COURSES: &str = "courses";
const LESSONS: &str = "lessons";
const ENROLLMENTS: &str = "enrollments";
const LESSON_PROGRESS: &str = "lesson_progress";
const USERS: &str = "users";
const QUIZZES: &str = "quizzes";
const QUIZ_ATTEMPTS: &str = "quiz_attempts";

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    /// Creates the unique indexes of the collections this service writes.
    /// Catalog collections (courses, lessons, users, quizzes) belong to course
    /// authoring and identity and are left alone.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        for (collection, keys) in unique_indexes() {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.db
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .with_context(|| format!("Failed to create index on {}", collection))?;
        }

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }
}

fn unique_indexes() -> [(&'static str, Document); 5] {
    [
        (ENROLLMENTS, doc! { "id": 1 }),
        (ENROLLMENTS, doc! { "user_id": 1, "course_id": 1 }),
        (LESSON_PROGRESS, doc! { "user_id": 1, "lesson_id": 1 }),
        (QUIZ_ATTEMPTS, doc! { "id": 1 }),
        (
            QUIZ_ATTEMPTS,
            doc! { "user_id": 1, "quiz_id": 1, "attempt_number": 1 },
        ),
    ]
}

#[async_trait]
impl LearningStore for MongoStore {
    type Tx = MongoTx;

    async fn begin(&self) -> StoreResult<MongoTx> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(map_mongo_error)?;
        session
            .start_transaction()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .await
            .map_err(map_mongo_error)?;

        Ok(MongoTx {
            session,
            db: self.db.clone(),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(map_mongo_error)
    }
}

pub struct MongoTx {
    session: ClientSession,
    db: Database,
}

impl MongoTx {
    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    async fn find_one<T>(&mut self, name: &str, filter: Document) -> StoreResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + Sync,
    {
        let collection = self.collection::<T>(name);
        let session = &mut self.session;
        track_store_operation("find_one", name, async move {
            collection.find_one(filter).session(session).await
        })
        .await
        .map_err(map_mongo_error)
    }

    async fn find_many<T>(
        &mut self,
        name: &str,
        filter: Document,
        sort: Document,
    ) -> StoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        let collection = self.collection::<T>(name);
        let session = &mut self.session;
        track_store_operation("find", name, async move {
            let mut cursor = collection.find(filter).sort(sort).session(&mut *session).await?;
            let rows: Vec<T> = cursor.stream(session).try_collect().await?;
            Ok::<_, mongodb::error::Error>(rows)
        })
        .await
        .map_err(map_mongo_error)
    }

    /// Ids of the lessons currently attached to a course
    async fn course_lesson_ids(&mut self, course_id: &str) -> StoreResult<Vec<String>> {
        let collection = self.collection::<Document>(LESSONS);
        let session = &mut self.session;
        let ids = track_store_operation("distinct", LESSONS, async move {
            collection
                .distinct("id", doc! { "course_id": course_id })
                .session(session)
                .await
        })
        .await
        .map_err(map_mongo_error)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }

    async fn count(&mut self, name: &str, filter: Document) -> StoreResult<u32> {
        let collection = self.collection::<Document>(name);
        let session = &mut self.session;
        let count = track_store_operation("count", name, async move {
            collection.count_documents(filter).session(session).await
        })
        .await
        .map_err(map_mongo_error)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert<T>(&mut self, name: &str, value: &T) -> StoreResult<()>
    where
        T: serde::Serialize + Send + Sync,
    {
        let collection = self.collection::<T>(name);
        let session = &mut self.session;
        track_store_operation("insert_one", name, async move {
            collection.insert_one(value).session(session).await
        })
        .await
        .map(|_| ())
        .map_err(map_mongo_error)
    }

    /// Replaces the document matching `filter`; returns the matched count
    async fn replace<T>(
        &mut self,
        name: &str,
        filter: Document,
        value: &T,
        upsert: bool,
    ) -> StoreResult<u64>
    where
        T: serde::Serialize + Send + Sync,
    {
        let collection = self.collection::<T>(name);
        let session = &mut self.session;
        let result = track_store_operation("replace_one", name, async move {
            collection
                .replace_one(filter, value)
                .with_options(ReplaceOptions::builder().upsert(upsert).build())
                .session(session)
                .await
        })
        .await
        .map_err(map_mongo_error)?;
        Ok(result.matched_count + u64::from(result.upserted_id.is_some()))
    }
}

#[async_trait]
impl StoreTx for MongoTx {
    async fn get_course(&mut self, course_id: &str) -> StoreResult<Option<Course>> {
        self.find_one(COURSES, doc! { "id": course_id }).await
    }

    async fn get_lesson(&mut self, lesson_id: &str) -> StoreResult<Option<Lesson>> {
        self.find_one(LESSONS, doc! { "id": lesson_id }).await
    }

    async fn count_lessons(&mut self, course_id: &str) -> StoreResult<u32> {
        self.count(LESSONS, doc! { "course_id": course_id }).await
    }

    async fn get_enrollment(&mut self, enrollment_id: &str) -> StoreResult<Option<Enrollment>> {
        self.find_one(ENROLLMENTS, doc! { "id": enrollment_id }).await
    }

    async fn find_enrollment(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Enrollment>> {
        self.find_one(
            ENROLLMENTS,
            doc! { "user_id": user_id, "course_id": course_id },
        )
        .await
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        self.insert(ENROLLMENTS, enrollment).await
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        let matched = self
            .replace(ENROLLMENTS, doc! { "id": enrollment.id.as_str() }, enrollment, false)
            .await?;
        if matched == 0 {
            return Err(StoreError::Backend(format!(
                "enrollment {} vanished during update",
                enrollment.id
            )));
        }
        Ok(())
    }

    async fn get_lesson_progress(
        &mut self,
        user_id: &str,
        lesson_id: &str,
    ) -> StoreResult<Option<LessonProgress>> {
        self.find_one(
            LESSON_PROGRESS,
            doc! { "user_id": user_id, "lesson_id": lesson_id },
        )
        .await
    }

    async fn upsert_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()> {
        self.replace(
            LESSON_PROGRESS,
            doc! { "user_id": progress.user_id.as_str(), "lesson_id": progress.lesson_id.as_str() },
            progress,
            true,
        )
        .await
        .map(|_| ())
    }

    async fn count_completed_lessons(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<u32> {
        let lesson_ids = self.course_lesson_ids(course_id).await?;
        self.count(
            LESSON_PROGRESS,
            doc! {
                "user_id": user_id,
                "lesson_id": { "$in": lesson_ids },
                "is_completed": true,
            },
        )
        .await
    }

    async fn list_lesson_progress(
        &mut self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Vec<LessonProgress>> {
        let lesson_ids = self.course_lesson_ids(course_id).await?;
        self.find_many(
            LESSON_PROGRESS,
            doc! { "user_id": user_id, "lesson_id": { "$in": lesson_ids } },
            doc! { "lesson_id": 1 },
        )
        .await
    }

    async fn get_user_points(&mut self, user_id: &str) -> StoreResult<Option<UserPoints>> {
        self.find_one(USERS, doc! { "id": user_id }).await
    }

    async fn increment_points(
        &mut self,
        user_id: &str,
        amount: u64,
    ) -> StoreResult<Option<UserPoints>> {
        let amount = i64::try_from(amount)
            .map_err(|_| StoreError::Backend(format!("point amount {} overflows", amount)))?;
        let collection = self.collection::<UserPoints>(USERS);
        let session = &mut self.session;
        track_store_operation("find_one_and_update", USERS, async move {
            collection
                .find_one_and_update(
                    doc! { "id": user_id },
                    doc! { "$inc": { "total_points": amount } },
                )
                .with_options(
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::Before)
                        .build(),
                )
                .session(session)
                .await
        })
        .await
        .map_err(map_mongo_error)
    }

    async fn set_badge(&mut self, user_id: &str, badge: Badge) -> StoreResult<()> {
        let collection = self.collection::<Document>(USERS);
        let session = &mut self.session;
        track_store_operation("update_one", USERS, async move {
            collection
                .update_one(
                    doc! { "id": user_id },
                    doc! { "$set": { "current_badge": badge.as_str() } },
                )
                .session(session)
                .await
        })
        .await
        .map(|_| ())
        .map_err(map_mongo_error)
    }

    async fn get_quiz(&mut self, quiz_id: &str) -> StoreResult<Option<Quiz>> {
        self.find_one(QUIZZES, doc! { "id": quiz_id }).await
    }

    async fn count_quiz_attempts(&mut self, user_id: &str, quiz_id: &str) -> StoreResult<u32> {
        self.count(
            QUIZ_ATTEMPTS,
            doc! { "user_id": user_id, "quiz_id": quiz_id },
        )
        .await
    }

    async fn insert_quiz_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.insert(QUIZ_ATTEMPTS, attempt).await
    }

    async fn list_quiz_attempts(
        &mut self,
        user_id: &str,
        quiz_id: &str,
    ) -> StoreResult<Vec<QuizAttempt>> {
        self.find_many(
            QUIZ_ATTEMPTS,
            doc! { "user_id": user_id, "quiz_id": quiz_id },
            doc! { "attempt_number": 1 },
        )
        .await
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.session
            .commit_transaction()
            .await
            .map_err(map_mongo_error)
    }

    async fn rollback(mut self) -> StoreResult<()> {
        self.session
            .abort_transaction()
            .await
            .map_err(map_mongo_error)
    }
}

/// Duplicate keys and transient transaction errors are replayable conflicts
fn map_mongo_error(err: mongodb::error::Error) -> StoreError {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        return StoreError::Conflict(err.to_string());
    }

    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY => {
            StoreError::Conflict(err.to_string())
        }
        ErrorKind::Command(ref ce) if ce.code == DUPLICATE_KEY || ce.code == WRITE_CONFLICT => {
            StoreError::Conflict(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_only_owned_collections() {
        let collections: Vec<&str> = unique_indexes().iter().map(|(name, _)| *name).collect();
        for catalog in [COURSES, LESSONS, USERS, QUIZZES] {
            assert!(!collections.contains(&catalog), "{} is indexed", catalog);
        }
        assert!(unique_indexes().iter().any(|(name, keys)| *name == QUIZ_ATTEMPTS
            && keys.contains_key("attempt_number")));
    }
}
