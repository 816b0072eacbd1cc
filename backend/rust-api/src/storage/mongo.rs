use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{AttemptRepository, QuizSessionRepository, StorageError, WordRepository};
use crate::metrics::track_db_operation;
use crate::models::{Difficulty, QuizAttempt, QuizSession, QuizStatus, Word};

const WORDS: &str = "words";
const SESSIONS: &str = "quiz_sessions";
const ATTEMPTS: &str = "quiz_attempts";

/// MongoDB-backed repositories. Ids are UUID strings stored in `_id`.
#[derive(Clone)]
pub struct MongoRepository {
    client: Client,
    db: Database,
}

impl MongoRepository {
    pub fn new(client: Client, database: &str) -> Self {
        Self {
            db: client.database(database),
            client,
        }
    }

    /// Unique text index for the word bank, lookup indexes for the rest.
    pub async fn ensure_indexes(&self) -> Result<(), StorageError> {
        self.words()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "text": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(map_mongo_error)?;

        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "session_id": 1, "attempt_number": 1 })
                    .build(),
            )
            .await
            .map_err(map_mongo_error)?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn words(&self) -> Collection<WordDocument> {
        self.db.collection(WORDS)
    }

    fn sessions(&self) -> Collection<SessionDocument> {
        self.db.collection(SESSIONS)
    }

    fn attempts(&self) -> Collection<AttemptDocument> {
        self.db.collection(ATTEMPTS)
    }

    async fn find_words(&self, filter: Document) -> Result<Vec<Word>, StorageError> {
        let cursor = self
            .words()
            .find(filter)
            .sort(doc! { "text": 1 })
            .await
            .map_err(map_mongo_error)?;
        collect(cursor).await
    }
}

impl MongoRepository {
    async fn write_answer(
        &self,
        tx: &mut ClientSession,
        session: &QuizSession,
        attempt: &QuizAttempt,
    ) -> mongodb::error::Result<()> {
        self.attempts()
            .insert_one(AttemptDocument::from(attempt))
            .session(&mut *tx)
            .await?;
        self.sessions()
            .replace_one(doc! { "_id": session.id.as_str() }, SessionDocument::from(session))
            .upsert(true)
            .session(&mut *tx)
            .await?;
        Ok(())
    }
}

async fn collect<D, T>(cursor: mongodb::Cursor<D>) -> Result<Vec<T>, StorageError>
where
    D: DeserializeOwned + Unpin + Send + Sync + Into<T>,
{
    let documents: Vec<D> = cursor.try_collect().await.map_err(map_mongo_error)?;
    Ok(documents.into_iter().map(Into::into).collect())
}

fn map_mongo_error(err: mongodb::error::Error) -> StorageError {
    if is_duplicate_key(&err) {
        return StorageError::Conflict("Word with the same text already exists".to_string());
    }
    match err.kind.as_ref() {
        ErrorKind::BsonDeserialization(e) => StorageError::Serialization(e.to_string()),
        ErrorKind::BsonSerialization(e) => StorageError::Serialization(e.to_string()),
        _ => StorageError::Connection(err.to_string()),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000
    )
}

#[async_trait]
impl WordRepository for MongoRepository {
    async fn insert_word(&self, word: &Word) -> Result<(), StorageError> {
        track_db_operation("insert", WORDS, async {
            self.words()
                .insert_one(WordDocument::from(word))
                .await
                .map_err(map_mongo_error)
        })
        .await?;
        Ok(())
    }

    async fn update_word(&self, word: &Word) -> Result<(), StorageError> {
        let result = track_db_operation("replace", WORDS, async {
            self.words()
                .replace_one(doc! { "_id": word.id.as_str() }, WordDocument::from(word))
                .await
                .map_err(map_mongo_error)
        })
        .await?;

        if result.matched_count == 0 {
            return Err(StorageError::NotFound("Word".to_string()));
        }
        Ok(())
    }

    async fn get_word(&self, id: &str) -> Result<Word, StorageError> {
        track_db_operation("find_one", WORDS, async {
            self.words()
                .find_one(doc! { "_id": id })
                .await
                .map_err(map_mongo_error)?
                .map(Word::from)
                .ok_or_else(|| StorageError::NotFound("Word".to_string()))
        })
        .await
    }

    async fn find_by_text(&self, text: &str) -> Result<Option<Word>, StorageError> {
        track_db_operation("find_one", WORDS, async {
            self.words()
                .find_one(doc! { "text": text })
                .await
                .map(|found| found.map(Word::from))
                .map_err(map_mongo_error)
        })
        .await
    }

    async fn list_words(&self, active_only: bool) -> Result<Vec<Word>, StorageError> {
        let filter = if active_only {
            doc! { "is_active": true }
        } else {
            doc! {}
        };
        track_db_operation("find", WORDS, self.find_words(filter)).await
    }

    async fn active_words_excluding(
        &self,
        exclude: &[String],
    ) -> Result<Vec<Word>, StorageError> {
        let filter = doc! {
            "is_active": true,
            "_id": { "$nin": exclude.to_vec() },
        };
        track_db_operation("find", WORDS, self.find_words(filter)).await
    }

    async fn delete_word(&self, id: &str) -> Result<(), StorageError> {
        let result = track_db_operation("delete", WORDS, async {
            self.words()
                .delete_one(doc! { "_id": id })
                .await
                .map_err(map_mongo_error)
        })
        .await?;

        if result.deleted_count == 0 {
            return Err(StorageError::NotFound("Word".to_string()));
        }
        Ok(())
    }

    async fn delete_words(&self, ids: &[String]) -> Result<u64, StorageError> {
        let result = track_db_operation("delete_many", WORDS, async {
            self.words()
                .delete_many(doc! { "_id": { "$in": ids.to_vec() } })
                .await
                .map_err(map_mongo_error)
        })
        .await?;
        Ok(result.deleted_count)
    }

    async fn increment_usage(&self, id: &str) -> Result<(), StorageError> {
        track_db_operation("update", WORDS, async {
            self.words()
                .update_one(doc! { "_id": id }, doc! { "$inc": { "usage_count": 1_i64 } })
                .await
                .map_err(map_mongo_error)
        })
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(map_mongo_error)
    }
}

#[async_trait]
impl QuizSessionRepository for MongoRepository {
    async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError> {
        track_db_operation("upsert", SESSIONS, async {
            self.sessions()
                .replace_one(doc! { "_id": session.id.as_str() }, SessionDocument::from(session))
                .upsert(true)
                .await
                .map_err(map_mongo_error)
        })
        .await?;
        Ok(())
    }

    /// Runs both writes in one multi-document transaction, which needs a
    /// replica set or sharded deployment.
    async fn save_session_with_attempt(
        &self,
        session: &QuizSession,
        attempt: &QuizAttempt,
    ) -> Result<(), StorageError> {
        track_db_operation("transaction", SESSIONS, async {
            let mut tx = self.client.start_session().await.map_err(map_mongo_error)?;
            tx.start_transaction().await.map_err(map_mongo_error)?;

            match self.write_answer(&mut tx, session, attempt).await {
                Ok(()) => tx.commit_transaction().await.map_err(map_mongo_error),
                Err(e) => {
                    if let Err(abort) = tx.abort_transaction().await {
                        tracing::warn!("Failed to abort transaction for session {}: {}", session.id, abort);
                    }
                    Err(map_mongo_error(e))
                }
            }
        })
        .await
    }

    async fn get_session(&self, id: &str) -> Result<QuizSession, StorageError> {
        track_db_operation("find_one", SESSIONS, async {
            self.sessions()
                .find_one(doc! { "_id": id })
                .await
                .map_err(map_mongo_error)?
                .map(QuizSession::from)
                .ok_or_else(|| StorageError::NotFound("Session".to_string()))
        })
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<QuizSession>, StorageError> {
        track_db_operation("find", SESSIONS, async {
            let cursor = self
                .sessions()
                .find(doc! {})
                .sort(doc! { "created_at": -1 })
                .await
                .map_err(map_mongo_error)?;
            collect(cursor).await
        })
        .await
    }
}

#[async_trait]
impl AttemptRepository for MongoRepository {
    async fn list_attempts(&self, session_id: &str) -> Result<Vec<QuizAttempt>, StorageError> {
        track_db_operation("find", ATTEMPTS, async {
            let cursor = self
                .attempts()
                .find(doc! { "session_id": session_id })
                .sort(doc! { "attempt_number": 1 })
                .await
                .map_err(map_mongo_error)?;
            collect(cursor).await
        })
        .await
    }
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bson::DateTime::from_millis(date.timestamp_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}

mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        date.map(|d| bson::DateTime::from_millis(d.timestamp_millis()))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(bson_dt.and_then(|dt| DateTime::from_timestamp_millis(dt.timestamp_millis())))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WordDocument {
    #[serde(rename = "_id")]
    id: String,
    text: String,
    clues: Vec<String>,
    difficulty: Difficulty,
    usage_count: i64,
    is_active: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    updated_at: DateTime<Utc>,
}

impl From<&Word> for WordDocument {
    fn from(word: &Word) -> Self {
        WordDocument {
            id: word.id.clone(),
            text: word.text.clone(),
            clues: word.clues.clone(),
            difficulty: word.difficulty,
            usage_count: word.usage_count as i64,
            is_active: word.is_active,
            created_at: word.created_at,
            updated_at: word.updated_at,
        }
    }
}

impl From<WordDocument> for Word {
    fn from(doc: WordDocument) -> Self {
        Word {
            id: doc.id,
            text: doc.text,
            clues: doc.clues,
            difficulty: doc.difficulty,
            usage_count: doc.usage_count.max(0) as u64,
            is_active: doc.is_active,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    status: QuizStatus,
    current_word_id: Option<String>,
    current_word_index: i64,
    used_word_ids: Vec<String>,
    total_words: i64,
    correct_answers: i64,
    total_attempts: i64,
    time_limit_seconds: Option<i64>,
    #[serde(with = "bson_datetime_as_chrono")]
    created_at: DateTime<Utc>,
    #[serde(default, with = "bson_datetime_as_chrono_option")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "bson_datetime_as_chrono_option")]
    ended_at: Option<DateTime<Utc>>,
}

impl From<&QuizSession> for SessionDocument {
    fn from(s: &QuizSession) -> Self {
        SessionDocument {
            id: s.id.clone(),
            name: s.name.clone(),
            status: s.status,
            current_word_id: s.current_word_id.clone(),
            current_word_index: i64::from(s.current_word_index),
            used_word_ids: s.used_word_ids.clone(),
            total_words: i64::from(s.total_words),
            correct_answers: i64::from(s.correct_answers),
            total_attempts: i64::from(s.total_attempts),
            time_limit_seconds: s.time_limit_seconds.map(i64::from),
            created_at: s.created_at,
            started_at: s.started_at,
            ended_at: s.ended_at,
        }
    }
}

impl From<SessionDocument> for QuizSession {
    fn from(d: SessionDocument) -> Self {
        QuizSession {
            id: d.id,
            name: d.name,
            status: d.status,
            current_word_id: d.current_word_id,
            current_word_index: d.current_word_index as u32,
            used_word_ids: d.used_word_ids,
            total_words: d.total_words as u32,
            correct_answers: d.correct_answers as u32,
            total_attempts: d.total_attempts as u32,
            time_limit_seconds: d.time_limit_seconds.map(|v| v as u32),
            created_at: d.created_at,
            started_at: d.started_at,
            ended_at: d.ended_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AttemptDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    word_id: String,
    contestant_name: String,
    answer: String,
    is_correct: bool,
    attempt_number: i64,
    elapsed_seconds: Option<f64>,
    #[serde(with = "bson_datetime_as_chrono")]
    created_at: DateTime<Utc>,
}

impl From<&QuizAttempt> for AttemptDocument {
    fn from(a: &QuizAttempt) -> Self {
        AttemptDocument {
            id: a.id.clone(),
            session_id: a.session_id.clone(),
            word_id: a.word_id.clone(),
            contestant_name: a.contestant_name.clone(),
            answer: a.answer.clone(),
            is_correct: a.is_correct,
            attempt_number: i64::from(a.attempt_number),
            elapsed_seconds: a.elapsed_seconds,
            created_at: a.created_at,
        }
    }
}

impl From<AttemptDocument> for QuizAttempt {
    fn from(d: AttemptDocument) -> Self {
        QuizAttempt {
            id: d.id,
            session_id: d.session_id,
            word_id: d.word_id,
            contestant_name: d.contestant_name,
            answer: d.answer,
            is_correct: d.is_correct,
            attempt_number: d.attempt_number as u32,
            elapsed_seconds: d.elapsed_seconds,
            created_at: d.created_at,
        }
    }
}
