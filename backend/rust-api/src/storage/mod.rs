use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{QuizAttempt, QuizSession, Word};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryRepository;
pub use mongo::MongoRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Carries the entity name, e.g. "Word".
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Word bank persistence. `text` is expected to be normalized by the caller,
/// so uniqueness is an exact match on it.
#[async_trait]
pub trait WordRepository: Send + Sync {
    /// # Errors
    ///
    /// `StorageError::Conflict` if a word with the same text exists.
    async fn insert_word(&self, word: &Word) -> Result<(), StorageError>;

    /// Replaces the stored word with the same id.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` if missing, `StorageError::Conflict` if the
    /// new text collides with another word.
    async fn update_word(&self, word: &Word) -> Result<(), StorageError>;

    async fn get_word(&self, id: &str) -> Result<Word, StorageError>;

    async fn find_by_text(&self, text: &str) -> Result<Option<Word>, StorageError>;

    /// Sorted by text.
    async fn list_words(&self, active_only: bool) -> Result<Vec<Word>, StorageError>;

    /// The active pool minus `exclude`.
    async fn active_words_excluding(&self, exclude: &[String])
        -> Result<Vec<Word>, StorageError>;

    async fn delete_word(&self, id: &str) -> Result<(), StorageError>;

    /// Returns how many of `ids` were deleted; unknown ids are skipped.
    async fn delete_words(&self, ids: &[String]) -> Result<u64, StorageError>;

    /// Best-effort: a missing word is not an error.
    async fn increment_usage(&self, id: &str) -> Result<(), StorageError>;

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
pub trait QuizSessionRepository: Send + Sync {
    /// Atomically writes the whole session row (insert or replace).
    async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError>;

    /// Appends `attempt` and writes `session` as one unit: either both are
    /// stored or neither is.
    async fn save_session_with_attempt(
        &self,
        session: &QuizSession,
        attempt: &QuizAttempt,
    ) -> Result<(), StorageError>;

    async fn get_session(&self, id: &str) -> Result<QuizSession, StorageError>;

    /// Newest first.
    async fn list_sessions(&self) -> Result<Vec<QuizSession>, StorageError>;
}

/// Read side of the append-only attempt log. Attempts are written only
/// through `QuizSessionRepository::save_session_with_attempt`.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// In creation order.
    async fn list_attempts(&self, session_id: &str) -> Result<Vec<QuizAttempt>, StorageError>;
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub words: Arc<dyn WordRepository>,
    pub sessions: Arc<dyn QuizSessionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub backend: &'static str,
}

impl Storage {
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            words: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            attempts: Arc::new(repo),
            backend: "memory",
        }
    }

    pub fn mongo(repo: MongoRepository) -> Self {
        Self {
            words: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            attempts: Arc::new(repo),
            backend: "mongodb",
        }
    }
}
