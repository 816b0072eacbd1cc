use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AttemptRepository, QuizSessionRepository, StorageError, WordRepository};
use crate::models::{QuizAttempt, QuizSession, Word};

/// Process-local store used by tests and `APP_STORAGE=memory`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    words: Arc<Mutex<HashMap<String, Word>>>,
    sessions: Arc<Mutex<HashMap<String, QuizSession>>>,
    attempts: Arc<Mutex<Vec<QuizAttempt>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

fn text_taken(words: &HashMap<String, Word>, text: &str, except_id: &str) -> bool {
    words
        .values()
        .any(|w| w.id != except_id && w.text.eq_ignore_ascii_case(text))
}

#[async_trait]
impl WordRepository for InMemoryRepository {
    async fn insert_word(&self, word: &Word) -> Result<(), StorageError> {
        let mut guard = lock(&self.words)?;
        if text_taken(&guard, &word.text, &word.id) {
            return Err(StorageError::Conflict(format!(
                "Word {} already exists",
                word.text
            )));
        }
        guard.insert(word.id.clone(), word.clone());
        Ok(())
    }

    async fn update_word(&self, word: &Word) -> Result<(), StorageError> {
        let mut guard = lock(&self.words)?;
        if !guard.contains_key(&word.id) {
            return Err(StorageError::NotFound("Word".to_string()));
        }
        if text_taken(&guard, &word.text, &word.id) {
            return Err(StorageError::Conflict(format!(
                "Word {} already exists",
                word.text
            )));
        }
        guard.insert(word.id.clone(), word.clone());
        Ok(())
    }

    async fn get_word(&self, id: &str) -> Result<Word, StorageError> {
        let guard = lock(&self.words)?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound("Word".to_string()))
    }

    async fn find_by_text(&self, text: &str) -> Result<Option<Word>, StorageError> {
        let guard = lock(&self.words)?;
        Ok(guard
            .values()
            .find(|w| w.text.eq_ignore_ascii_case(text))
            .cloned())
    }

    async fn list_words(&self, active_only: bool) -> Result<Vec<Word>, StorageError> {
        let guard = lock(&self.words)?;
        let mut words: Vec<Word> = guard
            .values()
            .filter(|w| !active_only || w.is_active)
            .cloned()
            .collect();
        words.sort_by(|a, b| a.text.cmp(&b.text));
        Ok(words)
    }

    async fn active_words_excluding(
        &self,
        exclude: &[String],
    ) -> Result<Vec<Word>, StorageError> {
        let guard = lock(&self.words)?;
        Ok(guard
            .values()
            .filter(|w| w.is_active && !exclude.contains(&w.id))
            .cloned()
            .collect())
    }

    async fn delete_word(&self, id: &str) -> Result<(), StorageError> {
        let mut guard = lock(&self.words)?;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound("Word".to_string()))
    }

    async fn delete_words(&self, ids: &[String]) -> Result<u64, StorageError> {
        let mut guard = lock(&self.words)?;
        let deleted = ids.iter().filter(|id| guard.remove(*id).is_some()).count();
        Ok(deleted as u64)
    }

    async fn increment_usage(&self, id: &str) -> Result<(), StorageError> {
        let mut guard = lock(&self.words)?;
        if let Some(word) = guard.get_mut(id) {
            word.usage_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl QuizSessionRepository for InMemoryRepository {
    async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        guard.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn save_session_with_attempt(
        &self,
        session: &QuizSession,
        attempt: &QuizAttempt,
    ) -> Result<(), StorageError> {
        // Sessions before attempts, both held until the end.
        let mut sessions = lock(&self.sessions)?;
        let mut attempts = lock(&self.attempts)?;
        attempts.push(attempt.clone());
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<QuizSession, StorageError> {
        let guard = lock(&self.sessions)?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound("Session".to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<QuizSession>, StorageError> {
        let guard = lock(&self.sessions)?;
        let mut sessions: Vec<QuizSession> = guard.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn list_attempts(&self, session_id: &str) -> Result<Vec<QuizAttempt>, StorageError> {
        let guard = lock(&self.attempts)?;
        Ok(guard
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }
}
