use chrono::Utc;
use validator::Validate;

use super::session_locks::SessionLocks;
use super::word_selector::{scramble, WordSelector};
use crate::error::QuizError;
use crate::metrics::{record_session_transition, ANSWERS_SUBMITTED_TOTAL};
use crate::models::quiz::answers_match;
use crate::models::{
    AnswerOutcome, CreateQuizSessionRequest, CurrentWordView, OperatorWordView, QuizAttempt,
    QuizSession, QuizStats, QuizStatus, ScrambledWord, SubmitAnswerRequest, SubmitAnswerResponse,
    UpdateCurrentWordRequest, Word,
};
use crate::storage::Storage;

/// Drives the quiz session lifecycle against storage.
///
/// Every mutating operation holds the per-session lock for its whole
/// read-modify-write sequence, so two submissions against the same session
/// never interleave.
pub struct QuizSessionService {
    storage: Storage,
    selector: WordSelector,
    locks: SessionLocks,
    default_total_words: u32,
}

impl QuizSessionService {
    pub fn new(storage: &Storage, locks: SessionLocks, default_total_words: u32) -> Self {
        Self {
            storage: storage.clone(),
            selector: WordSelector::new(storage.words.clone()),
            locks,
            default_total_words,
        }
    }

    pub async fn create_session(&self, req: CreateQuizSessionRequest) -> Result<QuizSession, QuizError> {
        req.validate()?;
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(QuizError::validation("Name must not be blank"));
        }

        let total_words = req.total_words.unwrap_or(self.default_total_words);
        let session = QuizSession::new(name, total_words, req.time_limit_seconds);
        self.storage.sessions.save_session(&session).await?;

        record_session_transition("created", false);
        tracing::info!(
            "Quiz session created: {} ({} words)",
            session.id,
            session.total_words
        );
        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<QuizSession>, QuizError> {
        Ok(self.storage.sessions.list_sessions().await?)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<QuizSession, QuizError> {
        Ok(self.storage.sessions.get_session(session_id).await?)
    }

    /// PENDING -> ACTIVE with a first word drawn from the whole pool.
    pub async fn start_session(&self, session_id: &str) -> Result<QuizSession, QuizError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.storage.sessions.get_session(session_id).await?;
        session.ensure_pending()?;

        let first = self.selector.select(&[]).await?;
        session.begin(first.id.clone(), Utc::now())?;
        self.storage.sessions.save_session(&session).await?;
        self.selector.record_usage(&first.id).await;

        record_session_transition("started", false);
        tracing::info!("Quiz session started: {} with word {}", session.id, first.id);
        Ok(session)
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        req: SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, QuizError> {
        req.validate()?;
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.storage.sessions.get_session(session_id).await?;
        let word_id = session.current_word_for_answer()?.to_string();
        let word = self.storage.words.get_word(&word_id).await?;

        let is_correct = answers_match(&req.answer, &word.text);
        let outcome = session.record_answer(is_correct);
        let now = Utc::now();

        let attempt = QuizAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            word_id: word.id.clone(),
            contestant_name: req.contestant_name.trim().to_string(),
            answer: req.answer,
            is_correct,
            attempt_number: session.total_attempts,
            elapsed_seconds: req.elapsed_seconds,
            created_at: now,
        };

        let next_word = match outcome {
            AnswerOutcome::Retry => None,
            AnswerOutcome::Complete => {
                session.complete(now);
                None
            }
            AnswerOutcome::Advance => match self.selector.select(&session.used_word_ids).await {
                Ok(next) => {
                    session.advance_to(next.id.clone());
                    Some(next)
                }
                Err(QuizError::NotFound(_)) => {
                    tracing::info!(
                        "Word pool exhausted for session {} at index {}, completing",
                        session.id,
                        session.current_word_index
                    );
                    session.complete(now);
                    None
                }
                Err(e) => return Err(e),
            },
        };

        self.storage
            .sessions
            .save_session_with_attempt(&session, &attempt)
            .await?;

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[if is_correct { "true" } else { "false" }])
            .inc();
        tracing::info!(
            "Answer #{} for session {} by {}: correct={}",
            attempt.attempt_number,
            session.id,
            attempt.contestant_name,
            is_correct
        );

        if let Some(next) = &next_word {
            self.selector.record_usage(&next.id).await;
        }

        let session_complete = session.status == QuizStatus::Completed;
        if session_complete {
            record_session_transition("completed", true);
            tracing::info!(
                "Quiz session completed: {} ({}/{} correct)",
                session.id,
                session.correct_answers,
                session.total_attempts
            );
        }

        Ok(SubmitAnswerResponse {
            is_correct,
            correct_answer: word.text,
            next_word: next_word.map(|word| {
                let scrambled = scramble(&word.text);
                ScrambledWord { word, scrambled }
            }),
            session_complete,
        })
    }

    /// Forces COMPLETED from PENDING or ACTIVE.
    pub async fn end_session(&self, session_id: &str) -> Result<QuizSession, QuizError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.storage.sessions.get_session(session_id).await?;
        let was_active = session.status == QuizStatus::Active;

        session.end(Utc::now())?;
        self.storage.sessions.save_session(&session).await?;

        record_session_transition("completed", was_active);
        tracing::info!("Quiz session ended: {}", session.id);
        Ok(session)
    }

    pub async fn cancel_session(&self, session_id: &str) -> Result<QuizSession, QuizError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.storage.sessions.get_session(session_id).await?;
        let was_active = session.status == QuizStatus::Active;

        session.cancel(Utc::now())?;
        self.storage.sessions.save_session(&session).await?;

        record_session_transition("cancelled", was_active);
        tracing::info!("Quiz session cancelled: {}", session.id);
        Ok(session)
    }

    /// Operator override. The word id is not checked against the pool.
    pub async fn update_current_word(
        &self,
        session_id: &str,
        req: UpdateCurrentWordRequest,
    ) -> Result<QuizSession, QuizError> {
        req.validate()?;
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.storage.sessions.get_session(session_id).await?;

        session.override_current_word(req.word_id)?;
        self.storage.sessions.save_session(&session).await?;

        tracing::warn!(
            "Current word of session {} overridden to {:?}",
            session.id,
            session.current_word_id
        );
        Ok(session)
    }

    /// Contestant view: scrambled, no answer.
    pub async fn current_word(&self, session_id: &str) -> Result<CurrentWordView, QuizError> {
        let (session, word) = self.load_current_word(session_id).await?;
        Ok(build_view(&session, &word))
    }

    pub async fn operator_word(&self, session_id: &str) -> Result<OperatorWordView, QuizError> {
        let (session, word) = self.load_current_word(session_id).await?;
        Ok(OperatorWordView {
            view: build_view(&session, &word),
            answer: word.text,
        })
    }

    pub async fn attempts(&self, session_id: &str) -> Result<Vec<QuizAttempt>, QuizError> {
        self.storage.sessions.get_session(session_id).await?;
        Ok(self.storage.attempts.list_attempts(session_id).await?)
    }

    pub async fn stats(&self, session_id: &str) -> Result<QuizStats, QuizError> {
        let session = self.storage.sessions.get_session(session_id).await?;
        let attempts = self.storage.attempts.list_attempts(session_id).await?;
        Ok(QuizStats::compute(&session, &attempts))
    }

    async fn load_current_word(&self, session_id: &str) -> Result<(QuizSession, Word), QuizError> {
        let session = self.storage.sessions.get_session(session_id).await?;
        session.ensure_active()?;
        let word_id = session
            .current_word_id
            .clone()
            .ok_or_else(|| QuizError::invalid_state("Session has no current word"))?;
        let word = self.storage.words.get_word(&word_id).await?;
        Ok((session, word))
    }
}

fn build_view(session: &QuizSession, word: &Word) -> CurrentWordView {
    CurrentWordView {
        session_id: session.id.clone(),
        word_id: word.id.clone(),
        scrambled: scramble(&word.text),
        clues: word.clues.clone(),
        difficulty: word.difficulty,
        letter_count: word.text.chars().count(),
        word_index: session.current_word_index,
        total_words: session.total_words,
        time_limit_seconds: session.time_limit_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use crate::storage::{InMemoryRepository, QuizSessionRepository, StorageError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Session store that yields before every read and write, so concurrent
    /// callers interleave, and can reject the next few answer writes.
    struct FlakySessions {
        inner: InMemoryRepository,
        failing_answer_writes: AtomicUsize,
    }

    #[async_trait]
    impl QuizSessionRepository for FlakySessions {
        async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            self.inner.save_session(session).await
        }

        async fn save_session_with_attempt(
            &self,
            session: &QuizSession,
            attempt: &QuizAttempt,
        ) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            let failing = self.failing_answer_writes.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_answer_writes.store(failing - 1, Ordering::SeqCst);
                return Err(StorageError::Connection("connection reset".to_string()));
            }
            self.inner.save_session_with_attempt(session, attempt).await
        }

        async fn get_session(&self, id: &str) -> Result<QuizSession, StorageError> {
            tokio::task::yield_now().await;
            self.inner.get_session(id).await
        }

        async fn list_sessions(&self) -> Result<Vec<QuizSession>, StorageError> {
            self.inner.list_sessions().await
        }
    }

    async fn setup_flaky(texts: &[&str], failing_answer_writes: usize) -> QuizSessionService {
        let repo = InMemoryRepository::new();
        let storage = Storage {
            words: Arc::new(repo.clone()),
            sessions: Arc::new(FlakySessions {
                inner: repo.clone(),
                failing_answer_writes: AtomicUsize::new(failing_answer_writes),
            }),
            attempts: Arc::new(repo),
            backend: "memory",
        };
        for text in texts {
            let word = Word::new(
                text.to_string(),
                vec![format!("clue for {}", text)],
                Difficulty::Easy,
                true,
            );
            storage.words.insert_word(&word).await.unwrap();
        }
        QuizSessionService::new(&storage, SessionLocks::new(), 10)
    }

    async fn setup(texts: &[&str]) -> QuizSessionService {
        let storage = Storage::in_memory();
        for text in texts {
            let word = Word::new(
                text.to_string(),
                vec![format!("clue for {}", text)],
                Difficulty::Easy,
                true,
            );
            storage.words.insert_word(&word).await.unwrap();
        }
        QuizSessionService::new(&storage, SessionLocks::new(), 10)
    }

    async fn create(service: &QuizSessionService, total_words: u32) -> QuizSession {
        service
            .create_session(CreateQuizSessionRequest {
                name: "Period 2".to_string(),
                total_words: Some(total_words),
                time_limit_seconds: None,
            })
            .await
            .unwrap()
    }

    fn answer(text: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            contestant_name: "Team Blue".to_string(),
            answer: text.to_string(),
            elapsed_seconds: Some(5.0),
        }
    }

    async fn current_text(service: &QuizSessionService, id: &str) -> String {
        service.operator_word(id).await.unwrap().answer
    }

    #[tokio::test]
    async fn test_two_word_scenario() {
        let service = setup(&["ALPHA", "BRAVO", "CHARLIE"]).await;
        let session = create(&service, 2).await;

        let started = service.start_session(&session.id).await.unwrap();
        assert_eq!(started.status, QuizStatus::Active);
        assert_eq!(started.current_word_index, 0);
        let word_a = started.current_word_id.clone().unwrap();

        let wrong = service
            .submit_answer(&session.id, answer("nope"))
            .await
            .unwrap();
        assert!(!wrong.is_correct);
        assert!(wrong.next_word.is_none());
        assert!(!wrong.session_complete);
        let after_wrong = service.get_session(&session.id).await.unwrap();
        assert_eq!(after_wrong.current_word_index, 0);
        assert_eq!(after_wrong.current_word_id.as_deref(), Some(word_a.as_str()));
        assert_eq!(after_wrong.status, QuizStatus::Active);

        let text_a = current_text(&service, &session.id).await;
        let right = service
            .submit_answer(&session.id, answer(&text_a.to_lowercase()))
            .await
            .unwrap();
        assert!(right.is_correct);
        assert!(!right.session_complete);
        let next = right.next_word.unwrap();
        assert_ne!(next.word.id, word_a);
        let after_right = service.get_session(&session.id).await.unwrap();
        assert_eq!(after_right.current_word_index, 1);
        assert_eq!(after_right.used_word_ids, vec![word_a, next.word.id.clone()]);

        let last = service
            .submit_answer(&session.id, answer("whatever"))
            .await
            .unwrap();
        assert!(last.session_complete);
        assert!(last.next_word.is_none());
        assert_eq!(last.correct_answer, next.word.text);

        let done = service.get_session(&session.id).await.unwrap();
        assert_eq!(done.status, QuizStatus::Completed);
        assert!(done.ended_at.is_some());
        assert_eq!(done.total_attempts, 3);
        assert_eq!(done.correct_answers, 1);
        assert_eq!(service.attempts(&session.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let service = setup(&["ALPHA"]).await;
        let session = create(&service, 1).await;
        service.start_session(&session.id).await.unwrap();

        let err = service.start_session(&session.id).await.unwrap_err();
        assert!(matches!(err, QuizError::InvalidState(_)));
        assert_eq!(
            service.get_session(&session.id).await.unwrap().status,
            QuizStatus::Active
        );
    }

    #[tokio::test]
    async fn test_start_with_empty_pool_stays_pending() {
        let service = setup(&[]).await;
        let session = create(&service, 3).await;
        assert!(matches!(
            service.start_session(&session.id).await,
            Err(QuizError::NotFound(_))
        ));
        assert_eq!(
            service.get_session(&session.id).await.unwrap().status,
            QuizStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_start_records_usage() {
        let service = setup(&["ALPHA"]).await;
        let session = create(&service, 1).await;
        let started = service.start_session(&session.id).await.unwrap();
        let word_id = started.current_word_id.unwrap();
        let word = service.storage.words.get_word(&word_id).await.unwrap();
        assert_eq!(word.usage_count, 1);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_completes_session() {
        let service = setup(&["ALPHA"]).await;
        let session = create(&service, 5).await;
        service.start_session(&session.id).await.unwrap();

        let response = service
            .submit_answer(&session.id, answer("alpha"))
            .await
            .unwrap();
        assert!(response.is_correct);
        assert!(response.session_complete);
        assert_eq!(
            service.get_session(&session.id).await.unwrap().status,
            QuizStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_submit_to_pending_session_is_invalid_state() {
        let service = setup(&["ALPHA"]).await;
        let session = create(&service, 1).await;
        let err = service
            .submit_answer(&session.id, answer("alpha"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let service = setup(&["ALPHA"]).await;
        assert!(matches!(
            service.start_session("missing").await,
            Err(QuizError::NotFound(_))
        ));
        assert!(matches!(
            service.stats("missing").await,
            Err(QuizError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_end_and_cancel_rules() {
        let service = setup(&["ALPHA"]).await;
        let pending = create(&service, 2).await;
        let ended = service.end_session(&pending.id).await.unwrap();
        assert_eq!(ended.status, QuizStatus::Completed);
        assert!(matches!(
            service.end_session(&pending.id).await,
            Err(QuizError::InvalidState(_))
        ));

        let other = create(&service, 2).await;
        service.start_session(&other.id).await.unwrap();
        let cancelled = service.cancel_session(&other.id).await.unwrap();
        assert_eq!(cancelled.status, QuizStatus::Cancelled);
        assert!(matches!(
            service.end_session(&other.id).await,
            Err(QuizError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_override_then_views() {
        let service = setup(&["ALPHA", "BRAVO"]).await;
        let session = create(&service, 2).await;
        service.start_session(&session.id).await.unwrap();

        let all = service.storage.words.list_words(true).await.unwrap();
        let bravo = all.iter().find(|w| w.text == "BRAVO").unwrap();
        let updated = service
            .update_current_word(
                &session.id,
                UpdateCurrentWordRequest {
                    word_id: bravo.id.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.current_word_index, 0);
        assert_eq!(updated.used_word_ids.len(), 1);

        let view = service.current_word(&session.id).await.unwrap();
        assert_eq!(view.word_id, bravo.id);
        assert_eq!(view.letter_count, 5);
        assert_ne!(view.scrambled, "BRAVO");
        assert_eq!(service.operator_word(&session.id).await.unwrap().answer, "BRAVO");

        service
            .update_current_word(
                &session.id,
                UpdateCurrentWordRequest {
                    word_id: "ghost".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            service.current_word(&session.id).await,
            Err(QuizError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_after_answers() {
        let service = setup(&["ALPHA", "BRAVO", "CHARLIE", "DELTA"]).await;
        let session = create(&service, 4).await;
        service.start_session(&session.id).await.unwrap();

        for (correct, elapsed) in [(true, 10.0), (false, 20.0), (true, 30.0)] {
            let text = current_text(&service, &session.id).await;
            let guess = if correct { text } else { "wrong".to_string() };
            service
                .submit_answer(
                    &session.id,
                    SubmitAnswerRequest {
                        contestant_name: "Ada".to_string(),
                        answer: guess,
                        elapsed_seconds: Some(elapsed),
                    },
                )
                .await
                .unwrap();
        }

        let stats = service.stats(&session.id).await.unwrap();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.correct_answers, 2);
        assert_eq!(stats.accuracy, 66.67);
        assert_eq!(stats.average_time, 20.0);
        assert_eq!(stats.status, QuizStatus::Active);
    }

    #[tokio::test]
    async fn test_failed_answer_write_stores_neither_attempt_nor_counters() {
        let service = setup_flaky(&["ALPHA", "BRAVO"], 1).await;
        let session = create(&service, 2).await;
        service.start_session(&session.id).await.unwrap();

        let err = service
            .submit_answer(&session.id, answer("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::Storage(_)));

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored.total_attempts, 0);
        assert!(service.attempts(&session.id).await.unwrap().is_empty());

        service
            .submit_answer(&session.id, answer("nope"))
            .await
            .unwrap();
        let stored = service.get_session(&session.id).await.unwrap();
        let attempts = service.attempts(&session.id).await.unwrap();
        assert_eq!(stored.total_attempts, 1);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_number, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_wrong_answers_are_serialized() {
        let service = Arc::new(setup_flaky(&["ALPHA", "BRAVO", "CHARLIE"], 0).await);
        let session = create(&service, 2).await;
        service.start_session(&session.id).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = session.id.clone();
                tokio::spawn(async move { service.submit_answer(&id, answer("nope")).await })
            })
            .collect();
        for task in tasks {
            assert!(!task.await.unwrap().unwrap().is_correct);
        }

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored.total_attempts, 8);
        assert_eq!(stored.current_word_index, 0);
        assert_eq!(stored.used_word_ids.len(), 1);
        let numbers: Vec<u32> = service
            .attempts(&session.id)
            .await
            .unwrap()
            .iter()
            .map(|a| a.attempt_number)
            .collect();
        assert_eq!(numbers, (1..=8).collect::<Vec<u32>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_correct_answers_advance_once() {
        let service = Arc::new(setup_flaky(&["ALPHA", "BRAVO", "CHARLIE"], 0).await);
        let session = create(&service, 2).await;
        service.start_session(&session.id).await.unwrap();
        let first = current_text(&service, &session.id).await;

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = session.id.clone();
                let guess = first.clone();
                tokio::spawn(async move { service.submit_answer(&id, answer(&guess)).await })
            })
            .collect();

        let mut accepted = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(QuizError::InvalidState(_)) => rejected += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        // First answer advances, second lands on the final word and
        // completes, the rest hit a completed session.
        assert_eq!(accepted, 2);
        assert_eq!(rejected, 2);

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, QuizStatus::Completed);
        assert_eq!(stored.total_attempts, 2);
        assert_eq!(stored.correct_answers, 1);
        assert_eq!(stored.current_word_index, 1);
        assert_eq!(service.attempts(&session.id).await.unwrap().len(), 2);
    }
}
