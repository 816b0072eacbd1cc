use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::word::{Difficulty, ScrambledWord};
use crate::error::QuizError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Pending => "pending",
            QuizStatus::Active => "active",
            QuizStatus::Completed => "completed",
            QuizStatus::Cancelled => "cancelled",
        }
    }

    /// No transitions leave a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuizStatus::Completed | QuizStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    pub id: String,
    pub name: String,
    pub status: QuizStatus,
    pub current_word_id: Option<String>,
    pub current_word_index: u32,
    /// Selection order, no duplicates.
    pub used_word_ids: Vec<String>,
    pub total_words: u32,
    pub correct_answers: u32,
    pub total_attempts: u32,
    pub time_limit_seconds: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// What happens to the session after an answer has been graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Wrong answer on a non-final word: the same word stays current.
    Retry,
    /// Correct answer with budget left: a new word must be selected.
    Advance,
    /// The final word was answered, right or wrong.
    Complete,
}

impl QuizSession {
    pub fn new(name: String, total_words: u32, time_limit_seconds: Option<u32>) -> Self {
        QuizSession {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            status: QuizStatus::Pending,
            current_word_id: None,
            current_word_index: 0,
            used_word_ids: Vec::new(),
            total_words,
            correct_answers: 0,
            total_attempts: 0,
            time_limit_seconds,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn ensure_pending(&self) -> Result<(), QuizError> {
        if self.status != QuizStatus::Pending {
            return Err(QuizError::invalid_state(format!(
                "Session {} cannot be started from status {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<(), QuizError> {
        if self.status != QuizStatus::Active {
            return Err(QuizError::invalid_state(format!(
                "Session {} is not active (status {})",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Returns the current word id when the session can accept an answer.
    pub fn current_word_for_answer(&self) -> Result<&str, QuizError> {
        self.ensure_active()?;
        self.current_word_id
            .as_deref()
            .ok_or_else(|| QuizError::invalid_state("Session has no current word"))
    }

    /// PENDING -> ACTIVE with the first selected word.
    pub fn begin(&mut self, first_word_id: String, now: DateTime<Utc>) -> Result<(), QuizError> {
        self.ensure_pending()?;
        self.current_word_index = 0;
        self.mark_used(&first_word_id);
        self.current_word_id = Some(first_word_id);
        self.status = QuizStatus::Active;
        self.started_at = Some(now);
        Ok(())
    }

    /// Updates the counters for one graded answer and decides the next step.
    pub fn record_answer(&mut self, is_correct: bool) -> AnswerOutcome {
        self.total_attempts += 1;
        if is_correct {
            self.correct_answers += 1;
        }

        if self.is_on_final_word() {
            AnswerOutcome::Complete
        } else if is_correct {
            AnswerOutcome::Advance
        } else {
            AnswerOutcome::Retry
        }
    }

    pub fn is_on_final_word(&self) -> bool {
        self.current_word_index + 1 >= self.total_words
    }

    pub fn advance_to(&mut self, word_id: String) {
        self.current_word_index += 1;
        self.mark_used(&word_id);
        self.current_word_id = Some(word_id);
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = QuizStatus::Completed;
        self.ended_at = Some(now);
    }

    /// Forces COMPLETED from PENDING or ACTIVE.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<(), QuizError> {
        if self.status.is_terminal() {
            return Err(QuizError::invalid_state(format!(
                "Session {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.complete(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), QuizError> {
        if self.status.is_terminal() {
            return Err(QuizError::invalid_state(format!(
                "Session {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = QuizStatus::Cancelled;
        self.ended_at = Some(now);
        Ok(())
    }

    /// Operator override: replaces the current word id without touching the
    /// index or the used-id set.
    pub fn override_current_word(&mut self, word_id: String) -> Result<(), QuizError> {
        self.ensure_active()?;
        self.current_word_id = Some(word_id);
        Ok(())
    }

    fn mark_used(&mut self, word_id: &str) {
        if !self.used_word_ids.iter().any(|id| id == word_id) {
            self.used_word_ids.push(word_id.to_string());
        }
    }
}

/// Case-insensitive, whitespace-trimmed comparison.
pub fn answers_match(submitted: &str, expected: &str) -> bool {
    submitted.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Append-only record of one submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: String,
    pub session_id: String,
    pub word_id: String,
    pub contestant_name: String,
    pub answer: String,
    pub is_correct: bool,
    pub attempt_number: u32,
    pub elapsed_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuizSessionRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(range(min = 1, max = 100, message = "Total words must be between 1 and 100"))]
    pub total_words: Option<u32>,

    #[validate(range(min = 5, max = 600, message = "Time limit must be between 5 and 600 seconds"))]
    pub time_limit_seconds: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, max = 100, message = "Contestant name must be between 1 and 100 characters"))]
    pub contestant_name: String,

    #[validate(length(max = 128, message = "Answer must be at most 128 characters"))]
    pub answer: String,

    #[validate(range(min = 0.0, message = "Elapsed time cannot be negative"))]
    pub elapsed_seconds: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub is_correct: bool,
    pub correct_answer: String,
    pub next_word: Option<ScrambledWord>,
    pub session_complete: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCurrentWordRequest {
    #[validate(length(min = 1, message = "Word id is required"))]
    pub word_id: String,
}

/// What contestants see: never includes the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWordView {
    pub session_id: String,
    pub word_id: String,
    pub scrambled: String,
    pub clues: Vec<String>,
    pub difficulty: Difficulty,
    pub letter_count: usize,
    pub word_index: u32,
    pub total_words: u32,
    pub time_limit_seconds: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorWordView {
    #[serde(flatten)]
    pub view: CurrentWordView,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizStats {
    pub session_id: String,
    pub status: QuizStatus,
    pub total_words: u32,
    pub words_played: usize,
    pub total_attempts: u32,
    pub correct_answers: u32,
    /// Percentage, two decimals.
    pub accuracy: f64,
    /// Mean elapsed seconds over attempts that recorded one, two decimals.
    pub average_time: f64,
}

impl QuizStats {
    pub fn compute(session: &QuizSession, attempts: &[QuizAttempt]) -> Self {
        let accuracy = if session.total_attempts == 0 {
            0.0
        } else {
            f64::from(session.correct_answers) / f64::from(session.total_attempts) * 100.0
        };

        let times: Vec<f64> = attempts.iter().filter_map(|a| a.elapsed_seconds).collect();
        let average_time = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        };

        QuizStats {
            session_id: session.id.clone(),
            status: session.status,
            total_words: session.total_words,
            words_played: session.used_word_ids.len(),
            total_attempts: session.total_attempts,
            correct_answers: session.correct_answers,
            accuracy: round2(accuracy),
            average_time: round2(average_time),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_session(total_words: u32) -> QuizSession {
        let mut session = QuizSession::new("Period 3".to_string(), total_words, None);
        session.begin("w1".to_string(), Utc::now()).unwrap();
        session
    }

    fn attempt(is_correct: bool, elapsed: Option<f64>) -> QuizAttempt {
        QuizAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: "s".to_string(),
            word_id: "w".to_string(),
            contestant_name: "Ada".to_string(),
            answer: "x".to_string(),
            is_correct,
            attempt_number: 1,
            elapsed_seconds: elapsed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_session_is_pending_and_empty() {
        let session = QuizSession::new("Quiz".to_string(), 5, Some(30));
        assert_eq!(session.status, QuizStatus::Pending);
        assert_eq!(session.current_word_index, 0);
        assert!(session.used_word_ids.is_empty());
        assert!(session.current_word_id.is_none());
        assert_eq!(session.total_attempts, 0);
    }

    #[test]
    fn test_begin_twice_is_invalid_state() {
        let mut session = active_session(3);
        assert_eq!(session.status, QuizStatus::Active);
        assert!(session.started_at.is_some());

        let err = session.begin("w2".to_string(), Utc::now()).unwrap_err();
        assert!(matches!(err, QuizError::InvalidState(_)));
        assert_eq!(session.status, QuizStatus::Active);
        assert_eq!(session.used_word_ids, vec!["w1".to_string()]);
    }

    #[test]
    fn test_wrong_answer_on_non_final_word_retries() {
        let mut session = active_session(3);
        assert_eq!(session.record_answer(false), AnswerOutcome::Retry);
        assert_eq!(session.current_word_index, 0);
        assert_eq!(session.current_word_id.as_deref(), Some("w1"));
        assert_eq!(session.total_attempts, 1);
        assert_eq!(session.correct_answers, 0);
    }

    #[test]
    fn test_correct_answer_on_non_final_word_advances() {
        let mut session = active_session(3);
        assert_eq!(session.record_answer(true), AnswerOutcome::Advance);
        session.advance_to("w2".to_string());
        assert_eq!(session.current_word_index, 1);
        assert_eq!(session.used_word_ids, vec!["w1".to_string(), "w2".to_string()]);
        assert_eq!(session.status, QuizStatus::Active);
    }

    #[test]
    fn test_final_word_completes_even_when_wrong() {
        let mut session = active_session(1);
        assert_eq!(session.record_answer(false), AnswerOutcome::Complete);

        let mut session = active_session(1);
        assert_eq!(session.record_answer(true), AnswerOutcome::Complete);
        session.complete(Utc::now());
        assert_eq!(session.status, QuizStatus::Completed);
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_answer_requires_active_session_with_word() {
        let session = QuizSession::new("Quiz".to_string(), 2, None);
        assert!(matches!(
            session.current_word_for_answer(),
            Err(QuizError::InvalidState(_))
        ));

        let mut session = active_session(2);
        session.current_word_id = None;
        let err = session.current_word_for_answer().unwrap_err();
        assert!(err.to_string().contains("no current word"));
    }

    #[test]
    fn test_end_from_pending_completes() {
        let mut session = QuizSession::new("Quiz".to_string(), 2, None);
        session.end(Utc::now()).unwrap();
        assert_eq!(session.status, QuizStatus::Completed);
        assert!(session.ended_at.is_some());

        let err = session.end(Utc::now()).unwrap_err();
        assert!(matches!(err, QuizError::InvalidState(_)));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let mut session = active_session(2);
        session.cancel(Utc::now()).unwrap();
        assert_eq!(session.status, QuizStatus::Cancelled);
        assert!(session.end(Utc::now()).is_err());
        assert!(session.cancel(Utc::now()).is_err());
        assert!(session.begin("w9".to_string(), Utc::now()).is_err());
    }

    #[test]
    fn test_override_only_when_active() {
        let mut pending = QuizSession::new("Quiz".to_string(), 2, None);
        assert!(pending.override_current_word("w5".to_string()).is_err());

        let mut session = active_session(3);
        session.override_current_word("w5".to_string()).unwrap();
        assert_eq!(session.current_word_id.as_deref(), Some("w5"));
        assert_eq!(session.current_word_index, 0);
        assert_eq!(session.used_word_ids, vec!["w1".to_string()]);
    }

    #[test]
    fn test_used_ids_never_duplicate() {
        let mut session = active_session(3);
        session.advance_to("w1".to_string());
        assert_eq!(session.used_word_ids, vec!["w1".to_string()]);
    }

    #[test]
    fn test_answers_match_ignores_case_and_whitespace() {
        assert!(answers_match("  planet ", "PLANET"));
        assert!(answers_match("Planet", "planet"));
        assert!(!answers_match("plane", "PLANET"));
        assert!(!answers_match("", "PLANET"));
    }

    #[test]
    fn test_stats_accuracy_and_average_time() {
        let mut session = active_session(5);
        session.record_answer(true);
        session.record_answer(false);
        session.record_answer(true);
        let attempts = vec![
            attempt(true, Some(10.0)),
            attempt(false, Some(20.0)),
            attempt(true, Some(30.0)),
        ];

        let stats = QuizStats::compute(&session, &attempts);
        assert_eq!(stats.accuracy, 66.67);
        assert_eq!(stats.average_time, 20.0);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.correct_answers, 2);
    }

    #[test]
    fn test_stats_without_attempts_are_zero() {
        let session = QuizSession::new("Quiz".to_string(), 2, None);
        let stats = QuizStats::compute(&session, &[]);
        assert_eq!(stats.accuracy, 0.0);
        assert_eq!(stats.average_time, 0.0);
    }

    #[test]
    fn test_average_time_skips_attempts_without_timing() {
        let session = active_session(5);
        let attempts = vec![attempt(true, Some(12.5)), attempt(false, None)];
        assert_eq!(QuizStats::compute(&session, &attempts).average_time, 12.5);
    }
}
