pub mod quiz;
pub mod word;

pub use quiz::{
    AnswerOutcome, CreateQuizSessionRequest, CurrentWordView, OperatorWordView, QuizAttempt,
    QuizSession, QuizStats, QuizStatus, SubmitAnswerRequest, SubmitAnswerResponse,
    UpdateCurrentWordRequest,
};
pub use word::{
    BulkDeleteRequest, BulkDeleteResponse, CreateWordRequest, Difficulty, ImportReport,
    ImportRowError, ImportWordRow, ImportWordsRequest, ListWordsQuery, RandomWordQuery,
    ScrambledWord, UpdateWordRequest, Word,
};
