use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

use super::word_selector::WordSelector;
use crate::error::QuizError;
use crate::metrics::WORDS_IMPORTED_TOTAL;
use crate::models::word::{clean_clues, normalize_text, MAX_TEXT_CHARS};
use crate::models::{
    BulkDeleteRequest, BulkDeleteResponse, CreateWordRequest, Difficulty, ImportReport,
    ImportRowError, ImportWordRow, ImportWordsRequest, ListWordsQuery, RandomWordQuery,
    ScrambledWord, UpdateWordRequest, Word,
};
use crate::storage::{Storage, WordRepository};

/// Word bank administration: CRUD, bulk operations and import.
pub struct WordService {
    words: Arc<dyn WordRepository>,
    selector: WordSelector,
}

impl WordService {
    pub fn new(storage: &Storage) -> Self {
        Self {
            words: storage.words.clone(),
            selector: WordSelector::new(storage.words.clone()),
        }
    }

    pub async fn create_word(&self, req: CreateWordRequest) -> Result<Word, QuizError> {
        req.validate()?;
        let text = prepare_text(&req.text)?;
        let clues = prepare_clues(req.clues)?;
        self.ensure_text_available(&text, None).await?;

        let word = Word::new(
            text,
            clues,
            req.difficulty.unwrap_or_default(),
            req.is_active.unwrap_or(true),
        );
        self.words.insert_word(&word).await?;

        tracing::info!("Word created: {} ({})", word.id, word.text);
        Ok(word)
    }

    pub async fn list_words(&self, query: ListWordsQuery) -> Result<Vec<Word>, QuizError> {
        Ok(self.words.list_words(query.active_only).await?)
    }

    pub async fn get_word(&self, id: &str) -> Result<Word, QuizError> {
        Ok(self.words.get_word(id).await?)
    }

    pub async fn update_word(&self, id: &str, req: UpdateWordRequest) -> Result<Word, QuizError> {
        req.validate()?;
        let mut word = self.words.get_word(id).await?;

        if let Some(raw) = req.text {
            let text = prepare_text(&raw)?;
            self.ensure_text_available(&text, Some(id)).await?;
            word.text = text;
        }
        if let Some(clues) = req.clues {
            word.clues = prepare_clues(clues)?;
        }
        if let Some(difficulty) = req.difficulty {
            word.difficulty = difficulty;
        }
        if let Some(is_active) = req.is_active {
            word.is_active = is_active;
        }
        word.updated_at = Utc::now();

        self.words.update_word(&word).await?;
        tracing::info!("Word updated: {}", word.id);
        Ok(word)
    }

    pub async fn delete_word(&self, id: &str) -> Result<(), QuizError> {
        self.words.delete_word(id).await?;
        tracing::info!("Word deleted: {}", id);
        Ok(())
    }

    pub async fn delete_words(&self, req: BulkDeleteRequest) -> Result<BulkDeleteResponse, QuizError> {
        req.validate()?;
        let deleted = self.words.delete_words(&req.ids).await?;
        tracing::info!("Bulk delete removed {} of {} words", deleted, req.ids.len());
        Ok(BulkDeleteResponse { deleted })
    }

    pub async fn random_word(&self, query: RandomWordQuery) -> Result<ScrambledWord, QuizError> {
        self.selector.select_scrambled(&query.exclude_ids()).await
    }

    pub async fn record_usage(&self, id: &str) {
        self.selector.record_usage(id).await;
    }

    /// Validates every row independently; valid rows are inserted and bad
    /// ones reported by 1-based row number.
    pub async fn import_words(&self, req: ImportWordsRequest) -> Result<ImportReport, QuizError> {
        let mut report = ImportReport::default();
        let mut seen = HashSet::new();

        for (index, row) in req.rows.into_iter().enumerate() {
            let row_number = index + 1;
            match self.import_row(row, &mut seen).await {
                Ok(word) => {
                    report.imported += 1;
                    tracing::debug!("Imported row {} as word {}", row_number, word.id);
                }
                Err(QuizError::Validation(message)) => {
                    report.errors.push(ImportRowError {
                        row: row_number,
                        message,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        WORDS_IMPORTED_TOTAL
            .with_label_values(&["imported"])
            .inc_by(report.imported as u64);
        WORDS_IMPORTED_TOTAL
            .with_label_values(&["rejected"])
            .inc_by(report.errors.len() as u64);
        tracing::info!(
            "Word import finished: {} imported, {} rejected",
            report.imported,
            report.errors.len()
        );

        Ok(report)
    }

    async fn import_row(
        &self,
        row: ImportWordRow,
        seen: &mut HashSet<String>,
    ) -> Result<Word, QuizError> {
        let text = prepare_text(&row.text)?;
        let clues = prepare_clues(row.clues)?;
        let difficulty = match row.difficulty.as_deref().map(str::trim) {
            None | Some("") => Difficulty::default(),
            Some(raw) => raw.parse::<Difficulty>().map_err(QuizError::Validation)?,
        };

        if !seen.insert(text.clone()) {
            return Err(QuizError::validation(format!(
                "Word {} appears more than once in the import",
                text
            )));
        }
        self.ensure_text_available(&text, None).await?;

        let word = Word::new(text, clues, difficulty, true);
        self.words.insert_word(&word).await?;
        Ok(word)
    }

    async fn ensure_text_available(&self, text: &str, except_id: Option<&str>) -> Result<(), QuizError> {
        match self.words.find_by_text(text).await? {
            Some(existing) if Some(existing.id.as_str()) != except_id => Err(
                QuizError::validation(format!("Word {} already exists", text)),
            ),
            _ => Ok(()),
        }
    }
}

fn prepare_text(raw: &str) -> Result<String, QuizError> {
    let text = normalize_text(raw);
    if text.is_empty() {
        return Err(QuizError::validation("Word text must not be empty"));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(QuizError::validation(format!(
            "Text must be between 1 and {} characters",
            MAX_TEXT_CHARS
        )));
    }
    Ok(text)
}

fn prepare_clues(raw: Vec<String>) -> Result<Vec<String>, QuizError> {
    let clues = clean_clues(raw);
    if clues.is_empty() {
        return Err(QuizError::validation("At least one non-empty clue is required"));
    }
    Ok(clues)
}
