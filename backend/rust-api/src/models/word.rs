use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

/// A word in the bank. `text` is stored trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub id: String,
    pub text: String,
    pub clues: Vec<String>,
    pub difficulty: Difficulty,
    pub usage_count: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Word {
    pub fn new(text: String, clues: Vec<String>, difficulty: Difficulty, is_active: bool) -> Self {
        let now = Utc::now();
        Word {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            clues,
            difficulty,
            usage_count: 0,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Upper bound on word text length, in characters.
pub const MAX_TEXT_CHARS: usize = 64;

/// Canonical form of word text: trimmed, upper-cased.
pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Trims clues and drops the blank ones.
pub fn clean_clues(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|clue| clue.trim().to_string())
        .filter(|clue| !clue.is_empty())
        .collect()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWordRequest {
    #[validate(length(min = 1, max = 64, message = "Text must be between 1 and 64 characters"))]
    pub text: String,

    #[validate(length(min = 1, message = "At least one clue is required"))]
    pub clues: Vec<String>,

    pub difficulty: Option<Difficulty>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateWordRequest {
    #[validate(length(min = 1, max = 64, message = "Text must be between 1 and 64 characters"))]
    pub text: Option<String>,

    #[validate(length(min = 1, message = "At least one clue is required"))]
    pub clues: Option<Vec<String>>,

    pub difficulty: Option<Difficulty>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListWordsQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// `?exclude=id1,id2` for the random pick endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RandomWordQuery {
    pub exclude: Option<String>,
}

impl RandomWordQuery {
    pub fn exclude_ids(&self) -> Vec<String> {
        self.exclude
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrambledWord {
    pub word: Word,
    pub scrambled: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, message = "At least one id is required"))]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// One already-parsed row of a bulk import.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportWordRow {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub clues: Vec<String>,
    pub difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportWordsRequest {
    pub rows: Vec<ImportWordRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRowError {
    /// 1-based row number within the request.
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<ImportRowError>,
}
