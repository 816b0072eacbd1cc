use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;

use crate::error::QuizError;
use crate::metrics::{WORDS_SELECTED_TOTAL, WORD_POOL_EXHAUSTED_TOTAL};
use crate::models::{ScrambledWord, Word};
use crate::storage::WordRepository;

/// Full shuffles attempted before falling back to a rotation.
const MAX_SHUFFLES: usize = 32;

/// Picks unused active words and disguises them for contestants.
#[derive(Clone)]
pub struct WordSelector {
    words: Arc<dyn WordRepository>,
}

impl WordSelector {
    pub fn new(words: Arc<dyn WordRepository>) -> Self {
        Self { words }
    }

    /// Uniformly random active word whose id is not in `exclude`.
    ///
    /// # Errors
    ///
    /// `QuizError::NotFound` when the pool is empty under the exclusions.
    pub async fn select(&self, exclude: &[String]) -> Result<Word, QuizError> {
        let pool = self.words.active_words_excluding(exclude).await?;
        let picked = pool.choose(&mut rand::rng()).cloned();

        match picked {
            Some(word) => {
                WORDS_SELECTED_TOTAL.inc();
                tracing::debug!(
                    "Selected word {} from pool of {} (excluded {})",
                    word.id,
                    pool.len(),
                    exclude.len()
                );
                Ok(word)
            }
            None => {
                WORD_POOL_EXHAUSTED_TOTAL.inc();
                tracing::info!("Word pool exhausted ({} excluded)", exclude.len());
                Err(QuizError::not_found("No words available"))
            }
        }
    }

    pub async fn select_scrambled(&self, exclude: &[String]) -> Result<ScrambledWord, QuizError> {
        let word = self.select(exclude).await?;
        let scrambled = scramble(&word.text);
        Ok(ScrambledWord { word, scrambled })
    }

    /// Best-effort usage accounting; failures are logged, never returned.
    pub async fn record_usage(&self, word_id: &str) {
        if let Err(e) = self.words.increment_usage(word_id).await {
            tracing::warn!("Failed to record usage for word {}: {}", word_id, e);
        }
    }
}

pub fn scramble(word: &str) -> String {
    scramble_with(word, &mut rand::rng())
}

/// Returns a permutation of `word` that differs from it whenever the word has
/// at least two distinct characters; otherwise returns the word unchanged.
pub fn scramble_with<R: Rng + ?Sized>(word: &str, rng: &mut R) -> String {
    let original: Vec<char> = word.chars().collect();
    if !has_distinct_chars(&original) {
        return word.to_string();
    }

    let mut chars = original.clone();
    for _ in 0..MAX_SHUFFLES {
        shuffle(&mut chars, rng);
        if chars != original {
            return chars.into_iter().collect();
        }
    }

    // A rotation by one equals the original only when all characters match,
    // which was ruled out above.
    let mut rotated = original;
    rotated.rotate_left(1);
    rotated.into_iter().collect()
}

fn has_distinct_chars(chars: &[char]) -> bool {
    chars
        .split_first()
        .is_some_and(|(first, rest)| rest.iter().any(|c| c != first))
}

/// Fisher-Yates: walk from the last index down to 1, swapping with a uniform
/// index in `0..=i`.
fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}
