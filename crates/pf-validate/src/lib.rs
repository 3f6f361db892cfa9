//! Phrase validation.
//!
//! One rule set serves every consumer: human submissions, AI cache
//! generation, and cache revalidation all run through [`PhraseValidator`],
//! so a cached phrase is valid exactly when a typed one would be.
//!
//! The trait is async and object-safe so the implementation can be swapped
//! for a remote validation worker without touching call sites.
use async_trait::async_trait;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::Settings;
use std::collections::HashSet;

/// Validation interface shared by all games.
#[async_trait]
pub trait PhraseValidator: Send + Sync {
    /// Shape and dictionary rules only.
    async fn validate(&self, phrase: &str) -> GameResult<()>;
    /// Additionally forbids reuse of significant words from the prompt.
    async fn validate_prompt_phrase(&self, phrase: &str, prompt_text: &str) -> GameResult<()>;
    /// Additionally forbids reuse of significant words from the original,
    /// the other copy when present, and the prompt; forbids identity.
    async fn validate_copy(
        &self,
        phrase: &str,
        original_phrase: &str,
        other_copy_phrase: Option<&str>,
        prompt_text: Option<&str>,
    ) -> GameResult<()>;
    /// Each word must start with the matching letter of the target word, in
    /// order, and pass the per-word shape rules.
    async fn validate_backronym_words(&self, words: &[String], target_word: &str)
    -> GameResult<()>;
    /// The curated common-words list, exposed so AI prompt construction can
    /// tell the model which words are free to reuse.
    fn common_words(&self) -> &HashSet<String>;
}

/// Words too common to count as "significant" when checking reuse.
const COMMON_WORDS: &[&str] = &[
    "that", "this", "with", "from", "your", "have", "will", "what", "when", "where", "which",
    "their", "would", "there", "could", "should", "about", "after", "before", "being", "every",
    "first", "found", "great", "house", "large", "never", "other", "place", "right", "small",
    "sound", "still", "such", "then", "them", "these", "they", "thing", "think", "three", "time",
    "very", "want", "water", "were", "word", "work", "world", "year", "some", "more", "most",
    "over", "only", "into", "than", "like", "just", "also", "back", "good", "make", "well",
];

/// In-process rule validator.
pub struct RuleValidator {
    min_words: usize,
    max_words: usize,
    max_length: usize,
    min_char_per_word: usize,
    max_char_per_word: usize,
    significant_word_min_length: usize,
    common_words: HashSet<String>,
    /// Dictionary membership; `None` accepts any well-formed word.
    dictionary: Option<HashSet<String>>,
}

impl RuleValidator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            min_words: settings.phrase_min_words,
            max_words: settings.phrase_max_words,
            max_length: settings.phrase_max_length,
            min_char_per_word: settings.phrase_min_char_per_word,
            max_char_per_word: settings.phrase_max_char_per_word,
            significant_word_min_length: settings.significant_word_min_length,
            common_words: COMMON_WORDS.iter().map(|w| w.to_string()).collect(),
            dictionary: None,
        }
    }

    pub fn with_dictionary(mut self, words: impl IntoIterator<Item = String>) -> Self {
        self.dictionary = Some(words.into_iter().map(|w| w.to_lowercase()).collect());
        self
    }

    fn words(phrase: &str) -> Vec<String> {
        phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect()
    }

    fn well_formed(&self, word: &str) -> Result<(), String> {
        let bare: String = word.chars().filter(|c| c.is_alphabetic()).collect();
        if word
            .chars()
            .any(|c| !c.is_alphabetic() && c != '\'' && c != '-')
        {
            return Err(format!("'{}' contains invalid characters", word));
        }
        if bare.chars().count() < self.min_char_per_word {
            return Err(format!("'{}' is too short", word));
        }
        if bare.chars().count() > self.max_char_per_word {
            return Err(format!("'{}' is too long", word));
        }
        if let Some(dictionary) = &self.dictionary {
            if !dictionary.contains(&bare) {
                return Err(format!("'{}' is not a recognized word", word));
            }
        }
        Ok(())
    }

    fn shape(&self, phrase: &str) -> Result<Vec<String>, String> {
        let trimmed = phrase.trim();
        if trimmed.is_empty() {
            return Err("phrase is empty".to_string());
        }
        if trimmed.chars().count() > self.max_length {
            return Err(format!("phrase exceeds {} characters", self.max_length));
        }
        let words = Self::words(trimmed);
        if words.len() < self.min_words {
            return Err(format!("needs at least {} words", self.min_words));
        }
        if words.len() > self.max_words {
            return Err(format!("needs at most {} words", self.max_words));
        }
        for word in &words {
            self.well_formed(word)?;
        }
        Ok(words)
    }

    /// Words long enough and uncommon enough that reusing them gives the
    /// copy away.
    fn significant_words(&self, text: &str) -> HashSet<String> {
        Self::words(text)
            .into_iter()
            .map(|w| w.chars().filter(|c| c.is_alphabetic()).collect::<String>())
            .filter(|w| w.chars().count() >= self.significant_word_min_length)
            .filter(|w| !self.common_words.contains(w))
            .collect()
    }

    fn check_no_reuse(&self, phrase_words: &[String], source: &str, label: &str) -> Result<(), String> {
        let significant = self.significant_words(source);
        for word in phrase_words {
            let bare: String = word.chars().filter(|c| c.is_alphabetic()).collect();
            if significant.contains(&bare) {
                return Err(format!("'{}' reuses a word from the {}", bare, label));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PhraseValidator for RuleValidator {
    async fn validate(&self, phrase: &str) -> GameResult<()> {
        self.shape(phrase)
            .map(|_| ())
            .map_err(GameError::InvalidPhrase)
    }

    async fn validate_prompt_phrase(&self, phrase: &str, prompt_text: &str) -> GameResult<()> {
        let words = self.shape(phrase).map_err(GameError::InvalidPhrase)?;
        self.check_no_reuse(&words, prompt_text, "prompt")
            .map_err(GameError::InvalidPhrase)
    }

    async fn validate_copy(
        &self,
        phrase: &str,
        original_phrase: &str,
        other_copy_phrase: Option<&str>,
        prompt_text: Option<&str>,
    ) -> GameResult<()> {
        let words = self.shape(phrase).map_err(GameError::InvalidPhrase)?;
        if phrase.trim().eq_ignore_ascii_case(original_phrase.trim()) {
            return Err(GameError::InvalidPhrase(
                "copy is identical to the original".to_string(),
            ));
        }
        if let Some(other) = other_copy_phrase {
            if phrase.trim().eq_ignore_ascii_case(other.trim()) {
                return Err(GameError::InvalidPhrase(
                    "copy is identical to the other copy".to_string(),
                ));
            }
        }
        self.check_no_reuse(&words, original_phrase, "original phrase")
            .map_err(GameError::InvalidPhrase)?;
        if let Some(other) = other_copy_phrase {
            self.check_no_reuse(&words, other, "other copy")
                .map_err(GameError::InvalidPhrase)?;
        }
        if let Some(prompt) = prompt_text {
            self.check_no_reuse(&words, prompt, "prompt")
                .map_err(GameError::InvalidPhrase)?;
        }
        Ok(())
    }

    async fn validate_backronym_words(
        &self,
        words: &[String],
        target_word: &str,
    ) -> GameResult<()> {
        let letters: Vec<char> = target_word
            .chars()
            .filter(|c| c.is_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if words.len() != letters.len() {
            return Err(GameError::InvalidPhrase(format!(
                "expected {} words for '{}', got {}",
                letters.len(),
                target_word,
                words.len()
            )));
        }
        for (word, letter) in words.iter().zip(letters.iter()) {
            self.well_formed(&word.to_lowercase())
                .map_err(GameError::InvalidPhrase)?;
            let initial = word
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or(' ');
            if initial != *letter {
                return Err(GameError::InvalidPhrase(format!(
                    "'{}' must start with '{}'",
                    word, letter
                )));
            }
        }
        Ok(())
    }

    fn common_words(&self) -> &HashSet<String> {
        &self.common_words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RuleValidator {
        RuleValidator::new(&Settings::default())
    }

    fn reason(result: GameResult<()>) -> String {
        match result {
            Err(GameError::InvalidPhrase(reason)) => reason,
            other => panic!("expected InvalidPhrase, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn accepts_ordinary_phrases() {
        let v = validator();
        assert!(v.validate("free cake forever").await.is_ok());
        assert!(v.validate("kiss the bride").await.is_ok());
    }

    #[tokio::test]
    async fn rejects_word_count_violations() {
        let v = validator();
        assert!(reason(v.validate("cake").await).contains("at least"));
        assert!(
            reason(v.validate("one two three four five six").await).contains("at most")
        );
    }

    #[tokio::test]
    async fn rejects_malformed_words() {
        let v = validator();
        assert!(v.validate("c4ke time").await.is_err());
        assert!(v.validate("a cake").await.is_err());
        assert!(v.validate("supercalifragilistic cake").await.is_err());
        assert!(v.validate("it's fine").await.is_ok());
    }

    #[tokio::test]
    async fn prompt_phrase_rejects_significant_reuse() {
        let v = validator();
        let prompt = "things you shout at a wedding";
        assert!(
            v.validate_prompt_phrase("wedding cake", prompt)
                .await
                .is_err()
        );
        // "that" is common, so reusing it is fine
        assert!(
            v.validate_prompt_phrase("throw that rice", prompt)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn copy_rejects_identity_and_reuse() {
        let v = validator();
        let err = v
            .validate_copy("kiss the bride", "kiss the bride", None, None)
            .await;
        assert!(reason(err).contains("identical"));
        let err = v
            .validate_copy("bride runs fast", "kiss the bride", None, None)
            .await;
        assert!(reason(err).contains("bride"));
        assert!(
            v.validate_copy(
                "free cake forever",
                "kiss the bride",
                Some("run while able"),
                Some("things you shout at a wedding"),
            )
            .await
            .is_ok()
        );
    }

    #[tokio::test]
    async fn copy_rejects_reuse_from_other_copy() {
        let v = validator();
        let err = v
            .validate_copy(
                "cake for everyone",
                "kiss the bride",
                Some("free cake forever"),
                None,
            )
            .await;
        assert!(reason(err).contains("cake"));
    }

    #[tokio::test]
    async fn backronym_checks_initials_in_order() {
        let v = validator();
        let good: Vec<String> = ["Fuzzy", "Rodents", "Often", "Giggle"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(v.validate_backronym_words(&good, "FROG").await.is_ok());
        let bad: Vec<String> = ["Fuzzy", "Giggle", "Often", "Rodents"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(v.validate_backronym_words(&bad, "FROG").await.is_err());
        let short: Vec<String> = ["Fuzzy", "Rodents"].iter().map(|s| s.to_string()).collect();
        assert!(v.validate_backronym_words(&short, "FROG").await.is_err());
    }

    #[tokio::test]
    async fn dictionary_gates_when_present() {
        let v = validator().with_dictionary(["free", "cake", "forever"].map(String::from));
        assert!(v.validate("free cake").await.is_ok());
        assert!(v.validate("weird cake").await.is_err());
    }
}
