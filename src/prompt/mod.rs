//! Prompt cleaning before a message consumes tokenizer or completion quota

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Prompt cleaning errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("Prompt is empty or consists only of unsupported characters")]
    Empty,
}

/// Cleaner trait for different sanitization strategies
pub trait PromptCleaner: Send + Sync {
    /// Return the cleaned prompt, or `SanitizeError::Empty` if nothing is left
    fn clean(&self, prompt: &str) -> Result<String, SanitizeError>;
}

// Keycap sequences as a whole, then pictographs plus the joiners, selectors
// and modifiers that glue emoji sequences.
static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9#*]\u{FE0F}?\u{20E3}|[\p{Extended_Pictographic}\p{Emoji_Modifier}\p{Regional_Indicator}\u{FE0F}\u{FE0E}\u{200D}\u{20E3}\u{E0020}-\u{E007F}]")
        .expect("emoji pattern is valid")
});

static NONSPACING_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{Mn}").expect("mark pattern is valid"));

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}_\s.,!?-]").expect("symbol pattern is valid"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Default cleaner: strips emoji, diacritics and symbols, collapses whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptSanitizer;

impl PromptSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl PromptCleaner for PromptSanitizer {
    fn clean(&self, prompt: &str) -> Result<String, SanitizeError> {
        debug!("Cleaning prompt: {}", prompt);

        let without_emoji = EMOJI.replace_all(prompt, "");

        let decomposed: String = without_emoji.nfd().collect();
        let without_marks = NONSPACING_MARK.replace_all(&decomposed, "");

        let without_symbols = DISALLOWED.replace_all(&without_marks, "");
        let cleaned = WHITESPACE.replace_all(&without_symbols, " ").trim().to_string();

        if cleaned.is_empty() {
            return Err(SanitizeError::Empty);
        }

        debug!("Cleaned prompt: {}", cleaned);
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(text: &str) -> Result<String, SanitizeError> {
        PromptSanitizer::new().clean(text)
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert_eq!(clean(""), Err(SanitizeError::Empty));
        assert_eq!(clean("   "), Err(SanitizeError::Empty));
        assert_eq!(clean("😀😀"), Err(SanitizeError::Empty));
        assert_eq!(clean("#$%^&*"), Err(SanitizeError::Empty));
    }

    #[test]
    fn test_emoji_removed_punctuation_kept() {
        assert_eq!(clean("Hello, world!!! 😀").unwrap(), "Hello, world!!!");
        assert_eq!(clean("Is it ready? 👍🏽 yes-no.").unwrap(), "Is it ready? yes-no.");
    }

    #[test]
    fn test_emoji_sequences_removed() {
        // ZWJ family and a flag
        assert_eq!(clean("family 👨‍👩‍👧 trip 🇷🇺").unwrap(), "family trip");
        assert_eq!(clean("love ❤️ it").unwrap(), "love it");
    }

    #[test]
    fn test_diacritics_stripped() {
        assert_eq!(clean("Café crème brûlée").unwrap(), "Cafe creme brulee");
        // Cyrillic short i decomposes into и + breve
        assert_eq!(clean("Привет, мой друг!").unwrap(), "Привет, мои друг!");
    }

    #[test]
    fn test_symbols_removed_and_whitespace_collapsed() {
        assert_eq!(clean("  price:   100$ \n\t (approx)  ").unwrap(), "price 100 approx");
        assert_eq!(clean("snake_case stays").unwrap(), "snake_case stays");
    }

    #[test]
    fn test_keycap_sequences_removed_whole() {
        assert_eq!(clean("Press 1\u{FE0F}\u{20E3} or #\u{FE0F}\u{20E3} now").unwrap(), "Press or now");
        assert_eq!(clean("room 2\u{20E3} 12").unwrap(), "room 12");
    }

    #[test]
    fn test_word_characters_are_letters_digits_underscore() {
        // U+093E is a spacing mark (Mc), U+203F connector punctuation
        assert_eq!(clean("\u{915}\u{93E}").unwrap(), "\u{915}");
        assert_eq!(clean("a\u{203F}b c_d").unwrap(), "ab c_d");
        assert_eq!(clean("Ⅻ ½ ٣").unwrap(), "Ⅻ ½ ٣");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = clean("Héllo 🌍 — wörld?!").unwrap();
        assert_eq!(clean(&once).unwrap(), once);
    }
}
