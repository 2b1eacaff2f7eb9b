//! Spoken content and the languages the avatar can speak

use serde::{Deserialize, Serialize};

use crate::gesture::Gesture;

/// Conversation language, as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Spanish (the avatar's home language)
    #[default]
    Es,
    /// English
    En,
}

impl Language {
    /// Parse a backend language code, falling back to Spanish for anything unknown
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "en" => Language::En,
            _ => Language::Es,
        }
    }

    /// Two-letter code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }

    /// Locale used for synthesis when no matching voice was resolved
    pub fn default_locale(&self) -> &'static str {
        match self {
            Language::Es => "es-MX",
            Language::En => "en-US",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Something for the avatar to say, with the gesture to show while saying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub language: Language,
    pub gesture: Gesture,
}

impl Utterance {
    pub fn new(text: impl Into<String>, language: Language, gesture: Gesture) -> Self {
        Self {
            text: text.into(),
            language,
            gesture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_code() {
        assert_eq!(Language::from_code("en"), Language::En);
        assert_eq!(Language::from_code(" EN "), Language::En);
        assert_eq!(Language::from_code("es"), Language::Es);
        assert_eq!(Language::from_code("fr"), Language::Es);
        assert_eq!(Language::from_code(""), Language::Es);
    }

    #[test]
    fn test_default_locale() {
        assert_eq!(Language::Es.default_locale(), "es-MX");
        assert_eq!(Language::En.default_locale(), "en-US");
    }
}
