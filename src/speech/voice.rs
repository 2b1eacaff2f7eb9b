//! Synthesis voice selection
//!
//! Picks the platform voice the avatar should speak with. The choice is
//! cached and only recomputed when the platform's voice list changes.

use tracing::{debug, info};

use super::utterance::Language;

/// A synthesis voice offered by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Display name, e.g. "Sofia"
    pub name: String,
    /// BCP-47 locale, e.g. "es-MX"
    pub locale: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: locale.into(),
        }
    }

    /// Whether this voice belongs to the given language family
    pub fn speaks(&self, language: Language) -> bool {
        self.locale
            .to_lowercase()
            .starts_with(language.code())
    }
}

/// Ordered preferences used to pick a voice
#[derive(Debug, Clone)]
pub struct VoicePriority {
    /// Token searched (case-insensitively) in voice names
    pub name_token: String,
    pub primary_locale: String,
    pub secondary_locale: String,
    /// Base language family, e.g. "es"
    pub family: String,
}

impl Default for VoicePriority {
    fn default() -> Self {
        Self {
            name_token: "sofia".to_string(),
            primary_locale: "es-BO".to_string(),
            secondary_locale: "es-MX".to_string(),
            family: "es".to_string(),
        }
    }
}

/// Select a voice from `voices`.
///
/// Priority: name token, primary locale, secondary locale, language family.
/// Returns `None` when nothing matches, leaving the platform default in place.
pub fn select_voice<'a>(voices: &'a [Voice], priority: &VoicePriority) -> Option<&'a Voice> {
    let token = priority.name_token.to_lowercase();

    voices
        .iter()
        .find(|v| !token.is_empty() && v.name.to_lowercase().contains(&token))
        .or_else(|| voices.iter().find(|v| v.locale == priority.primary_locale))
        .or_else(|| voices.iter().find(|v| v.locale == priority.secondary_locale))
        .or_else(|| voices.iter().find(|v| v.locale.contains(&priority.family)))
}

/// Cached voice choice, refreshed when the available voices change
#[derive(Debug, Default)]
pub struct VoicePreference {
    priority: VoicePriority,
    /// Voice list the cached choice was computed from
    snapshot: Option<Vec<Voice>>,
    resolved: Option<Voice>,
}

impl VoicePreference {
    pub fn new(priority: VoicePriority) -> Self {
        Self {
            priority,
            snapshot: None,
            resolved: None,
        }
    }

    /// Re-resolve against `voices` if they differ from the last list seen.
    ///
    /// Returns true when a resolution actually ran.
    pub fn refresh(&mut self, voices: &[Voice]) -> bool {
        if self.snapshot.as_deref() == Some(voices) {
            debug!("voice list unchanged, keeping cached voice");
            return false;
        }

        self.resolved = select_voice(voices, &self.priority).cloned();
        self.snapshot = Some(voices.to_vec());

        info!(
            available = voices.len(),
            voice = ?self.resolved.as_ref().map(|v| v.name.as_str()),
            "voice preference resolved"
        );
        true
    }

    /// Currently preferred voice, if any
    pub fn voice(&self) -> Option<&Voice> {
        self.resolved.as_ref()
    }

    /// Voice to use for `language`, only if it actually speaks that language
    pub fn voice_for(&self, language: Language) -> Option<&Voice> {
        self.voice().filter(|v| v.speaks(language))
    }

    /// Locale tag for speaking in `language`
    pub fn language_tag(&self, language: Language) -> String {
        match self.voice_for(language) {
            Some(voice) => voice.locale.clone(),
            None => language.default_locale().to_string(),
        }
    }
}
