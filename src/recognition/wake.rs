//! Wake word matching and transcript assembly

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Words that wake the avatar up
pub const WAKE_WORDS: &[&str] = &["dinner", "diner"];

/// How strictly the wake word must stand on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakePolicy {
    /// Substring match anywhere in the transcript ("dinnertime" wakes)
    #[default]
    Tolerant,
    /// Whole-word match only
    Strict,
}

impl std::str::FromStr for WakePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tolerant" => Ok(WakePolicy::Tolerant),
            "strict" => Ok(WakePolicy::Strict),
            other => Err(format!("unknown wake policy '{other}'")),
        }
    }
}

/// Tests transcripts for the wake word
#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    policy: WakePolicy,
    pattern: Regex,
}

impl WakeWordMatcher {
    pub fn new(policy: WakePolicy) -> Result<Self, regex::Error> {
        let alternatives = WAKE_WORDS
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = match policy {
            WakePolicy::Tolerant => format!("(?i)({alternatives})"),
            WakePolicy::Strict => format!(r"(?i)\b({alternatives})\b"),
        };

        Ok(Self {
            policy,
            pattern: Regex::new(&pattern)?,
        })
    }

    pub fn policy(&self) -> WakePolicy {
        self.policy
    }

    /// Whether the (already normalized) transcript contains the wake word
    pub fn matches(&self, transcript: &str) -> bool {
        self.pattern.is_match(transcript)
    }
}

/// Join every segment from `result_index` on into one normalized transcript.
///
/// Segments before `result_index` were already reported by earlier events.
pub fn collect_transcript(result_index: usize, segments: &[String]) -> String {
    segments
        .iter()
        .skip(result_index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
