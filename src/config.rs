//! Configuration loading and management

use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::recognition::WakePolicy;
use crate::speech::Voice;

/// Which side owns the interaction state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Client decides transitions and calls `POST /procesar`
    #[default]
    Local,
    /// Backend owns the state over a persistent channel
    Remote,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Mode::Local),
            "remote" => Ok(Mode::Remote),
            other => bail!("unknown mode '{other}' (expected 'local' or 'remote')"),
        }
    }
}

/// Delays and timeouts driving the state machine
#[derive(Debug, Clone)]
pub struct Timings {
    /// Silence allowed while listening before an idle filler
    pub idle_timeout: Duration,
    /// Random idle window used when the backend owns the state
    pub remote_idle: Range<Duration>,
    /// Pause between the end of speech and listening again
    pub resume_delay: Duration,
    /// Backoff before restarting a recognizer that stopped on its own
    pub restart_backoff: Duration,
    /// How long a non-neutral gesture stays before reverting
    pub gesture_hold: Duration,
    /// Longest an utterance may go without a completion notification
    pub speech_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            remote_idle: Duration::from_secs(8)..Duration::from_secs(18),
            resume_delay: Duration::from_millis(300),
            restart_backoff: Duration::from_millis(800),
            gesture_hold: Duration::from_secs(4),
            speech_timeout: Duration::from_secs(30),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,

    /// Base URL of the request/response backend
    pub backend_url: String,

    /// Timeout for one backend request
    pub backend_timeout: Duration,

    /// WebSocket URL of the persistent channel
    pub channel_url: String,

    /// Delay between reconnection attempts on the persistent channel
    pub reconnect_delay: Duration,

    pub wake_policy: WakePolicy,

    /// Voices the console speaker advertises
    pub voices: Vec<Voice>,

    /// URL prefix of the gesture videos
    pub asset_base: String,

    pub timings: Timings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            backend_url: "http://127.0.0.1:5000".to_string(),
            backend_timeout: Duration::from_secs(15),
            channel_url: "ws://127.0.0.1:5000/ws".to_string(),
            reconnect_delay: Duration::from_secs(5),
            wake_policy: WakePolicy::default(),
            voices: vec![
                Voice::new("Paulina", "es-MX"),
                Voice::new("Samantha", "en-US"),
            ],
            asset_base: "/static/videos".to_string(),
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("AVATAR_MODE") {
            config.mode = mode.parse::<Mode>()?;
        }
        if let Some(url) = lookup("AVATAR_BACKEND_URL") {
            config.backend_url = url;
        }
        if let Some(url) = lookup("AVATAR_CHANNEL_URL") {
            config.channel_url = url;
        }
        if let Some(policy) = lookup("AVATAR_WAKE_POLICY") {
            config.wake_policy = policy.parse::<WakePolicy>().map_err(anyhow::Error::msg)?;
        }
        if let Some(voices) = lookup("AVATAR_VOICES") {
            config.voices = parse_voices(&voices)?;
        }
        if let Some(base) = lookup("AVATAR_ASSET_BASE") {
            config.asset_base = base;
        }
        if let Some(ms) = lookup("AVATAR_IDLE_TIMEOUT_MS") {
            config.timings.idle_timeout = parse_millis("AVATAR_IDLE_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("AVATAR_SPEECH_TIMEOUT_MS") {
            config.timings.speech_timeout = parse_millis("AVATAR_SPEECH_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("AVATAR_BACKEND_TIMEOUT_MS") {
            config.backend_timeout = parse_millis("AVATAR_BACKEND_TIMEOUT_MS", &ms)?;
        }

        Ok(config)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number of milliseconds"))?;
    if ms == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}

/// Parse `name:locale` pairs separated by commas
fn parse_voices(value: &str) -> Result<Vec<Voice>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<Voice> {
            let (name, locale) = entry
                .rsplit_once(':')
                .with_context(|| format!("voice '{entry}' must look like name:locale"))?;
            Ok(Voice::new(name.trim(), locale.trim()))
        })
        .collect()
}
