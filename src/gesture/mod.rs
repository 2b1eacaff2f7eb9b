//! Gesture display for the avatar video surface
//!
//! The neutral gesture loops forever. Any other gesture plays once and falls
//! back to neutral after a hold period, unless the owner is speaking by then.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::state::TimerSlot;

/// Tag of the looping idle animation
pub const NEUTRAL: &str = "lado";

/// Tag shown while the backend is working on a request
pub const PROCESSING: &str = "sospecha";

/// Named animation cue, mapped to a video asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gesture(String);

impl Gesture {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn neutral() -> Self {
        Self::new(NEUTRAL)
    }

    pub fn processing() -> Self {
        Self::new(PROCESSING)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_neutral(&self) -> bool {
        self.0 == NEUTRAL
    }
}

impl Default for Gesture {
    fn default() -> Self {
        Self::neutral()
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where gestures are rendered: the avatar video and the start overlay
pub trait GestureSurface: Send {
    /// Load and play `asset`, looping if requested
    fn play(&mut self, asset: &str, looping: bool);

    /// Hide the "press to start" overlay
    fn hide_overlay(&mut self);
}

/// Surface that only logs what would be shown
#[derive(Debug, Default)]
pub struct LogSurface;

impl GestureSurface for LogSurface {
    fn play(&mut self, asset: &str, looping: bool) {
        info!(asset, looping, "avatar video switched");
    }

    fn hide_overlay(&mut self) {
        debug!("start overlay hidden");
    }
}

/// Tracks the displayed gesture and its pending reversion
pub struct GestureDisplay {
    surface: Option<Box<dyn GestureSurface>>,
    asset_base: String,
    hold: Duration,
    current: Option<Gesture>,
    revert: TimerSlot,
}

impl GestureDisplay {
    /// Create a display; a `None` surface turns every call into a no-op
    pub fn new(
        surface: Option<Box<dyn GestureSurface>>,
        asset_base: impl Into<String>,
        hold: Duration,
    ) -> Self {
        Self {
            surface,
            asset_base: asset_base.into(),
            hold,
            current: None,
            revert: TimerSlot::new("gesture-revert"),
        }
    }

    /// Asset path for a gesture tag
    pub fn asset_path(&self, gesture: &Gesture) -> String {
        format!("{}/{}.mp4", self.asset_base.trim_end_matches('/'), gesture.as_str())
    }

    /// Gesture currently on screen
    pub fn current(&self) -> Option<&Gesture> {
        self.current.as_ref()
    }

    /// Show `gesture`, scheduling a revert event for non-neutral tags.
    ///
    /// Returns true if the surface actually switched assets.
    pub fn show<E, F>(
        &mut self,
        gesture: &Gesture,
        tx: &mpsc::UnboundedSender<E>,
        on_revert: F,
    ) -> bool
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        let switched = self.switch_to(gesture);

        if gesture.is_neutral() {
            self.revert.disarm();
        } else {
            self.revert.arm(self.hold, tx.clone(), on_revert);
        }

        switched
    }

    /// Handle a revert firing. `speaking` suppresses the reversion.
    ///
    /// Returns true if the neutral gesture was restored.
    pub fn revert_due(&mut self, generation: u64, speaking: bool) -> bool {
        if !self.revert.fire(generation) {
            debug!(generation, "stale gesture revert ignored");
            return false;
        }
        if speaking {
            debug!("gesture revert suppressed while speaking");
            return false;
        }
        self.switch_to(&Gesture::neutral())
    }

    /// Hide the start overlay, if there is a surface
    pub fn hide_overlay(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.hide_overlay();
        }
    }

    pub fn cancel_revert(&mut self) {
        self.revert.disarm();
    }

    fn switch_to(&mut self, gesture: &Gesture) -> bool {
        if self.current() == Some(gesture) {
            return false;
        }

        let asset = self.asset_path(gesture);
        let Some(surface) = self.surface.as_mut() else {
            debug!(gesture = %gesture, "no avatar surface, gesture skipped");
            return false;
        };

        surface.play(&asset, gesture.is_neutral());
        self.current = Some(gesture.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSurface {
        played: Arc<Mutex<Vec<(String, bool)>>>,
    }

    impl GestureSurface for RecordingSurface {
        fn play(&mut self, asset: &str, looping: bool) {
            self.played.lock().unwrap().push((asset.to_string(), looping));
        }

        fn hide_overlay(&mut self) {}
    }

    fn display() -> (GestureDisplay, RecordingSurface) {
        let surface = RecordingSurface::default();
        let display = GestureDisplay::new(
            Some(Box::new(surface.clone())),
            "/static/videos",
            Duration::from_secs(4),
        );
        (display, surface)
    }

    #[test]
    fn test_asset_path() {
        let (display, _) = display();
        assert_eq!(display.asset_path(&Gesture::new("lado")), "/static/videos/lado.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_gesture_does_not_reload() {
        let (mut display, surface) = display();
        let (tx, _rx) = mpsc::unbounded_channel::<u64>();

        assert!(display.show(&Gesture::neutral(), &tx, |g| g));
        assert!(!display.show(&Gesture::neutral(), &tx, |g| g));
        assert_eq!(
            *surface.played.lock().unwrap(),
            vec![("/static/videos/lado.mp4".to_string(), true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_neutral_reverts_after_hold() {
        let (mut display, surface) = display();
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();

        display.show(&Gesture::new("feliz"), &tx, |g| g);
        let generation = rx.recv().await.unwrap();
        assert!(display.revert_due(generation, false));

        let played = surface.played.lock().unwrap().clone();
        assert_eq!(
            played,
            vec![
                ("/static/videos/feliz.mp4".to_string(), false),
                ("/static/videos/lado.mp4".to_string(), true),
            ]
        );
        assert!(display.current().unwrap().is_neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_suppressed_while_speaking() {
        let (mut display, _) = display();
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();

        display.show(&Gesture::new("feliz"), &tx, |g| g);
        let generation = rx.recv().await.unwrap();
        assert!(!display.revert_due(generation, true));
        assert_eq!(display.current().unwrap().as_str(), "feliz");
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_revert_counts() {
        let (mut display, _) = display();
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();

        display.show(&Gesture::new("feliz"), &tx, |g| g);
        display.show(&Gesture::new("triste"), &tx, |g| g);
        let generation = rx.recv().await.unwrap();
        assert!(display.revert_due(generation, false));
        assert!(!display.revert_due(generation - 1, false));
    }

    #[tokio::test]
    async fn test_missing_surface_is_noop() {
        let mut display = GestureDisplay::new(None, "/static/videos", Duration::from_secs(4));
        let (tx, _rx) = mpsc::unbounded_channel::<u64>();
        assert!(!display.show(&Gesture::new("feliz"), &tx, |g| g));
        display.hide_overlay();
        assert!(display.current().is_none());
    }
}
