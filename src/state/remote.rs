//! Projection of a backend-owned interaction state
//!
//! When the backend runs recognition and synthesis itself, the client only
//! mirrors its state pushes, drives the gesture display and nudges the backend
//! with intents. It never synthesizes speech.

use std::ops::Range;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::backend::{ClientIntent, IntentSink, ServerPush};
use crate::events::AvatarEvent;
use crate::gesture::{Gesture, GestureDisplay, GestureSurface};
use crate::speech::Language;

use super::machine::State;
use super::timer::TimerSlot;

/// Events delivered to the projector
#[derive(Debug)]
pub enum RemoteEvent {
    /// Bootstrap: ask the backend to start listening
    Start,
    /// Notification from the backend
    Push(ServerPush),
    /// Random idle window elapsed
    IdleTimeout { generation: u64 },
    /// Hold time of a non-neutral gesture elapsed
    GestureRevert { generation: u64 },
}

/// Client side of a backend-owned interaction
pub struct RemoteProjector {
    state: State,
    language: Language,
    state_entered_at: Instant,
    started: bool,

    sink: Box<dyn IntentSink>,
    gestures: GestureDisplay,
    idle_window: Range<Duration>,
    idle_timer: TimerSlot,

    events_tx: mpsc::UnboundedSender<RemoteEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<RemoteEvent>>,
    notify_tx: broadcast::Sender<AvatarEvent>,
}

impl RemoteProjector {
    /// Create a projector emitting intents on `sink`
    pub fn new(
        sink: Box<dyn IntentSink>,
        gestures: GestureDisplay,
        idle_window: Range<Duration>,
        notify_tx: broadcast::Sender<AvatarEvent>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            state: State::Idle,
            language: Language::default(),
            state_entered_at: Instant::now(),
            started: false,
            sink,
            gestures,
            idle_window,
            idle_timer: TimerSlot::new("remote-idle"),
            events_tx,
            events_rx: Some(events_rx),
            notify_tx,
        }
    }

    /// Convenience constructor for a projector drawing on `surface`
    pub fn with_surface(
        sink: Box<dyn IntentSink>,
        surface: Option<Box<dyn GestureSurface>>,
        asset_base: impl Into<String>,
        gesture_hold: Duration,
        idle_window: Range<Duration>,
        notify_tx: broadcast::Sender<AvatarEvent>,
    ) -> Self {
        let gestures = GestureDisplay::new(surface, asset_base, gesture_hold);
        Self::new(sink, gestures, idle_window, notify_tx)
    }

    /// Last state pushed by the backend
    pub fn state(&self) -> State {
        self.state
    }

    /// Last language reported by the backend
    pub fn language(&self) -> Language {
        self.language
    }

    /// Handle for feeding events (e.g. `RemoteEvent::Start`) from outside
    pub fn sender(&self) -> mpsc::UnboundedSender<RemoteEvent> {
        self.events_tx.clone()
    }

    /// Run until the push stream and every event sender are gone
    pub async fn run(&mut self, mut pushes: mpsc::Receiver<ServerPush>) {
        let Some(mut events_rx) = self.events_rx.take() else {
            warn!("remote projector is already running");
            return;
        };

        info!("remote projector started");

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => self.handle(event),
                Some(push) = pushes.recv() => self.handle(RemoteEvent::Push(push)),
                else => break,
            }
        }

        info!("remote projector stopped");
    }

    /// Handle one event
    pub fn handle(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Start => self.start(),
            RemoteEvent::Push(push) => self.on_push(push),
            RemoteEvent::IdleTimeout { generation } => {
                if !self.idle_timer.fire(generation) || self.state != State::Listening {
                    debug!(generation, "stale remote idle timer ignored");
                    return;
                }
                self.emit(ClientIntent::IdleSpeak {
                    idioma: self.language,
                });
                self.arm_idle();
            }
            RemoteEvent::GestureRevert { generation } => {
                if self.gestures.revert_due(generation, self.state == State::Speaking) {
                    self.notify(AvatarEvent::GestureShown {
                        gesture: Gesture::neutral(),
                    });
                }
            }
        }
    }

    /// Ask the backend to stop listening and drop pending timers
    pub fn shutdown(&mut self) {
        self.idle_timer.disarm();
        self.gestures.cancel_revert();
        if self.started {
            self.emit(ClientIntent::StopListening {});
        }
        info!(state = %self.state, "remote projector shut down");
    }

    fn start(&mut self) {
        if self.started {
            debug!("remote projector already started");
            return;
        }
        self.started = true;
        self.gestures.hide_overlay();
        self.emit(ClientIntent::StartListening {});
        self.project(State::Listening);
    }

    fn on_push(&mut self, push: ServerPush) {
        match push {
            ServerPush::Status { message } => info!(%message, "backend status"),

            ServerPush::StateChanged { state } => self.project(state),

            ServerPush::IdiomaDetectado { idioma } => {
                self.adopt_language(Language::from_code(&idioma));
            }

            ServerPush::WakeWordDetected { texto } => {
                info!(%texto, "backend heard the wake word");
                self.idle_timer.disarm();
                self.notify(AvatarEvent::WakeWordDetected { text: texto });
                self.show_gesture(&Gesture::processing());
            }

            ServerPush::IaResponse(reply) => {
                let utterance = reply.into_utterance();
                info!(text = %utterance.text, "backend response");
                self.adopt_language(utterance.language);
                self.show_gesture(&utterance.gesture);
            }

            ServerPush::SpeakingDone {} => self.project(State::Listening),
        }
    }

    /// Mirror a backend state; the idle timer only runs while Listening
    fn project(&mut self, state: State) {
        if state != self.state {
            let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
            info!(from = %self.state, to = %state, duration_ms, "projected state transition");
            self.notify(AvatarEvent::StateChanged {
                from: self.state,
                to: state,
            });
            self.state = state;
            self.state_entered_at = Instant::now();
        }

        if state == State::Listening {
            self.arm_idle();
        } else {
            self.idle_timer.disarm();
        }
    }

    fn arm_idle(&mut self) {
        let after = if self.idle_window.is_empty() {
            self.idle_window.start
        } else {
            rand::thread_rng().gen_range(self.idle_window.clone())
        };
        debug!(after_ms = after.as_millis() as u64, "remote idle timer armed");
        self.idle_timer.arm(after, self.events_tx.clone(), |generation| {
            RemoteEvent::IdleTimeout { generation }
        });
    }

    fn adopt_language(&mut self, language: Language) {
        if self.language != language {
            info!(from = %self.language, to = %language, "language changed");
            self.language = language;
            self.notify(AvatarEvent::LanguageChanged { language });
        }
    }

    fn show_gesture(&mut self, gesture: &Gesture) {
        if self
            .gestures
            .show(gesture, &self.events_tx, |generation| RemoteEvent::GestureRevert { generation })
        {
            self.notify(AvatarEvent::GestureShown {
                gesture: gesture.clone(),
            });
        }
    }

    fn emit(&self, intent: ClientIntent) {
        match self.sink.emit(intent.clone()) {
            Ok(()) => self.notify(AvatarEvent::IntentSent { intent }),
            Err(e) => warn!(?e, %intent, "failed to emit intent"),
        }
    }

    fn notify(&self, event: AvatarEvent) {
        debug!(%event, "emitting avatar event");
        let _ = self.notify_tx.send(event);
    }
}
