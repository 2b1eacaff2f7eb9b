//! voice-avatar: wake-word driven talking avatar client
//!
//! This binary provides:
//! - An explicit state machine arbitrating listening, thinking and speaking
//! - Wake-word detection over recognizer transcripts
//! - Spoken responses and idle fillers with matching avatar gestures
//! - A request/response backend, or a persistent channel to a backend that
//!   owns the interaction state (`AVATAR_MODE=remote`)
//!
//! The local adapters are deliberately plain: transcripts are read from
//! stdin (one line per result, `|` between segments), speech and gestures are
//! written to the log.

mod backend;
mod config;
mod events;
mod gesture;
mod lifecycle;
mod recognition;
mod speech;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::backend::HttpBackend;
use crate::config::{Config, Mode};
use crate::events::AvatarEvent;
use crate::gesture::LogSurface;
use crate::lifecycle::ShutdownSignal;
use crate::recognition::StdinRecognizer;
use crate::speech::ConsoleSpeaker;
use crate::state::{Adapters, Event, RemoteEvent, RemoteProjector, Settings, StateMachine};

/// How long to wait for the channel task to flush its last intent
const CHANNEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-avatar starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(mode = ?config.mode, wake_policy = ?config.wake_policy, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // State machine / projector -> observers
    let (event_tx, event_rx) = broadcast::channel::<AvatarEvent>(64);

    match config.mode {
        Mode::Local => run_local(&config, event_tx, event_rx, &shutdown).await?,
        Mode::Remote => run_remote(&config, event_tx, event_rx, &shutdown).await,
    }

    info!("voice-avatar stopped");

    Ok(())
}

/// Client-owned state: recognition, backend calls and speech happen here
async fn run_local(
    config: &Config,
    event_tx: broadcast::Sender<AvatarEvent>,
    event_rx: broadcast::Receiver<AvatarEvent>,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    // Recognizer -> State machine
    let (recognition_tx, recognition_rx) = mpsc::channel(32);

    let backend = HttpBackend::new(&config.backend_url, config.backend_timeout)?;
    info!(endpoint = backend.endpoint(), "using request/response backend");

    let adapters = Adapters {
        recognizer: Box::new(StdinRecognizer::new(recognition_tx)),
        speaker: Box::new(ConsoleSpeaker::new(config.voices.clone())),
        surface: Some(Box::new(LogSurface)),
        backend: Arc::new(backend),
    };

    let mut state_machine = StateMachine::new(Settings::from_config(config)?, adapters, event_tx);

    // No start overlay to click on; begin listening immediately
    if state_machine.sender().send(Event::Start).is_err() {
        warn!("state machine inbox closed before start");
    }

    info!("client initialized, entering main loop");

    tokio::select! {
        _ = state_machine.run(recognition_rx) => {
            info!("state machine exited");
        }

        _ = log_events(event_rx) => {
            info!("event logger exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");
    state_machine.shutdown();

    Ok(())
}

/// Backend-owned state: mirror it and nudge the backend with intents
async fn run_remote(
    config: &Config,
    event_tx: broadcast::Sender<AvatarEvent>,
    event_rx: broadcast::Receiver<AvatarEvent>,
    shutdown: &ShutdownSignal,
) {
    let (handle, pushes, channel_task) =
        backend::connect(config.channel_url.clone(), config.reconnect_delay);
    info!(url = %config.channel_url, "using persistent backend channel");

    let mut projector = RemoteProjector::with_surface(
        Box::new(handle),
        Some(Box::new(LogSurface)),
        config.asset_base.clone(),
        config.timings.gesture_hold,
        config.timings.remote_idle.clone(),
        event_tx,
    );

    if projector.sender().send(RemoteEvent::Start).is_err() {
        warn!("projector inbox closed before start");
    }

    info!("client initialized, entering main loop");

    tokio::select! {
        _ = projector.run(pushes) => {
            info!("remote projector exited");
        }

        _ = log_events(event_rx) => {
            info!("event logger exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");
    projector.shutdown();

    // Dropping the projector drops the last intent handle, which lets the
    // channel task send `stop_listening` and close.
    drop(projector);
    if tokio::time::timeout(CHANNEL_DRAIN_TIMEOUT, channel_task).await.is_err() {
        warn!("backend channel did not close in time");
    }
}

async fn log_events(mut event_rx: broadcast::Receiver<AvatarEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                info!(%event, "avatar event");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "avatar event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                break;
            }
        }
    }
}
