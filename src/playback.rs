// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, span, warn, Instrument, Level, Span};

use crate::{
    engine::{EngineError, EngineEvent, PatternEngine},
    export::SampleBuffer,
    playsync::CancelHandle,
    session::{Phase, SessionError, SessionSnapshot, SessionState},
};

const EVENT_BUFFER: usize = 32;

/// Pattern text supplied before the engine was ready.
struct PendingPattern {
    code: String,
    autoplay: bool,
}

struct Inner {
    state: SessionState,
    /// Applied exactly once when the session becomes ready.
    pending: Option<PendingPattern>,
    /// The last pattern forwarded to the engine. Reset re-applies it.
    current_code: Option<String>,
    /// True while an initialize call is waiting on the engine.
    booting: bool,
    /// The in-flight capture, if any.
    capture: Option<CancelHandle>,
    disposed: bool,
}

/// State shared between the controller and its engine event monitor.
struct Shared {
    inner: Mutex<Inner>,
    snapshots: watch::Sender<SessionSnapshot>,
    engine: Arc<dyn PatternEngine>,
}

impl Shared {
    /// Publishes a snapshot of the current state to observers.
    fn publish(&self, inner: &Inner) {
        self.snapshots.send_replace(inner.state.snapshot());
    }

    /// Moves the session into the error phase. Returns the initialization error for the cause.
    fn fail(&self, cause: &str) -> SessionError {
        let mut inner = self.inner.lock();
        let from = inner.state.phase();
        inner.booting = false;
        if let Some(capture) = inner.capture.take() {
            capture.cancel();
        }
        if from == Phase::Started {
            self.engine.stop();
        }
        inner.state.mark_error(cause);
        self.publish(&inner);

        error!(from = from.to_string(), cause, "Session failed.");
        SessionError::Initialization(cause.to_string())
    }

    /// Starts scheduling. Must be called with the inner lock held.
    fn start(&self, inner: &mut Inner) -> Result<(), SessionError> {
        inner.state.expect_phase("play", &[Phase::Ready])?;
        self.engine.start()?;
        inner.state.mark_started()?;
        info!(from = "ready", to = "started", "Playback started.");
        Ok(())
    }

    /// Completes the Loading -> Ready transition and applies any pending pattern.
    fn become_ready(&self) -> Result<Phase, SessionError> {
        let mut inner = self.inner.lock();
        inner.booting = false;
        inner.state.mark_ready()?;
        info!(from = "loading", to = "ready", "Engine is ready.");

        if let Some(pending) = inner.pending.take() {
            match self.engine.evaluate(&pending.code) {
                Ok(()) => {
                    info!(autoplay = pending.autoplay, "Applied pending pattern.");
                    inner.current_code = Some(pending.code);
                    if pending.autoplay {
                        if let Err(e) = self.start(&mut inner) {
                            error!(err = e.to_string(), "Error starting pending pattern");
                            inner
                                .state
                                .set_status(&format!("Pattern not started: {}", e));
                        }
                    }
                }
                Err(e) => {
                    error!(err = e.to_string(), "Error applying pending pattern");
                    inner
                        .state
                        .set_status(&format!("Pattern not applied: {}", e));
                }
            }
        }

        self.publish(&inner);
        Ok(inner.state.phase())
    }

    /// Watches engine events after boot until the channel closes or the engine fails.
    async fn monitor(shared: Arc<Shared>, mut events_rx: mpsc::Receiver<EngineEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                EngineEvent::Cycle(cycle) => debug!(cycle, "Cycle started."),
                EngineEvent::Failed(cause) => {
                    shared.fail(&cause);
                    return;
                }
                EngineEvent::Progress(..) | EngineEvent::Ready => {
                    debug!(event = format!("{:?}", event), "Ignoring boot event after boot.")
                }
            }
        }
        info!("Engine event channel closed.");
    }
}

/// Controls the lifecycle of a single live-coding session. Owns the session state and the
/// session's engine. Observers read state through snapshots.
pub struct PlaybackController {
    shared: Arc<Shared>,
    /// How long initialize waits for the engine.
    boot_timeout: Duration,
    /// Drains engine events once the session is ready.
    monitor: Mutex<Option<JoinHandle<()>>>,
    /// The logging span.
    span: Span,
}

impl PlaybackController {
    /// Creates a new controller in the loading phase. The engine isn't booted until initialize.
    pub fn new(engine: Arc<dyn PatternEngine>, boot_timeout: Duration) -> PlaybackController {
        let state = SessionState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        let span = span!(Level::INFO, "playback", engine = engine.to_string());

        PlaybackController {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state,
                    pending: None,
                    current_code: None,
                    booting: false,
                    capture: None,
                    disposed: false,
                }),
                snapshots,
                engine,
            }),
            boot_timeout,
            monitor: Mutex::new(None),
            span,
        }
    }

    /// Returns a snapshot of the current session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.inner.lock().state.snapshot()
    }

    /// Subscribes to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().state.phase()
    }

    /// The pattern most recently forwarded to the engine.
    pub fn current_pattern(&self) -> Option<String> {
        self.shared.inner.lock().current_code.clone()
    }

    /// The pattern waiting for the engine to become ready.
    pub fn pending_pattern(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .pending
            .as_ref()
            .map(|pending| pending.code.clone())
    }

    /// Returns true if a capture is in flight.
    pub fn is_capturing(&self) -> bool {
        self.shared.inner.lock().capture.is_some()
    }

    /// Boots the engine and waits until it's ready or has failed. Calling this once the session
    /// is ready returns the current phase without booting again.
    pub async fn initialize(&self) -> Result<Phase, SessionError> {
        let events_rx = {
            let mut inner = self.shared.inner.lock();
            match inner.state.phase() {
                Phase::Ready | Phase::Started => return Ok(inner.state.phase()),
                Phase::Error => {
                    return Err(SessionError::Initialization(
                        inner.state.status_message().to_string(),
                    ))
                }
                Phase::Loading if inner.booting => None,
                Phase::Loading => {
                    inner.booting = true;
                    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
                    self.shared.engine.boot(events_tx);
                    Some(events_rx)
                }
            }
        };

        match events_rx {
            Some(events_rx) => self.boot(events_rx).instrument(self.span.clone()).await,
            None => self.wait_for_boot().instrument(self.span.clone()).await,
        }
    }

    async fn boot(&self, mut events_rx: mpsc::Receiver<EngineEvent>) -> Result<Phase, SessionError> {
        info!(timeout = format!("{:?}", self.boot_timeout), "Booting engine.");
        let deadline = Instant::now() + self.boot_timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, events_rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(self.shared.fail("engine stopped before it was ready")),
                Err(_) => {
                    return Err(self.shared.fail(&format!(
                        "engine was not ready within {:?}",
                        self.boot_timeout
                    )))
                }
            };

            match event {
                EngineEvent::Progress(percent, message) => {
                    let mut inner = self.shared.inner.lock();
                    inner.state.set_progress(percent, message.as_deref());
                    self.shared.publish(&inner);
                    debug!(percent, "Boot progress.");
                }
                EngineEvent::Ready => break,
                EngineEvent::Failed(cause) => return Err(self.shared.fail(&cause)),
                EngineEvent::Cycle(_) => {}
            }
        }

        let phase = self.shared.become_ready()?;

        let monitor = tokio::spawn(
            Shared::monitor(self.shared.clone(), events_rx).instrument(self.span.clone()),
        );
        if let Some(previous) = self.monitor.lock().replace(monitor) {
            previous.abort();
        }

        Ok(phase)
    }

    /// Waits for a boot started by another initialize call.
    async fn wait_for_boot(&self) -> Result<Phase, SessionError> {
        info!("Waiting for the engine boot already in progress.");
        let mut snapshots = self.subscribe();
        let waited = tokio::time::timeout(
            self.boot_timeout,
            snapshots.wait_for(|snapshot| snapshot.phase != Phase::Loading),
        )
        .await;

        let snapshot = match waited {
            Ok(Ok(snapshot)) => snapshot.clone(),
            Ok(Err(_)) => return Err(SessionError::Initialization("session closed".to_string())),
            // The booting caller owns the session failure, so only this caller gives up.
            Err(_) => {
                warn!("Gave up waiting for the engine boot.");
                return Err(SessionError::Initialization(format!(
                    "engine was not ready within {:?}",
                    self.boot_timeout
                )));
            }
        };

        match snapshot.phase {
            Phase::Error => Err(SessionError::Initialization(snapshot.status_message)),
            phase => Ok(phase),
        }
    }

    /// Supplies new pattern text. While loading, the text is queued (replacing any queued text)
    /// and applied once the engine is ready. Otherwise it's forwarded to the engine right away,
    /// and autoplay starts playback if the session is ready.
    pub fn set_pattern(&self, code: &str, autoplay: bool) -> Result<(), SessionError> {
        let _enter = self.span.enter();
        let mut inner = self.shared.inner.lock();

        match inner.state.phase() {
            Phase::Loading => {
                if inner.pending.is_some() {
                    debug!("Replacing queued pattern.");
                }
                inner.pending = Some(PendingPattern {
                    code: code.to_string(),
                    autoplay,
                });
                info!(autoplay, "Queued pattern until the engine is ready.");
                Ok(())
            }
            Phase::Ready | Phase::Started => {
                self.shared.engine.evaluate(code)?;
                inner.current_code = Some(code.to_string());
                info!(
                    autoplay,
                    phase = inner.state.phase().to_string(),
                    "Forwarded pattern to engine."
                );

                if autoplay && inner.state.phase() == Phase::Ready {
                    let result = self.shared.start(&mut inner);
                    self.shared.publish(&inner);
                    return result;
                }
                Ok(())
            }
            Phase::Error => Err(self.reject(&inner, "set pattern")),
        }
    }

    /// Starts scheduling audio. Only valid when ready.
    pub fn play(&self) -> Result<(), SessionError> {
        let _enter = self.span.enter();
        let mut inner = self.shared.inner.lock();

        match self.shared.start(&mut inner) {
            Ok(()) => {
                self.shared.publish(&inner);
                Ok(())
            }
            Err(e) => {
                warn!(
                    err = e.to_string(),
                    phase = inner.state.phase().to_string(),
                    "Can't play."
                );
                Err(e)
            }
        }
    }

    /// Halts scheduling, keeping the loaded pattern. Only valid while started.
    pub fn stop(&self) -> Result<(), SessionError> {
        let _enter = self.span.enter();
        let mut inner = self.shared.inner.lock();

        if inner.state.phase() != Phase::Started {
            return Err(self.reject(&inner, "stop"));
        }

        if let Some(capture) = inner.capture.take() {
            capture.cancel();
        }
        self.shared.engine.stop();
        inner.state.mark_stopped()?;
        self.shared.publish(&inner);
        info!(from = "started", to = "ready", "Playback stopped.");
        Ok(())
    }

    /// Halts scheduling, clears the engine's scheduling state and reloads the last pattern.
    /// Cancels any capture in flight. Valid when ready or started. If the pattern can't be
    /// reloaded the reset still succeeds, and the session is left without a current pattern.
    pub fn reset(&self) -> Result<(), SessionError> {
        let _enter = self.span.enter();
        let mut inner = self.shared.inner.lock();

        let from = inner.state.phase();
        if from != Phase::Ready && from != Phase::Started {
            return Err(self.reject(&inner, "reset"));
        }

        if let Some(capture) = inner.capture.take() {
            info!("Cancelling capture in flight.");
            capture.cancel();
        }
        self.shared.engine.clear();
        inner.state.mark_reset()?;
        self.shared.publish(&inner);
        info!(from = from.to_string(), to = "ready", "Session reset.");

        // The engine is already cleared, so a failed reload leaves the session without a
        // pattern rather than failing the reset.
        if let Some(code) = inner.current_code.take() {
            match self.shared.engine.evaluate(&code) {
                Ok(()) => inner.current_code = Some(code),
                Err(e) => {
                    error!(err = e.to_string(), "Error reloading pattern after reset");
                    inner
                        .state
                        .set_status(&format!("Reset, pattern not reloaded: {}", e));
                    self.shared.publish(&inner);
                }
            }
        }
        Ok(())
    }

    /// Renders the given duration of the playing pattern. Only valid while started. Stopping or
    /// resetting the session while the render is in flight cancels it.
    pub async fn capture_audio(&self, duration: Duration) -> Result<SampleBuffer, SessionError> {
        let (cancel_handle, frame_count) = {
            let _enter = self.span.enter();
            let mut inner = self.shared.inner.lock();

            let phase = inner.state.phase();
            if phase != Phase::Started {
                warn!(phase = phase.to_string(), "Can't capture, not playing.");
                return Err(SessionError::NotPlaying);
            }
            if inner.capture.is_some() {
                return Err(self.reject(&inner, "capture audio"));
            }

            let cancel_handle = CancelHandle::new();
            inner.capture = Some(cancel_handle.clone());
            let frame_count = (duration.as_secs_f64()
                * f64::from(self.shared.engine.sample_rate()))
            .round() as usize;
            info!(
                duration = format!("{:?}", duration),
                frames = frame_count,
                "Capturing audio."
            );
            (cancel_handle, frame_count)
        };

        let rendered = {
            let engine = self.shared.engine.clone();
            let cancel_handle = cancel_handle.clone();
            tokio::task::spawn_blocking(move || engine.render(frame_count, cancel_handle)).await
        };

        {
            let mut inner = self.shared.inner.lock();
            if cancel_handle.is_cancelled() {
                info!("Capture cancelled.");
                return Err(SessionError::CaptureCancelled);
            }
            // Whatever cancels a capture also takes it, so an uncancelled capture is still ours.
            inner.capture = None;
        }

        match rendered {
            Ok(Ok(buffer)) => Ok(buffer),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(EngineError::Render(e.to_string()).into()),
        }
    }

    /// Ends the session and releases the engine.
    pub fn dispose(self) {
        // Drop does the work.
    }

    fn shutdown(&self) {
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.abort();
        }

        let mut inner = self.shared.inner.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        if let Some(capture) = inner.capture.take() {
            capture.cancel();
        }
        if inner.state.is_playing() {
            self.shared.engine.stop();
        }
        self.shared.engine.dispose();

        let _enter = self.span.enter();
        info!("Session disposed.");
    }

    fn reject(&self, inner: &Inner, operation: &'static str) -> SessionError {
        let phase = inner.state.phase();
        warn!(operation, phase = phase.to_string(), "Invalid transition.");
        SessionError::InvalidTransition { operation, phase }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
