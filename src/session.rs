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
use std::fmt;

use serde::Serialize;

use crate::engine::EngineError;

/// The lifecycle phase of a live-coding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// The engine is booting: sample banks and audio context aren't ready yet.
    Loading,
    /// The engine is ready and not scheduling audio.
    Ready,
    /// The engine is scheduling audio.
    Started,
    /// The engine failed to start. Terminal for the session.
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Started => "started",
            Phase::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by session operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: Phase,
    },

    #[error("engine failed to initialize: {0}")]
    Initialization(String),

    #[error("audio can only be captured while playing")]
    NotPlaying,

    #[error("capture was cancelled")]
    CaptureCancelled,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A read-only copy of the session state, published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub status_message: String,
    pub progress_percent: u8,
    pub is_playing: bool,
}

/// The session state and its transition rules. Only the owning playback controller mutates it.
///
/// Invariants: `is_playing` implies `Started`, and `Loading` implies not playing.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    status_message: String,
    progress_percent: u8,
    is_playing: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new()
    }
}

impl SessionState {
    /// Creates a new session in the loading phase.
    pub fn new() -> SessionState {
        SessionState {
            phase: Phase::Loading,
            status_message: "Loading...".to_string(),
            progress_percent: 0,
            is_playing: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            status_message: self.status_message.clone(),
            progress_percent: self.progress_percent,
            is_playing: self.is_playing,
        }
    }

    /// Records boot progress. Ignored outside of loading, and never moves backwards.
    pub fn set_progress(&mut self, percent: u8, message: Option<&str>) {
        if self.phase != Phase::Loading {
            return;
        }
        self.progress_percent = self.progress_percent.max(percent.min(100));
        if let Some(message) = message {
            self.status_message = message.to_string();
        }
    }

    /// Replaces the status message without changing the phase.
    pub fn set_status(&mut self, message: &str) {
        self.status_message = message.to_string();
    }

    /// Loading -> Ready.
    pub fn mark_ready(&mut self) -> Result<(), SessionError> {
        self.expect_phase("become ready", &[Phase::Loading])?;
        self.phase = Phase::Ready;
        self.progress_percent = 100;
        self.status_message = "Ready".to_string();
        Ok(())
    }

    /// Ready -> Started.
    pub fn mark_started(&mut self) -> Result<(), SessionError> {
        self.expect_phase("play", &[Phase::Ready])?;
        self.phase = Phase::Started;
        self.is_playing = true;
        self.status_message = "Playing".to_string();
        Ok(())
    }

    /// Started -> Ready.
    pub fn mark_stopped(&mut self) -> Result<(), SessionError> {
        self.expect_phase("stop", &[Phase::Started])?;
        self.phase = Phase::Ready;
        self.is_playing = false;
        self.status_message = "Stopped".to_string();
        Ok(())
    }

    /// Ready | Started -> Ready.
    pub fn mark_reset(&mut self) -> Result<(), SessionError> {
        self.expect_phase("reset", &[Phase::Ready, Phase::Started])?;
        self.phase = Phase::Ready;
        self.is_playing = false;
        self.status_message = "Reset".to_string();
        Ok(())
    }

    /// Any -> Error. The cause becomes the status message.
    pub fn mark_error(&mut self, cause: &str) {
        self.phase = Phase::Error;
        self.is_playing = false;
        self.progress_percent = 0;
        self.status_message = cause.to_string();
    }

    /// Fails with an invalid transition unless the session is in one of the allowed phases.
    pub fn expect_phase(
        &self,
        operation: &'static str,
        allowed: &[Phase],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                operation,
                phase: self.phase,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_invariants(state: &SessionState) {
        if state.is_playing() {
            assert_eq!(state.phase(), Phase::Started);
        }
        if state.phase() == Phase::Loading {
            assert!(!state.is_playing());
        }
    }

    #[test]
    fn test_lifecycle() -> Result<(), SessionError> {
        let mut state = SessionState::new();
        assert_eq!(state.phase(), Phase::Loading);
        assert_eq!(state.progress_percent(), 0);
        assert_invariants(&state);

        state.mark_ready()?;
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.progress_percent(), 100);
        assert_invariants(&state);

        state.mark_started()?;
        assert_eq!(state.phase(), Phase::Started);
        assert!(state.is_playing());
        assert_invariants(&state);

        state.mark_stopped()?;
        assert_eq!(state.phase(), Phase::Ready);
        assert!(!state.is_playing());

        state.mark_started()?;
        state.mark_reset()?;
        assert_eq!(state.phase(), Phase::Ready);
        assert!(!state.is_playing());

        state.mark_reset()?;
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.status_message(), "Reset");
        Ok(())
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = SessionState::new();
        assert_eq!(
            state.mark_started(),
            Err(SessionError::InvalidTransition {
                operation: "play",
                phase: Phase::Loading
            })
        );
        assert_eq!(state.phase(), Phase::Loading);
        assert!(state.mark_stopped().is_err());
        assert!(state.mark_reset().is_err());
        assert_eq!(state.phase(), Phase::Loading);

        assert!(state.mark_ready().is_ok());
        assert!(state.mark_ready().is_err());
        assert!(state.mark_stopped().is_err());
        assert_eq!(state.phase(), Phase::Ready);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut state = SessionState::new();
        state.set_progress(30, Some("Loading samples"));
        state.set_progress(10, None);
        assert_eq!(state.progress_percent(), 30);
        assert_eq!(state.status_message(), "Loading samples");

        state.set_progress(250, None);
        assert_eq!(state.progress_percent(), 100);

        let mut state = SessionState::new();
        state.set_progress(40, None);
        assert!(state.mark_ready().is_ok());
        state.set_progress(10, Some("ignored"));
        assert_eq!(state.progress_percent(), 100);
        assert_eq!(state.status_message(), "Ready");
    }

    #[test]
    fn test_error_is_sticky() {
        let mut state = SessionState::new();
        state.set_progress(60, None);
        state.mark_error("audio context unavailable");

        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.progress_percent(), 0);
        assert_eq!(state.status_message(), "audio context unavailable");
        assert!(state.mark_ready().is_err());
        assert!(state.mark_started().is_err());
        assert!(state.mark_reset().is_err());
        assert_eq!(state.phase(), Phase::Error);
    }

    #[test]
    fn test_error_stops_playback() -> Result<(), SessionError> {
        let mut state = SessionState::new();
        state.mark_ready()?;
        state.mark_started()?;
        state.mark_error("engine crashed");
        assert!(!state.is_playing());
        assert_invariants(&state);
        Ok(())
    }

    #[test]
    fn test_set_status_keeps_phase() -> Result<(), SessionError> {
        let mut state = SessionState::new();
        state.mark_ready()?;
        state.set_status("Pattern not applied");
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.status_message(), "Pattern not applied");
        Ok(())
    }

    #[test]
    fn test_snapshot() -> Result<(), SessionError> {
        let mut state = SessionState::new();
        state.mark_ready()?;
        state.mark_started()?;
        assert_eq!(
            state.snapshot(),
            SessionSnapshot {
                phase: Phase::Started,
                status_message: "Playing".to_string(),
                progress_percent: 100,
                is_playing: true,
            }
        );
        Ok(())
    }
}
