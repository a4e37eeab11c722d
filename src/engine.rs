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
use std::{error::Error, fmt, sync::Arc};

use tokio::sync::mpsc::Sender;

use crate::{config, export::SampleBuffer, playsync::CancelHandle};

pub mod mock;

/// Notifications delivered by the engine to the session that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Boot progress in percent, optionally with a human readable stage.
    Progress(u8, Option<String>),
    /// Sample banks and the audio context are ready.
    Ready,
    /// The engine failed and can't recover.
    Failed(String),
    /// A scheduling cycle began.
    Cycle(u64),
}

/// Errors raised by the pattern engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("pattern evaluation failed: {0}")]
    Evaluation(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("render failed: {0}")]
    Render(String),
}

/// The pattern evaluation and audio scheduling engine. A session owns exactly one.
pub trait PatternEngine: fmt::Display + Send + Sync + 'static {
    /// Begins booting the engine. Progress, readiness and failure are reported on events_tx,
    /// which stays open after readiness to carry cycle ticks and late failures.
    fn boot(&self, events_tx: Sender<EngineEvent>);

    /// Loads pattern code. If the engine is scheduling, the code takes effect on the next cycle.
    fn evaluate(&self, code: &str) -> Result<(), EngineError>;

    /// Begins scheduling audio for the loaded pattern.
    fn start(&self) -> Result<(), EngineError>;

    /// Halts scheduling without discarding the loaded pattern.
    fn stop(&self);

    /// Halts scheduling and clears transient scheduling state.
    fn clear(&self);

    /// The sample rate renders are produced at.
    fn sample_rate(&self) -> u32;

    /// Renders the given number of frames of the current pattern. This may block, so callers
    /// should run it off the async executor.
    fn render(
        &self,
        frame_count: usize,
        cancel_handle: CancelHandle,
    ) -> Result<SampleBuffer, EngineError>;

    /// Releases the engine's resources. No other calls are made afterwards.
    fn dispose(&self);
}

/// Gets the engine named by the session configuration.
pub fn get_engine(config: &config::Session) -> Result<Arc<dyn PatternEngine>, Box<dyn Error>> {
    let name = config.engine();
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Engine::new(
            name,
            config.sample_rate(),
            config.channels(),
        )));
    }

    Err(format!("unknown pattern engine '{}'", name).into())
}
