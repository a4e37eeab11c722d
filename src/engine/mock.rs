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
use std::{
    f32::consts::PI,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::{mpsc::Sender, Notify};
use tracing::{info, span, Instrument, Level};

use super::{EngineError, EngineEvent, PatternEngine};
use crate::{export::SampleBuffer, playsync::CancelHandle};

const TONE_FREQUENCY: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.5;
const RENDER_BLOCK: usize = 1024;

/// How the mock engine behaves when booted.
#[derive(Clone, Debug, PartialEq)]
pub enum Boot {
    /// Becomes ready right away.
    Immediate,
    /// Waits for release_boot before becoming ready.
    Gated,
    /// Reports the given failure.
    Fail(String),
    /// Never reports readiness or failure.
    Hang,
}

#[derive(Default)]
struct State {
    loaded: Option<String>,
    evaluated: Vec<String>,
    playing: bool,
    boots: usize,
    starts: usize,
    clears: usize,
    disposed: bool,
}

/// A mock engine. Doesn't evaluate patterns, but renders a tone while a pattern is playing.
pub struct Engine {
    name: String,
    sample_rate: u32,
    channels: u16,
    boot: Boot,
    boot_gate: Arc<Notify>,
    realtime_render: bool,
    fail_evaluation: AtomicBool,
    cycle: AtomicU64,
    state: Mutex<State>,
    events_tx: Mutex<Option<Sender<EngineEvent>>>,
}

impl Engine {
    /// Gets a mock engine that boots immediately and renders offline.
    pub fn new(name: &str, sample_rate: u32, channels: u16) -> Engine {
        Engine {
            name: name.to_string(),
            sample_rate,
            channels,
            boot: Boot::Immediate,
            boot_gate: Arc::new(Notify::new()),
            realtime_render: false,
            fail_evaluation: AtomicBool::new(false),
            cycle: AtomicU64::new(0),
            state: Mutex::new(State::default()),
            events_tx: Mutex::new(None),
        }
    }

    /// Sets the boot behavior.
    pub fn with_boot(mut self, boot: Boot) -> Engine {
        self.boot = boot;
        self
    }

    /// Makes renders take as long as the audio they produce.
    pub fn with_realtime_render(mut self, realtime_render: bool) -> Engine {
        self.realtime_render = realtime_render;
        self
    }

    /// Lets a gated boot finish.
    pub fn release_boot(&self) {
        self.boot_gate.notify_one();
    }

    /// Makes subsequent evaluations fail.
    pub fn set_evaluation_failure(&self, fail: bool) {
        self.fail_evaluation.store(fail, Ordering::Relaxed);
    }

    /// Reports an unrecoverable failure after boot.
    pub fn crash(&self, cause: &str) {
        if let Some(events_tx) = self.events_tx.lock().as_ref() {
            let _ = events_tx.try_send(EngineEvent::Failed(cause.to_string()));
        }
    }

    /// Every pattern evaluated so far, in order.
    pub fn evaluated(&self) -> Vec<String> {
        self.state.lock().evaluated.clone()
    }

    /// The currently loaded pattern.
    pub fn loaded(&self) -> Option<String> {
        self.state.lock().loaded.clone()
    }

    /// Returns true if the engine is scheduling audio.
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// The number of times the engine was booted.
    pub fn boot_count(&self) -> usize {
        self.state.lock().boots
    }

    /// The number of times scheduling was started.
    pub fn start_count(&self) -> usize {
        self.state.lock().starts
    }

    /// The number of times scheduling state was cleared.
    pub fn clear_count(&self) -> usize {
        self.state.lock().clears
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl PatternEngine for Engine {
    fn boot(&self, events_tx: Sender<EngineEvent>) {
        *self.events_tx.lock() = Some(events_tx.clone());
        self.state.lock().boots += 1;

        let boot = self.boot.clone();
        let boot_gate = self.boot_gate.clone();
        let name = self.name.clone();
        let boot_task = async move {
            info!(engine = name, boot = format!("{:?}", boot), "Booting engine.");
            let _ = events_tx
                .send(EngineEvent::Progress(
                    20,
                    Some("Loading samples...".to_string()),
                ))
                .await;

            match boot {
                Boot::Immediate => {}
                Boot::Gated => boot_gate.notified().await,
                Boot::Fail(cause) => {
                    let _ = events_tx.send(EngineEvent::Failed(cause)).await;
                    return;
                }
                Boot::Hang => return,
            }

            let _ = events_tx
                .send(EngineEvent::Progress(
                    80,
                    Some("Starting audio...".to_string()),
                ))
                .await;
            let _ = events_tx.send(EngineEvent::Ready).await;
        };
        tokio::spawn(boot_task.instrument(span!(Level::INFO, "boot engine (mock)")));
    }

    fn evaluate(&self, code: &str) -> Result<(), EngineError> {
        if self.fail_evaluation.load(Ordering::Relaxed) {
            return Err(EngineError::Evaluation(format!(
                "could not evaluate '{}'",
                code
            )));
        }

        let mut state = self.state.lock();
        state.evaluated.push(code.to_string());
        state.loaded = Some(code.to_string());
        Ok(())
    }

    fn start(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            state.playing = true;
            state.starts += 1;
        }

        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed);
        if let Some(events_tx) = self.events_tx.lock().as_ref() {
            let _ = events_tx.try_send(EngineEvent::Cycle(cycle));
        }
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().playing = false;
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.loaded = None;
        state.clears += 1;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn render(
        &self,
        frame_count: usize,
        cancel_handle: CancelHandle,
    ) -> Result<SampleBuffer, EngineError> {
        let span = span!(Level::INFO, "render (mock)");
        let _enter = span.enter();

        if self.realtime_render {
            let duration = Duration::from_secs_f64(frame_count as f64 / self.sample_rate as f64);
            if cancel_handle.wait_timeout(duration) {
                return Err(EngineError::Render("render cancelled".to_string()));
            }
        }

        let audible = {
            let state = self.state.lock();
            state.playing && state.loaded.is_some()
        };

        let mut samples = Vec::with_capacity(frame_count);
        for block_start in (0..frame_count).step_by(RENDER_BLOCK) {
            if cancel_handle.is_cancelled() {
                return Err(EngineError::Render("render cancelled".to_string()));
            }
            let block_end = (block_start + RENDER_BLOCK).min(frame_count);
            samples.extend((block_start..block_end).map(|frame| {
                if audible {
                    let t = frame as f32 / self.sample_rate as f32;
                    TONE_AMPLITUDE * (2.0 * PI * TONE_FREQUENCY * t).sin()
                } else {
                    0.0
                }
            }));
        }

        info!(
            engine = self.name,
            frames = frame_count,
            audible = audible,
            "Rendered audio."
        );

        Ok(SampleBuffer::new(
            self.sample_rate,
            frame_count,
            vec![samples; usize::from(self.channels)],
        ))
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.disposed = true;
        *self.events_tx.lock() = None;
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
