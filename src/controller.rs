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
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::playback::PlaybackController;

pub mod keyboard;

/// Controller events that will trigger behavior in the playback controller.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Starts scheduling the loaded pattern.
    Play,

    /// Stops scheduling, keeping the loaded pattern.
    Stop,

    /// Clears scheduling state and reloads the current pattern.
    Reset,

    /// Supplies new pattern text, e.g. from an assistant or a shared link.
    SetPattern { code: String, autoplay: bool },
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds events from a driver into a playback controller.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(playback: Arc<PlaybackController>, driver: Arc<dyn Driver>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(playback, driver).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers playback operations by watching the driver and getting events from it.
    async fn trigger_events(playback: Arc<PlaybackController>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(
            phase = playback.phase().to_string(),
            "Controller started."
        );

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");

            let result = match event {
                Event::Play => playback.play(),
                Event::Stop => playback.stop(),
                Event::Reset => playback.reset(),
                Event::SetPattern { code, autoplay } => playback.set_pattern(&code, autoplay),
            };
            if let Err(e) = result {
                error!("Error talking to playback: {}", e);
            }
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Err(e)) => error!("Event monitor failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
    }
}
