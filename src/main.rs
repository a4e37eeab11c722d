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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use livecode::controller::{keyboard, Controller};
use livecode::playback::PlaybackController;
use livecode::share::{share_url, MemoryShareStore, ShareGateway};
use livecode::{config, engine, export};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A live-coding session runner."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boots a session and controls it from the keyboard.
    Start {
        /// The path to the session config.
        config_path: String,
    },
    /// Plays a pattern and exports the given number of seconds of it as a WAV file.
    Render {
        /// The path to the session config.
        config_path: String,
        /// The pattern code to play.
        pattern: String,
        /// How many seconds of audio to capture.
        seconds: f64,
        /// Where to write the WAV file.
        output_path: String,
    },
    /// Shares a pattern and prints the share record and its URL.
    Share {
        /// The path to the session config.
        config_path: String,
        /// The user sharing the pattern.
        owner: String,
        /// The pattern code to share.
        code: String,
        /// An optional display title.
        #[arg(short, long)]
        title: Option<String>,
    },
}

/// Creates a playback controller for the configured engine.
fn new_playback(config: &config::Session) -> Result<PlaybackController, Box<dyn Error>> {
    let engine = engine::get_engine(config)?;
    Ok(PlaybackController::new(engine, config.boot_timeout()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = config::Session::deserialize(&PathBuf::from(config_path))?;
            let playback = Arc::new(new_playback(&config)?);
            playback.initialize().await?;
            println!("{}", serde_json::to_string(&playback.snapshot())?);

            Controller::new(playback, Arc::new(keyboard::Driver::new()))
                .join()
                .await?;
        }
        Commands::Render {
            config_path,
            pattern,
            seconds,
            output_path,
        } => {
            let duration = Duration::try_from_secs_f64(seconds)?;
            let config = config::Session::deserialize(&PathBuf::from(config_path))?;
            let playback = new_playback(&config)?;

            // Queued until the engine is ready, then played.
            playback.set_pattern(&pattern, true)?;
            playback.initialize().await?;
            let buffer = playback.capture_audio(duration).await?;
            playback.dispose();

            let frames = buffer.frame_count();
            export::write_wav(&PathBuf::from(&output_path), buffer)?;
            println!("Wrote {} frames to {}.", frames, output_path);
        }
        Commands::Share {
            config_path,
            owner,
            code,
            title,
        } => {
            let config = config::Session::deserialize(&PathBuf::from(config_path))?;
            let store = MemoryShareStore::new();
            let record = store.create(&owner, &code, title.as_deref())?;

            println!("{}", serde_json::to_string_pretty(&record)?);
            println!("{}", share_url(config.share_origin(), &record.id));
        }
    }

    Ok(())
}
