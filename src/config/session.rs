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
use std::{path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_ENGINE: &str = "mock";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SHARE_ORIGIN: &str = "http://localhost:3000";

fn default_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

/// A YAML representation of the session configuration.
#[derive(Deserialize, Clone)]
pub struct Session {
    /// The pattern engine to boot.
    #[serde(default = "default_engine")]
    engine: String,

    /// Sample rate for audio captures in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Channel count for audio captures (default: 2)
    channels: Option<u16>,

    /// How long to wait for the engine to boot, e.g. "10s".
    boot_timeout: Option<String>,

    /// The origin share URLs are built from.
    share_origin: Option<String>,
}

impl Session {
    /// New will create a new session configuration for the given engine.
    pub fn new(engine: &str) -> Session {
        Session {
            engine: engine.to_string(),
            sample_rate: None,
            channels: None,
            boot_timeout: None,
            share_origin: None,
        }
    }

    /// Parse a session configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Session, ConfigError> {
        let session = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Session>()?;
        session.validate()?;
        Ok(session)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == Some(0) {
            return Err(ConfigError::Invalid(
                "sample_rate",
                "must be positive".to_string(),
            ));
        }
        if self.channels == Some(0) {
            return Err(ConfigError::Invalid(
                "channels",
                "must be at least 1".to_string(),
            ));
        }
        self.boot_timeout()?;
        Ok(())
    }

    /// Returns the engine name.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Returns the capture sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the capture channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    /// Returns how long to wait for the engine to boot (default: 10s)
    pub fn boot_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.boot_timeout {
            Some(boot_timeout) => Ok(DurationString::from_string(boot_timeout.clone())
                .map_err(|e| ConfigError::Duration(boot_timeout.clone(), e.to_string()))?
                .into()),
            None => Ok(DEFAULT_BOOT_TIMEOUT),
        }
    }

    /// Returns the origin that share URLs are built from.
    pub fn share_origin(&self) -> &str {
        self.share_origin.as_deref().unwrap_or(DEFAULT_SHARE_ORIGIN)
    }
}
