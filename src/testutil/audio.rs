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
use std::{error::Error, io::Cursor};

use hound::WavReader;

/// Calculate RMS (Root Mean Square) of a signal
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Decodes an encoded WAV container into its format and per-channel float samples.
pub fn decode_wav(bytes: Vec<u8>) -> Result<(hound::WavSpec, Vec<Vec<f32>>), Box<dyn Error>> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channel_count = usize::from(spec.channels);
    let mut channels = vec![Vec::new(); channel_count];

    for (i, sample) in reader.into_samples::<i16>().enumerate() {
        channels[i % channel_count].push(f32::from(sample?) / 32768.0);
    }

    Ok((spec, channels))
}
