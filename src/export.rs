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
use std::{fs::File, io, io::Write, path::Path};

use tracing::debug;

/// Size of the canonical PCM WAV header.
pub const HEADER_SIZE: usize = 44;

const BYTES_PER_SAMPLE: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
const PCM_FORMAT: u16 = 1;
const FMT_CHUNK_SIZE: u32 = 16;

/// The most channels whose block alignment fits the header's 16 bit field.
pub const MAX_CHANNELS: u16 = u16::MAX / BYTES_PER_SAMPLE;

/// Rendered multichannel audio, one vector of samples per channel.
///
/// Samples are nominally within [-1.0, 1.0] but may overshoot. Channels shorter than
/// the frame count are padded with silence when encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    frame_count: usize,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Creates a new sample buffer with an explicit frame count.
    pub fn new(sample_rate: u32, frame_count: usize, channels: Vec<Vec<f32>>) -> SampleBuffer {
        SampleBuffer {
            sample_rate,
            frame_count,
            channels,
        }
    }

    /// Creates a sample buffer whose frame count is the length of the longest channel.
    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> SampleBuffer {
        let frame_count = channels.iter().map(Vec::len).max().unwrap_or(0);
        SampleBuffer::new(sample_rate, frame_count, channels)
    }

    /// Creates a silent buffer of the given shape.
    pub fn silence(sample_rate: u32, channel_count: u16, frame_count: usize) -> SampleBuffer {
        SampleBuffer::new(
            sample_rate,
            frame_count,
            vec![vec![0.0; frame_count]; usize::from(channel_count)],
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn channel_count(&self) -> u16 {
        u16::try_from(self.channels.len()).unwrap_or(u16::MAX)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Returns the sample at the given channel and frame, or silence if it's missing.
    fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channels
            .get(channel)
            .and_then(|samples| samples.get(frame))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Converts a float sample to 16 bit PCM. Negative values scale by 32768 and non-negative
/// values by 32767, so the full [-1.0, 1.0] range maps onto [-32768, 32767].
pub fn to_pcm16(sample: f32) -> i16 {
    let clipped = sample.clamp(-1.0, 1.0);
    if clipped < 0.0 {
        (clipped * 32768.0).round() as i16
    } else {
        (clipped * 32767.0).round() as i16
    }
}

/// Encodes the buffer as a 16 bit PCM WAV container. Encoding never fails. Channels past
/// MAX_CHANNELS aren't representable and are left out.
pub fn encode(buffer: SampleBuffer) -> Vec<u8> {
    let channel_count = buffer.channel_count().min(MAX_CHANNELS);
    let block_align = channel_count * BYTES_PER_SAMPLE;
    let byte_rate = buffer.sample_rate.saturating_mul(u32::from(block_align));
    let data_len = buffer.frame_count * usize::from(block_align);
    // Containers larger than 4 GiB aren't representable, so the size fields saturate.
    let data_size = u32::try_from(data_len).unwrap_or(u32::MAX);

    let mut bytes = Vec::with_capacity(HEADER_SIZE + data_len);

    // RIFF chunk
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&data_size.saturating_add(36).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    // fmt subchunk
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    bytes.extend_from_slice(&PCM_FORMAT.to_le_bytes());
    bytes.extend_from_slice(&channel_count.to_le_bytes());
    bytes.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data subchunk, frame-interleaved
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
    for frame in 0..buffer.frame_count {
        for channel in 0..usize::from(channel_count) {
            bytes.extend_from_slice(&to_pcm16(buffer.sample(channel, frame)).to_le_bytes());
        }
    }

    bytes
}

/// Encodes the buffer and writes it to the given path.
pub fn write_wav(path: &Path, buffer: SampleBuffer) -> io::Result<()> {
    let frame_count = buffer.frame_count;
    let bytes = encode(buffer);
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()?;

    debug!(
        path = path.display().to_string(),
        frames = frame_count,
        bytes = bytes.len(),
        "Wrote WAV export."
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Cursor};

    use hound::{SampleFormat, WavReader};

    use super::*;

    fn read_u16(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn data_samples(bytes: &[u8]) -> Vec<i16> {
        bytes[HEADER_SIZE..]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn test_header_layout() {
        let buffer = SampleBuffer::from_channels(48000, vec![vec![0.0; 10], vec![0.0; 10]]);
        let bytes = encode(buffer);

        assert_eq!(bytes.len(), HEADER_SIZE + 10 * 2 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4), 36 + 40);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u32(&bytes, 16), 16);
        assert_eq!(read_u16(&bytes, 20), 1);
        assert_eq!(read_u16(&bytes, 22), 2);
        assert_eq!(read_u32(&bytes, 24), 48000);
        assert_eq!(read_u32(&bytes, 28), 48000 * 4);
        assert_eq!(read_u16(&bytes, 32), 4);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32(&bytes, 40), 40);
    }

    #[test]
    fn test_decodes_with_hound() -> Result<(), Box<dyn Error>> {
        let frames = 441;
        let left: Vec<f32> = (0..frames).map(|i| (i as f32 / 100.0).sin() * 0.5).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let bytes = encode(SampleBuffer::from_channels(
            44100,
            vec![left.clone(), right.clone()],
        ));

        assert_eq!(bytes.len(), HEADER_SIZE + frames * 2 * 2);

        let reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);
        assert_eq!(reader.duration() as usize, frames);

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<i16>, hound::Error>>()?;
        assert_eq!(samples.len(), frames * 2);
        for (i, frame) in samples.chunks_exact(2).enumerate() {
            assert_eq!(frame[0], to_pcm16(left[i]));
            assert_eq!(frame[1], to_pcm16(right[i]));
        }
        Ok(())
    }

    #[test]
    fn test_clipping() {
        assert_eq!(to_pcm16(1.5), to_pcm16(1.0));
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(-1.5), to_pcm16(-1.0));
        assert_eq!(to_pcm16(-1.0), -32768);
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(0.5), 16384);
        assert_eq!(to_pcm16(-0.5), -16384);

        let bytes = encode(SampleBuffer::from_channels(8000, vec![vec![1.5, -1.5, 2.0]]));
        assert_eq!(data_samples(&bytes), vec![32767, -32768, 32767]);
    }

    #[test]
    fn test_silence() {
        for (channels, frames) in [(1u16, 1usize), (2, 64), (6, 100)] {
            let bytes = encode(SampleBuffer::silence(22050, channels, frames));
            let data_len = frames * usize::from(channels) * 2;
            assert_eq!(bytes.len(), HEADER_SIZE + data_len);
            assert!(bytes[HEADER_SIZE..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_empty_buffer() {
        let bytes = encode(SampleBuffer::silence(44100, 2, 0));
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(read_u32(&bytes, 4), 36);
        assert_eq!(read_u32(&bytes, 40), 0);
    }

    #[test]
    fn test_short_channels_are_padded() {
        // The second channel is missing its last two frames.
        let buffer = SampleBuffer::new(8000, 3, vec![vec![0.5, 0.5, 0.5], vec![-0.5]]);
        let bytes = encode(buffer);

        assert_eq!(bytes.len(), HEADER_SIZE + 3 * 2 * 2);
        assert_eq!(
            data_samples(&bytes),
            vec![16384, -16384, 16384, 0, 16384, 0]
        );
    }

    #[test]
    fn test_too_many_channels() {
        let channels = usize::from(MAX_CHANNELS) + 10;
        let bytes = encode(SampleBuffer::new(8000, 2, vec![vec![0.5, -0.5]; channels]));

        let kept = usize::from(MAX_CHANNELS);
        assert_eq!(read_u16(&bytes, 22), MAX_CHANNELS);
        assert_eq!(read_u16(&bytes, 32), MAX_CHANNELS * 2);
        assert_eq!(read_u32(&bytes, 40) as usize, 2 * kept * 2);
        assert_eq!(bytes.len(), HEADER_SIZE + 2 * kept * 2);
    }

    #[test]
    fn test_write_wav() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("export.wav");
        let buffer = SampleBuffer::from_channels(44100, vec![vec![0.25; 100]]);
        let expected = encode(buffer.clone());

        write_wav(&path, buffer)?;

        assert_eq!(std::fs::read(&path)?, expected);
        let reader = WavReader::open(&path)?;
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 100);
        Ok(())
    }
}
