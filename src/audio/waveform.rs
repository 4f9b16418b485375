//! Immutable sample buffers and a rodio source that plays them.

use std::sync::Arc;
use std::time::Duration;

use rodio::Source;

/// Sample rate of narration payloads produced by the speech service.
pub const NARRATION_SAMPLE_RATE: u32 = 24_000;

/// Mono buffer of amplitudes in `[-1, 1]`. Cloning shares the samples.
#[derive(Clone, Debug)]
pub struct Waveform {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Index of the sample that starts at `seconds`, clamped to the buffer.
    pub fn index_at(&self, seconds: f64) -> usize {
        let idx = (seconds.max(0.0) * self.sample_rate as f64).floor() as usize;
        idx.min(self.samples.len())
    }

    /// One-shot playback starting `offset` seconds in.
    pub fn play_from(&self, offset: f64) -> WaveformSource {
        WaveformSource {
            waveform: self.clone(),
            position: self.index_at(offset),
            looping: false,
        }
    }

    /// Endless playback that wraps to the start.
    pub fn looped(&self) -> WaveformSource {
        WaveformSource {
            waveform: self.clone(),
            position: 0,
            looping: true,
        }
    }
}

/// Plays a [`Waveform`], optionally looping.
pub struct WaveformSource {
    waveform: Waveform,
    position: usize,
    looping: bool,
}

impl Iterator for WaveformSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.waveform.len();
        if len == 0 {
            return None;
        }
        if self.position >= len {
            if !self.looping {
                return None;
            }
            self.position = 0;
        }
        let sample = self.waveform.samples[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Source for WaveformSource {
    fn current_frame_len(&self) -> Option<usize> {
        if self.looping {
            None
        } else {
            Some(self.waveform.len() - self.position)
        }
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.waveform.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        if self.looping {
            None
        } else {
            Some(Duration::from_secs_f64(self.waveform.duration()))
        }
    }
}
