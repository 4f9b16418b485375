//! Tone and noise building blocks.
//!
//! Nothing in here touches a device. Engines combine these pieces into
//! rodio sources.

use std::f32::consts::PI;

use rand::Rng;

use super::waveform::Waveform;

/// Oscillator waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl Shape {
    /// One cycle of the shape, `phase` in `[0, 1)`.
    pub fn at(self, phase: f32) -> f32 {
        match self {
            Shape::Sine => (phase * 2.0 * PI).sin(),
            Shape::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
            Shape::Sawtooth => 2.0 * phase - 1.0,
            Shape::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    at: f32,
    value: f32,
    curve: Curve,
}

/// Parameter timeline in the style of a WebAudio `AudioParam`.
///
/// Starts at `initial` at t=0; each ramp runs from the previous point to
/// its own `(value, at)`. After the last point the value holds.
#[derive(Debug, Clone)]
pub struct Automation {
    initial: f32,
    segments: Vec<Segment>,
}

impl Automation {
    pub fn constant(value: f32) -> Self {
        Self {
            initial: value,
            segments: Vec::new(),
        }
    }

    pub fn linear_to(mut self, value: f32, at: f32) -> Self {
        self.segments.push(Segment {
            at,
            value,
            curve: Curve::Linear,
        });
        self
    }

    /// Exponential ramp. Falls back to linear when either end is not
    /// strictly positive.
    pub fn exponential_to(mut self, value: f32, at: f32) -> Self {
        self.segments.push(Segment {
            at,
            value,
            curve: Curve::Exponential,
        });
        self
    }

    pub fn value_at(&self, t: f32) -> f32 {
        let (mut t0, mut v0) = (0.0f32, self.initial);
        for seg in &self.segments {
            if t < seg.at {
                let span = seg.at - t0;
                if span <= 0.0 {
                    return seg.value;
                }
                let x = ((t - t0) / span).clamp(0.0, 1.0);
                return match seg.curve {
                    Curve::Exponential if v0 > 0.0 && seg.value > 0.0 => {
                        v0 * (seg.value / v0).powf(x)
                    }
                    _ => v0 + (seg.value - v0) * x,
                };
            }
            t0 = seg.at;
            v0 = seg.value;
        }
        v0
    }
}

/// Descriptor for one oscillator in a signal graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorSpec {
    pub shape: Shape,
    pub frequency: f32,
    /// Exponential ramp target reached at the end of the sound.
    pub ramp_to: Option<f32>,
}

impl OscillatorSpec {
    pub fn new(shape: Shape, frequency: f32) -> Self {
        Self {
            shape,
            frequency,
            ramp_to: None,
        }
    }

    pub fn ramping_to(mut self, target: f32) -> Self {
        self.ramp_to = Some(target);
        self
    }

    /// Build an oscillator whose ramp (if any) completes after `duration` seconds.
    pub fn build(&self, duration: f32, sample_rate: u32) -> Oscillator {
        let frequency = match self.ramp_to {
            Some(target) => Automation::constant(self.frequency).exponential_to(target, duration),
            None => Automation::constant(self.frequency),
        };
        Oscillator::new(self.shape, frequency, sample_rate)
    }
}

/// Phase-accumulating oscillator with an automated frequency.
#[derive(Debug, Clone)]
pub struct Oscillator {
    shape: Shape,
    frequency: Automation,
    sample_rate: f32,
    phase: f32,
    elapsed: u64,
}

impl Oscillator {
    pub fn new(shape: Shape, frequency: Automation, sample_rate: u32) -> Self {
        Self {
            shape,
            frequency,
            sample_rate: sample_rate.max(1) as f32,
            phase: 0.0,
            elapsed: 0,
        }
    }

    pub fn fixed(shape: Shape, frequency: f32, sample_rate: u32) -> Self {
        Self::new(shape, Automation::constant(frequency), sample_rate)
    }

    /// Seconds since the oscillator started.
    pub fn time(&self) -> f32 {
        self.elapsed as f32 / self.sample_rate
    }

    /// Frequency the next sample will use, before modulation.
    pub fn frequency(&self) -> f32 {
        self.frequency.value_at(self.time())
    }

    pub fn next_sample(&mut self) -> f32 {
        self.next_modulated(0.0)
    }

    /// Next sample with `offset_hz` added to the automated frequency.
    pub fn next_modulated(&mut self, offset_hz: f32) -> f32 {
        let sample = self.shape.at(self.phase);
        let freq = self.frequency() + offset_hz;
        self.phase = (self.phase + freq / self.sample_rate).rem_euclid(1.0);
        self.elapsed += 1;
        sample
    }
}

/// Paul Kellet's pink noise filter over a white noise input.
#[derive(Debug, Clone, Default)]
pub struct PinkNoise {
    b: [f32; 7],
}

impl PinkNoise {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter one white sample in `[-1, 1]`.
    pub fn next(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let out = (b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362) * 0.11;
        b[6] = white * 0.115926;
        out
    }
}

fn buffer_len(duration: f32, sample_rate: u32) -> usize {
    (duration.max(0.0) * sample_rate as f32).round() as usize
}

/// Pink noise buffer of `duration` seconds.
pub fn generate_pink_noise<R: Rng + ?Sized>(duration: f32, sample_rate: u32, rng: &mut R) -> Waveform {
    let mut pink = PinkNoise::new();
    let samples = (0..buffer_len(duration, sample_rate))
        .map(|_| pink.next(rng.gen_range(-1.0..1.0)))
        .collect();
    Waveform::new(samples, sample_rate)
}

/// Uniform white noise buffer of `duration` seconds.
pub fn generate_white_noise<R: Rng + ?Sized>(duration: f32, sample_rate: u32, rng: &mut R) -> Waveform {
    let samples = (0..buffer_len(duration, sample_rate))
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    Waveform::new(samples, sample_rate)
}

/// Soft knee limiter: linear below 0.7, compressed above, ceiling 0.95.
pub fn soft_limit(input: f32) -> f32 {
    let threshold = 0.7;
    if input.abs() > threshold {
        let sign = input.signum();
        let excess = input.abs() - threshold;
        sign * (threshold + excess * 0.2).min(0.95)
    } else {
        input
    }
}
