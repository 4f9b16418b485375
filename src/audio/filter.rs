//! RBJ cookbook biquads, transposed direct form II.

use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    /// Constant 0 dB peak gain.
    Bandpass,
}

#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    sample_rate: f32,
    frequency: f32,
    q: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(kind: FilterKind, frequency: f32, q: f32, sample_rate: u32) -> Self {
        let mut filter = Self {
            kind,
            sample_rate: sample_rate.max(1) as f32,
            frequency,
            q: q.max(1e-4),
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        filter.update_coefficients();
        filter
    }

    pub fn lowpass(frequency: f32, q: f32, sample_rate: u32) -> Self {
        Self::new(FilterKind::Lowpass, frequency, q, sample_rate)
    }

    /// Highpass with a Butterworth Q.
    pub fn highpass(frequency: f32, sample_rate: u32) -> Self {
        Self::new(FilterKind::Highpass, frequency, std::f32::consts::FRAC_1_SQRT_2, sample_rate)
    }

    pub fn bandpass(frequency: f32, q: f32, sample_rate: u32) -> Self {
        Self::new(FilterKind::Bandpass, frequency, q, sample_rate)
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Retune without clearing the filter state. Skips work when unchanged.
    pub fn set_frequency(&mut self, frequency: f32) {
        if frequency != self.frequency {
            self.frequency = frequency;
            self.update_coefficients();
        }
    }

    fn update_coefficients(&mut self) {
        // Keep the cutoff inside (0, nyquist) so modulation can't blow up the filter.
        let nyquist = self.sample_rate * 0.5;
        let freq = self.frequency.clamp(1.0, nyquist * 0.99);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * self.q);

        let (b0, b1, b2) = match self.kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterKind::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterKind::Bandpass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
