//! Jump-scare bursts.
//!
//! Every trigger builds its own signal graph on a fresh output context: a
//! cluster of saw/square oscillators plus a white-noise blast, scaled by
//! intensity. The visual completion timer runs independently of the audio,
//! so the tail may still be decaying after the overlay clears.

use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rodio::Source;

use super::clock::OutputClock;
use super::output::{AudioBackend, AudioContext, Voice};
use super::random::RandomSource;
use super::scheduler::Timers;
use super::synth::{
    generate_white_noise, soft_limit, Automation, Oscillator, OscillatorSpec, Shape,
};
use super::waveform::WaveformSource;
use crate::settings::Intensity;

pub const SCARE_SAMPLE_RATE: u32 = 44_100;

const MILD_FREQS: [f32; 2] = [100.0, 200.0];
const FULL_FREQS: [f32; 5] = [100.0, 200.0, 450.0, 800.0, 5000.0];
const NOISE_BOOST: f32 = 1.2;
const OSC_FLOOR: f32 = 0.01;

impl Intensity {
    /// Audio length of the burst in seconds.
    pub fn burst_secs(&self) -> f32 {
        match self {
            Intensity::Mild => 0.3,
            Intensity::Standard => 0.5,
            Intensity::Extreme => 0.8,
        }
    }

    /// Starting gain of every oscillator.
    pub fn base_volume(&self) -> f32 {
        match self {
            Intensity::Mild => 0.2,
            Intensity::Standard => 0.6,
            Intensity::Extreme => 1.0,
        }
    }

    /// How long the overlay stays up.
    pub fn visual_duration(&self) -> Duration {
        Duration::from_millis(match self {
            Intensity::Mild => 400,
            Intensity::Standard => 600,
            Intensity::Extreme => 1000,
        })
    }
}

/// What a burst will contain, decided before any samples exist.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstPlan {
    pub intensity: Intensity,
    pub oscillators: Vec<OscillatorSpec>,
    pub volume: f32,
    pub noise_gain: f32,
    pub duration: f32,
    pub noise_seed: u64,
}

impl BurstPlan {
    pub fn new(intensity: Intensity, rng: &mut dyn RandomSource) -> Self {
        let freqs: &[f32] = match intensity {
            Intensity::Mild => &MILD_FREQS,
            _ => &FULL_FREQS,
        };
        let oscillators = freqs
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let shape = if i % 2 == 0 { Shape::Sawtooth } else { Shape::Square };
                let spec = OscillatorSpec::new(shape, f);
                match intensity {
                    Intensity::Mild => spec,
                    _ => spec.ramping_to(f * rng.range(0.5, 1.5) as f32),
                }
            })
            .collect();
        let volume = intensity.base_volume();
        Self {
            intensity,
            oscillators,
            volume,
            noise_gain: volume * NOISE_BOOST,
            duration: intensity.burst_secs(),
            noise_seed: rng.noise_seed(),
        }
    }

    pub fn render(&self, sample_rate: u32) -> ScareBurst {
        ScareBurst::new(self, sample_rate)
    }
}

/// Rendered burst as a rodio source.
pub struct ScareBurst {
    oscillators: Vec<Oscillator>,
    osc_gain: Automation,
    noise: WaveformSource,
    noise_gain: Automation,
    sample_rate: u32,
    position: u32,
    length: u32,
}

impl ScareBurst {
    fn new(plan: &BurstPlan, sample_rate: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(plan.noise_seed);
        let noise = generate_white_noise(plan.duration, sample_rate, &mut rng);
        Self {
            oscillators: plan
                .oscillators
                .iter()
                .map(|spec| spec.build(plan.duration, sample_rate))
                .collect(),
            osc_gain: Automation::constant(plan.volume).exponential_to(OSC_FLOOR, plan.duration),
            noise: noise.play_from(0.0),
            noise_gain: Automation::constant(plan.noise_gain).linear_to(0.0, plan.duration),
            sample_rate,
            position: 0,
            length: noise.len() as u32,
        }
    }
}

impl Iterator for ScareBurst {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }
        let t = self.position as f32 / self.sample_rate as f32;
        self.position += 1;

        let tones: f32 = self.oscillators.iter_mut().map(|o| o.next_sample()).sum();
        let hiss = self.noise.next().unwrap_or(0.0);
        let mix = tones * self.osc_gain.value_at(t) + hiss * self.noise_gain.value_at(t);
        Some(soft_limit(mix))
    }
}

impl Source for ScareBurst {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.length - self.position) as usize)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.length as f64 / self.sample_rate as f64))
    }
}

/// One scare from trigger to visual completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScareEvent {
    pub intensity: Intensity,
    pub started_at: f64,
    pub visual_duration_ms: u64,
}

struct Burst {
    audio_ends_at: f64,
    // Dropped before the context it plays on.
    _voice: Option<Voice>,
    _context: Box<dyn AudioContext>,
}

pub struct JumpScareEngine {
    backend: Rc<dyn AudioBackend>,
    clock: Rc<dyn OutputClock>,
    rng: Box<dyn RandomSource>,
    bursts: Vec<Burst>,
    completions: Timers<ScareEvent>,
}

impl JumpScareEngine {
    pub fn new(
        backend: Rc<dyn AudioBackend>,
        clock: Rc<dyn OutputClock>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            backend,
            clock,
            rng,
            bursts: Vec::new(),
            completions: Timers::new(),
        }
    }

    /// Fire a scare. The completion comes back from [`update`](Self::update)
    /// once the visual duration has passed, whether or not audio played.
    pub fn trigger(&mut self, intensity: Intensity) -> ScareEvent {
        let now = self.clock.now();
        let visual = intensity.visual_duration();
        let event = ScareEvent {
            intensity,
            started_at: now,
            visual_duration_ms: visual.as_millis() as u64,
        };
        self.completions.schedule(now + visual.as_secs_f64(), event);

        let plan = BurstPlan::new(intensity, self.rng.as_mut());
        match self.backend.open() {
            Ok(mut ctx) => {
                let voice = match ctx.play("scare", Box::new(plan.render(SCARE_SAMPLE_RATE))) {
                    Ok(voice) => Some(voice),
                    Err(e) => {
                        log::warn!("scare burst failed: {e}");
                        None
                    }
                };
                self.bursts.push(Burst {
                    audio_ends_at: now + plan.duration as f64,
                    _voice: voice,
                    _context: ctx,
                });
            }
            Err(e) => log::warn!("scare audio unavailable: {e}"),
        }
        log::info!(
            "jump scare: {} ({} oscillators, {:.1}s audio)",
            intensity.name(),
            plan.oscillators.len(),
            plan.duration
        );
        event
    }

    /// Tear down finished bursts and return scares whose visual has ended.
    pub fn update(&mut self) -> Vec<ScareEvent> {
        let now = self.clock.now();
        self.bursts.retain(|b| b.audio_ends_at > now);
        self.completions.due(now)
    }

    pub fn active_bursts(&self) -> usize {
        self.bursts.len()
    }

    pub fn is_showing(&self) -> bool {
        !self.completions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::output::CaptureBackend;
    use crate::audio::random::SequenceRandom;

    #[test]
    fn extreme_plan_shape() {
        let mut rng = SequenceRandom::new(vec![0.0, 0.25, 0.5, 0.75, 0.99]);
        let plan = BurstPlan::new(Intensity::Extreme, &mut rng);
        assert_eq!(plan.oscillators.len(), 5);
        assert_eq!(plan.duration, 0.8);
        assert_eq!(plan.volume, 1.0);
        assert!((plan.noise_gain - 1.2).abs() < 1e-6);
        let shapes: Vec<Shape> = plan.oscillators.iter().map(|o| o.shape).collect();
        assert_eq!(
            shapes,
            vec![Shape::Sawtooth, Shape::Square, Shape::Sawtooth, Shape::Square, Shape::Sawtooth]
        );
        for spec in &plan.oscillators {
            let target = spec.ramp_to.unwrap();
            assert!(target >= spec.frequency * 0.5 && target < spec.frequency * 1.5);
        }
        assert_eq!(plan.oscillators[0].ramp_to, Some(50.0));
    }

    #[test]
    fn mild_plan_has_two_steady_tones() {
        let mut rng = SequenceRandom::new(vec![0.5]);
        let plan = BurstPlan::new(Intensity::Mild, &mut rng);
        let freqs: Vec<f32> = plan.oscillators.iter().map(|o| o.frequency).collect();
        assert_eq!(freqs, vec![100.0, 200.0]);
        assert!(plan.oscillators.iter().all(|o| o.ramp_to.is_none()));
        assert_eq!(plan.duration, 0.3);
        assert!((plan.noise_gain - 0.24).abs() < 1e-6);
    }

    #[test]
    fn standard_plan_scales() {
        let mut rng = SequenceRandom::new(vec![0.5]);
        let plan = BurstPlan::new(Intensity::Standard, &mut rng);
        assert_eq!(plan.oscillators.len(), 5);
        assert_eq!(plan.duration, 0.5);
        assert_eq!(plan.volume, 0.6);
        assert_eq!(Intensity::Standard.visual_duration().as_millis(), 600);
    }

    #[test]
    fn noise_layer_is_part_of_the_burst() {
        let mut rng = SequenceRandom::new(vec![0.5]);
        let plan = BurstPlan::new(Intensity::Mild, &mut rng);
        let tones_only = BurstPlan {
            noise_gain: 0.0,
            ..plan.clone()
        };
        let with_noise: Vec<f32> = plan.render(SCARE_SAMPLE_RATE).collect();
        let without: Vec<f32> = tones_only.render(SCARE_SAMPLE_RATE).collect();
        assert_eq!(with_noise.len(), without.len());
        let diff: f32 = with_noise
            .iter()
            .zip(&without)
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / with_noise.len() as f32;
        assert!(diff > 0.01, "noise layer missing, mean diff {diff}");

        // Noise gain ramps to silence, so the last samples are tones only.
        let tail = with_noise.len() - 1;
        assert!((with_noise[tail] - without[tail]).abs() < 1e-3);
    }

    #[test]
    fn burst_renders_full_length_and_stays_limited() {
        let mut rng = SequenceRandom::new(vec![0.3, 0.6, 0.9]);
        let plan = BurstPlan::new(Intensity::Extreme, &mut rng);
        let samples: Vec<f32> = plan.render(SCARE_SAMPLE_RATE).collect();
        assert_eq!(samples.len(), (0.8f32 * SCARE_SAMPLE_RATE as f32).round() as usize);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 0.95));
        let head = samples[..4410].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(head > 0.5, "burst should be loud at the start, got {head}");
    }

    #[test]
    fn extreme_trigger_timeline() {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        let mut engine = JumpScareEngine::new(
            Rc::new(backend.clone()),
            Rc::new(clock.clone()),
            Box::new(SequenceRandom::new(vec![0.5])),
        );
        clock.set(2.0);
        let event = engine.trigger(Intensity::Extreme);
        assert_eq!(event.visual_duration_ms, 1000);
        assert_eq!(event.started_at, 2.0);
        assert!(backend.is_live("scare"));

        clock.set(2.5);
        assert!(engine.update().is_empty());
        assert_eq!(engine.active_bursts(), 1);

        clock.set(2.85);
        assert!(engine.update().is_empty());
        assert_eq!(engine.active_bursts(), 0);
        assert_eq!(backend.live_contexts(), 0);
        assert!(engine.is_showing());

        clock.set(3.0);
        assert_eq!(engine.update(), vec![event]);
        assert!(!engine.is_showing());
        assert!(engine.update().is_empty());
    }

    #[test]
    fn completion_fires_without_output() {
        let clock = ManualClock::new();
        let mut engine = JumpScareEngine::new(
            Rc::new(CaptureBackend::unavailable()),
            Rc::new(clock.clone()),
            Box::new(SequenceRandom::new(vec![0.5])),
        );
        let event = engine.trigger(Intensity::Mild);
        assert_eq!(engine.active_bursts(), 0);
        clock.set(0.4);
        assert_eq!(engine.update(), vec![event]);
    }

    #[test]
    fn overlapping_scares_complete_in_order() {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        let mut engine = JumpScareEngine::new(
            Rc::new(backend.clone()),
            Rc::new(clock.clone()),
            Box::new(SequenceRandom::new(vec![0.5])),
        );
        let first = engine.trigger(Intensity::Extreme);
        clock.set(0.1);
        let second = engine.trigger(Intensity::Mild);
        assert_eq!(backend.live_contexts(), 2);
        clock.set(2.0);
        assert_eq!(engine.update(), vec![second, first]);
    }
}
