//! Procedural ambient soundscape.
//!
//! A detuned sub-bass drone and a gusting wind bed run for as long as the
//! engine is on. On top of that a self-rescheduling timer drops in a creak
//! or a whisper every 4 to 12 seconds.

use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rodio::Source;

use super::clock::OutputClock;
use super::filter::Biquad;
use super::output::{AudioBackend, AudioContext, SynthSource, Voice};
use super::random::RandomSource;
use super::scheduler::Timers;
use super::synth::{generate_pink_noise, Automation, Oscillator, Shape};
use super::waveform::WaveformSource;

pub const AMBIENT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_MASTER_VOLUME: f32 = 0.5;

const DRONE_GAIN: f32 = 0.15;
const WIND_GAIN: f32 = 0.5;
const WIND_CUTOFF: f32 = 400.0;
const WIND_SWEEP: f32 = 300.0;
const WIND_LFO_HZ: f32 = 0.07;
const WIND_LOOP_SECS: f32 = 2.0;
/// Samples between wind filter retunes.
const CONTROL_PERIOD: u32 = 32;

const MIN_DELAY: f64 = 4.0;
const MAX_DELAY: f64 = 12.0;
/// Share of transients that are whispers. Rolls above it pick a creak.
const WHISPER_ODDS: f64 = 0.6;

const CREAK_SWEEP_SECS: f32 = 0.6;
const CREAK_LIFETIME: f32 = 0.7;
const WHISPER_TAIL: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// One-shot effect injected by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transient {
    Creak { start_hz: f32 },
    Whisper { duration: f32, from_hz: f32, to_hz: f32 },
}

impl Transient {
    /// Draw the next effect: one roll for the branch, then its parameters.
    pub fn pick(rng: &mut dyn RandomSource) -> Self {
        if rng.next_unit() > WHISPER_ODDS {
            Transient::Creak {
                start_hz: rng.range(100.0, 200.0) as f32,
            }
        } else {
            Transient::Whisper {
                duration: rng.range(2.0, 3.0) as f32,
                from_hz: rng.range(800.0, 1300.0) as f32,
                to_hz: rng.range(1500.0, 2000.0) as f32,
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transient::Creak { .. } => "creak",
            Transient::Whisper { .. } => "whisper",
        }
    }

    /// Seconds until the effect has fully stopped.
    pub fn lifetime(&self) -> f32 {
        match self {
            Transient::Creak { .. } => CREAK_LIFETIME,
            Transient::Whisper { duration, .. } => duration + WHISPER_TAIL,
        }
    }
}

// ---------- sources ----------

/// Triangle at 45 Hz against a sine at 48 Hz for a slow 3 Hz beat.
pub struct DroneSource {
    low: Oscillator,
    high: Oscillator,
    gain: f32,
    sample_rate: u32,
}

impl DroneSource {
    pub fn new(master: f32, sample_rate: u32) -> Self {
        Self {
            low: Oscillator::fixed(Shape::Triangle, 45.0, sample_rate),
            high: Oscillator::fixed(Shape::Sine, 48.0, sample_rate),
            gain: DRONE_GAIN * master,
            sample_rate,
        }
    }
}

impl Iterator for DroneSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        Some((self.low.next_sample() + self.high.next_sample()) * self.gain)
    }
}

impl Source for DroneSource {
    fn current_frame_len(&self) -> Option<usize> { None }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate }
    fn total_duration(&self) -> Option<Duration> { None }
}

/// Looped pink noise through a lowpass whose cutoff drifts with a slow LFO.
pub struct WindSource {
    noise: WaveformSource,
    filter: Biquad,
    lfo: Oscillator,
    gain: f32,
    counter: u32,
    sample_rate: u32,
}

impl WindSource {
    pub fn new(master: f32, noise_seed: u64, sample_rate: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(noise_seed);
        let bed = generate_pink_noise(WIND_LOOP_SECS, sample_rate, &mut rng);
        Self {
            noise: bed.looped(),
            filter: Biquad::lowpass(WIND_CUTOFF, 1.0, sample_rate),
            lfo: Oscillator::fixed(Shape::Sine, WIND_LFO_HZ, sample_rate),
            gain: WIND_GAIN * master,
            counter: 0,
            sample_rate,
        }
    }
}

impl Iterator for WindSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sweep = self.lfo.next_sample();
        if self.counter % CONTROL_PERIOD == 0 {
            self.filter.set_frequency(WIND_CUTOFF + sweep * WIND_SWEEP);
        }
        self.counter = self.counter.wrapping_add(1);
        let input = self.noise.next().unwrap_or(0.0);
        Some(self.filter.process(input) * self.gain)
    }
}

impl Source for WindSource {
    fn current_frame_len(&self) -> Option<usize> { None }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate }
    fn total_duration(&self) -> Option<Duration> { None }
}

/// Falling sawtooth, roughened by a 40 Hz FM wobble and highpassed.
pub struct CreakSource {
    osc: Oscillator,
    wobble: Oscillator,
    filter: Biquad,
    envelope: Automation,
    master: f32,
    sample_rate: f32,
    position: u32,
    length: u32,
}

impl CreakSource {
    pub fn new(start_hz: f32, master: f32, sample_rate: u32) -> Self {
        let frequency = Automation::constant(start_hz).exponential_to(30.0, CREAK_SWEEP_SECS);
        Self {
            osc: Oscillator::new(Shape::Sawtooth, frequency, sample_rate),
            wobble: Oscillator::fixed(Shape::Sine, 40.0, sample_rate),
            filter: Biquad::highpass(200.0, sample_rate),
            envelope: Automation::constant(0.08).exponential_to(0.001, CREAK_SWEEP_SECS),
            master,
            sample_rate: sample_rate as f32,
            position: 0,
            length: (CREAK_LIFETIME * sample_rate as f32) as u32,
        }
    }
}

impl Iterator for CreakSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }
        let t = self.position as f32 / self.sample_rate;
        self.position += 1;
        let fm = self.wobble.next_sample() * 200.0;
        let raw = self.osc.next_modulated(fm);
        Some(self.filter.process(raw) * self.envelope.value_at(t) * self.master)
    }
}

impl Source for CreakSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.length - self.position) as usize)
    }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate as u32 }
    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(CREAK_LIFETIME))
    }
}

/// Pink noise through a rising narrow bandpass, swelling then fading.
pub struct WhisperSource {
    noise: WaveformSource,
    filter: Biquad,
    sweep: Automation,
    envelope: Automation,
    master: f32,
    sample_rate: f32,
    position: u32,
    length: u32,
}

impl WhisperSource {
    pub fn new(
        duration: f32,
        from_hz: f32,
        to_hz: f32,
        master: f32,
        noise_seed: u64,
        sample_rate: u32,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(noise_seed);
        let noise = generate_pink_noise(duration, sample_rate, &mut rng);
        Self {
            noise: noise.play_from(0.0),
            filter: Biquad::bandpass(from_hz, 5.0, sample_rate),
            sweep: Automation::constant(from_hz).linear_to(to_hz, duration),
            envelope: Automation::constant(0.0)
                .linear_to(0.1, duration * 0.2)
                .linear_to(0.0, duration),
            master,
            sample_rate: sample_rate as f32,
            position: 0,
            length: ((duration + WHISPER_TAIL) * sample_rate as f32) as u32,
        }
    }
}

impl Iterator for WhisperSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }
        let t = self.position as f32 / self.sample_rate;
        if self.position % CONTROL_PERIOD == 0 {
            self.filter.set_frequency(self.sweep.value_at(t));
        }
        self.position += 1;
        let input = self.noise.next().unwrap_or(0.0);
        Some(self.filter.process(input) * self.envelope.value_at(t) * self.master)
    }
}

impl Source for WhisperSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.length - self.position) as usize)
    }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate as u32 }
    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(self.length as f32 / self.sample_rate))
    }
}

// ---------- engine ----------

struct Playing {
    ends_at: f64,
    _voice: Voice,
}

pub struct AmbientEngine {
    backend: Rc<dyn AudioBackend>,
    clock: Rc<dyn OutputClock>,
    rng: Box<dyn RandomSource>,
    master_volume: f32,
    state: AmbientState,
    // Voices are declared ahead of the context that plays them.
    bed: Vec<Voice>,
    transients: Vec<Playing>,
    context: Option<Box<dyn AudioContext>>,
    timers: Timers<()>,
    fired: usize,
}

impl AmbientEngine {
    pub fn new(
        backend: Rc<dyn AudioBackend>,
        clock: Rc<dyn OutputClock>,
        rng: Box<dyn RandomSource>,
        master_volume: f32,
    ) -> Self {
        Self {
            backend,
            clock,
            rng,
            master_volume: master_volume.clamp(0.0, 1.0),
            state: AmbientState::Stopped,
            bed: Vec::new(),
            transients: Vec::new(),
            context: None,
            timers: Timers::new(),
            fired: 0,
        }
    }

    pub fn state(&self) -> AmbientState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == AmbientState::Running
    }

    /// Open an output and start the drone, wind and scheduler. No-op while running.
    pub fn start(&mut self) {
        if self.state != AmbientState::Stopped {
            return;
        }
        self.state = AmbientState::Starting;

        let mut ctx = match self.backend.open() {
            Ok(ctx) => ctx,
            Err(e) => {
                log::warn!("ambient soundscape unavailable: {e}");
                self.state = AmbientState::Stopped;
                return;
            }
        };

        let sr = AMBIENT_SAMPLE_RATE;
        let master = self.master_volume;
        let drone: SynthSource = Box::new(DroneSource::new(master, sr));
        let wind: SynthSource = Box::new(WindSource::new(master, self.rng.noise_seed(), sr));
        for (label, source) in [("drone", drone), ("wind", wind)] {
            match ctx.play(label, source) {
                Ok(voice) => self.bed.push(voice),
                Err(e) => log::warn!("ambient {label} failed to start: {e}"),
            }
        }
        self.context = Some(ctx);
        self.state = AmbientState::Running;
        self.schedule_next();
        log::info!("ambient soundscape started");
    }

    /// Cancel the scheduler and release every voice and the output.
    /// Safe to call repeatedly and from any state.
    pub fn stop(&mut self) {
        if self.state == AmbientState::Stopped {
            return;
        }
        self.state = AmbientState::Stopping;
        self.timers.cancel_all();
        self.transients.clear();
        self.bed.clear();
        self.context = None;
        self.state = AmbientState::Stopped;
        log::info!("ambient soundscape stopped");
    }

    pub fn toggle(&mut self) {
        if self.is_active() {
            self.stop();
        } else {
            self.start();
        }
    }

    fn schedule_next(&mut self) {
        let delay = self.rng.range(MIN_DELAY, MAX_DELAY);
        let due = self.clock.now() + delay;
        self.timers.schedule(due, ());
        log::debug!("next ambient transient in {delay:.2}s");
    }

    /// Per-frame tick: fire due transients and retire finished ones.
    pub fn update(&mut self) {
        if self.state != AmbientState::Running {
            return;
        }
        let now = self.clock.now();
        for () in self.timers.due(now) {
            self.fire(now);
            self.schedule_next();
        }
        self.transients.retain(|p| p.ends_at > now);
    }

    fn fire(&mut self, now: f64) {
        let transient = Transient::pick(self.rng.as_mut());
        let sr = AMBIENT_SAMPLE_RATE;
        let master = self.master_volume;
        let source: SynthSource = match transient {
            Transient::Creak { start_hz } => Box::new(CreakSource::new(start_hz, master, sr)),
            Transient::Whisper {
                duration,
                from_hz,
                to_hz,
            } => Box::new(WhisperSource::new(
                duration,
                from_hz,
                to_hz,
                master,
                self.rng.noise_seed(),
                sr,
            )),
        };
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        match ctx.play(transient.label(), source) {
            Ok(voice) => {
                self.fired += 1;
                log::debug!("ambient transient: {transient:?}");
                self.transients.push(Playing {
                    ends_at: now + transient.lifetime() as f64,
                    _voice: voice,
                });
            }
            Err(e) => log::warn!("ambient {} failed: {e}", transient.label()),
        }
    }

    /// Transients started since construction.
    pub fn transients_fired(&self) -> usize {
        self.fired
    }

    pub fn transients_playing(&self) -> usize {
        self.transients.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_transient_at(&self) -> Option<f64> {
        self.timers.next_due()
    }
}

impl Drop for AmbientEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::output::CaptureBackend;
    use crate::audio::random::SequenceRandom;

    fn engine(backend: &CaptureBackend, clock: &ManualClock, values: Vec<f64>) -> AmbientEngine {
        AmbientEngine::new(
            Rc::new(backend.clone()),
            Rc::new(clock.clone()),
            Box::new(SequenceRandom::new(values)),
            DEFAULT_MASTER_VOLUME,
        )
    }

    /// Advance in 16 ms frames, ticking each one.
    fn run(engine: &mut AmbientEngine, clock: &ManualClock, seconds: f64) {
        let frames = (seconds / 0.016).round() as usize;
        for _ in 0..frames {
            clock.advance(0.016);
            engine.update();
        }
    }

    #[test]
    fn twenty_seconds_fire_exactly_one_transient() {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        // Every draw is 0.9: delays of 11.2 s and a creak each time.
        let mut amb = engine(&backend, &clock, vec![0.9]);
        amb.start();
        assert!(amb.is_active());
        assert!(backend.is_live("drone") && backend.is_live("wind"));

        run(&mut amb, &clock, 20.0);
        assert_eq!(amb.transients_fired(), 1);
        assert_eq!(backend.count("creak"), 1);

        amb.stop();
        assert_eq!(amb.pending_timers(), 0);
        assert_eq!(backend.live_voices(), 0);
        assert_eq!(backend.live_contexts(), 0);

        run(&mut amb, &clock, 30.0);
        assert_eq!(amb.transients_fired(), 1);
    }

    #[test]
    fn low_rolls_pick_whispers() {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        // Delay 6.4 s each time; roll 0.3 means whisper.
        let mut amb = engine(&backend, &clock, vec![0.3]);
        amb.start();
        run(&mut amb, &clock, 20.0);
        assert_eq!(backend.count("whisper"), 3);
        assert_eq!(backend.count("creak"), 0);
    }

    #[test]
    fn delays_stay_in_bounds() {
        let clock = ManualClock::new();
        for v in [0.0, 0.5, 0.999] {
            let backend = CaptureBackend::new();
            let mut amb = engine(&backend, &clock, vec![v]);
            let now = clock.now();
            amb.start();
            let due = amb.next_transient_at().unwrap() - now;
            assert!((4.0..12.0).contains(&due), "delay {due}");
            amb.stop();
        }
    }

    #[test]
    fn transient_draws() {
        let mut rng = SequenceRandom::new(vec![0.61, 0.5]);
        assert_eq!(Transient::pick(&mut rng), Transient::Creak { start_hz: 150.0 });

        let mut rng = SequenceRandom::new(vec![0.6, 0.5, 0.0, 0.5]);
        match Transient::pick(&mut rng) {
            Transient::Whisper {
                duration,
                from_hz,
                to_hz,
            } => {
                assert_eq!(duration, 2.5);
                assert_eq!(from_hz, 800.0);
                assert_eq!(to_hz, 1750.0);
            }
            other => panic!("expected whisper, got {other:?}"),
        }
    }

    #[test]
    fn whispers_take_sixty_percent_of_rolls() {
        let whispers = (0..100)
            .map(|i| i as f64 / 100.0 + 0.005)
            .filter(|&roll| {
                let mut rng = SequenceRandom::new(vec![roll, 0.5]);
                matches!(Transient::pick(&mut rng), Transient::Whisper { .. })
            })
            .count();
        assert_eq!(whispers, 60);
    }

    #[test]
    fn stop_twice_and_restart() {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        let mut amb = engine(&backend, &clock, vec![0.5]);
        amb.stop();
        amb.start();
        amb.start();
        assert_eq!(backend.contexts_opened(), 1);
        amb.stop();
        amb.stop();
        assert_eq!(amb.state(), AmbientState::Stopped);
        assert_eq!(backend.live_voices(), 0);
        amb.toggle();
        assert!(amb.is_active());
        assert_eq!(backend.contexts_opened(), 2);
    }

    #[test]
    fn finished_transients_are_retired() {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        let mut amb = engine(&backend, &clock, vec![0.9]);
        amb.start();
        run(&mut amb, &clock, 11.3);
        assert_eq!(amb.transients_playing(), 1);
        run(&mut amb, &clock, 1.0);
        assert_eq!(amb.transients_playing(), 0);
    }

    #[test]
    fn unavailable_output_is_silent_no_op() {
        let backend = CaptureBackend::unavailable();
        let clock = ManualClock::new();
        let mut amb = engine(&backend, &clock, vec![0.5]);
        amb.start();
        assert!(!amb.is_active());
        assert_eq!(amb.pending_timers(), 0);
        amb.stop();
    }

    #[test]
    fn creak_and_whisper_render_for_their_lifetime() {
        let sr = AMBIENT_SAMPLE_RATE;
        let creak: Vec<f32> = CreakSource::new(150.0, 0.5, sr).collect();
        assert_eq!(creak.len(), (0.7 * sr as f32) as usize);
        assert!(creak.iter().all(|s| s.is_finite() && s.abs() < 0.2));

        let whisper: Vec<f32> = WhisperSource::new(2.0, 900.0, 1600.0, 0.5, 42, sr).collect();
        assert_eq!(whisper.len(), (2.1 * sr as f32) as usize);
        assert!(whisper.iter().all(|s| s.is_finite()));
        // Silent at the very start and after the fade.
        assert_eq!(whisper[0], 0.0);
        assert!(whisper[whisper.len() - 1].abs() < 1e-6);
    }

    #[test]
    fn bed_is_audible_but_bounded() {
        let sr = AMBIENT_SAMPLE_RATE;
        let drone: Vec<f32> = DroneSource::new(0.5, sr).take(sr as usize).collect();
        let wind: Vec<f32> = WindSource::new(0.5, 9, sr).take(sr as usize).collect();
        for layer in [&drone, &wind] {
            let peak = layer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak > 0.001 && peak < 0.5, "peak {peak}");
        }
    }
}
