//! Hidden knock target.
//!
//! Each knock plays a short low thud that climbs in pitch with the streak.
//! Five knocks in a row summon a scare; a pause longer than
//! [`KNOCK_RESET`] seconds starts the streak over.

use std::rc::Rc;
use std::time::Duration;

use rodio::Source;

use super::clock::OutputClock;
use super::output::{AudioBackend, AudioContext, Voice};
use super::synth::{Automation, Oscillator, Shape};

pub const KNOCK_SAMPLE_RATE: u32 = 44_100;
/// Seconds of silence after which the streak resets.
pub const KNOCK_RESET: f64 = 0.8;
pub const KNOCKS_TO_SUMMON: u32 = 5;

const THUD_BASE_HZ: f32 = 50.0;
const THUD_STEP_HZ: f32 = 10.0;
const THUD_GAIN: f32 = 0.05;
const THUD_FLOOR: f32 = 0.001;
const THUD_SECS: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnockOutcome {
    /// Streak continues; holds the new count.
    Counted(u32),
    /// Streak complete. The count is back to zero.
    Summon,
}

/// Triangle thud with an exponential decay.
pub struct ThudSource {
    osc: Oscillator,
    gain: Automation,
    position: u32,
    length: u32,
}

impl ThudSource {
    pub fn new(frequency: f32, sample_rate: u32) -> Self {
        Self {
            osc: Oscillator::fixed(Shape::Triangle, frequency, sample_rate),
            gain: Automation::constant(THUD_GAIN).exponential_to(THUD_FLOOR, THUD_SECS),
            position: 0,
            length: (THUD_SECS * sample_rate as f32).round() as u32,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.osc.frequency()
    }
}

impl Iterator for ThudSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }
        self.position += 1;
        let t = self.osc.time();
        Some(self.osc.next_sample() * self.gain.value_at(t))
    }
}

impl Source for ThudSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.length - self.position) as usize)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        KNOCK_SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(THUD_SECS))
    }
}

struct Thud {
    ends_at: f64,
    _voice: Voice,
    _context: Box<dyn AudioContext>,
}

pub struct GhostKnock {
    backend: Rc<dyn AudioBackend>,
    clock: Rc<dyn OutputClock>,
    count: u32,
    last_knock: Option<f64>,
    thuds: Vec<Thud>,
}

impl GhostKnock {
    pub fn new(backend: Rc<dyn AudioBackend>, clock: Rc<dyn OutputClock>) -> Self {
        Self {
            backend,
            clock,
            count: 0,
            last_knock: None,
            thuds: Vec::new(),
        }
    }

    /// Current streak, already reset if the last knock is stale.
    pub fn count(&self) -> u32 {
        if self.expired(self.clock.now()) {
            0
        } else {
            self.count
        }
    }

    fn expired(&self, now: f64) -> bool {
        match self.last_knock {
            Some(last) => now - last > KNOCK_RESET,
            None => true,
        }
    }

    pub fn knock(&mut self) -> KnockOutcome {
        let now = self.clock.now();
        if self.expired(now) {
            self.count = 0;
        }
        self.thud(THUD_BASE_HZ + self.count as f32 * THUD_STEP_HZ, now);

        self.count += 1;
        self.last_knock = Some(now);
        if self.count >= KNOCKS_TO_SUMMON {
            log::info!("ghost summoned");
            self.count = 0;
            self.last_knock = None;
            KnockOutcome::Summon
        } else {
            KnockOutcome::Counted(self.count)
        }
    }

    fn thud(&mut self, frequency: f32, now: f64) {
        let mut ctx = match self.backend.open() {
            Ok(ctx) => ctx,
            Err(e) => {
                log::debug!("knock silent: {e}");
                return;
            }
        };
        match ctx.play("knock", Box::new(ThudSource::new(frequency, KNOCK_SAMPLE_RATE))) {
            Ok(voice) => self.thuds.push(Thud {
                ends_at: now + THUD_SECS as f64,
                _voice: voice,
                _context: ctx,
            }),
            Err(e) => log::debug!("knock silent: {e}"),
        }
    }

    /// Release thuds that have finished sounding.
    pub fn update(&mut self) {
        let now = self.clock.now();
        self.thuds.retain(|t| t.ends_at > now);
    }

    pub fn sounding(&self) -> usize {
        self.thuds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::output::CaptureBackend;

    fn knocker() -> (GhostKnock, CaptureBackend, ManualClock) {
        let backend = CaptureBackend::new();
        let clock = ManualClock::new();
        let knock = GhostKnock::new(Rc::new(backend.clone()), Rc::new(clock.clone()));
        (knock, backend, clock)
    }

    #[test]
    fn fifth_knock_summons_and_resets() {
        let (mut knock, backend, clock) = knocker();
        for n in 1..=4 {
            assert_eq!(knock.knock(), KnockOutcome::Counted(n));
            clock.advance(0.3);
        }
        assert_eq!(knock.knock(), KnockOutcome::Summon);
        assert_eq!(knock.count(), 0);
        assert_eq!(backend.count("knock"), 5);
        assert_eq!(knock.knock(), KnockOutcome::Counted(1));
    }

    #[test]
    fn slow_knocks_never_summon() {
        let (mut knock, _backend, clock) = knocker();
        for _ in 0..10 {
            assert_eq!(knock.knock(), KnockOutcome::Counted(1));
            clock.advance(0.81);
        }
    }

    #[test]
    fn streak_expires_after_pause() {
        let (mut knock, _backend, clock) = knocker();
        knock.knock();
        knock.knock();
        clock.advance(0.5);
        assert_eq!(knock.count(), 2);
        clock.advance(0.4);
        assert_eq!(knock.count(), 0);
    }

    fn sign_changes(source: crate::audio::output::SynthSource) -> usize {
        let samples: Vec<f32> = source.collect();
        samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    #[test]
    fn pitch_climbs_with_streak() {
        let (mut knock, backend, _clock) = knocker();
        knock.knock();
        let first = sign_changes(backend.take_latest("knock").unwrap());
        knock.knock();
        knock.knock();
        let third = sign_changes(backend.take_latest("knock").unwrap());
        // 50 Hz vs 70 Hz over 100 ms
        assert!((9..=11).contains(&first), "{first}");
        assert!((13..=15).contains(&third), "{third}");
        assert_eq!(ThudSource::new(70.0, KNOCK_SAMPLE_RATE).frequency(), 70.0);
    }

    #[test]
    fn thud_is_short_and_quiet() {
        let samples: Vec<f32> = ThudSource::new(60.0, KNOCK_SAMPLE_RATE).collect();
        assert_eq!(samples.len(), 4410);
        assert!(samples.iter().all(|s| s.abs() <= THUD_GAIN + 1e-6));
        let tail = samples[4000..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail < 0.005);
    }

    #[test]
    fn thuds_release_their_output() {
        let (mut knock, backend, clock) = knocker();
        knock.knock();
        assert_eq!(knock.sounding(), 1);
        assert_eq!(backend.live_contexts(), 1);
        clock.advance(0.15);
        knock.update();
        assert_eq!(knock.sounding(), 0);
        assert_eq!(backend.live_contexts(), 0);
    }

    #[test]
    fn knocks_count_without_output() {
        let backend = CaptureBackend::unavailable();
        let clock = ManualClock::new();
        let mut knock = GhostKnock::new(Rc::new(backend), Rc::new(clock));
        for _ in 0..4 {
            knock.knock();
        }
        assert_eq!(knock.knock(), KnockOutcome::Summon);
    }
}
