//! Director: one place that owns every engine and drives them per frame.
//!
//! The presentation layer calls [`Director::frame`] once per output frame
//! and reads [`UiEvent`]s from [`Director::events`].

use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::audio::ambient::AmbientEngine;
use crate::audio::clock::OutputClock;
use crate::audio::decoder::{DecodeJob, DecodeQueue, SpeechRequest, SpeechSynthesizer, Ticket};
use crate::audio::ghost_knock::{GhostKnock, KnockOutcome};
use crate::audio::jump_scare::{JumpScareEngine, ScareEvent};
use crate::audio::narration::{NarrationEvent, NarrationOptions, NarrationPlayer, PlaybackState, Progress};
use crate::audio::output::AudioBackend;
use crate::audio::random::{EntropyRandom, RandomSource};
use crate::audio::voice_cache::VoiceCache;
use crate::config::Config;
use crate::error::AudioError;
use crate::settings::{Intensity, Language, ListenerProfile, VoiceName};

/// Signals for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    AnticipationStart,
    AnticipationEnd,
    ScareTrigger(Intensity),
    ScareComplete(ScareEvent),
    PlaybackFinished,
    DecodeError(String),
}

pub struct Director {
    profile: ListenerProfile,
    narration: NarrationPlayer,
    ambient: AmbientEngine,
    scares: JumpScareEngine,
    knock: GhostKnock,
    cache: Arc<Mutex<VoiceCache>>,
    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,
}

impl Director {
    pub fn new(
        config: &Config,
        backend: Rc<dyn AudioBackend>,
        clock: Rc<dyn OutputClock>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> io::Result<Self> {
        Self::with_random(
            config,
            backend,
            clock,
            synthesizer,
            Box::new(EntropyRandom::new()),
            Box::new(EntropyRandom::new()),
        )
    }

    /// Same as [`new`](Self::new) with explicit randomness for the
    /// soundscape and the scare bursts.
    pub fn with_random(
        config: &Config,
        backend: Rc<dyn AudioBackend>,
        clock: Rc<dyn OutputClock>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        ambient_rng: Box<dyn RandomSource>,
        scare_rng: Box<dyn RandomSource>,
    ) -> io::Result<Self> {
        let profile = ListenerProfile::from_config(config);
        let cache = Arc::new(Mutex::new(VoiceCache::new(config.voice_cache_capacity)));
        let decoder = DecodeQueue::spawn(synthesizer, Arc::clone(&cache))?;
        let narration = NarrationPlayer::new(
            Rc::clone(&backend),
            Rc::clone(&clock),
            decoder,
            NarrationOptions {
                anticipation_lead: config.anticipation_lead_secs,
                auto_play: config.auto_play,
                jump_scares_enabled: profile.jump_scares_enabled,
            },
        );
        let mut ambient = AmbientEngine::new(
            Rc::clone(&backend),
            Rc::clone(&clock),
            ambient_rng,
            config.master_volume,
        );
        if config.ambient_enabled {
            ambient.start();
        }
        let scares = JumpScareEngine::new(Rc::clone(&backend), Rc::clone(&clock), scare_rng);
        let knock = GhostKnock::new(backend, clock);
        let (tx, rx) = crossbeam_channel::unbounded();

        Ok(Self {
            profile,
            narration,
            ambient,
            scares,
            knock,
            cache,
            tx,
            rx,
        })
    }

    /// Receiver for every event published by [`frame`](Self::frame).
    pub fn events(&self) -> Receiver<UiEvent> {
        self.rx.clone()
    }

    fn publish(&self, event: UiEvent) {
        log::debug!("ui event: {event:?}");
        // The director holds a receiver, so the channel never disconnects.
        let _ = self.tx.send(event);
    }

    /// Per-frame tick for every engine.
    pub fn frame(&mut self) {
        self.narration.tick();
        for event in self.narration.drain_events() {
            match event {
                NarrationEvent::AnticipationStart => self.publish(UiEvent::AnticipationStart),
                NarrationEvent::AnticipationEnd => self.publish(UiEvent::AnticipationEnd),
                NarrationEvent::ScareTrigger => self.trigger_scare(self.profile.intensity),
                NarrationEvent::PlaybackFinished => self.publish(UiEvent::PlaybackFinished),
                NarrationEvent::DecodeError(reason) => self.publish(UiEvent::DecodeError(reason)),
            }
        }
        self.ambient.update();
        self.knock.update();
        for done in self.scares.update() {
            self.publish(UiEvent::ScareComplete(done));
        }
    }

    pub fn trigger_scare(&mut self, intensity: Intensity) {
        self.scares.trigger(intensity);
        self.publish(UiEvent::ScareTrigger(intensity));
    }

    // ---------- narration ----------

    /// Decode and install a payload. A failure is also published as
    /// [`UiEvent::DecodeError`]; the current narration keeps playing.
    pub fn load(&mut self, payload: &str, cue_target: Option<f64>) -> Result<(), AudioError> {
        self.narration.load(payload, cue_target).map_err(|e| {
            log::warn!("narration load failed: {e}");
            if e.is_user_facing() {
                self.publish(UiEvent::DecodeError(e.to_string()));
            }
            e
        })
    }

    /// Decode a payload on the worker.
    pub fn begin_load(&mut self, payload: String, cue_target: Option<f64>) -> Ticket {
        self.narration.begin_load(DecodeJob::Payload(payload), cue_target)
    }

    /// Have the speech producer read `text` in the listener's voice.
    pub fn begin_generate(&mut self, text: impl Into<String>, cue_target: Option<f64>) -> Ticket {
        let request = SpeechRequest {
            text: text.into(),
            language: self.profile.language,
            voice: self.profile.voice.clone(),
        };
        self.narration.begin_load(DecodeJob::Generate(request), cue_target)
    }

    /// Audition `voice` with a short line. Replaces the current narration.
    pub fn preview_voice(&mut self, voice: VoiceName) -> Ticket {
        let language = self.profile.language;
        log::info!(
            "previewing voice {voice} ({})",
            voice.description().unwrap_or("custom")
        );
        self.narration.begin_preview(DecodeJob::Generate(SpeechRequest {
            text: language.preview_line().to_string(),
            language,
            voice,
        }))
    }

    pub fn play(&mut self, offset: f64) {
        self.narration.play(offset);
    }

    pub fn pause(&mut self) {
        self.narration.pause();
    }

    pub fn stop(&mut self) {
        self.narration.stop();
    }

    pub fn toggle(&mut self) {
        self.narration.toggle();
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.narration.state()
    }

    pub fn is_loading(&self) -> bool {
        self.narration.is_loading()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.narration.progress()
    }

    pub fn cue_time(&self) -> Option<f64> {
        self.narration.cue_time()
    }

    // ---------- ambient ----------

    pub fn toggle_ambient(&mut self) {
        self.ambient.toggle();
    }

    pub fn start_ambient(&mut self) {
        self.ambient.start();
    }

    pub fn stop_ambient(&mut self) {
        self.ambient.stop();
    }

    pub fn ambient_active(&self) -> bool {
        self.ambient.is_active()
    }

    // ---------- ghost knock ----------

    /// Knock on the hidden target. The fifth knock in a row fires a scare
    /// at the listener's intensity, whether or not scares are enabled.
    pub fn knock(&mut self) -> KnockOutcome {
        let outcome = self.knock.knock();
        if outcome == KnockOutcome::Summon {
            self.trigger_scare(self.profile.intensity);
        }
        outcome
    }

    // ---------- settings ----------

    pub fn profile(&self) -> &ListenerProfile {
        &self.profile
    }

    pub fn set_jump_scares_enabled(&mut self, enabled: bool) {
        self.profile.jump_scares_enabled = enabled;
        self.narration.set_jump_scares_enabled(enabled);
    }

    pub fn set_intensity(&mut self, intensity: Intensity) {
        self.profile.intensity = intensity;
    }

    pub fn cycle_intensity(&mut self) -> Intensity {
        self.profile.intensity = self.profile.intensity.next();
        self.profile.intensity
    }

    pub fn set_voice(&mut self, voice: VoiceName) {
        if !voice.is_known() {
            log::debug!("voice {voice} is not a built-in choice");
        }
        self.profile.voice = voice;
    }

    pub fn set_language(&mut self, language: Language) {
        self.profile.language = language;
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.profile.set_brightness(brightness);
    }

    /// Drop every generated payload cached while the settings panel was open.
    pub fn close_settings_session(&mut self) {
        if let Ok(mut cache) = self.cache.lock() {
            log::debug!("voice cache cleared ({} entries)", cache.len());
            cache.clear();
        }
    }

    pub fn cached_voices(&self) -> usize {
        self.cache.lock().map_or(0, |c| c.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::decoder::encode_pcm16;
    use crate::audio::output::CaptureBackend;
    use crate::audio::random::SequenceRandom;
    use crate::audio::waveform::NARRATION_SAMPLE_RATE;
    use crate::error::GenerationError;
    use std::time::{Duration, Instant};

    struct Echo;

    impl SpeechSynthesizer for Echo {
        fn synthesize(&self, request: &SpeechRequest) -> Result<String, GenerationError> {
            if request.voice.as_str() == "Mute" {
                return Err(GenerationError("voice not available".into()));
            }
            Ok(encode_pcm16(&vec![0.1; NARRATION_SAMPLE_RATE as usize]))
        }
    }

    struct Rig {
        clock: ManualClock,
        backend: CaptureBackend,
        director: Director,
        events: Receiver<UiEvent>,
    }

    fn rig(config: Config) -> Rig {
        let clock = ManualClock::new();
        let backend = CaptureBackend::new();
        let director = Director::with_random(
            &config,
            Rc::new(backend.clone()),
            Rc::new(clock.clone()),
            Some(Arc::new(Echo)),
            Box::new(SequenceRandom::new(vec![0.9])),
            Box::new(SequenceRandom::new(vec![0.5])),
        )
        .unwrap();
        let events = director.events();
        Rig {
            clock,
            backend,
            director,
            events,
        }
    }

    impl Rig {
        fn at(&mut self, t: f64) -> Vec<UiEvent> {
            self.clock.set(t);
            self.director.frame();
            self.events.try_iter().collect()
        }

        fn settle(&mut self) -> Vec<UiEvent> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.director.is_loading() && Instant::now() < deadline {
                self.director.frame();
                std::thread::sleep(Duration::from_millis(1));
            }
            self.events.try_iter().collect()
        }
    }

    fn narration(seconds: f64) -> String {
        encode_pcm16(&vec![0.0; (seconds * NARRATION_SAMPLE_RATE as f64) as usize])
    }

    fn scares_on() -> Config {
        Config {
            jump_scares_enabled: true,
            intensity: Intensity::Extreme,
            ..Config::default()
        }
    }

    #[test]
    fn cue_drives_scare_and_completion() {
        let mut r = rig(scares_on());
        r.director.load(&narration(10.0), Some(0.8)).unwrap();
        assert_eq!(r.director.playback_state(), PlaybackState::Playing);
        assert_eq!(r.director.cue_time(), Some(8.0));

        assert_eq!(r.at(4.0), vec![UiEvent::AnticipationStart]);
        assert_eq!(
            r.at(8.0),
            vec![UiEvent::AnticipationEnd, UiEvent::ScareTrigger(Intensity::Extreme)]
        );
        assert!(r.backend.is_live("scare"));
        assert!(r.at(8.9).is_empty());
        match r.at(9.0).as_slice() {
            [UiEvent::ScareComplete(done)] => {
                assert_eq!(done.intensity, Intensity::Extreme);
                assert_eq!(done.visual_duration_ms, 1000);
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(r.at(10.0), vec![UiEvent::PlaybackFinished]);
    }

    #[test]
    fn scares_disabled_stays_quiet() {
        let mut r = rig(Config::default());
        r.director.load(&narration(10.0), Some(0.5)).unwrap();
        assert!(r.at(3.0).is_empty());
        assert!(r.at(6.0).is_empty());
        assert_eq!(r.backend.count("scare"), 0);
    }

    #[test]
    fn intensity_follows_profile() {
        let mut r = rig(scares_on());
        r.director.load(&narration(10.0), Some(0.5)).unwrap();
        r.director.set_intensity(Intensity::Mild);
        assert_eq!(r.at(6.0), vec![UiEvent::ScareTrigger(Intensity::Mild)]);
    }

    #[test]
    fn bad_payload_is_reported() {
        let mut r = rig(Config::default());
        r.director.load(&narration(5.0), None).unwrap();
        assert!(r.director.load("", None).is_err());
        assert_eq!(
            r.events.try_iter().collect::<Vec<_>>(),
            vec![UiEvent::DecodeError(AudioError::EmptyPayload.to_string())]
        );
        assert_eq!(r.director.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn fifth_knock_fires_scare() {
        let mut r = rig(Config::default());
        for _ in 0..4 {
            assert!(matches!(r.director.knock(), KnockOutcome::Counted(_)));
        }
        assert_eq!(r.director.knock(), KnockOutcome::Summon);
        assert_eq!(r.at(0.0), vec![UiEvent::ScareTrigger(Intensity::Standard)]);
        assert_eq!(r.backend.count("knock"), 5);
        assert!(matches!(r.at(0.6).as_slice(), [UiEvent::ScareComplete(_)]));
    }

    #[test]
    fn ambient_toggle_surface() {
        let mut r = rig(Config::default());
        assert!(!r.director.ambient_active());
        r.director.toggle_ambient();
        assert!(r.director.ambient_active());
        assert!(r.backend.is_live("drone"));
        r.director.stop_ambient();
        r.director.stop_ambient();
        assert!(!r.director.ambient_active());
        assert!(!r.backend.is_live("wind"));
    }

    #[test]
    fn ambient_starts_from_config() {
        let r = rig(Config {
            ambient_enabled: true,
            ..Config::default()
        });
        assert!(r.director.ambient_active());
    }

    #[test]
    fn preview_plays_and_caches() {
        let mut r = rig(Config::default());
        r.director.preview_voice(VoiceName::new("Kore"));
        assert!(r.settle().is_empty());
        assert_eq!(r.director.playback_state(), PlaybackState::Playing);
        assert_eq!(r.director.cue_time(), None);
        assert_eq!(r.director.cached_voices(), 1);

        r.director.close_settings_session();
        assert_eq!(r.director.cached_voices(), 0);
    }

    #[test]
    fn generation_failure_surfaces_as_decode_error() {
        let mut r = rig(Config::default());
        r.director.load(&narration(5.0), None).unwrap();
        r.director.set_voice(VoiceName::new("Mute"));
        r.director.begin_generate("a story", Some(0.5));
        let events = r.settle();
        assert!(matches!(events.as_slice(), [UiEvent::DecodeError(reason)] if reason.contains("voice not available")));
        assert_eq!(r.director.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn progress_readout() {
        let mut r = rig(Config::default());
        assert!(r.director.progress().is_none());
        r.director.load(&narration(10.0), None).unwrap();
        r.at(2.5);
        let p = r.director.progress().unwrap();
        assert!((p.elapsed - 2.5).abs() < 1e-9);
        assert!((p.duration - 10.0).abs() < 1e-9);
    }

    #[test]
    fn settings_flow_into_profile() {
        let mut r = rig(Config::default());
        assert_eq!(r.director.cycle_intensity(), Intensity::Extreme);
        r.director.set_language(Language::English);
        r.director.set_brightness(9.0);
        r.director.set_voice(VoiceName::new("Nyx"));
        let profile = r.director.profile();
        assert_eq!(profile.intensity, Intensity::Extreme);
        assert_eq!(profile.language, Language::English);
        assert_eq!(profile.brightness, 2.5);
        assert_eq!(profile.voice.as_str(), "Nyx");

        let intensity = r.director.profile().intensity;
        r.director.trigger_scare(intensity);
        assert_eq!(r.at(0.0), vec![UiEvent::ScareTrigger(Intensity::Extreme)]);
    }
}
