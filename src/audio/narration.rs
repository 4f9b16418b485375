//! Narration playback with cue tracking.
//!
//! One [`NarrationPlayer`] owns at most one session: a decoded waveform, its
//! transport state and the output context it plays through. [`tick`] is the
//! per-frame poll that compares the output clock against the resolved cue
//! and queues anticipation / trigger / finish events.
//!
//! [`tick`]: NarrationPlayer::tick

use std::rc::Rc;

use super::clock::OutputClock;
use super::cue::CueOutcome;
use super::decoder::{decode_payload, DecodeJob, DecodeQueue, Ticket};
use super::output::{AudioBackend, AudioContext, Voice};
use super::waveform::Waveform;
use crate::error::AudioError;

/// Lead before the cue at which anticipation starts.
pub const DEFAULT_ANTICIPATION_LEAD: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Signals for the presentation layer, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    AnticipationStart,
    AnticipationEnd,
    ScareTrigger,
    PlaybackFinished,
    DecodeError(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrationOptions {
    pub anticipation_lead: f64,
    /// Start from zero as soon as a narration is installed.
    pub auto_play: bool,
    pub jump_scares_enabled: bool,
}

impl Default for NarrationOptions {
    fn default() -> Self {
        Self {
            anticipation_lead: DEFAULT_ANTICIPATION_LEAD,
            auto_play: false,
            jump_scares_enabled: false,
        }
    }
}

/// Elapsed/total readout for a progress bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub elapsed: f64,
    pub duration: f64,
}

struct Session {
    waveform: Waveform,
    cue: CueOutcome,
    state: PlaybackState,
    elapsed_at_pause: f64,
    origin: f64,
    fired: bool,
    anticipating: bool,
    voice: Option<Voice>,
}

impl Session {
    fn new(waveform: Waveform, cue: CueOutcome) -> Self {
        Self {
            waveform,
            cue,
            state: PlaybackState::Idle,
            elapsed_at_pause: 0.0,
            origin: 0.0,
            fired: false,
            anticipating: false,
            voice: None,
        }
    }
}

struct PendingLoad {
    ticket: Ticket,
    cue_target: Option<f64>,
    auto_play: bool,
}

pub struct NarrationPlayer {
    backend: Rc<dyn AudioBackend>,
    clock: Rc<dyn OutputClock>,
    decoder: DecodeQueue,
    options: NarrationOptions,
    // Declared before `context` so its voice stops before the stream closes.
    session: Option<Session>,
    context: Option<Box<dyn AudioContext>>,
    pending: Option<PendingLoad>,
    events: Vec<NarrationEvent>,
}

impl NarrationPlayer {
    pub fn new(
        backend: Rc<dyn AudioBackend>,
        clock: Rc<dyn OutputClock>,
        decoder: DecodeQueue,
        options: NarrationOptions,
    ) -> Self {
        Self {
            backend,
            clock,
            decoder,
            options,
            session: None,
            context: None,
            pending: None,
            events: Vec::new(),
        }
    }

    pub fn options(&self) -> NarrationOptions {
        self.options
    }

    pub fn set_jump_scares_enabled(&mut self, enabled: bool) {
        self.options.jump_scares_enabled = enabled;
        if !enabled {
            self.end_anticipation();
        }
    }

    pub fn set_auto_play(&mut self, auto_play: bool) {
        self.options.auto_play = auto_play;
    }

    /// Decode `payload` and make it the current narration.
    ///
    /// On failure the current session keeps playing, but any decode still
    /// in flight is dropped.
    pub fn load(&mut self, payload: &str, cue_target: Option<f64>) -> Result<(), AudioError> {
        // Supersedes any decode still in flight, even when this payload is bad.
        self.decoder.invalidate();
        self.pending = None;
        let waveform = decode_payload(payload)?;
        self.install(waveform, cue_target, self.options.auto_play);
        Ok(())
    }

    /// Install an already decoded waveform.
    pub fn load_waveform(&mut self, waveform: Waveform, cue_target: Option<f64>) {
        self.decoder.invalidate();
        self.pending = None;
        self.install(waveform, cue_target, self.options.auto_play);
    }

    /// Queue a decode on the worker. The result is applied by a later
    /// [`tick`](Self::tick) unless another load supersedes it first.
    pub fn begin_load(&mut self, job: DecodeJob, cue_target: Option<f64>) -> Ticket {
        let auto_play = self.options.auto_play;
        self.submit(job, cue_target, auto_play)
    }

    /// Like [`begin_load`](Self::begin_load) but always plays, with no cue.
    pub fn begin_preview(&mut self, job: DecodeJob) -> Ticket {
        self.submit(job, None, true)
    }

    fn submit(&mut self, job: DecodeJob, cue_target: Option<f64>, auto_play: bool) -> Ticket {
        let ticket = self.decoder.submit(job);
        self.pending = Some(PendingLoad {
            ticket,
            cue_target,
            auto_play,
        });
        ticket
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    fn install(&mut self, waveform: Waveform, cue_target: Option<f64>, auto_play: bool) {
        // Release the previous session and its output before allocating anew.
        self.teardown();

        let cue = CueOutcome::analyze(&waveform, cue_target);
        log::info!(
            "narration loaded: {:.2}s, cue {:?}",
            waveform.duration(),
            cue.time()
        );
        self.session = Some(Session::new(waveform, cue));
        self.context = match self.backend.open() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                log::warn!("narration output unavailable: {e}");
                None
            }
        };
        if auto_play {
            self.play(0.0);
        }
    }

    fn teardown(&mut self) {
        if self.session.is_some() {
            self.end_anticipation();
        }
        self.session = None;
        self.context = None;
    }

    /// Start emitting from `offset` seconds.
    pub fn play(&mut self, offset: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if self.context.is_none() {
            match self.backend.open() {
                Ok(ctx) => self.context = Some(ctx),
                Err(e) => {
                    log::warn!("narration output unavailable: {e}");
                    return;
                }
            }
        }
        let Some(ctx) = self.context.as_mut() else {
            return;
        };

        let offset = offset.clamp(0.0, session.waveform.duration());
        // Silence whatever was playing before starting the new source.
        session.voice = None;
        match ctx.play("narration", Box::new(session.waveform.play_from(offset))) {
            Ok(voice) => {
                session.voice = Some(voice);
                session.origin = self.clock.now() - offset;
                session.state = PlaybackState::Playing;
                log::debug!("narration playing from {offset:.2}s");
            }
            Err(e) => log::warn!("narration could not start: {e}"),
        }
    }

    pub fn pause(&mut self) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != PlaybackState::Playing {
            return;
        }
        session.voice = None;
        session.elapsed_at_pause = (now - session.origin).clamp(0.0, session.waveform.duration());
        session.state = PlaybackState::Paused;
        self.end_anticipation();
    }

    /// Pause, rewind to zero and re-arm the cue. A second call does nothing.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state == PlaybackState::Idle {
            return;
        }
        session.voice = None;
        session.elapsed_at_pause = 0.0;
        session.fired = false;
        session.state = PlaybackState::Idle;
        self.end_anticipation();
    }

    pub fn toggle(&mut self) {
        match self.session.as_ref().map(|s| (s.state, s.elapsed_at_pause)) {
            Some((PlaybackState::Playing, _)) => self.pause(),
            Some((_, offset)) => self.play(offset),
            None => {}
        }
    }

    fn end_anticipation(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.anticipating {
                session.anticipating = false;
                self.events.push(NarrationEvent::AnticipationEnd);
            }
        }
    }

    /// Per-frame poll: apply finished decodes, then advance cue tracking.
    pub fn tick(&mut self) {
        self.poll_decoder();

        let now = self.clock.now();
        let lead = self.options.anticipation_lead;
        let scares = self.options.jump_scares_enabled;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != PlaybackState::Playing {
            return;
        }

        let elapsed = now - session.origin;
        let duration = session.waveform.duration();

        if let Some(cue) = session.cue.time().filter(|t| *t > 0.0) {
            if scares {
                let remaining = cue - elapsed;
                if !session.anticipating && !session.fired && remaining > 0.0 && remaining <= lead {
                    session.anticipating = true;
                    self.events.push(NarrationEvent::AnticipationStart);
                }
                if !session.fired && elapsed >= cue {
                    session.fired = true;
                    if session.anticipating {
                        session.anticipating = false;
                        self.events.push(NarrationEvent::AnticipationEnd);
                    }
                    log::info!("scare cue reached at {elapsed:.2}s (cue {cue:.2}s)");
                    self.events.push(NarrationEvent::ScareTrigger);
                }
            }
        }

        if elapsed >= duration {
            session.voice = None;
            session.elapsed_at_pause = 0.0;
            session.state = PlaybackState::Finished;
            if session.anticipating {
                session.anticipating = false;
                self.events.push(NarrationEvent::AnticipationEnd);
            }
            log::info!("narration finished");
            self.events.push(NarrationEvent::PlaybackFinished);
        }
    }

    fn poll_decoder(&mut self) {
        let Some(result) = self.decoder.poll() else {
            return;
        };
        if self.pending.as_ref().map(|p| p.ticket) != Some(result.ticket) {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        match result.outcome {
            Ok(waveform) => self.install(waveform, pending.cue_target, pending.auto_play),
            Err(e) => {
                log::warn!("narration load failed: {e}");
                self.events.push(NarrationEvent::DecodeError(e.to_string()));
            }
        }
    }

    /// Events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<NarrationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn state(&self) -> PlaybackState {
        self.session.as_ref().map_or(PlaybackState::Idle, |s| s.state)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn cue_time(&self) -> Option<f64> {
        self.session.as_ref().and_then(|s| s.cue.time())
    }

    pub fn duration(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.waveform.duration())
    }

    pub fn progress(&self) -> Option<Progress> {
        let session = self.session.as_ref()?;
        let duration = session.waveform.duration();
        let elapsed = match session.state {
            PlaybackState::Playing => (self.clock.now() - session.origin).clamp(0.0, duration),
            _ => session.elapsed_at_pause,
        };
        Some(Progress { elapsed, duration })
    }
}
