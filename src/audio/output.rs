//! Audio output contexts.
//!
//! An [`AudioBackend`] hands out [`AudioContext`]s; a context owns the device
//! stream and every voice started on it. Dropping the context releases the
//! device. Engines never talk to rodio directly, which lets the headless
//! [`CaptureBackend`] stand in for a sound card.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use crate::error::AudioError;

/// Boxed mono sample stream accepted by every context.
pub type SynthSource = Box<dyn Source<Item = f32> + Send>;

pub trait AudioBackend {
    fn open(&self) -> Result<Box<dyn AudioContext>, AudioError>;
}

pub trait AudioContext {
    fn play(&mut self, label: &'static str, source: SynthSource) -> Result<Voice, AudioError>;
}

/// Backend-specific stop hook for a playing voice.
pub trait VoiceControl {
    fn stop(&self);
}

/// A sound started on a context. Stops when dropped.
pub struct Voice {
    label: &'static str,
    control: Box<dyn VoiceControl>,
}

impl Voice {
    pub fn new(label: &'static str, control: Box<dyn VoiceControl>) -> Self {
        Self { label, control }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn stop(&self) {
        self.control.stop();
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.control.stop();
    }
}

// ---------- rodio ----------

/// Default sound card via rodio.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioBackend;

impl AudioBackend for RodioBackend {
    fn open(&self) -> Result<Box<dyn AudioContext>, AudioError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| AudioError::OutputUnavailable(e.to_string()))?;
        Ok(Box::new(RodioContext {
            _stream: stream,
            handle,
        }))
    }
}

struct RodioContext {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioContext for RodioContext {
    fn play(&mut self, label: &'static str, source: SynthSource) -> Result<Voice, AudioError> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AudioError::OutputUnavailable(e.to_string()))?;
        sink.append(source);
        Ok(Voice::new(label, Box::new(RodioVoice(sink))))
    }
}

struct RodioVoice(Sink);

impl VoiceControl for RodioVoice {
    fn stop(&self) {
        self.0.stop();
    }
}

// ---------- headless capture ----------

/// A voice recorded by [`CaptureBackend`].
pub struct CapturedVoice {
    pub label: &'static str,
    source: Option<SynthSource>,
    stopped: Rc<Cell<bool>>,
}

#[derive(Default)]
struct CaptureState {
    unavailable: bool,
    contexts_opened: usize,
    contexts_live: usize,
    voices: Vec<CapturedVoice>,
}

/// Records contexts and voices instead of producing sound.
///
/// Clones share one log. Sources are kept so callers can render them.
#[derive(Clone, Default)]
pub struct CaptureBackend {
    state: Rc<RefCell<CaptureState>>,
}

impl CaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `open` always fails with `OutputUnavailable`.
    pub fn unavailable() -> Self {
        let backend = Self::new();
        backend.state.borrow_mut().unavailable = true;
        backend
    }

    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().unavailable = !available;
    }

    pub fn contexts_opened(&self) -> usize {
        self.state.borrow().contexts_opened
    }

    pub fn live_contexts(&self) -> usize {
        self.state.borrow().contexts_live
    }

    pub fn count(&self, label: &str) -> usize {
        self.state.borrow().voices.iter().filter(|v| v.label == label).count()
    }

    pub fn live_voices(&self) -> usize {
        self.state
            .borrow()
            .voices
            .iter()
            .filter(|v| !v.stopped.get())
            .count()
    }

    pub fn is_live(&self, label: &str) -> bool {
        self.state
            .borrow()
            .voices
            .iter()
            .any(|v| v.label == label && !v.stopped.get())
    }

    /// Take the source of the most recent voice with `label`.
    pub fn take_latest(&self, label: &str) -> Option<SynthSource> {
        self.state
            .borrow_mut()
            .voices
            .iter_mut()
            .rev()
            .find(|v| v.label == label)
            .and_then(|v| v.source.take())
    }
}

impl AudioBackend for CaptureBackend {
    fn open(&self) -> Result<Box<dyn AudioContext>, AudioError> {
        let mut state = self.state.borrow_mut();
        if state.unavailable {
            return Err(AudioError::OutputUnavailable("capture backend disabled".into()));
        }
        state.contexts_opened += 1;
        state.contexts_live += 1;
        Ok(Box::new(CaptureContext {
            state: Rc::clone(&self.state),
            voices: Vec::new(),
        }))
    }
}

struct CaptureContext {
    state: Rc<RefCell<CaptureState>>,
    voices: Vec<Rc<Cell<bool>>>,
}

impl AudioContext for CaptureContext {
    fn play(&mut self, label: &'static str, source: SynthSource) -> Result<Voice, AudioError> {
        let stopped = Rc::new(Cell::new(false));
        self.voices.push(Rc::clone(&stopped));
        self.state.borrow_mut().voices.push(CapturedVoice {
            label,
            source: Some(source),
            stopped: Rc::clone(&stopped),
        });
        Ok(Voice::new(label, Box::new(CaptureVoice(stopped))))
    }
}

impl Drop for CaptureContext {
    fn drop(&mut self) {
        for flag in &self.voices {
            flag.set(true);
        }
        let mut state = self.state.borrow_mut();
        state.contexts_live = state.contexts_live.saturating_sub(1);
    }
}

struct CaptureVoice(Rc<Cell<bool>>);

impl VoiceControl for CaptureVoice {
    fn stop(&self) {
        self.0.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::buffer::SamplesBuffer;

    fn tone() -> SynthSource {
        Box::new(SamplesBuffer::new(1, 44_100, vec![0.25f32; 441]))
    }

    #[test]
    fn dropping_context_stops_voices() {
        let backend = CaptureBackend::new();
        let mut ctx = backend.open().unwrap();
        let voice = ctx.play("tone", tone()).unwrap();
        assert_eq!(backend.live_contexts(), 1);
        assert!(backend.is_live("tone"));
        drop(ctx);
        assert_eq!(backend.live_contexts(), 0);
        assert!(!backend.is_live("tone"));
        drop(voice);
    }

    #[test]
    fn dropping_voice_stops_it() {
        let backend = CaptureBackend::new();
        let mut ctx = backend.open().unwrap();
        let voice = ctx.play("tone", tone()).unwrap();
        assert_eq!(voice.label(), "tone");
        drop(voice);
        assert_eq!(backend.live_voices(), 0);
        assert_eq!(backend.count("tone"), 1);
    }

    #[test]
    fn unavailable_backend_refuses() {
        let backend = CaptureBackend::unavailable();
        assert!(matches!(backend.open(), Err(AudioError::OutputUnavailable(_))));
        backend.set_available(true);
        assert!(backend.open().is_ok());
        assert_eq!(backend.contexts_opened(), 1);
    }

    #[test]
    fn captured_source_can_be_rendered() {
        let backend = CaptureBackend::new();
        let mut ctx = backend.open().unwrap();
        let _voice = ctx.play("tone", tone()).unwrap();
        let source = backend.take_latest("tone").unwrap();
        assert_eq!(source.count(), 441);
        assert!(backend.take_latest("tone").is_none());
    }
}
