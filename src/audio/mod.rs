// Device plumbing and timing
pub mod clock;
pub mod output;
pub mod random;
pub mod scheduler;

// Signal building blocks
pub mod filter;
pub mod synth;
pub mod waveform;

// Narration pipeline
pub mod cue;
pub mod decoder;
pub mod narration;
pub mod voice_cache;

// Engines
pub mod ambient;
pub mod ghost_knock;
pub mod jump_scare;

pub use ambient::{AmbientEngine, AmbientState};
pub use clock::{ManualClock, MonotonicClock, OutputClock};
pub use cue::{CueOutcome, CuePoint};
pub use decoder::{decode_payload, DecodeJob, DecodeQueue, SpeechRequest, SpeechSynthesizer};
pub use ghost_knock::{GhostKnock, KnockOutcome};
pub use jump_scare::{JumpScareEngine, ScareEvent};
pub use narration::{NarrationEvent, NarrationOptions, NarrationPlayer, PlaybackState, Progress};
pub use output::{AudioBackend, CaptureBackend, RodioBackend};
pub use random::{EntropyRandom, RandomSource, SequenceRandom};
pub use voice_cache::VoiceCache;
pub use waveform::Waveform;
