//! Error types shared by the audio engines.
//!
//! Only decode (and generation) failures ever reach the caller. Output
//! failures are caught at the engine boundary, logged, and turned into a
//! silent no-op.

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("malformed narration payload: {0}")]
    Decode(String),
    #[error("narration payload is empty")]
    EmptyPayload,
    #[error("no audio output available: {0}")]
    OutputUnavailable(String),
    #[error("speech generation failed: {0}")]
    Generation(String),
}

impl AudioError {
    /// True for failures that must be shown to the listener.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, AudioError::OutputUnavailable(_))
    }
}

/// Failure reported by the external speech producer.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct GenerationError(pub String);

impl From<GenerationError> for AudioError {
    fn from(err: GenerationError) -> Self {
        AudioError::Generation(err.0)
    }
}
