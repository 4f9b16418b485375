//! Cue-point analysis: snap a story-progress fraction to a nearby loud moment.

use super::waveform::Waveform;

/// Width of the search window centred on the naive estimate, in seconds.
pub const CUE_WINDOW_SECS: f64 = 3.0;
/// Only every n-th sample is inspected (about 4 ms at 24 kHz).
pub const CUE_SCAN_STRIDE: usize = 100;
/// Peaks at or below this amplitude count as silence.
pub const SILENCE_THRESHOLD: f32 = 0.05;

/// Timestamp of the loudest strided sample within 1.5 s of
/// `duration * target_fraction`, or the estimate itself if that window is
/// silent. The result always lies inside the clipped window.
pub fn resolve_cue(waveform: &Waveform, target_fraction: f64) -> f64 {
    let duration = waveform.duration();
    let estimate = duration * target_fraction;
    let sample_rate = waveform.sample_rate() as f64;
    let samples = waveform.samples();

    let half = CUE_WINDOW_SECS / 2.0;
    // Round the start up so the first inspected sample never precedes the window.
    let start = (((estimate - half).max(0.0) * sample_rate).ceil() as usize).min(samples.len());
    let end = waveform.index_at(estimate + half);

    let mut peak_amp = 0.0f32;
    let mut peak_idx = None;
    for i in (start..end).step_by(CUE_SCAN_STRIDE) {
        let amp = samples[i].abs();
        if amp > peak_amp {
            peak_amp = amp;
            peak_idx = Some(i);
        }
    }

    let resolved = match peak_idx {
        Some(i) if peak_amp > SILENCE_THRESHOLD => i as f64 / sample_rate,
        _ => estimate,
    };
    log::debug!(
        "cue resolved: estimate {estimate:.2}s -> {resolved:.2}s (peak amplitude {peak_amp:.2})"
    );
    resolved
}

/// A requested cue and, once analysed, where it landed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuePoint {
    pub target_fraction: f64,
    pub resolved_time: Option<f64>,
}

/// Result of analysing a freshly loaded waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CueOutcome {
    /// Peak search ran over the waveform.
    Resolved(CuePoint),
    /// Nothing to scan; the naive estimate stands in.
    Estimated(CuePoint),
    /// No cue requested for this narration.
    NotRequested,
}

impl CueOutcome {
    /// Analyse `waveform` for an optional target. A target of zero or less
    /// counts as no request; fractions above one are clamped.
    pub fn analyze(waveform: &Waveform, target: Option<f64>) -> Self {
        let target_fraction = match target {
            Some(f) if f > 0.0 => f.min(1.0),
            _ => {
                log::debug!("cue analysis skipped: no target requested");
                return CueOutcome::NotRequested;
            }
        };
        if waveform.is_empty() {
            log::debug!("cue analysis skipped: empty waveform");
            return CueOutcome::Estimated(CuePoint {
                target_fraction,
                resolved_time: Some(waveform.duration() * target_fraction),
            });
        }
        CueOutcome::Resolved(CuePoint {
            target_fraction,
            resolved_time: Some(resolve_cue(waveform, target_fraction)),
        })
    }

    pub fn cue(&self) -> Option<CuePoint> {
        match self {
            CueOutcome::Resolved(cue) | CueOutcome::Estimated(cue) => Some(*cue),
            CueOutcome::NotRequested => None,
        }
    }

    pub fn time(&self) -> Option<f64> {
        self.cue().and_then(|c| c.resolved_time)
    }
}
