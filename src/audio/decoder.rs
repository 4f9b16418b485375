//! Narration payload decoding.
//!
//! Payloads arrive as base64 text. The speech producer emits raw 16-bit
//! little-endian mono PCM at 24 kHz; anything wrapped in a RIFF container
//! goes through rodio's decoder instead. Decoding runs on a worker thread
//! fed by [`DecodeQueue`] so the frame loop never blocks.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use dasp_sample::Sample;
use rodio::Source;

use super::voice_cache::{CacheKey, VoiceCache};
use super::waveform::{Waveform, NARRATION_SAMPLE_RATE};
use crate::error::{AudioError, GenerationError};
use crate::settings::{Language, VoiceName};

/// Decode a base64 narration payload into a mono waveform.
pub fn decode_payload(payload: &str) -> Result<Waveform, AudioError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(AudioError::EmptyPayload);
    }
    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|e| AudioError::Decode(format!("invalid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(AudioError::EmptyPayload);
    }
    if bytes.starts_with(b"RIFF") {
        decode_container(bytes)
    } else {
        decode_pcm16(&bytes)
    }
}

fn decode_pcm16(bytes: &[u8]) -> Result<Waveform, AudioError> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::Decode(format!(
            "odd PCM byte count ({})",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]).to_sample::<f32>())
        .collect();
    Ok(Waveform::new(samples, NARRATION_SAMPLE_RATE))
}

fn decode_container(bytes: Vec<u8>) -> Result<Waveform, AudioError> {
    let decoder = rodio::Decoder::new(Cursor::new(bytes))
        .map_err(|e| AudioError::Decode(format!("unreadable container: {e}")))?;
    let channels = decoder.channels().max(1) as usize;
    let sample_rate = decoder.sample_rate();
    let interleaved: Vec<f32> = decoder.map(|s| s.to_sample::<f32>()).collect();
    if interleaved.is_empty() {
        return Err(AudioError::EmptyPayload);
    }
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok(Waveform::new(mono, sample_rate))
}

/// Text to be spoken by the external speech producer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub language: Language,
    pub voice: VoiceName,
}

impl SpeechRequest {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.text, self.voice.as_str())
    }
}

/// External producer of base64 narration payloads. Called from the decode
/// worker, so it may block.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, request: &SpeechRequest) -> Result<String, GenerationError>;
}

/// Work accepted by the decode worker.
#[derive(Debug, Clone)]
pub enum DecodeJob {
    /// Payload already in hand.
    Payload(String),
    /// Ask the speech producer first, consulting the voice cache.
    Generate(SpeechRequest),
}

pub type Ticket = u64;

/// Outcome of one job.
#[derive(Debug)]
pub struct DecodeResult {
    pub ticket: Ticket,
    pub outcome: Result<Waveform, AudioError>,
}

struct Request {
    ticket: Ticket,
    job: DecodeJob,
}

/// Off-thread decoder. Only the most recently submitted job's result is
/// ever handed back; earlier ones are dropped when they arrive.
pub struct DecodeQueue {
    jobs: Option<Sender<Request>>,
    results: Receiver<DecodeResult>,
    latest: Ticket,
    worker: Option<JoinHandle<()>>,
}

impl DecodeQueue {
    pub fn spawn(
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        cache: Arc<Mutex<VoiceCache>>,
    ) -> std::io::Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Request>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<DecodeResult>();

        let worker = std::thread::Builder::new()
            .name("kaidan-decode".into())
            .spawn(move || {
                for Request { ticket, job } in job_rx.iter() {
                    let outcome = run_job(job, synthesizer.as_deref(), &cache);
                    if result_tx.send(DecodeResult { ticket, outcome }).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            latest: 0,
            worker: Some(worker),
        })
    }

    /// Queue a job; it supersedes everything submitted before it.
    pub fn submit(&mut self, job: DecodeJob) -> Ticket {
        self.latest += 1;
        let ticket = self.latest;
        if let Some(jobs) = &self.jobs {
            if jobs.send(Request { ticket, job }).is_err() {
                log::warn!("decode worker is gone; job {ticket} dropped");
            }
        }
        ticket
    }

    /// Forget any in-flight job so its result is discarded on arrival.
    pub fn invalidate(&mut self) {
        self.latest += 1;
    }

    /// Non-blocking: the current job's result if it has arrived.
    pub fn poll(&mut self) -> Option<DecodeResult> {
        while let Ok(result) = self.results.try_recv() {
            if let Some(current) = self.accept(result) {
                return Some(current);
            }
        }
        None
    }

    /// Block up to `timeout` for the current job's result.
    pub fn wait(&mut self, timeout: Duration) -> Option<DecodeResult> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.results.recv_timeout(left) {
                Ok(result) => {
                    if let Some(current) = self.accept(result) {
                        return Some(current);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn accept(&self, result: DecodeResult) -> Option<DecodeResult> {
        if result.ticket == self.latest {
            Some(result)
        } else {
            log::debug!(
                "discarding stale decode result {} (current {})",
                result.ticket,
                self.latest
            );
            None
        }
    }
}

impl Drop for DecodeQueue {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop. A worker still stuck in
        // the speech producer is left to finish on its own.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

fn run_job(
    job: DecodeJob,
    synthesizer: Option<&dyn SpeechSynthesizer>,
    cache: &Mutex<VoiceCache>,
) -> Result<Waveform, AudioError> {
    match job {
        DecodeJob::Payload(payload) => decode_payload(&payload),
        DecodeJob::Generate(request) => {
            let payload = generate(&request, synthesizer, cache)?;
            decode_payload(&payload)
        }
    }
}

fn generate(
    request: &SpeechRequest,
    synthesizer: Option<&dyn SpeechSynthesizer>,
    cache: &Mutex<VoiceCache>,
) -> Result<String, AudioError> {
    let key = request.cache_key();
    if let Ok(cache) = cache.lock() {
        if let Some(hit) = cache.get(&key) {
            log::debug!("voice cache hit for {}", request.voice);
            return Ok(hit.to_owned());
        }
    }
    let synthesizer = synthesizer
        .ok_or_else(|| AudioError::Generation("no speech producer configured".into()))?;
    let payload = synthesizer.synthesize(request)?;
    if let Ok(mut cache) = cache.lock() {
        cache.insert(key, payload.clone());
    }
    Ok(payload)
}

/// Base64 of raw PCM16LE samples, as the speech producer would send them.
pub fn encode_pcm16(samples: &[f32]) -> String {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|s| s.clamp(-1.0, 1.0).to_sample::<i16>().to_le_bytes())
        .collect();
    STANDARD.encode(bytes)
}

/// Base64 of arbitrary file bytes (e.g. a `.wav` read from disk).
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
