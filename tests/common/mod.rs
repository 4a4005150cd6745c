#![allow(dead_code)]

use pitchvis::analyzer::{Analyzer, Peak, Tone};
use pitchvis::decoder::{Decoder, DecoderBackend};
use pitchvis::engine::CancelToken;
use pitchvis::error::{AnalyzerError, VisError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Stereo silence with a scripted duration and scripted failures.
#[derive(Clone, Default)]
pub struct ScriptedDecoder {
    pub duration: Option<f64>,
    /// Duration stays unknown until this long after open.
    pub ready_after: Duration,
    pub step: usize,
    /// Cancels the token while serving this column's read.
    pub cancel_at: Option<(usize, CancelToken)>,
    pub fail_read_at: Option<usize>,
    pub short_read_at: Option<usize>,
    pub reads: Arc<AtomicUsize>,
    opened_at: Option<Instant>,
}

impl ScriptedDecoder {
    pub fn with_duration(duration: f64, step: usize) -> Self {
        Self {
            duration: Some(duration),
            step,
            ..Self::default()
        }
    }

    pub fn never_ready() -> Self {
        Self::default()
    }

    fn column(&self, frame_offset: usize) -> usize {
        frame_offset / self.step.max(1)
    }
}

impl Decoder for ScriptedDecoder {
    fn duration(&self) -> Option<f64> {
        let opened = self.opened_at?;
        if opened.elapsed() < self.ready_after {
            return None;
        }
        self.duration
    }

    fn read_samples(&mut self, frames: usize, frame_offset: usize) -> Result<Vec<f32>, VisError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let x = self.column(frame_offset);
        if let Some((at, token)) = &self.cancel_at {
            if *at == x {
                token.cancel();
            }
        }
        if self.fail_read_at == Some(x) {
            return Err(VisError::StreamRead(format!("scripted failure at column {x}")));
        }
        if self.short_read_at == Some(x) {
            return Ok(vec![0.0; frames]);
        }
        Ok(vec![0.0; frames * 2])
    }
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub decoder: ScriptedDecoder,
    pub fail_open: bool,
    pub opens: Arc<AtomicUsize>,
    pub requested_rate: Arc<Mutex<Option<u32>>>,
}

impl ScriptedBackend {
    pub fn new(decoder: ScriptedDecoder) -> Self {
        Self {
            decoder,
            ..Self::default()
        }
    }
}

impl DecoderBackend for ScriptedBackend {
    fn open(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn Decoder>, VisError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.requested_rate.lock().unwrap() = Some(sample_rate);
        if self.fail_open {
            return Err(VisError::StreamOpen(format!("{}: scripted", path.display())));
        }
        let mut decoder = self.decoder.clone();
        decoder.opened_at = Some(Instant::now());
        Ok(Box::new(decoder))
    }
}

/// Reports the same peaks and tones for every window.
#[derive(Clone, Default)]
pub struct ScriptedAnalyzer {
    pub peaks: Vec<Peak>,
    pub tones: Vec<Tone>,
    /// `process` fails on this call (0-based).
    pub fail_at: Option<usize>,
    /// `process` panics on this call (0-based).
    pub panic_at: Option<usize>,
    pub calls: usize,
    pub last_input_len: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    /// A steady A4 at about -12 dBFS.
    pub fn a440() -> Self {
        let level = 0.0625;
        Self {
            peaks: vec![Peak { frequency: 440.0, level }],
            tones: vec![Tone { frequency: 440.0, level }],
            ..Self::default()
        }
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn input(&mut self, samples: &[f32]) {
        self.last_input_len.store(samples.len(), Ordering::SeqCst);
    }

    fn process(&mut self) -> Result<(), AnalyzerError> {
        let call = self.calls;
        self.calls += 1;
        if self.panic_at == Some(call) {
            panic!("scripted panic on window {call}");
        }
        if self.fail_at == Some(call) {
            return Err(AnalyzerError(format!("scripted failure on window {call}")));
        }
        Ok(())
    }

    fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    fn tones(&self) -> &[Tone] {
        &self.tones
    }
}

/// Stereo PCM16 sine written to a per-test temp file.
pub fn write_sine_wav(name: &str, freq: f32, seconds: f32, sample_rate: u32) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("pitchvis_{}_{name}.wav", std::process::id()));
    let frames = (seconds * sample_rate as f32).round() as usize;
    let mut data = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let s = 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
        let v = (s * i16::MAX as f32) as i16;
        data.extend_from_slice(&v.to_le_bytes());
        data.extend_from_slice(&v.to_le_bytes());
    }

    let mut b = Vec::with_capacity(44 + data.len());
    b.extend_from_slice(b"RIFF");
    b.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    b.extend_from_slice(b"WAVE");
    b.extend_from_slice(b"fmt ");
    b.extend_from_slice(&16u32.to_le_bytes());
    b.extend_from_slice(&1u16.to_le_bytes());
    b.extend_from_slice(&2u16.to_le_bytes());
    b.extend_from_slice(&sample_rate.to_le_bytes());
    b.extend_from_slice(&(sample_rate * 4).to_le_bytes());
    b.extend_from_slice(&4u16.to_le_bytes());
    b.extend_from_slice(&16u16.to_le_bytes());
    b.extend_from_slice(b"data");
    b.extend_from_slice(&(data.len() as u32).to_le_bytes());
    b.extend_from_slice(&data);
    std::fs::write(&path, b).expect("write temp wav");
    path
}

/// Stereo PCM16 silence, `frames` long. Big enough files keep the loader busy.
pub fn write_silent_wav(name: &str, frames: usize, sample_rate: u32) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("pitchvis_{}_{name}.wav", std::process::id()));
    let data_len = (frames * 4) as u32;
    let mut b = Vec::with_capacity(44 + frames * 4);
    b.extend_from_slice(b"RIFF");
    b.extend_from_slice(&(36 + data_len).to_le_bytes());
    b.extend_from_slice(b"WAVE");
    b.extend_from_slice(b"fmt ");
    b.extend_from_slice(&16u32.to_le_bytes());
    b.extend_from_slice(&1u16.to_le_bytes());
    b.extend_from_slice(&2u16.to_le_bytes());
    b.extend_from_slice(&sample_rate.to_le_bytes());
    b.extend_from_slice(&(sample_rate * 4).to_le_bytes());
    b.extend_from_slice(&4u16.to_le_bytes());
    b.extend_from_slice(&16u16.to_le_bytes());
    b.extend_from_slice(b"data");
    b.extend_from_slice(&data_len.to_le_bytes());
    b.resize(44 + frames * 4, 0);
    std::fs::write(&path, b).expect("write temp wav");
    path
}
