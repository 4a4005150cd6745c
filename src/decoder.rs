use crate::error::VisError;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Refuse to load files above this size into memory.
pub const MAX_FILE_BYTES: u64 = 100_000_000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An opened audio stream delivering interleaved stereo at a fixed rate.
pub trait Decoder: Send {
    /// Stream length in seconds, `None` until the decoder has settled.
    fn duration(&self) -> Option<f64>;

    /// Waits at most `timeout` for a duration. `Ok(None)` means not yet known.
    fn wait_for_duration(&self, timeout: Duration) -> Result<Option<f64>, VisError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(d) = self.duration() {
                return Ok(Some(d));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Returns `2 * frames` interleaved samples starting at `frame_offset`. May block.
    fn read_samples(&mut self, frames: usize, frame_offset: usize) -> Result<Vec<f32>, VisError>;
}

/// Opens decoders; kept separate so the engine can own the open step.
pub trait DecoderBackend: Send {
    fn open(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn Decoder>, VisError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct WavData {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved, normalised to -1..1.
    pub samples: Vec<f32>,
}

impl WavData {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Parses RIFF/WAVE PCM16 or IEEE float32.
pub fn parse_wav(bytes: &[u8]) -> Result<WavData, VisError> {
    let fail = |msg: String| VisError::StreamOpen(msg);
    if bytes.len() < 44 {
        return Err(fail("wav too small".into()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(fail("not a RIFF/WAVE file".into()));
    }

    let mut fmt_audio_format = 0u16;
    let mut fmt_channels = 0u16;
    let mut fmt_sample_rate = 0u32;
    let mut fmt_bits = 0u16;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size =
            u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
                as usize;
        let start = pos + 8;
        let end = start.saturating_add(size);
        if end > bytes.len() {
            // Truncated writers leave a bogus data size; take what is there.
            if id == b"data" {
                data = Some(&bytes[start..]);
            }
            break;
        }

        if id == b"fmt " {
            if size < 16 {
                return Err(fail("invalid fmt chunk".into()));
            }
            fmt_audio_format = u16::from_le_bytes([bytes[start], bytes[start + 1]]);
            fmt_channels = u16::from_le_bytes([bytes[start + 2], bytes[start + 3]]);
            fmt_sample_rate = u32::from_le_bytes([
                bytes[start + 4],
                bytes[start + 5],
                bytes[start + 6],
                bytes[start + 7],
            ]);
            fmt_bits = u16::from_le_bytes([bytes[start + 14], bytes[start + 15]]);
        } else if id == b"data" {
            data = Some(&bytes[start..end]);
        }

        pos = end + (size % 2);
    }

    let data = data.ok_or_else(|| fail("missing data chunk".into()))?;
    if fmt_channels == 0 {
        return Err(fail("invalid channel count".into()));
    }
    if fmt_sample_rate == 0 {
        return Err(fail("invalid sample rate".into()));
    }

    let mut samples = match (fmt_audio_format, fmt_bits) {
        (1, 16) => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect::<Vec<_>>(),
        (3, 32) => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]).clamp(-1.0, 1.0))
            .collect::<Vec<_>>(),
        _ => {
            return Err(fail(format!(
                "unsupported wav format: audio_format={} bits={} (supported: PCM16, Float32)",
                fmt_audio_format, fmt_bits
            )))
        }
    };

    let ch = fmt_channels as usize;
    let whole = samples.len() / ch * ch;
    samples.truncate(whole);

    Ok(WavData {
        sample_rate: fmt_sample_rate,
        channels: fmt_channels,
        samples,
    })
}

/// Interleaved stereo: mono is duplicated, channels past the second are dropped.
pub fn to_stereo(wav: &WavData) -> Vec<f32> {
    let ch = wav.channels.max(1) as usize;
    let mut out = Vec::with_capacity(wav.frames() * 2);
    for frame in wav.samples.chunks_exact(ch) {
        let l = frame[0];
        let r = if ch > 1 { frame[1] } else { l };
        out.push(l);
        out.push(r);
    }
    out
}

/// Linear-interpolation rate conversion of interleaved stereo.
pub fn resample_stereo(stereo: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || stereo.is_empty() {
        return stereo.to_vec();
    }
    let frames_in = stereo.len() / 2;
    let ratio = from_hz as f64 / to_hz as f64;
    let frames_out = ((frames_in as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(frames_out * 2);
    for i in 0..frames_out {
        let pos = i as f64 * ratio;
        let i0 = (pos.floor() as usize).min(frames_in - 1);
        let i1 = (i0 + 1).min(frames_in - 1);
        let t = (pos - i0 as f64) as f32;
        for c in 0..2 {
            let a = stereo[i0 * 2 + c];
            let b = stereo[i1 * 2 + c];
            out.push(a + (b - a) * t);
        }
    }
    out
}

/// Turns a file into interleaved stereo at the requested rate. The flag is set
/// once nobody is waiting for the result any more.
pub type LoadFn = fn(&Path, u32, &AtomicBool) -> Result<Vec<f32>, VisError>;

enum LoadState {
    Pending,
    Ready(Arc<Vec<f32>>, f64),
    Failed(String),
}

struct LoadShared {
    state: Mutex<LoadState>,
    ready: Condvar,
    abandoned: AtomicBool,
}

impl LoadShared {
    fn lock(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opens RIFF/WAVE files with the built-in parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavBackend;

impl DecoderBackend for WavBackend {
    fn open(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn Decoder>, VisError> {
        Ok(Box::new(FileDecoder::open_wav(path, sample_rate)?))
    }
}

/// A whole file decoded into memory on a loader thread.
///
/// Dropping the decoder does not wait for the loader: it is told to give up
/// and finishes on its own, holding nothing but its share of the load state.
pub struct FileDecoder {
    shared: Arc<LoadShared>,
}

impl FileDecoder {
    pub fn open_wav(path: &Path, sample_rate: u32) -> Result<Self, VisError> {
        Self::open_with(path, sample_rate, load_wav_stereo)
    }

    /// Returns as soon as the file is known to exist; decoding finishes in the background.
    pub fn open_with(path: &Path, sample_rate: u32, load: LoadFn) -> Result<Self, VisError> {
        let meta = std::fs::metadata(path)
            .map_err(|e| VisError::StreamOpen(format!("{}: {e}", path.display())))?;
        if !meta.is_file() {
            return Err(VisError::StreamOpen(format!("{}: not a file", path.display())));
        }
        if meta.len() > MAX_FILE_BYTES {
            return Err(VisError::StreamOpen(format!(
                "{}: file too large ({} bytes)",
                path.display(),
                meta.len()
            )));
        }

        let shared = Arc::new(LoadShared {
            state: Mutex::new(LoadState::Pending),
            ready: Condvar::new(),
            abandoned: AtomicBool::new(false),
        });
        let shared_for_thread = Arc::clone(&shared);
        let path: PathBuf = path.to_path_buf();

        thread::Builder::new()
            .name("pitchvis-decoder".into())
            .spawn(move || {
                let abandoned = &shared_for_thread.abandoned;
                let next = match load(&path, sample_rate, abandoned) {
                    Ok(stereo) => {
                        let duration = (stereo.len() / 2) as f64 / sample_rate as f64;
                        debug!("decoded {} ({duration:.3}s at {sample_rate} Hz)", path.display());
                        LoadState::Ready(Arc::new(stereo), duration)
                    }
                    Err(err) => {
                        if abandoned.load(Ordering::Acquire) {
                            debug!("gave up decoding {}", path.display());
                        } else {
                            warn!("decoding {} failed: {err}", path.display());
                        }
                        LoadState::Failed(err.to_string())
                    }
                };
                *shared_for_thread.lock() = next;
                shared_for_thread.ready.notify_all();
            })
            .map_err(|e| VisError::StreamOpen(format!("spawn decoder thread: {e}")))?;

        Ok(Self { shared })
    }
}

/// Fails with `StreamOpen` once the decoder that asked for the load is gone.
pub fn check_abandoned(abandoned: &AtomicBool) -> Result<(), VisError> {
    if abandoned.load(Ordering::Acquire) {
        return Err(VisError::StreamOpen("load abandoned".into()));
    }
    Ok(())
}

fn load_wav_stereo(path: &Path, sample_rate: u32, abandoned: &AtomicBool) -> Result<Vec<f32>, VisError> {
    let bytes = std::fs::read(path)
        .map_err(|e| VisError::StreamOpen(format!("{}: {e}", path.display())))?;
    check_abandoned(abandoned)?;
    let wav = parse_wav(&bytes)?;
    drop(bytes);
    check_abandoned(abandoned)?;
    let stereo = to_stereo(&wav);
    check_abandoned(abandoned)?;
    Ok(resample_stereo(&stereo, wav.sample_rate, sample_rate))
}

impl Decoder for FileDecoder {
    fn duration(&self) -> Option<f64> {
        match &*self.shared.lock() {
            LoadState::Ready(_, d) => Some(*d),
            _ => None,
        }
    }

    fn wait_for_duration(&self, timeout: Duration) -> Result<Option<f64>, VisError> {
        let st = self.shared.lock();
        let (st, _) = self
            .shared
            .ready
            .wait_timeout_while(st, timeout, |s| matches!(s, LoadState::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        match &*st {
            LoadState::Pending => Ok(None),
            LoadState::Ready(_, d) => Ok(Some(*d)),
            LoadState::Failed(msg) => Err(VisError::StreamOpen(msg.clone())),
        }
    }

    fn read_samples(&mut self, frames: usize, frame_offset: usize) -> Result<Vec<f32>, VisError> {
        let st = self.shared.lock();
        let st = self
            .shared
            .ready
            .wait_while(st, |s| matches!(s, LoadState::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        let data = match &*st {
            LoadState::Ready(data, _) => Arc::clone(data),
            LoadState::Failed(msg) => return Err(VisError::StreamRead(msg.clone())),
            LoadState::Pending => return Err(VisError::StreamRead("stream not ready".into())),
        };
        drop(st);

        // Past the end reads as silence.
        let mut out = vec![0.0f32; frames * 2];
        let start = frame_offset.saturating_mul(2).min(data.len());
        let end = start.saturating_add(frames * 2).min(data.len());
        out[..end - start].copy_from_slice(&data[start..end]);
        Ok(out)
    }
}

impl Drop for FileDecoder {
    fn drop(&mut self) {
        self.shared.abandoned.store(true, Ordering::Release);
    }
}
