use crate::config::TuningProfile;
use crate::error::AnalyzerError;
use log::warn;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;
use std::sync::Arc;

/// A spectral local maximum in one analysis window. `level` is power
/// (amplitude squared), so `10 * log10(level)` is dBFS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frequency: f32,
    pub level: f32,
}

/// A pitch that has persisted across windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f32,
    pub level: f32,
}

/// Pitch detector fed one window of mono samples at a time.
pub trait Analyzer: Send {
    fn input(&mut self, samples: &[f32]);
    fn process(&mut self) -> Result<(), AnalyzerError>;
    fn peaks(&self) -> &[Peak];
    /// Ordered strongest-first.
    fn tones(&self) -> &[Tone];
}

// -80 dBFS
const PEAK_FLOOR: f32 = 1e-8;
// Peaks more than 60 dB under the loudest one in the window are sidelobe noise.
const PEAK_RELATIVE_FLOOR: f32 = 1e-6;
// -60 dBFS
const TONE_FLOOR: f32 = 1e-6;
// Half a semitone either side.
const TONE_MATCH_SEMITONES: f32 = 0.5;
const TONE_MIN_HITS: u32 = 2;
const TONE_MAX_MISSES: u32 = 2;
const MAX_TRACKS: usize = 32;

#[derive(Debug, Clone, Copy)]
struct ProfileParams {
    fft_size: usize,
    min_hz: f32,
    max_hz: f32,
}

fn profile_params(profile: TuningProfile) -> ProfileParams {
    match profile {
        TuningProfile::Default => ProfileParams {
            fft_size: 4096,
            min_hz: 40.0,
            max_hz: 4200.0,
        },
        TuningProfile::Voice => ProfileParams {
            fft_size: 4096,
            min_hz: 65.0,
            max_hz: 1400.0,
        },
        TuningProfile::Instrument => ProfileParams {
            fft_size: 8192,
            min_hz: 27.0,
            max_hz: 4200.0,
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct Track {
    frequency: f32,
    level: f32,
    hits: u32,
    misses: u32,
}

/// Hann-windowed FFT peak picker with a simple frequency tracker for tones.
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    params: ProfileParams,
    history: Vec<f32>,
    hann: Vec<f32>,
    win_sum: f32,
    fft: Arc<dyn rustfft::Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    mags: Vec<f32>,
    bad_input: bool,
    peaks: Vec<Peak>,
    tracks: Vec<Track>,
    tones: Vec<Tone>,
}

impl SpectrumAnalyzer {
    /// `profile` is a tuning profile name; unknown names fall back to the default.
    pub fn new(sample_rate: u32, profile: &str) -> Self {
        let resolved = TuningProfile::from_name(profile).unwrap_or_else(|| {
            warn!("unknown tuning profile '{profile}', using default");
            TuningProfile::Default
        });
        Self::with_profile(sample_rate, resolved)
    }

    pub fn with_profile(sample_rate: u32, profile: TuningProfile) -> Self {
        let params = profile_params(profile);
        let n = params.fft_size;

        let hann = (0..n)
            .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (n as f32)).cos())
            .collect::<Vec<_>>();
        let win_sum = hann.iter().sum::<f32>();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let scratch = vec![Complex { re: 0.0, im: 0.0 }; fft.get_inplace_scratch_len()];

        Self {
            sample_rate,
            params,
            history: vec![0.0; n],
            hann,
            win_sum,
            fft,
            fft_buf: vec![Complex { re: 0.0, im: 0.0 }; n],
            scratch,
            mags: vec![0.0; n / 2],
            bad_input: false,
            peaks: Vec::new(),
            tracks: Vec::new(),
            tones: Vec::new(),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.params.fft_size
    }

    fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.params.fft_size as f32
    }

    fn find_peaks(&mut self) {
        self.peaks.clear();
        let half = self.mags.len();
        let bin_hz = self.bin_hz();
        let lo = ((self.params.min_hz / bin_hz).floor() as usize).max(1);
        let hi = ((self.params.max_hz / bin_hz).ceil() as usize).min(half.saturating_sub(2));
        let amp_scale = 2.0 / self.win_sum;

        for k in lo..=hi.max(lo) {
            if k + 1 >= half {
                break;
            }
            let (a, b, c) = (self.mags[k - 1], self.mags[k], self.mags[k + 1]);
            if !(b > a && b >= c) || b <= 0.0 {
                continue;
            }

            // Parabolic fit on log magnitude.
            let (la, lb, lc) = (a.max(1e-20).ln(), b.ln(), c.max(1e-20).ln());
            let denom = la - 2.0 * lb + lc;
            let p = if denom < 0.0 {
                (0.5 * (la - lc) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            let peak_mag = (lb - 0.25 * (la - lc) * p).exp();
            let amp = peak_mag * amp_scale;
            let level = amp * amp;
            if level < PEAK_FLOOR {
                continue;
            }
            self.peaks.push(Peak {
                frequency: (k as f32 + p) * bin_hz,
                level,
            });
        }

        let loudest = self.peaks.iter().map(|p| p.level).fold(0.0f32, f32::max);
        let floor = loudest * PEAK_RELATIVE_FLOOR;
        self.peaks.retain(|p| p.level >= floor);
    }

    fn track_tones(&mut self) {
        let mut claimed = vec![false; self.peaks.len()];

        for track in self.tracks.iter_mut() {
            let mut best: Option<usize> = None;
            for (i, peak) in self.peaks.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                let dist = 12.0 * (peak.frequency / track.frequency).log2().abs();
                if dist > TONE_MATCH_SEMITONES {
                    continue;
                }
                if best.map_or(true, |b| peak.level > self.peaks[b].level) {
                    best = Some(i);
                }
            }
            match best {
                Some(i) => {
                    claimed[i] = true;
                    let peak = self.peaks[i];
                    track.frequency = peak.frequency;
                    track.level = 0.5 * (track.level + peak.level);
                    track.hits += 1;
                    track.misses = 0;
                }
                None => track.misses += 1,
            }
        }
        self.tracks.retain(|t| t.misses < TONE_MAX_MISSES);

        for (i, peak) in self.peaks.iter().enumerate() {
            if !claimed[i] && peak.level >= TONE_FLOOR {
                self.tracks.push(Track {
                    frequency: peak.frequency,
                    level: peak.level,
                    hits: 1,
                    misses: 0,
                });
            }
        }
        if self.tracks.len() > MAX_TRACKS {
            self.tracks.sort_by(|a, b| b.level.total_cmp(&a.level));
            self.tracks.truncate(MAX_TRACKS);
        }

        self.tones = self
            .tracks
            .iter()
            .filter(|t| t.hits >= TONE_MIN_HITS && t.misses == 0)
            .map(|t| Tone {
                frequency: t.frequency,
                level: t.level,
            })
            .collect();
        self.tones.sort_by(|a, b| b.level.total_cmp(&a.level));
    }
}

impl Analyzer for SpectrumAnalyzer {
    fn input(&mut self, samples: &[f32]) {
        if samples.iter().any(|s| !s.is_finite()) {
            self.bad_input = true;
        }
        let n = self.history.len();
        if samples.len() >= n {
            self.history.copy_from_slice(&samples[samples.len() - n..]);
        } else {
            self.history.copy_within(samples.len().., 0);
            self.history[n - samples.len()..].copy_from_slice(samples);
        }
    }

    fn process(&mut self) -> Result<(), AnalyzerError> {
        if std::mem::take(&mut self.bad_input) {
            self.history.fill(0.0);
            return Err(AnalyzerError("non-finite sample in analysis window".to_string()));
        }

        for (dst, (s, w)) in self.fft_buf.iter_mut().zip(self.history.iter().zip(&self.hann)) {
            *dst = Complex { re: s * w, im: 0.0 };
        }
        self.fft.process_with_scratch(&mut self.fft_buf, &mut self.scratch);
        for (m, c) in self.mags.iter_mut().zip(&self.fft_buf) {
            *m = c.norm();
        }

        self.find_peaks();
        self.track_tones();
        Ok(())
    }

    fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    fn tones(&self) -> &[Tone] {
        &self.tones
    }
}
