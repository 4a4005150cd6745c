use crate::error::VisError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_STEP: usize = 512;
pub const DEFAULT_HEIGHT: usize = 768;
pub const DEFAULT_PIXELS_PER_NOTE: f64 = 16.0;
pub const DEFAULT_LEVEL_GAIN: f32 = 0.003;
pub const DEFAULT_LEVEL_OFFSET_DB: f32 = 80.0;
pub const DEFAULT_LOWEST_NOTE: f64 = 36.0;

// Refuse rasters above this many cells (1 GiB of packed colour).
pub const MAX_RASTER_CELLS: usize = 1 << 28;

#[derive(Parser, Debug, Clone)]
#[command(name = "pitchvis", version, about = "Scrolling pitch/time visualization of an audio file")]
pub struct Settings {
    #[arg(value_name = "AUDIO")]
    pub input: PathBuf,

    /// Samples per analysis window (one raster column).
    #[arg(long, default_value_t = DEFAULT_STEP)]
    pub step: usize,

    /// Raster height in pixels.
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: usize,

    /// Rate the decoder resamples to before analysis.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    #[arg(long, default_value_t = DEFAULT_PIXELS_PER_NOTE)]
    pub pixels_per_note: f64,

    #[arg(long, default_value_t = DEFAULT_LEVEL_GAIN)]
    pub level_gain: f32,

    #[arg(long, default_value_t = DEFAULT_LEVEL_OFFSET_DB)]
    pub level_offset_db: f32,

    /// MIDI note drawn at the bottom row of the raster.
    #[arg(long, default_value_t = DEFAULT_LOWEST_NOTE)]
    pub lowest_note: f64,

    /// Extra wait after the decoder reports a duration.
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,

    /// Give up on a stream that has not reported a duration after this long.
    #[arg(long, default_value_t = 10_000)]
    pub ready_timeout_ms: u64,

    /// `media` reads any container symphonia knows; `wav` uses the built-in parser.
    #[arg(long, value_enum, default_value_t = DecoderMode::Media)]
    pub decoder: DecoderMode,

    #[arg(long, value_enum, default_value_t = TuningProfile::Default)]
    pub profile: TuningProfile,

    /// Strongest tones drawn per column.
    #[arg(long, default_value_t = 3)]
    pub max_tones: usize,

    #[arg(long, default_value_t = false)]
    pub preview: bool,

    #[arg(long, value_enum, default_value_t = RendererMode::HalfBlock)]
    pub renderer: RendererMode,

    #[arg(long, default_value_t = 30)]
    pub preview_fps: u32,

    #[arg(long)]
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            step: DEFAULT_STEP,
            height: DEFAULT_HEIGHT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            pixels_per_note: DEFAULT_PIXELS_PER_NOTE,
            level_gain: DEFAULT_LEVEL_GAIN,
            level_offset_db: DEFAULT_LEVEL_OFFSET_DB,
            lowest_note: DEFAULT_LOWEST_NOTE,
            settle_ms: 1000,
            ready_timeout_ms: 10_000,
            decoder: DecoderMode::Media,
            profile: TuningProfile::Default,
            max_tones: 3,
            preview: false,
            renderer: RendererMode::HalfBlock,
            preview_fps: 30,
            log_level: None,
        }
    }
}

impl Settings {
    pub fn calibration(&self) -> Calibration {
        Calibration {
            pixels_per_note: self.pixels_per_note,
            level_gain: self.level_gain,
            level_offset_db: self.level_offset_db,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), VisError> {
        let fail = |msg: &str| Err(VisError::InvalidSettings(msg.to_string()));
        if self.step == 0 {
            return fail("--step must be >= 1");
        }
        // The tone band spans five rows and the two border rows are never drawn.
        if self.height < 5 {
            return fail("--height must be >= 5");
        }
        if self.sample_rate == 0 {
            return fail("--sample-rate must be >= 1");
        }
        if !self.pixels_per_note.is_finite() || self.pixels_per_note <= 0.0 {
            return fail("--pixels-per-note must be a positive number");
        }
        if !self.level_gain.is_finite() || !self.level_offset_db.is_finite() {
            return fail("level calibration must be finite");
        }
        if !self.lowest_note.is_finite() {
            return fail("--lowest-note must be finite");
        }
        if self.max_tones == 0 {
            return fail("--max-tones must be >= 1");
        }
        if self.ready_timeout_ms == 0 {
            return fail("--ready-timeout-ms must be > 0");
        }
        Ok(())
    }
}

/// Visual tuning values. They have no physical derivation; keep them overridable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub pixels_per_note: f64,
    pub level_gain: f32,
    pub level_offset_db: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixels_per_note: DEFAULT_PIXELS_PER_NOTE,
            level_gain: DEFAULT_LEVEL_GAIN,
            level_offset_db: DEFAULT_LEVEL_OFFSET_DB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecoderMode {
    #[value(alias = "symphonia", alias = "auto")]
    Media,
    Wav,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TuningProfile {
    Default,
    Voice,
    Instrument,
}

impl TuningProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Some(Self::Default),
            "voice" | "vocal" => Some(Self::Voice),
            "instrument" | "inst" => Some(Self::Instrument),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Voice => "voice",
            Self::Instrument => "instrument",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererMode {
    #[value(alias = "ansi", alias = "text")]
    Ascii,
    #[value(name = "half-block", alias = "halfblock", alias = "half_block", alias = "hb")]
    HalfBlock,
}
