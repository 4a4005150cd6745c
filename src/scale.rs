//! Conversions between frequency, note, time and raster coordinates.

use crate::config::{Calibration, Settings};

const A4_HZ: f64 = 440.0;
const A4_MIDI: f64 = 69.0;

/// Equal-tempered scale whose note 0 sits at `lowest_note` (a MIDI number).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalScale {
    pub lowest_note: f64,
}

impl MusicalScale {
    pub fn new(lowest_note: f64) -> Self {
        Self { lowest_note }
    }

    /// Continuous semitone coordinate, or `None` for frequencies without a pitch.
    pub fn frequency_to_note(&self, freq: f64) -> Option<f64> {
        if !freq.is_finite() || freq <= 0.0 {
            return None;
        }
        Some(12.0 * (freq / A4_HZ).log2() + A4_MIDI - self.lowest_note)
    }

    pub fn note_to_frequency(&self, note: f64) -> f64 {
        A4_HZ * 2f64.powf((note + self.lowest_note - A4_MIDI) / 12.0)
    }
}

/// Fixed-for-a-run mapping between audio coordinates and raster pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleMapper {
    pub sample_rate: u32,
    pub step: usize,
    pub height: usize,
    pub pixels_per_note: f64,
    pub scale: MusicalScale,
}

impl ScaleMapper {
    pub fn new(sample_rate: u32, step: usize, height: usize, calibration: &Calibration, scale: MusicalScale) -> Self {
        Self {
            sample_rate,
            step,
            height,
            pixels_per_note: calibration.pixels_per_note,
            scale,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.sample_rate,
            settings.step,
            settings.height,
            &settings.calibration(),
            MusicalScale::new(settings.lowest_note),
        )
    }

    /// Higher notes land on smaller rows. The result may fall outside the raster.
    pub fn note_to_pixel_y(&self, note: f64) -> i64 {
        self.height as i64 - (self.pixels_per_note * note).round() as i64
    }

    pub fn pixel_y_to_note(&self, y: f64) -> f64 {
        (self.height as f64 - y) / self.pixels_per_note
    }

    pub fn time_to_pixel_x(&self, t: f64) -> f64 {
        t * self.sample_rate as f64 / self.step as f64
    }

    pub fn pixel_x_to_time(&self, x: f64) -> f64 {
        x * self.step as f64 / self.sample_rate as f64
    }

    pub fn frequency_to_note(&self, freq: f64) -> Option<f64> {
        self.scale.frequency_to_note(freq)
    }

    pub fn frequency_to_pixel_y(&self, freq: f64) -> Option<i64> {
        self.frequency_to_note(freq).map(|note| self.note_to_pixel_y(note))
    }

    /// Row 0 and row `height - 1` are reserved so the halo and tone band never
    /// leave the raster; anything outside `1..height-1` is not drawable.
    pub fn is_drawable(&self, y: i64) -> bool {
        y >= 1 && y < self.height as i64 - 1
    }

    /// Number of columns a stream of `duration` seconds occupies.
    pub fn columns_for(&self, duration: f64) -> f64 {
        self.time_to_pixel_x(duration).round()
    }
}
