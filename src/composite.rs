use crate::analyzer::{Peak, Tone};
use crate::config::Calibration;
use crate::scale::ScaleMapper;
use std::ops::{AddAssign, Mul};

/// Additive RGB accumulator. Channels are unbounded until packed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pixel {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Pixel {
    pub const ZERO: Pixel = Pixel { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Packs to `0xAARRGGBB`. Alpha is always opaque, so premultiplied equals
    /// straight; each channel saturates at 255 instead of wrapping.
    pub fn to_argb(self) -> u32 {
        0xFF00_0000 | (channel_u8(self.r) << 16) | (channel_u8(self.g) << 8) | channel_u8(self.b)
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

#[inline]
fn channel_u8(v: f32) -> u32 {
    // clamp passes NaN through.
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u32
}

impl AddAssign for Pixel {
    fn add_assign(&mut self, rhs: Self) {
        self.r += rhs.r;
        self.g += rhs.g;
        self.b += rhs.b;
    }
}

impl Mul<f32> for Pixel {
    type Output = Pixel;

    fn mul(self, k: f32) -> Pixel {
        Pixel::new(self.r * k, self.g * k, self.b * k)
    }
}

/// Splits a packed colour back into `(r, g, b)` bytes.
#[inline]
pub fn argb_channels(argb: u32) -> (u8, u8, u8) {
    ((argb >> 16) as u8, (argb >> 8) as u8, argb as u8)
}

#[inline]
pub fn level_to_db(level: f32) -> f32 {
    10.0 * level.log10()
}

/// Turns one column's peaks and tones into raster contributions.
#[derive(Debug, Clone, Copy)]
pub struct ColumnCompositor {
    mapper: ScaleMapper,
    calibration: Calibration,
    max_tones: usize,
}

impl ColumnCompositor {
    pub fn new(mapper: ScaleMapper, calibration: Calibration, max_tones: usize) -> Self {
        Self {
            mapper,
            calibration,
            max_tones,
        }
    }

    pub fn mapper(&self) -> &ScaleMapper {
        &self.mapper
    }

    /// `None` when the level is below the visibility threshold.
    pub fn intensity(&self, level: f32) -> Option<f32> {
        let v = self.calibration.level_gain * (level_to_db(level) + self.calibration.level_offset_db);
        // NaN and -inf (silent levels) fall through here as well.
        if v > 0.0 { Some(v) } else { None }
    }

    /// Center row plus a half-intensity halo above and below, in blue.
    /// Returns the number of cells written.
    pub fn add_peak(&self, column: &mut [Pixel], peak: &Peak) -> usize {
        let Some((y, value)) = self.locate(peak.frequency, peak.level) else {
            return 0;
        };
        let p = Pixel::new(0.0, 0.0, value);
        let mut written = self.add_row(column, y, p);
        written += self.add_row(column, y - 1, p * 0.5);
        written += self.add_row(column, y + 1, p * 0.5);
        written
    }

    /// Uniform five-row band in green. Returns the number of cells written.
    pub fn add_tone(&self, column: &mut [Pixel], tone: &Tone) -> usize {
        let Some((y, value)) = self.locate(tone.frequency, tone.level) else {
            return 0;
        };
        let p = Pixel::new(0.0, value, 0.0);
        (y - 2..=y + 2).map(|row| self.add_row(column, row, p)).sum()
    }

    /// Composites a full column. `tones` must be ordered strongest-first.
    pub fn composite(&self, peaks: &[Peak], tones: &[Tone]) -> Vec<Pixel> {
        let mut column = vec![Pixel::ZERO; self.mapper.height];
        for peak in peaks {
            self.add_peak(&mut column, peak);
        }
        for tone in tones.iter().take(self.max_tones) {
            self.add_tone(&mut column, tone);
        }
        column
    }

    fn locate(&self, frequency: f32, level: f32) -> Option<(i64, f32)> {
        let y = self.mapper.frequency_to_pixel_y(frequency as f64)?;
        if !self.mapper.is_drawable(y) {
            return None;
        }
        let value = self.intensity(level)?;
        Some((y, value))
    }

    fn add_row(&self, column: &mut [Pixel], y: i64, p: Pixel) -> usize {
        if !self.mapper.is_drawable(y) {
            return 0;
        }
        match column.get_mut(y as usize) {
            Some(cell) => {
                *cell += p;
                1
            }
            None => 0,
        }
    }
}
