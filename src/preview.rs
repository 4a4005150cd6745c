//! Consumer-side view: squeezes a raster snapshot into a terminal-sized RGBA
//! image that scrolls with the newest published column.

use crate::composite::argb_channels;
use crate::raster::RasterSnapshot;
use crate::scale::ScaleMapper;

const GUIDE_RGB: (u8, u8, u8) = (48, 48, 64);

/// First raster column shown in a viewport `out_w` wide. The newest column sits
/// at the right edge once rendering has passed the viewport width.
pub fn scroll_origin(snapshot: &RasterSnapshot, out_w: usize) -> usize {
    let end = snapshot.columns_published.max(out_w).min(snapshot.width);
    end.saturating_sub(out_w)
}

/// Row-major RGBA, `out_w x out_h`. Each output row takes the channel-wise max
/// of the raster rows it covers; C notes get a faint guide line. Works on a full
/// snapshot or on one from [`SharedRaster::read_tail`](crate::raster::SharedRaster::read_tail);
/// columns the snapshot does not hold draw as empty.
pub fn compose(snapshot: &RasterSnapshot, mapper: &ScaleMapper, out_w: usize, out_h: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_w * out_h * 4];
    if out_w == 0 || out_h == 0 || snapshot.height == 0 {
        return out;
    }
    let h = snapshot.height;
    let origin = scroll_origin(snapshot, out_w);
    let held = snapshot.columns();
    let guides = guide_rows(mapper, h, out_h);

    for oy in 0..out_h {
        let y0 = oy * h / out_h;
        let y1 = ((oy + 1) * h / out_h).max(y0 + 1).min(h);
        for ox in 0..out_w {
            let x = origin + ox;
            let mut rgb = (0u8, 0u8, 0u8);
            if held.contains(&x) {
                for &argb in &snapshot.column(x)[y0..y1] {
                    let (r, g, b) = argb_channels(argb);
                    rgb = (rgb.0.max(r), rgb.1.max(g), rgb.2.max(b));
                }
            }
            if rgb == (0, 0, 0) && guides[oy] {
                rgb = GUIDE_RGB;
            }
            let i = (oy * out_w + ox) * 4;
            out[i..i + 4].copy_from_slice(&[rgb.0, rgb.1, rgb.2, 255]);
        }
    }
    out
}

fn guide_rows(mapper: &ScaleMapper, h: usize, out_h: usize) -> Vec<bool> {
    let mut rows = vec![false; out_h];
    let top_note = (h as f64 / mapper.pixels_per_note).ceil() as i64;
    let lowest = mapper.scale.lowest_note.round() as i64;
    for note in 0..=top_note {
        if (note + lowest).rem_euclid(12) != 0 {
            continue;
        }
        let y = mapper.note_to_pixel_y(note as f64);
        if mapper.is_drawable(y) {
            rows[(y as usize * out_h / h).min(out_h - 1)] = true;
        }
    }
    rows
}

/// One-line status for the preview HUD.
pub fn status_line(state: &str, published: usize, width: usize, mapper: &ScaleMapper) -> String {
    let t = mapper.pixel_x_to_time(published as f64);
    if width == 0 {
        return format!("pitchvis | {state} | q quits");
    }
    format!(
        "pitchvis | {state} | {published}/{width} cols | {t:.2}s / {:.2}s | q quits",
        mapper.pixel_x_to_time(width as f64)
    )
}
