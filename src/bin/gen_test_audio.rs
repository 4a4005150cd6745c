use std::f32::consts::PI;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

struct Args {
    out: PathBuf,
    sample_rate: u32,
}

fn parse_args() -> Args {
    let mut out = PathBuf::from("assets/test/tone_arpeggio.wav");
    let mut sample_rate = 44_100u32;

    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        let v = it.next();
        match (k.as_str(), v) {
            ("--out", Some(p)) => out = PathBuf::from(p),
            ("--sample-rate", Some(v)) => {
                if let Ok(sr) = v.parse::<u32>() {
                    sample_rate = sr.clamp(8_000, 192_000);
                }
            }
            _ => {}
        }
    }

    Args { out, sample_rate }
}

fn main() -> Result<()> {
    let args = parse_args();
    if let Some(parent) = args.out.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }

    let frames = make_fixture(args.sample_rate);
    write_wav_i16_stereo(&args.out, args.sample_rate, &frames)
        .with_context(|| format!("write {}", args.out.display()))?;

    println!("generated: {}", args.out.display());
    println!(
        "sample_rate={}Hz duration={:.2}s frames={}",
        args.sample_rate,
        frames.len() as f32 / args.sample_rate as f32,
        frames.len()
    );
    Ok(())
}

/// Stereo frames: left carries the melody, right a quieter fifth above.
pub fn make_fixture(sr: u32) -> Vec<(i16, i16)> {
    let mut out = Vec::new();

    // 1) 2s steady A4.
    push_tone(&mut out, sr, 2.0, 440.0);

    // 2) 0.5s silence.
    push_tone(&mut out, sr, 0.5, 0.0);

    // 3) A-major arpeggio over two octaves, 0.25s per note.
    for semis in [0, 4, 7, 12, 16, 19, 24, 19, 16, 12, 7, 4, 0] {
        let f = 220.0 * 2f32.powf(semis as f32 / 12.0);
        push_tone(&mut out, sr, 0.25, f);
    }

    // 4) 1s silent tail.
    push_tone(&mut out, sr, 1.0, 0.0);

    out
}

fn push_tone(out: &mut Vec<(i16, i16)>, sr: u32, seconds: f32, freq: f32) {
    let n = (seconds.max(0.0) * sr as f32).round() as usize;
    let fade = (0.005 * sr as f32) as usize;
    for i in 0..n {
        if freq <= 0.0 {
            out.push((0, 0));
            continue;
        }
        let t = i as f32 / sr as f32;
        // Short linear fades keep note edges from clicking.
        let env = (i.min(n - 1 - i) as f32 / fade.max(1) as f32).min(1.0);
        let l = (2.0 * PI * freq * t).sin() * 0.5 * env;
        let r = (2.0 * PI * freq * 1.5 * t).sin() * 0.2 * env;
        out.push((to_i16(l), to_i16(r)));
    }
}

fn to_i16(x: f32) -> i16 {
    let y = x.clamp(-1.0, 1.0);
    (y * i16::MAX as f32) as i16
}

pub fn write_wav_i16_stereo(path: &Path, sr: u32, frames: &[(i16, i16)]) -> Result<()> {
    let mut w = BufWriter::new(fs::File::create(path)?);

    let channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let byte_rate = sr * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let data_bytes = (frames.len() * 4) as u32;
    let riff_size = 4 + 8 + 16 + 8 + data_bytes;

    w.write_all(b"RIFF")?;
    w.write_all(&riff_size.to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&sr.to_le_bytes())?;
    w.write_all(&byte_rate.to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_bytes.to_le_bytes())?;
    for (l, r) in frames {
        w.write_all(&l.to_le_bytes())?;
        w.write_all(&r.to_le_bytes())?;
    }

    w.flush()?;
    Ok(())
}
