//! Compressed and container formats through symphonia (MP3, FLAC, Ogg Vorbis,
//! AAC/MP4, WAV, ...).

use crate::decoder::{check_abandoned, resample_stereo, Decoder, DecoderBackend, FileDecoder};
use crate::error::VisError;
use log::debug;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Opens anything symphonia recognises. The default backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaBackend;

impl DecoderBackend for MediaBackend {
    fn open(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn Decoder>, VisError> {
        Ok(Box::new(FileDecoder::open_media(path, sample_rate)?))
    }
}

impl FileDecoder {
    pub fn open_media(path: &Path, sample_rate: u32) -> Result<Self, VisError> {
        Self::open_with(path, sample_rate, load_media_stereo)
    }
}

fn load_media_stereo(path: &Path, sample_rate: u32, abandoned: &AtomicBool) -> Result<Vec<f32>, VisError> {
    let open_err = |what: &str, e: &dyn std::fmt::Display| {
        VisError::StreamOpen(format!("{}: {what}: {e}", path.display()))
    };

    let src = File::open(path).map_err(|e| open_err("open", &e))?;
    let mss = MediaSourceStream::new(Box::new(src), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| open_err("unsupported format", &e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| open_err("no audio track", &"none decodable"))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| open_err("no sample rate", &"track does not declare one"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| open_err("unsupported codec", &e))?;

    let mut stereo = Vec::new();
    loop {
        check_abandoned(abandoned)?;

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(VisError::StreamRead(format!("{}: {e}", path.display()))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!("{}: skipping bad packet: {msg}", path.display());
                continue;
            }
            Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(VisError::StreamRead(format!("{}: {e}", path.display()))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            continue;
        }
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks_exact(channels) {
            let l = frame[0];
            let r = if channels > 1 { frame[1] } else { l };
            stereo.push(l);
            stereo.push(r);
        }
    }

    check_abandoned(abandoned)?;
    Ok(resample_stereo(&stereo, source_rate, sample_rate))
}
