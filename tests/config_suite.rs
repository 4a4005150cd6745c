use clap::Parser;
use pitchvis::config::{Calibration, DecoderMode, RendererMode, Settings, TuningProfile};
use pitchvis::VisError;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_args_defaults_are_stable() {
    let cfg = Settings::try_parse_from(["pitchvis", "song.wav"]).expect("parse should succeed");

    assert_eq!(cfg.input, PathBuf::from("song.wav"));
    assert_eq!(cfg.step, 512);
    assert_eq!(cfg.height, 768);
    assert_eq!(cfg.sample_rate, 44_100);
    assert_eq!(cfg.calibration(), Calibration::default());
    assert_eq!(cfg.lowest_note, 36.0);
    assert_eq!(cfg.settle_delay(), Duration::from_secs(1));
    assert_eq!(cfg.ready_timeout(), Duration::from_secs(10));
    assert_eq!(cfg.profile, TuningProfile::Default);
    assert_eq!(cfg.max_tones, 3);
    assert!(!cfg.preview);
    assert_eq!(cfg.renderer, RendererMode::HalfBlock);
    assert_eq!(cfg.decoder, DecoderMode::Media);
    assert_eq!(cfg.log_level, None);
    assert!(cfg.validate().is_ok());
}

#[test]
fn parse_args_overrides_work() {
    let cfg = Settings::try_parse_from([
        "pitchvis",
        "take2.wav",
        "--step",
        "256",
        "--height",
        "512",
        "--sample-rate",
        "48000",
        "--pixels-per-note",
        "8",
        "--level-gain",
        "0.01",
        "--level-offset-db",
        "60",
        "--lowest-note",
        "24",
        "--settle-ms",
        "0",
        "--ready-timeout-ms",
        "500",
        "--profile",
        "voice",
        "--max-tones",
        "1",
        "--preview",
        "--renderer",
        "ascii",
        "--log-level",
        "debug",
    ])
    .expect("parse should succeed");

    assert_eq!(cfg.input, PathBuf::from("take2.wav"));
    assert_eq!(cfg.step, 256);
    assert_eq!(cfg.height, 512);
    assert_eq!(cfg.sample_rate, 48_000);
    assert_eq!(
        cfg.calibration(),
        Calibration {
            pixels_per_note: 8.0,
            level_gain: 0.01,
            level_offset_db: 60.0,
        }
    );
    assert_eq!(cfg.lowest_note, 24.0);
    assert_eq!(cfg.settle_delay(), Duration::ZERO);
    assert_eq!(cfg.ready_timeout(), Duration::from_millis(500));
    assert_eq!(cfg.profile, TuningProfile::Voice);
    assert_eq!(cfg.max_tones, 1);
    assert!(cfg.preview);
    assert_eq!(cfg.renderer, RendererMode::Ascii);
    assert_eq!(cfg.log_level.as_deref(), Some("debug"));
}

#[test]
fn renderer_aliases_parse() {
    for (arg, mode) in [
        ("half-block", RendererMode::HalfBlock),
        ("halfblock", RendererMode::HalfBlock),
        ("hb", RendererMode::HalfBlock),
        ("text", RendererMode::Ascii),
    ] {
        let cfg = Settings::try_parse_from(["pitchvis", "a.wav", "--renderer", arg]).unwrap();
        assert_eq!(cfg.renderer, mode, "{arg}");
    }
}

#[test]
fn decoder_modes_parse() {
    for (arg, mode) in [
        ("media", DecoderMode::Media),
        ("symphonia", DecoderMode::Media),
        ("auto", DecoderMode::Media),
        ("wav", DecoderMode::Wav),
    ] {
        let cfg = Settings::try_parse_from(["pitchvis", "a.flac", "--decoder", arg]).unwrap();
        assert_eq!(cfg.decoder, mode, "{arg}");
    }
    assert!(Settings::try_parse_from(["pitchvis", "a.flac", "--decoder", "ffmpeg"]).is_err());
    assert_eq!(Settings::default().decoder, DecoderMode::Media);
}

#[test]
fn parse_requires_an_input() {
    assert!(Settings::try_parse_from(["pitchvis"]).is_err());
}

#[test]
fn parse_rejects_unknown_profile() {
    assert!(Settings::try_parse_from(["pitchvis", "a.wav", "--profile", "kazoo"]).is_err());
}

#[test]
fn validate_rejects_unusable_settings() {
    let bad = [
        Settings { step: 0, ..Settings::default() },
        Settings { height: 4, ..Settings::default() },
        Settings { sample_rate: 0, ..Settings::default() },
        Settings { pixels_per_note: 0.0, ..Settings::default() },
        Settings { pixels_per_note: f64::NAN, ..Settings::default() },
        Settings { level_gain: f32::INFINITY, ..Settings::default() },
        Settings { lowest_note: f64::NAN, ..Settings::default() },
        Settings { max_tones: 0, ..Settings::default() },
        Settings { ready_timeout_ms: 0, ..Settings::default() },
    ];
    for cfg in bad {
        assert!(
            matches!(cfg.validate(), Err(VisError::InvalidSettings(_))),
            "{cfg:?}"
        );
    }
    assert!(Settings { height: 5, ..Settings::default() }.validate().is_ok());
}

#[test]
fn tuning_profile_names() {
    assert_eq!(TuningProfile::from_name(""), Some(TuningProfile::Default));
    assert_eq!(TuningProfile::from_name(" Vocal "), Some(TuningProfile::Voice));
    assert_eq!(TuningProfile::from_name("INST"), Some(TuningProfile::Instrument));
    assert_eq!(TuningProfile::from_name("kazoo"), None);
    assert_eq!(TuningProfile::Instrument.label(), "instrument");
}
