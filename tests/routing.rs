//! Integration test: routing table → mix graph layout → rendered channels.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sm_audio::{OfflineHost, OfflineProbe};
use sm_formats::converted_path;
use sm_master::{BitsPerSample, Controller, EngineConfig, SourceConfig};
use tempfile::TempDir;

const RATE: u32 = 8000;

fn write_wav(path: &Path, rate: u32, channels: u16, frames: &[f32]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for &s in frames {
        w.write_sample(s).unwrap();
    }
    w.finalize().unwrap();
}

fn constant(dir: &Path, name: &str, value: f32) -> PathBuf {
    let path = dir.join(name);
    write_wav(&path, RATE, 1, &vec![value; RATE as usize]);
    path
}

fn setup(capacity: u16, bits: u16) -> (TempDir, Controller, OfflineProbe) {
    let dir = tempfile::tempdir().unwrap();
    let host = OfflineHost::new().with_driver("Virtual", capacity);
    let probe = host.probe();
    let config = EngineConfig::new("Virtual").with_format(RATE, bits);
    let ctrl = Controller::new(Box::new(host), &config).unwrap();
    (dir, ctrl, probe)
}

#[test]
fn duplicate_channel_rejected_first_kept() {
    let (dir, mut ctrl, _probe) = setup(8, 32);
    let a = constant(dir.path(), "a.wav", 0.5);
    let b = constant(dir.path(), "b.wav", 0.25);

    let first = ctrl.attach(&SourceConfig::new(&a, 3));
    let second = ctrl.attach(&SourceConfig::new(&b, 3));

    assert_eq!(ctrl.registry().get(3), Some(first));
    assert!(!ctrl.registry().contains(second));
    assert_eq!(ctrl.registry().len(), 1);
}

#[test]
fn gap_channel_is_always_silent() {
    let (dir, mut ctrl, probe) = setup(8, 32);
    let a = constant(dir.path(), "a.wav", 0.5);
    let c = constant(dir.path(), "c.wav", 0.25);
    ctrl.attach(&SourceConfig::new(&c, 3));
    ctrl.attach(&SourceConfig::new(&a, 1));

    assert_eq!(ctrl.registry().channel_count(), 3);
    ctrl.tick(Duration::ZERO).unwrap();

    let lanes = probe
        .with_installed(|g| g.lanes().iter().map(|l| l.is_silence()).collect::<Vec<_>>())
        .unwrap();
    assert_eq!(lanes, vec![false, true, false]);

    let frames = probe.render(4, 3);
    for frame in frames.chunks(3) {
        assert_eq!(frame, &[0.5, 0.0, 0.25]);
    }
}

#[test]
fn paused_source_never_audible() {
    let (dir, mut ctrl, probe) = setup(8, 32);
    let a = constant(dir.path(), "a.wav", 0.5);
    let b = constant(dir.path(), "b.wav", 0.25);
    let ka = ctrl.attach(&SourceConfig::new(&a, 1));
    ctrl.attach(&SourceConfig::new(&b, 2));
    ctrl.tick(Duration::ZERO).unwrap();

    ctrl.pause(ka).unwrap();
    let frames = probe.render(8, 2);
    assert!(frames.chunks(2).all(|f| f == [0.0, 0.25]));
}

#[test]
fn capacity_limits_registered_sources() {
    let (dir, mut ctrl, _probe) = setup(2, 32);
    let keys: Vec<_> = (1..=3)
        .map(|ch| {
            let path = constant(dir.path(), &format!("{}.wav", ch), 0.1);
            ctrl.attach(&SourceConfig::new(&path, ch))
        })
        .collect();
    assert!(ctrl.registry().contains(keys[0]));
    assert!(ctrl.registry().contains(keys[1]));
    assert!(!ctrl.registry().contains(keys[2]));
}

#[test]
fn mismatched_rate_goes_through_cache() {
    let (dir, mut ctrl, _probe) = setup(8, 32);
    let original = dir.path().join("hi.wav");
    write_wav(&original, 16000, 1, &vec![0.5; 16000]);

    let key = ctrl.attach(&SourceConfig::new(&original, 1));
    let cached = converted_path(&original, RATE, BitsPerSample::Bits32);
    assert!(cached.is_file(), "Expected converted file {}", cached.display());

    let source = ctrl.source(key).unwrap();
    assert_eq!(source.path(), cached.as_path());
    assert_eq!(source.original_path(), Some(original.as_path()));
    let format = source.format().unwrap();
    assert_eq!(format.sample_rate, RATE);
    assert_eq!(format.channels, 1);
    assert!((source.duration_seconds() - 1.0).abs() < 1e-3);

    // A second source on the same file reuses the cache.
    let again = ctrl.attach(&SourceConfig::new(&original, 2));
    assert_eq!(ctrl.source(again).unwrap().path(), cached.as_path());
}

#[test]
fn foreign_cache_file_is_fatal_for_that_source() {
    let (dir, mut ctrl, _probe) = setup(8, 32);
    let original = dir.path().join("hi.wav");
    write_wav(&original, 16000, 1, &vec![0.5; 1600]);
    let cached = converted_path(&original, RATE, BitsPerSample::Bits32);
    write_wav(&cached, 22050, 1, &[0.0; 10]);

    let key = ctrl.attach(&SourceConfig::new(&original, 1));
    assert!(!ctrl.registry().contains(key));
    assert!(ctrl.source(key).unwrap().stream().is_none());
}

#[test]
fn stereo_is_averaged_to_mono() {
    let (dir, mut ctrl, probe) = setup(8, 32);
    let path = dir.path().join("stereo.wav");
    let interleaved: Vec<f32> = (0..100).flat_map(|_| [0.5, -0.25]).collect();
    write_wav(&path, RATE, 2, &interleaved);

    let key = ctrl.attach(&SourceConfig::new(&path, 1));
    assert_eq!(ctrl.source(key).unwrap().format().unwrap().channels, 1);
    ctrl.tick(Duration::ZERO).unwrap();
    assert_eq!(probe.render(1, 1), vec![0.125]);
}

#[test]
fn sixteen_bit_target_quantizes_after_volume() {
    let (dir, mut ctrl, probe) = setup(8, 16);
    let a = constant(dir.path(), "a.wav", 0.3);
    let key = ctrl.attach(&SourceConfig::new(&a, 1).with_volume(0.5));
    ctrl.tick(Duration::ZERO).unwrap();

    let expected = (0.15f32 * 32768.0).round() / 32768.0;
    let got = probe.render(1, 1)[0];
    assert!((got - expected).abs() < 1.0 / 32768.0, "got {}", got);
    assert_eq!(ctrl.source(key).unwrap().format().unwrap().bits_per_sample, 16);
}

#[test]
fn yaml_room_renders_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    constant(dir.path(), "left.wav", 0.5);
    constant(dir.path(), "right.wav", -0.5);
    let config_path = dir.path().join("room.yaml");
    fs::write(
        &config_path,
        "driver: Virtual\n\
         sample_rate: 8000\n\
         sources:\n  \
           - path: left.wav\n    channel: 1\n  \
           - path: right.wav\n    channel: 4\n    volume: 0.5\n",
    )
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    let out = dir.path().join("mix.wav");
    let pcm = sm_master::render_to_wav(&config, 0.25, &out).unwrap();
    assert_eq!(pcm.channels(), 4);
    assert_eq!(pcm.frames(), 2000);
    assert!(pcm.channel(0).iter().all(|&s| s == 0.5));
    assert!(pcm.channel(1).iter().all(|&s| s == 0.0));
    assert!(pcm.channel(3).iter().all(|&s| s == -0.25));

    let reader = hound::WavReader::open(&out).unwrap();
    assert_eq!(reader.spec().channels, 4);
    assert_eq!(reader.duration(), 2000);
}
