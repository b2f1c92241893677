use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

const SAMPLE_RATE: u32 = 44100;
const FRAME: usize = 1024;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_keytap_cli"))
}

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("keytap_cli_{}_{}", std::process::id(), name))
}

/// Quiet lead-in, one burst per entry in `bursts` (loud frames), quiet gaps
fn write_wav(path: &Path, channels: u16, bursts: &[(f32, usize)]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let mut write_frames = |freq: f32, amplitude: f32, frames: usize| {
        for i in 0..frames * FRAME {
            let t = i as f32 / SAMPLE_RATE as f32;
            let value = amplitude * (2.0 * std::f32::consts::PI * freq * t).sin();
            for _ in 0..channels {
                writer
                    .write_sample((value * i16::MAX as f32) as i16)
                    .expect("write sample");
            }
        }
    };

    write_frames(0.0, 0.0, 20);
    for &(freq, frames) in bursts {
        write_frames(freq, 0.5, frames);
        write_frames(0.0, 0.0, 20);
    }
    writer.finalize().expect("finalize wav");
}

fn run_json(args: &[&str]) -> Value {
    let output = cli().args(args).output().expect("failed to run keytap_cli");
    assert!(
        output.status.success(),
        "keytap_cli {:?} exited with {:?}: {}",
        args,
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    serde_json::from_str(stdout.trim()).expect("JSON report")
}

#[test]
fn segment_reports_each_burst() {
    let wav = temp_file("segment.wav");
    write_wav(&wav, 1, &[(1000.0, 4), (3000.0, 6)]);

    let report = run_json(&["segment", "--wav", wav.to_str().unwrap()]);
    assert_eq!(report["sample_rate"], SAMPLE_RATE);
    assert_eq!(report["event_count"], 2);
    assert_eq!(report["events"][0]["frames"], 4);
    assert_eq!(report["events"][0]["start_sample"], 20 * FRAME as u64);
    assert_eq!(report["events"][1]["frames"], 6);
    assert_eq!(
        report["events"][1]["features"]
            .as_array()
            .map(|values| values.len()),
        Some(18)
    );
    assert_eq!(report["feature_names"].as_array().map(Vec::len), Some(18));
    assert_eq!(report["feature_names"][0], "mfcc_0");
    assert_eq!(report["feature_names"][17], "rms");
    let frame_ms = report["frame_ms"].as_f64().expect("frame_ms");
    assert!((frame_ms - 1000.0 * FRAME as f64 / SAMPLE_RATE as f64).abs() < 1e-3);

    let _ = std::fs::remove_file(&wav);
}

#[test]
fn segment_downmixes_stereo() {
    let wav = temp_file("stereo.wav");
    write_wav(&wav, 2, &[(1000.0, 5)]);

    let report = run_json(&["segment", "--wav", wav.to_str().unwrap()]);
    assert_eq!(report["event_count"], 1);
    assert_eq!(report["events"][0]["samples"], 5 * FRAME as u64);

    let _ = std::fs::remove_file(&wav);
}

#[test]
fn learn_train_predict_cycle() {
    let low = temp_file("low.wav");
    let high = temp_file("high.wav");
    let model = temp_file("model.json");
    write_wav(&low, 1, &[(500.0, 4), (500.0, 5), (500.0, 4)]);
    write_wav(&high, 1, &[(6000.0, 4), (6000.0, 5), (6000.0, 4)]);
    let model_arg = model.to_str().unwrap();

    let learned = run_json(&[
        "learn", "--wav", low.to_str().unwrap(), "--label", "low", "--model", model_arg,
    ]);
    assert_eq!(learned["added"], 3);

    // One label is not enough to train
    let output = cli()
        .args(["train", "--model", model_arg])
        .output()
        .expect("failed to run train");
    assert_eq!(output.status.code(), Some(2));

    run_json(&[
        "learn", "--wav", high.to_str().unwrap(), "--label", "high", "--model", model_arg,
    ]);
    let counts = run_json(&["counts", "--model", model_arg]);
    assert_eq!(counts["counts"]["low"], 3);
    assert_eq!(counts["counts"]["high"], 3);
    assert_eq!(counts["trained"], false);
    assert_eq!(counts["label_count"], 2);
    assert_eq!(counts["needs_retraining"], true);
    assert!(counts.get("forest").is_none());

    let trained = run_json(&["train", "--model", model_arg]);
    assert_eq!(trained["trained"], true);
    assert_eq!(trained["needs_retraining"], false);
    assert_eq!(trained["forest"]["trees"], 100);
    assert!(trained["forest"]["max_depth"].as_u64().expect("max_depth") >= 1);

    let predictions = run_json(&["predict", "--wav", high.to_str().unwrap(), "--model", model_arg]);
    let predictions = predictions.as_array().expect("prediction list");
    assert_eq!(predictions.len(), 3);
    assert!(predictions
        .iter()
        .all(|p| p["label"] == "high" && p["recognized"] == true));

    for path in [&low, &high, &model] {
        let _ = std::fs::remove_file(path);
    }
}
