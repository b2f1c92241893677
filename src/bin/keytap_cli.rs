use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use keytap::analysis::segmenter::segment_samples;
use keytap::audio::{downmix_interleaved, EventBuffer};
use keytap::config::RuntimeConfig;
use keytap::{AppConfig, FeatureExtractor, FeatureVector, ModelHandle, Prediction, RandomForest};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "keytap_cli",
    about = "Offline harness for keystroke segmentation, learning and recognition"
)]
struct Cli {
    /// JSON configuration file (defaults are used when absent or invalid)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report the key events found in a recording
    Segment {
        #[arg(long)]
        wav: PathBuf,
    },
    /// Add every key event in a recording as a sample for one label
    Learn {
        #[arg(long)]
        wav: PathBuf,
        #[arg(long)]
        label: String,
        #[arg(long)]
        model: PathBuf,
    },
    /// Train the classifier on every stored sample
    Train {
        #[arg(long)]
        model: PathBuf,
    },
    /// Classify every key event in a recording
    Predict {
        #[arg(long)]
        wav: PathBuf,
        #[arg(long)]
        model: PathBuf,
    },
    /// Print per-label sample counts
    Counts {
        #[arg(long)]
        model: PathBuf,
    },
}

fn main() -> ExitCode {
    keytap::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    config.validate().context("validating configuration")?;

    match cli.command {
        Commands::Segment { wav } => run_segment(&config, &wav),
        Commands::Learn { wav, label, model } => run_learn(&config, &wav, &label, &model),
        Commands::Train { model } => run_train(&config, &model),
        Commands::Predict { wav, model } => run_predict(&config, &wav, &model),
        Commands::Counts { model } => run_counts(&config, &model),
    }
}

fn run_segment(config: &AppConfig, wav: &Path) -> Result<ExitCode> {
    let recording = Recording::open(wav, config)?;
    let extractor = FeatureExtractor::new(recording.sample_rate);

    let events: Vec<EventReport> = recording
        .events
        .iter()
        .map(|event| EventReport::new(event, recording.sample_rate, &extractor))
        .collect();

    let frame_duration = RuntimeConfig {
        sample_rate: recording.sample_rate,
        ..config.audio.clone()
    }
    .frame_duration();

    emit(&SegmentReport {
        wav: wav.display().to_string(),
        sample_rate: recording.sample_rate,
        frame_ms: frame_duration * 1000.0,
        feature_names: &FeatureVector::FIELD_NAMES,
        event_count: events.len(),
        events,
    })?;
    Ok(ExitCode::from(0))
}

fn run_learn(config: &AppConfig, wav: &Path, label: &str, model_path: &Path) -> Result<ExitCode> {
    let label = label.trim();
    if label.is_empty() {
        bail!("label must not be empty");
    }

    let recording = Recording::open(wav, config)?;
    let extractor = FeatureExtractor::new(recording.sample_rate);
    let model = ModelHandle::load(model_path, config.classifier.clone());

    let mut added = 0usize;
    for event in &recording.events {
        match extractor.extract(event.samples()) {
            Ok(features) => {
                if !model.add_sample(label, features) {
                    bail!("model lock poisoned while adding samples");
                }
                added += 1;
            }
            Err(err) => eprintln!("Skipping event at sample {}: {}", event.start_sample(), err),
        }
    }

    model
        .save(model_path)
        .with_context(|| format!("saving {}", model_path.display()))?;

    emit(&LearnReport {
        label,
        added,
        counts: model.sample_counts(),
    })?;
    Ok(ExitCode::from(0))
}

fn run_train(config: &AppConfig, model_path: &Path) -> Result<ExitCode> {
    let model = ModelHandle::load(model_path, config.classifier.clone());
    let trained = model.train();
    if trained {
        model
            .save(model_path)
            .with_context(|| format!("saving {}", model_path.display()))?;
    }

    emit(&ModelReport::new(&model, trained)?)?;
    Ok(if trained {
        ExitCode::from(0)
    } else {
        ExitCode::from(2)
    })
}

fn run_predict(config: &AppConfig, wav: &Path, model_path: &Path) -> Result<ExitCode> {
    let recording = Recording::open(wav, config)?;
    let extractor = FeatureExtractor::new(recording.sample_rate);
    let model = ModelHandle::load(model_path, config.classifier.clone());
    if !model.is_trained() {
        eprintln!("Model at {} is not trained", model_path.display());
    }

    let predictions = recording
        .events
        .iter()
        .filter_map(|event| match extractor.extract(event.samples()) {
            Ok(features) => Some(PredictionReport::new(
                event.start_sample(),
                model.predict(&features),
            )),
            Err(err) => {
                eprintln!("Skipping event at sample {}: {}", event.start_sample(), err);
                None
            }
        })
        .collect::<Vec<_>>();

    emit(&predictions)?;
    Ok(ExitCode::from(0))
}

fn run_counts(config: &AppConfig, model_path: &Path) -> Result<ExitCode> {
    let model = ModelHandle::load(model_path, config.classifier.clone());
    emit(&ModelReport::new(&model, model.is_trained())?)?;
    Ok(ExitCode::from(0))
}

fn emit<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Key events of one WAV file, segmented with the configured parameters
struct Recording {
    sample_rate: u32,
    events: Vec<EventBuffer>,
}

impl Recording {
    fn open(path: &Path, config: &AppConfig) -> Result<Self> {
        let (samples, sample_rate) = read_wav(path)?;
        if sample_rate != config.audio.sample_rate {
            eprintln!(
                "Warning: {} is {} Hz, configuration expects {} Hz",
                path.display(),
                sample_rate,
                config.audio.sample_rate
            );
        }

        let events = segment_samples(
            &samples,
            config.audio.frame_size,
            sample_rate,
            config.audio.energy_threshold,
            config.audio.silence_timeout,
        );
        Ok(Self {
            sample_rate,
            events,
        })
    }
}

/// Read a WAV file as mono f32, down-mixing interleaved channels
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                8 | 16 | 24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|value| value as f32 / max)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?,
                other => bail!(
                    "Unsupported bits per sample {} in {}",
                    other,
                    path.display()
                ),
            }
        }
    };

    Ok((downmix_interleaved(&samples, spec.channels), spec.sample_rate))
}

#[derive(Serialize)]
struct SegmentReport {
    wav: String,
    sample_rate: u32,
    frame_ms: f32,
    /// Names of the values in each event's `features`, in order
    feature_names: &'static [&'static str],
    event_count: usize,
    events: Vec<EventReport>,
}

#[derive(Serialize)]
struct EventReport {
    start_sample: u64,
    end_sample: u64,
    frames: usize,
    samples: usize,
    duration_ms: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<FeatureVector>,
}

impl EventReport {
    fn new(event: &EventBuffer, sample_rate: u32, extractor: &FeatureExtractor) -> Self {
        Self {
            start_sample: event.start_sample(),
            end_sample: event.end_sample(),
            frames: event.frame_count(),
            samples: event.len(),
            duration_ms: event.duration_secs(sample_rate) * 1000.0,
            features: extractor.extract(event.samples()).ok(),
        }
    }
}

#[derive(Serialize)]
struct LearnReport<'a> {
    label: &'a str,
    added: usize,
    counts: std::collections::BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct ModelReport {
    trained: bool,
    needs_retraining: bool,
    label_count: usize,
    counts: std::collections::BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forest: Option<ForestReport>,
}

impl ModelReport {
    fn new(handle: &ModelHandle, trained: bool) -> Result<Self> {
        let model = handle.snapshot().context("reading model state")?;
        Ok(Self {
            trained,
            needs_retraining: model.needs_retraining(),
            label_count: model.samples().label_count(),
            counts: model.sample_counts(),
            forest: model.classifier().map(ForestReport::new),
        })
    }
}

/// Size of the fitted forest
#[derive(Serialize)]
struct ForestReport {
    trees: usize,
    max_depth: usize,
    mean_nodes: f32,
}

impl ForestReport {
    fn new(forest: &RandomForest) -> Self {
        let shapes = forest.tree_shapes();
        let total_nodes: usize = shapes.iter().map(|&(nodes, _)| nodes).sum();
        Self {
            trees: shapes.len(),
            max_depth: shapes.iter().map(|&(_, depth)| depth).max().unwrap_or(0),
            mean_nodes: total_nodes as f32 / shapes.len().max(1) as f32,
        }
    }
}

#[derive(Serialize)]
struct PredictionReport {
    start_sample: u64,
    recognized: bool,
    #[serde(flatten)]
    prediction: Prediction,
}

impl PredictionReport {
    fn new(start_sample: u64, prediction: Prediction) -> Self {
        Self {
            start_sample,
            recognized: prediction.is_recognized(),
            prediction,
        }
    }
}
