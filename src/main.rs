//! UniTrain CLI
//!
//! Entry point for inspecting dataset layouts, training ResNet9/ResNet18
//! classifiers, evaluating checkpoints and classifying single images.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use burn::data::dataloader::DataLoader;
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::{info, warn};

use unitrain::backend::{backend_name, default_device, seed_all, DefaultBackend, TrainingBackend};
use unitrain::dataset::{
    get_data_loader, parse_folder, ClassificationBatch, FolderLayout, ImageFolder, ImageTransform,
    LoaderOptions, Split,
};
use unitrain::inference::{Predictor, DEFAULT_CLASS_ROOT};
use unitrain::model::{
    create_transfer_learning_model, summarize_parameters, ImageClassifier, ResNet18,
    ResNet18Config, ResNet18Factory, ResNet9, ResNet9Config,
};
use unitrain::training::{
    evaluate_detailed, latest_best_checkpoint, load_weights, ExperimentTracker, JsonlTracker,
    NoopTracker, RunLog, Trainer, TrainingConfig, TrainingReport,
};
use unitrain::utils::logging::{init_logging, LogConfig, LogLevel};
use unitrain::utils::{format_duration, format_number};

/// Image-classification training with Burn
#[derive(Parser, Debug)]
#[command(name = "unitrain")]
#[command(version)]
#[command(about = "Train and evaluate ResNet image classifiers with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Override the level chosen by --verbose/--quiet (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Architecture {
    /// Stacked conv blocks trained from scratch
    Resnet9,
    /// ResNet-18 backbone with a replaced head
    Resnet18,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a dataset root for matching train/test/eval splits
    Inspect {
        /// Dataset root containing train/, test/ and eval/
        #[arg(short, long, default_value = "content/data")]
        data_dir: PathBuf,
    },

    /// Train a classifier, validating on the test split after every epoch
    Train {
        /// Dataset root containing train/, test/ and eval/
        #[arg(short, long, default_value = "content/data")]
        data_dir: PathBuf,

        #[arg(short, long, value_enum, default_value = "resnet9")]
        arch: Architecture,

        /// JSON training configuration; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,

        /// Write a snapshot every N batches
        #[arg(long)]
        snapshot_interval: Option<usize>,

        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        #[arg(long)]
        snapshot_dir: Option<PathBuf>,

        /// ResNet-18 parameter snapshot to start from (resnet18 only)
        #[arg(long)]
        pretrained: Option<PathBuf>,

        /// Freeze the backbone and train only the new head (resnet18 only)
        #[arg(long, default_value = "false")]
        feature_extract: bool,

        /// Append per-epoch records to this file
        #[arg(long)]
        run_log: Option<PathBuf>,

        /// Write tracker events as JSON lines into this directory
        #[arg(long)]
        tracker_dir: Option<PathBuf>,

        /// Name reported to the tracker instead of a timestamp
        #[arg(long)]
        run_name: Option<String>,

        /// Start from the newest best-model checkpoint in the checkpoint directory
        #[arg(long, default_value = "false")]
        resume: bool,
    },

    /// Measure accuracy of saved weights on one split
    Evaluate {
        #[arg(short, long, default_value = "content/data")]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "eval")]
        split: Split,

        #[arg(short, long, value_enum, default_value = "resnet9")]
        arch: Architecture,

        /// Weights written by `train`
        #[arg(short, long)]
        weights: PathBuf,

        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },

    /// Classify a single image
    Infer {
        /// Path to the image
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value = "resnet9")]
        arch: Architecture,

        /// Weights written by `train`
        #[arg(short, long)]
        weights: PathBuf,

        /// Directory whose subdirectories name the classes
        #[arg(long, default_value = DEFAULT_CLASS_ROOT)]
        class_root: PathBuf,

        /// Number of most likely classes to print
        #[arg(long, default_value = "3")]
        top_k: usize,
    },
}

/// Training settings that only the CLI knows about
struct TrainOptions {
    data_dir: PathBuf,
    arch: Architecture,
    pretrained: Option<PathBuf>,
    feature_extract: bool,
    run_log: Option<PathBuf>,
    tracker_dir: Option<PathBuf>,
    run_name: Option<String>,
    resume: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Inspect { data_dir } => cmd_inspect(&data_dir),

        Commands::Train {
            data_dir,
            arch,
            config,
            epochs,
            batch_size,
            learning_rate,
            seed,
            snapshot_interval,
            checkpoint_dir,
            snapshot_dir,
            pretrained,
            feature_extract,
            run_log,
            tracker_dir,
            run_name,
            resume,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => TrainingConfig::default(),
            };
            if let Some(v) = epochs {
                training.num_epochs = v;
            }
            if let Some(v) = batch_size {
                training.batch_size = v;
            }
            if let Some(v) = learning_rate {
                training.learning_rate = v;
            }
            if let Some(v) = seed {
                training.seed = v;
            }
            if let Some(v) = snapshot_interval {
                training.snapshot_interval = v;
            }
            if let Some(v) = checkpoint_dir {
                training.checkpoint_dir = v;
            }
            if let Some(v) = snapshot_dir {
                training.snapshot_dir = v;
            }
            training.validate()?;

            let options = TrainOptions {
                data_dir,
                arch,
                pretrained,
                feature_extract,
                run_log,
                tracker_dir,
                run_name,
                resume,
            };
            cmd_train(training, options)
        }

        Commands::Evaluate {
            data_dir,
            split,
            arch,
            weights,
            batch_size,
        } => cmd_evaluate(&data_dir, split, arch, &weights, batch_size),

        Commands::Infer {
            input,
            arch,
            weights,
            class_root,
            top_k,
        } => cmd_infer(&input, arch, &weights, &class_root, top_k),
    }
}

fn cmd_inspect(data_dir: &Path) -> Result<()> {
    info!("Inspecting dataset layout at {:?}", data_dir);

    let paths = match parse_folder(data_dir) {
        FolderLayout::Valid(paths) => paths,
        FolderLayout::Invalid(issue) => {
            println!("{} {}", "Invalid layout:".red().bold(), issue);
            println!();
            println!("{}", "Expected structure:".yellow());
            println!("  {}/", data_dir.display());
            println!("  ├── train/<class>/...");
            println!("  ├── test/<class>/...");
            println!("  └── eval/<class>/...");
            return Ok(());
        }
    };

    println!("{}", "Dataset layout:".cyan().bold());
    println!("  Classes: {}", paths.classes.len());
    println!();

    for split in Split::ALL {
        let folder = ImageFolder::new(paths.path(split), ImageTransform::default())?;
        let distribution = folder.class_distribution();
        let total: usize = distribution.iter().sum();

        println!(
            "{} {} images",
            format!("{:>5}:", split).green().bold(),
            format_number(total)
        );
        for (class, count) in folder.classes().iter().zip(distribution) {
            let pct = if total == 0 {
                0.0
            } else {
                100.0 * count as f64 / total as f64
            };
            println!("  {:40} {:>7} ({:>5.1}%)", class, format_number(count), pct);
        }
    }

    Ok(())
}

fn cmd_train(config: TrainingConfig, options: TrainOptions) -> Result<()> {
    let paths = parse_folder(&options.data_dir).into_result()?;
    info!("Dataset has {} classes", paths.classes.len());
    let device = default_device();
    seed_all(config.seed);

    std::fs::create_dir_all(&config.checkpoint_dir)
        .with_context(|| format!("creating {}", config.checkpoint_dir.display()))?;
    std::fs::create_dir_all(&config.snapshot_dir)
        .with_context(|| format!("creating {}", config.snapshot_dir.display()))?;
    config.save(&config.checkpoint_dir.join("config.json"))?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Data:          {}", options.data_dir.display());
    println!("  Architecture:  {:?}", options.arch);
    println!("  Backend:       {}", backend_name());
    println!("  Epochs:        {}", config.num_epochs);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!();

    let train_options = LoaderOptions::new(config.batch_size)
        .with_shuffle(config.seed)
        .with_num_workers(config.num_workers);
    let valid_options = LoaderOptions::new(config.batch_size).with_num_workers(config.num_workers);

    let (train, classes) = get_data_loader::<TrainingBackend>(
        &options.data_dir,
        Split::Train,
        &train_options,
        &device,
    )?;
    let (valid, _) = get_data_loader::<DefaultBackend>(
        &options.data_dir,
        Split::Test,
        &valid_options,
        &device,
    )?;
    let num_classes = classes.len();

    let start = Instant::now();
    let report = match options.arch {
        Architecture::Resnet9 => {
            if options.pretrained.is_some() || options.feature_extract {
                bail!("--pretrained and --feature-extract require --arch resnet18");
            }
            let model = ResNet9Config::new(num_classes).init::<TrainingBackend>(&device)?;
            fit(model, config, &options, &train, &valid)?
        }
        Architecture::Resnet18 => {
            let mut factory = ResNet18Factory::new();
            if let Some(path) = &options.pretrained {
                factory = factory.with_weights(path);
            }
            let model = create_transfer_learning_model::<TrainingBackend, _>(
                num_classes,
                &factory,
                options.feature_extract,
                options.pretrained.is_some(),
                &device,
            )?;
            fit(model, config, &options, &train, &valid)?
        }
    };

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Duration:      {}", format_duration(start.elapsed()));
    println!("  Best accuracy: {:.2}%", report.best_accuracy);
    for (epoch, accuracy) in report.epoch_accuracies.iter().enumerate() {
        println!("  Epoch {:>3}:     {:.2}%", epoch + 1, accuracy);
    }
    if let Some(path) = report.best_checkpoints.last() {
        println!("  Best weights:  {}", path.display());
    }

    Ok(())
}

type TrainLoader = Arc<dyn DataLoader<ClassificationBatch<TrainingBackend>>>;
type ValidLoader = Arc<dyn DataLoader<ClassificationBatch<DefaultBackend>>>;

fn fit<M>(
    mut model: M,
    config: TrainingConfig,
    options: &TrainOptions,
    train: &TrainLoader,
    valid: &ValidLoader,
) -> Result<TrainingReport>
where
    M: AutodiffModule<TrainingBackend> + ImageClassifier<TrainingBackend>,
    M::InnerModule: ImageClassifier<DefaultBackend>,
{
    let summary = summarize_parameters(&model);
    println!(
        "  Parameters:    {} ({} trainable)",
        format_number(summary.total),
        format_number(summary.trainable)
    );

    let device = default_device();
    if options.resume {
        match latest_best_checkpoint(&config.checkpoint_dir)? {
            Some((epoch, path)) => {
                info!("Resuming from epoch {} weights at {:?}", epoch, path);
                model = load_weights::<TrainingBackend, M>(model, &path, &device)?;
            }
            None => warn!(
                "No best-model checkpoint in {:?}; starting from fresh weights",
                config.checkpoint_dir
            ),
        }
    }

    let optimizer = AdamConfig::new().init::<TrainingBackend, M>();
    let mut trainer = Trainer::<TrainingBackend>::new(config, device)?;
    if let Some(path) = &options.run_log {
        trainer = trainer.with_run_log(RunLog::create(path)?);
    }
    if let Some(name) = &options.run_name {
        trainer = trainer.with_run_name(name.as_str());
    }

    let mut tracker: Box<dyn ExperimentTracker> = match &options.tracker_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            Box::new(JsonlTracker::new(dir))
        }
        None => Box::new(NoopTracker),
    };

    let outcome = trainer.fit(model, optimizer, train, valid, tracker.as_mut())?;
    Ok(outcome.report)
}

fn cmd_evaluate(
    data_dir: &Path,
    split: Split,
    arch: Architecture,
    weights: &Path,
    batch_size: usize,
) -> Result<()> {
    let device = default_device();
    let options = LoaderOptions::new(batch_size);
    let (loader, classes) =
        get_data_loader::<DefaultBackend>(data_dir, split, &options, &device)?;

    println!("{}", "Evaluation:".cyan().bold());
    println!("  Split:   {}", split);
    println!("  Weights: {}", weights.display());
    println!("  Backend: {}", backend_name());

    let start = Instant::now();
    let summary = match arch {
        Architecture::Resnet9 => {
            let model: ResNet9<DefaultBackend> = ResNet9Config::new(classes.len()).init(&device)?;
            let model = load_weights(model, weights, &device)?;
            evaluate_detailed(&model, &loader)?
        }
        Architecture::Resnet18 => {
            let model: ResNet18<DefaultBackend> = ResNet18Config::new()
                .with_num_classes(classes.len())
                .init(&device)?;
            let model = load_weights(model, weights, &device)?;
            evaluate_detailed(&model, &loader)?
        }
    };

    println!();
    println!(
        "  Accuracy: {} ({} / {}) in {}",
        format!("{:.2}%", summary.accuracy).green().bold(),
        format_number(summary.correct),
        format_number(summary.total),
        format_duration(start.elapsed())
    );
    Ok(())
}

fn cmd_infer(
    input: &Path,
    arch: Architecture,
    weights: &Path,
    class_root: &Path,
    top_k: usize,
) -> Result<()> {
    if !input.exists() {
        bail!("input image not found: {}", input.display());
    }
    let device = default_device();

    match arch {
        Architecture::Resnet9 => {
            let predictor = Predictor::<DefaultBackend, ResNet9<DefaultBackend>>::from_class_root(
                class_root,
                device.clone(),
            )?;
            let model = ResNet9Config::new(predictor.classes().len()).init(&device)?;
            let model = load_weights(model, weights, &device)?;
            report_prediction(predictor.with_model(model), input, top_k)
        }
        Architecture::Resnet18 => {
            let predictor =
                Predictor::<DefaultBackend, ResNet18<DefaultBackend>>::from_class_root(
                    class_root,
                    device.clone(),
                )?;
            let model = ResNet18Config::new()
                .with_num_classes(predictor.classes().len())
                .init(&device)?;
            let model = load_weights(model, weights, &device)?;
            report_prediction(predictor.with_model(model), input, top_k)
        }
    }
}

fn report_prediction<M: ImageClassifier<DefaultBackend>>(
    predictor: Predictor<DefaultBackend, M>,
    input: &Path,
    top_k: usize,
) -> Result<()> {
    let prediction = predictor.predict_path(input)?;
    if prediction.confidence < 0.5 {
        warn!("Low confidence prediction ({:.1}%)", prediction.confidence * 100.0);
    }

    println!("{}", "Prediction:".cyan().bold());
    println!(
        "  {} ({:.1}%)",
        prediction.label.green().bold(),
        prediction.confidence * 100.0
    );
    println!("  Inference time: {:.1} ms", prediction.inference_time_ms);

    if top_k > 1 {
        println!();
        println!("{}", format!("Top {}:", top_k).cyan());
        for (_, label, prob) in prediction.top_k(top_k, predictor.classes()) {
            println!("  {:40} {:>5.1}%", label, prob * 100.0);
        }
    }
    Ok(())
}
