//! streamflow - Main Entry Point
//!
//! Runs a demo pipeline built from the configuration:
//! a clock-driven frame source feeding a reader stage, a statistics stage and
//! a writer stage whose sink reports back to this thread.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{unbounded, Receiver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use streamflow::{
    config::{self, AppConfig},
    filter::{shared, BufferReader, BufferWriter, MapFilter},
    logging::{default_logger, init_tracing, LogSink, MemorySink},
    pipeline::{Pipeline, StepOutcome},
    playback::{PlaybackClock, PlaybackMode},
    RingBuffer,
};

/// Typed streaming pipeline runner
#[derive(Parser, Debug)]
#[clap(name = "streamflow", version)]
#[clap(about = "Run and configure streamflow demo pipelines")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[clap(long, short, global = true, env = "STREAMFLOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo pipeline until the source is exhausted
    Run {
        /// Override the configured playback mode
        #[clap(long, value_enum)]
        mode: Option<CliMode>,
    },
    /// Print the effective configuration as TOML
    Config,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliMode {
    SingleStep,
    FrameBased,
}

impl From<CliMode> for PlaybackMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::SingleStep => PlaybackMode::SingleStepTrigger,
            CliMode::FrameBased => PlaybackMode::FrameBased,
        }
    }
}

/// One frame of synthetic samples
#[derive(Debug, Clone, Default)]
struct Frame {
    index: i64,
    time: f64,
    values: Vec<f64>,
}

/// Summary statistics of one frame
#[derive(Debug, Clone, Default)]
struct FrameStats {
    index: i64,
    time: f64,
    mean: f64,
    min: f64,
    max: f64,
}

fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => config::default_config_path().context("no platform config directory"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let path = config_path(args.config)?;
    // Held until the subscriber is installed, or printed for `config`.
    let startup = MemorySink::new();

    match args.command {
        Command::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Command::Config => {
            let config = AppConfig::load_or_default(&path, &startup);
            for entry in startup.entries() {
                eprintln!("{}: {}", entry.level, entry.message);
            }
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Run { mode } => {
            let mut config = AppConfig::load_or_default(&path, &startup);
            if let Some(mode) = mode {
                config.playback.mode = mode.into();
            }
            config.validate()?;
            let _guard = init_tracing(&config.logging)?;
            let logger = default_logger();
            for entry in startup.entries() {
                logger.log(entry.level, &entry.component, &entry.message);
            }
            run(&config)
        }
    }
}

fn run(config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!(pipeline = %config.name, mode = %config.playback.mode, "Starting streamflow");
    let logger = default_logger();

    // Frames follow a non-repeating clock over the configured window.
    let mut source_clock = PlaybackClock::from_settings(&config.playback)?;
    source_clock.set_mode(PlaybackMode::FrameBased);
    source_clock.set_repeat(false);
    source_clock.play();
    let values_per_frame = config.source.values_per_frame;
    let mut exhausted = false;
    let source = move || -> streamflow::Result<Option<Frame>> {
        if exhausted {
            return Ok(None);
        }
        let position = source_clock.update()?;
        exhausted = source_clock.finished();
        let values = (0..values_per_frame)
            .map(|i| (position.time * 0.01 + i as f64 * 0.1).sin())
            .collect();
        Ok(Some(Frame {
            index: position.frame,
            time: position.time,
            values,
        }))
    };

    let input_buffer = Arc::new(RingBuffer::new(config.buffer.capacity)?);
    let reader = shared(BufferReader::with_source(
        "frames",
        input_buffer,
        source,
        logger.clone(),
    ));

    let stats = shared(MapFilter::new("stats", |frame: &Frame, out: &mut FrameStats| {
        let count = frame.values.len().max(1) as f64;
        out.index = frame.index;
        out.time = frame.time;
        out.mean = frame.values.iter().sum::<f64>() / count;
        out.min = frame.values.iter().copied().fold(f64::INFINITY, f64::min);
        out.max = frame.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(())
    }));

    let (stats_tx, stats_rx) = unbounded();
    let output_buffer = Arc::new(RingBuffer::new(config.buffer.capacity)?);
    let writer = shared(BufferWriter::with_sink(
        "report",
        output_buffer,
        move |stats: &FrameStats| -> streamflow::Result<()> {
            stats_tx
                .send(stats.clone())
                .map_err(|e| streamflow::StreamError::stage("report", e.to_string()))
        },
        logger.clone(),
    ));

    let mut pipeline = Pipeline::builder(config.name.clone())
        .mode(config.playback.mode)
        .logger(logger)
        .build();
    pipeline.push_back(reader)?;
    pipeline.push_back(stats.clone())?;
    pipeline.push_back(writer.clone())?;
    tracing::info!("{}", pipeline);

    let started = Instant::now();
    pipeline.start()?;
    match config.playback.mode {
        PlaybackMode::SingleStepTrigger => loop {
            match pipeline.step()? {
                StepOutcome::EndOfStream | StepOutcome::Finished => break,
                StepOutcome::Completed | StepOutcome::Interrupted => {}
            }
        },
        PlaybackMode::FrameBased => pipeline.wait_until_idle(),
        other => bail!("{} playback is not supported by the demo runner", other),
    }
    pipeline.stop();

    let flushed = writer
        .lock()
        .map_err(|_| anyhow::anyhow!("writer stage poisoned"))?
        .flush()?;
    tracing::debug!(flushed, "Writer drained");
    let processed = stats
        .lock()
        .map_err(|_| anyhow::anyhow!("stats stage poisoned"))?
        .processed();

    report(&stats_rx, processed, started);
    Ok(())
}

fn report(stats_rx: &Receiver<FrameStats>, processed: u64, started: Instant) {
    let received: Vec<FrameStats> = stats_rx.try_iter().collect();
    let elapsed = started.elapsed();
    let (first, last) = match (received.first(), received.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            println!("No frames received ({} processed)", processed);
            return;
        }
    };
    let mean = received.iter().map(|s| s.mean).sum::<f64>() / received.len() as f64;
    let min = received.iter().map(|s| s.min).fold(f64::INFINITY, f64::min);
    let max = received.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max);

    println!(
        "Processed {} frames ({} delivered) in {:.2?}",
        processed,
        received.len(),
        elapsed
    );
    println!(
        "Frames {}..={} covering {:.3}..{:.3} ms",
        first.index, last.index, first.time, last.time
    );
    println!("Mean {:.4}, min {:.4}, max {:.4}", mean, min, max);
}
