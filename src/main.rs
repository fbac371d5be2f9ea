//! Delaymeter - audio delay measurement tool
//!
//! Simulates a reference and a delayed target stream on two producer
//! threads, measures the delay between them and applies it to a simulated
//! sync offset.

use anyhow::{bail, Context, Result};
use delaymeter::audio::signal::{delayed, program_audio, NoiseGenerator};
use delaymeter::{
    AppConfig, DelayMeter, MeasurementResult, SourceRegistry, StreamSource, SyncOffsetTarget,
    TargetSink,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Default target name when none is configured
const DEFAULT_TARGET: &str = "Simulated Target";

/// Frames per simulated audio callback
const BLOCK_MS: u32 = 10;

#[derive(Debug, Default)]
struct Options {
    delay_ms: f64,
    sample_rate: Option<u32>,
    window_ms: Option<u32>,
    max_lag_ms: Option<u32>,
    target: Option<String>,
    uncorrelated: bool,
    debug: bool,
    config_path: Option<PathBuf>,
    save_config: bool,
    json: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("delaymeter=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    let config_path = options.config_path.clone().unwrap_or_else(AppConfig::path);
    let mut config = AppConfig::load_from(&config_path);
    apply_overrides(&mut config, &options);

    if options.save_config {
        config.save(&config_path)?;
    }

    run(&config, &options)
}

/// Parse command line arguments; `None` when the program should just exit
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("delaymeter {}", delaymeter::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--delay-ms" | "-d" => {
                options.delay_ms = parse_value(args, i)?;
                i += 1;
            }
            "--sample-rate" | "-r" => {
                options.sample_rate = Some(parse_value(args, i)?);
                i += 1;
            }
            "--window-ms" | "-w" => {
                options.window_ms = Some(parse_value(args, i)?);
                i += 1;
            }
            "--max-lag-ms" | "-m" => {
                options.max_lag_ms = Some(parse_value(args, i)?);
                i += 1;
            }
            "--target" | "-t" => {
                options.target = Some(parse_value(args, i)?);
                i += 1;
            }
            "--config" | "-c" => {
                options.config_path = Some(parse_value(args, i)?);
                i += 1;
            }
            "--uncorrelated" => options.uncorrelated = true,
            "--debug" => options.debug = true,
            "--save-config" => options.save_config = true,
            "--json" => options.json = true,
            arg => {
                print_help();
                bail!("Unknown argument: {}", arg);
            }
        }
        i += 1;
    }

    Ok(Some(options))
}

/// Parse the value following the flag at `args[i]`
fn parse_value<T>(args: &[String], i: usize) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let flag = &args[i];
    let raw = args
        .get(i + 1)
        .with_context(|| format!("{} requires a value", flag))?;
    raw.parse()
        .with_context(|| format!("Invalid value for {}: {}", flag, raw))
}

fn print_help() {
    println!("Usage: delaymeter [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --delay-ms MS       Simulated target delay, negative leads (default: 0)");
    println!("  -r, --sample-rate RATE  Sample rate in Hz (default: 48000)");
    println!("  -w, --window-ms MS      Analysis window, 200-3000 (default: 1000)");
    println!("  -m, --max-lag-ms MS     Lag search range, 50-1500 (default: 500)");
    println!("  -t, --target NAME       Name of the target stream");
    println!("      --uncorrelated      Feed unrelated audio into the target");
    println!("      --debug             Log per-measurement diagnostics");
    println!("  -c, --config PATH       Config file (default: data dir)");
    println!("      --save-config       Persist the effective settings");
    println!("      --json              Print the result as JSON");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  delaymeter --delay-ms 42.5");
    println!("  delaymeter -d -12 -w 500 -m 100 --target \"Camera 2\"");
}

fn apply_overrides(config: &mut AppConfig, options: &Options) {
    if let Some(rate) = options.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(window) = options.window_ms {
        config.window_ms = window;
    }
    if let Some(lag) = options.max_lag_ms {
        config.max_lag_ms = lag;
    }
    if let Some(target) = &options.target {
        config.target = Some(target.clone());
    }
    config.debug |= options.debug;
}

/// Simulated host stream forwarding target audio into the meter
struct SimulatedSource {
    name: String,
    sink: Mutex<Option<TargetSink>>,
}

impl SimulatedSource {
    fn push(&self, samples: &[f32]) {
        if let Ok(sink) = self.sink.lock() {
            if let Some(sink) = sink.as_ref() {
                sink.write(samples);
            }
        }
    }
}

impl StreamSource for SimulatedSource {
    fn id(&self) -> &str {
        &self.name
    }

    fn connect(&self, sink: TargetSink) -> bool {
        match self.sink.lock() {
            Ok(mut slot) => {
                *slot = Some(sink);
                true
            }
            Err(_) => false,
        }
    }

    fn disconnect(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
    }
}

/// Registry holding the one simulated stream
struct SimulatedRegistry {
    source: Arc<SimulatedSource>,
}

impl SourceRegistry for SimulatedRegistry {
    fn lookup(&self, id: &str) -> Option<Arc<dyn StreamSource>> {
        (id == self.source.name).then(|| Arc::clone(&self.source) as Arc<dyn StreamSource>)
    }
}

/// Simulated reference source whose sync offset gets adjusted
#[derive(Default)]
struct SimulatedParent {
    offset_ns: Mutex<i64>,
}

impl SyncOffsetTarget for SimulatedParent {
    fn set_sync_offset(&self, offset_ns: i64) -> bool {
        match self.offset_ns.lock() {
            Ok(mut current) => {
                *current = offset_ns;
                true
            }
            Err(_) => false,
        }
    }
}

fn run(config: &AppConfig, options: &Options) -> Result<()> {
    let engine_config = config.engine_config();
    let target_name = config
        .target
        .clone()
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());

    let source = Arc::new(SimulatedSource {
        name: target_name.clone(),
        sink: Mutex::new(None),
    });
    let registry = Arc::new(SimulatedRegistry {
        source: Arc::clone(&source),
    });

    let meter = DelayMeter::new(engine_config)
        .context("Failed to create delay meter")?
        .with_registry(registry);
    let results = meter.subscribe();
    meter.connect_target(&target_name);

    let rate = engine_config.sample_rate;
    let len = engine_config
        .window_frames()
        .saturating_mul(2)
        .min(engine_config.buffer_capacity());
    let shift = shift_samples(options.delay_ms, rate, len)?;

    let reference = program_audio(1, rate, len);
    let target = if options.uncorrelated {
        NoiseGenerator::new(0x5eed).with_amplitude(0.3).generate(len)
    } else {
        delayed(&reference, shift)
    };

    info!(
        sample_rate = rate,
        frames = len,
        shift_samples = shift,
        stream = %target_name,
        "Feeding simulated streams"
    );

    let block = ((rate * BLOCK_MS) / 1000).max(1) as usize;
    std::thread::scope(|s| {
        s.spawn(|| {
            for chunk in reference.chunks(block) {
                meter.write_reference(chunk);
            }
        });
        s.spawn(|| {
            for chunk in target.chunks(block) {
                source.push(chunk);
            }
        });
    });

    let result = meter.measure();
    report(&result, options.json)?;

    if result.valid {
        let parent = SimulatedParent::default();
        let applied = meter.apply_as_offset(Some(&parent));
        if !options.json {
            println!("{}", applied.display_text);
            if let Ok(offset_ns) = parent.offset_ns.lock() {
                println!("Sync offset: {} ns", *offset_ns);
            }
        }
    } else if !options.json {
        warn!(reason = %result.display_text, "Measurement not usable");
    }

    let delivered = results.try_iter().count();
    info!(delivered, "Results handed to subscriber");

    Ok(())
}

/// Convert the simulated delay into a sample shift within the fed buffer
fn shift_samples(delay_ms: f64, rate: u32, len: usize) -> Result<i64> {
    let limit_ms = len as f64 * 1000.0 / rate as f64;
    if !delay_ms.is_finite() || delay_ms.abs() > limit_ms {
        bail!(
            "--delay-ms must be within ±{:.1} ms of the simulated buffer, got {}",
            limit_ms,
            delay_ms
        );
    }
    Ok((delay_ms * rate as f64 / 1000.0).round() as i64)
}

fn report(result: &MeasurementResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("[{}] {}", result.time_text(), result.display_text);
    if !result.notes_text.is_empty() {
        println!("{}", result.notes_text);
    }
    Ok(())
}
