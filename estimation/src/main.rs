use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use marg_filter::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Clone, Parser, Debug)]
#[command(version, about, long_about = None)]
struct CliArgs {
    /// Recorded IMU samples (columns: time,ax,ay,az,gx,gy,gz,mx,my,mz)
    #[arg(short, long)]
    file: PathBuf,

    /// Where to write the orientation estimates. Defaults to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Filter configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the fusion gain from the config
    #[arg(short, long)]
    beta: Option<f64>,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Ignore the gyroscope and track with accelerometer/magnetometer
    /// descent steps only
    #[arg(long)]
    no_gyro: bool,
}

fn write_estimates<W: Write>(mut writer: W, estimates: &[Estimate], format: Format) -> Result<()> {
    match format {
        Format::Csv => write_records(writer, estimates)?,
        Format::Json => {
            for estimate in estimates {
                serde_json::to_writer(&mut writer, estimate)?;
                writeln!(writer)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marg_filter=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => FilterConfig::default(),
    };
    if let Some(beta) = args.beta {
        config.beta = beta;
    }
    config.validate()?;
    info!(?config, "Filter configured");

    let samples = read_csv(&args.file)
        .with_context(|| format!("Failed to read samples from {}", args.file.display()))?;

    let mode = if args.no_gyro {
        Mode::AccelMag
    } else {
        Mode::Fusion
    };
    let estimates = replay(&samples, &config, mode).context("Failed to seed the filter")?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_estimates(BufWriter::new(file), &estimates, args.format)?;
        }
        None => write_estimates(io::stdout().lock(), &estimates, args.format)?,
    }

    info!(
        samples = samples.len(),
        estimates = estimates.len(),
        ?mode,
        "Replay finished"
    );
    Ok(())
}
