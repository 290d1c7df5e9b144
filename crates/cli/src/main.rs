use anyhow::{Context, Result};
use chartbands_core::{Bar, BarSeries, OutputSeries, Timeframe};
use chartbands_data::writer::{self, Column};
use chartbands_data::{csv_loader, resample, HistoryProvider};
use chartbands_engine::replay::bar_to_ticks;
use chartbands_engine::{registry, ChartConfig, ChartHost};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "chartbands")]
#[command(about = "Run ATR, RSI band and VWAP band indicators over CSV bar files")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the configured indicators over a bar file
    Run {
        /// Path to CSV bar file
        #[arg(short, long)]
        data: PathBuf,

        /// Path to TOML chart config
        #[arg(short, long, env = "CHARTBANDS_CONFIG")]
        config: PathBuf,

        /// Override the chart timeframe from the config (e.g. "5m", "1h")
        #[arg(short, long)]
        timeframe: Option<Timeframe>,

        /// Write output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,

        /// Feed the last N bars as live ticks instead of history
        #[arg(long, default_value = "0")]
        live_bars: usize,

        /// CSV file of trade prints to feed after the bars
        #[arg(long)]
        ticks: Option<PathBuf>,
    },

    /// List available indicators
    Indicators,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            data,
            config,
            timeframe,
            output,
            format,
            live_bars,
            ticks,
        } => run(RunArgs {
            data,
            config,
            timeframe,
            output,
            format,
            live_bars,
            ticks,
        })?,
        Commands::Indicators => {
            println!("Available indicators:");
            for (kind, description) in registry::AVAILABLE {
                println!("  {kind:<10} - {description}");
            }
        }
    }

    Ok(())
}

struct RunArgs {
    data: PathBuf,
    config: PathBuf,
    timeframe: Option<Timeframe>,
    output: Option<PathBuf>,
    format: Format,
    live_bars: usize,
    ticks: Option<PathBuf>,
}

fn run(args: RunArgs) -> Result<()> {
    let RunArgs {
        data: data_path,
        config: config_path,
        timeframe,
        output,
        format,
        live_bars,
        ticks,
    } = args;
    let mut config = ChartConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(tf) = timeframe {
        config.chart.timeframe = tf;
        config.validate()?;
    }
    let chart_tf = config.chart.timeframe;

    tracing::info!(
        data = %data_path.display(),
        timeframe = %chart_tf,
        indicators = config.indicators.len(),
        "Starting run"
    );

    let raw = csv_loader::load_bars_from_csv(&data_path)?;
    let bars = resample::resample(&raw, chart_tf);
    tracing::info!(raw = raw.len(), bars = bars.len(), "Loaded bar data");
    if bars.is_empty() {
        anyhow::bail!("No bars loaded from {}", data_path.display());
    }

    // Secondary series only see the history; later coarse bars are built live.
    let split = bars.len().saturating_sub(live_bars);
    let provider = HistoryProvider::new(BarSeries::from_bars(chart_tf, bars[..split].to_vec()));
    let mut host = ChartHost::new(chart_tf, Box::new(provider));

    host.load_history(bars[..split].iter().copied());
    for indicator in config.indicators {
        host.attach(indicator)?;
    }
    for bar in &bars[split..] {
        for tick in bar_to_ticks(bar) {
            host.on_tick(tick);
        }
    }
    if let Some(path) = ticks {
        let prints = csv_loader::load_ticks_from_csv(&path)
            .with_context(|| format!("loading ticks from {}", path.display()))?;
        let applied = prints
            .into_iter()
            .filter_map(|tick| host.on_tick(tick))
            .count();
        tracing::info!(applied, bars = host.bars().len(), "Applied live ticks");
    }

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        Format::Table => print_table(&mut out, &host)?,
        Format::Csv => {
            let headers: Vec<(String, &OutputSeries)> = host
                .indicators()
                .flat_map(|(_, ind)| {
                    let short = ind.short_name();
                    ind.lines()
                        .iter()
                        .map(move |line| (format!("{short} {}", line.name()), line))
                })
                .collect();
            let columns: Vec<Column<'_>> = headers
                .iter()
                .map(|(header, series)| Column {
                    header: header.as_str(),
                    series: *series,
                })
                .collect();
            writer::write_csv(&mut out, host.bars(), &columns)?;
        }
        Format::Json => {
            let report = Report {
                timeframe: chart_tf.to_string(),
                bars: host.bars().bars(),
                indicators: host
                    .indicators()
                    .map(|(_, ind)| IndicatorReport {
                        name: ind.short_name(),
                        lines: ind.lines(),
                    })
                    .collect(),
            };
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
    }
    out.flush()?;

    if let Some(path) = output {
        tracing::info!(output = %path.display(), "Wrote results");
    }
    Ok(())
}

#[derive(Serialize)]
struct Report<'a> {
    timeframe: String,
    bars: &'a [Bar],
    indicators: Vec<IndicatorReport<'a>>,
}

#[derive(Serialize)]
struct IndicatorReport<'a> {
    name: String,
    lines: &'a [OutputSeries],
}

fn print_table(out: &mut dyn Write, host: &ChartHost) -> Result<()> {
    let sep = "=".repeat(60);
    let bars = host.bars();
    writeln!(out, "\n{sep}")?;
    writeln!(out, "  INDICATORS ({} bars, {})", bars.len(), host.timeframe())?;
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        writeln!(
            out,
            "  Period:  {} → {}",
            first.timestamp.format("%Y-%m-%d %H:%M"),
            last.timestamp.format("%Y-%m-%d %H:%M")
        )?;
        writeln!(out, "  Close:   {:.4}", last.close)?;
    }
    writeln!(out, "{sep}")?;
    for (_, indicator) in host.indicators() {
        writeln!(out, "  {}", indicator.short_name())?;
        for line in indicator.lines() {
            match line.get(0) {
                Some(value) => writeln!(out, "    {:<14} {:.4}", line.name(), value)?,
                None => writeln!(out, "    {:<14} -", line.name())?,
            }
        }
    }
    writeln!(out, "{sep}\n")?;
    Ok(())
}
