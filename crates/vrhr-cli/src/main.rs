use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};
use vrhr_lib::{
    config::{PipelineConfig, PipelineOverrides, CSV_WINDOW_STRIDE_S},
    detectors::heart_rate::{analyze_window, run_heart_rate_pipeline, WindowAnalysis},
    detectors::peaks::{peakdet, Peak},
    io::{
        output::{
            parse_predicted_bpm, prediction_records, write_predictions_csv,
            write_predictions_ndjson, PREDICTION_COLUMNS,
        },
        read_motion, text as text_io, MotionFormat,
    },
    metrics::hrv::{nn_summary, remove_outliers_iqr, NnSummary},
    plot::{figure_from_estimates, figure_from_spectrum, Figure, Series},
    signal::{chop, MotionSeries},
};

#[derive(Parser)]
#[command(
    name = "vrhr",
    version,
    about = "Heart rate and SDNN from VR headset motion"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InputFormat {
    Csv,
    #[value(name = "recording-json")]
    RecordingJson,
    #[value(name = "follow-lines")]
    FollowLines,
}

impl From<InputFormat> for MotionFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Csv => MotionFormat::Csv,
            InputFormat::RecordingJson => MotionFormat::RecordingJson,
            InputFormat::FollowLines => MotionFormat::FollowLines,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Csv,
    Ndjson,
}

/// Motion input plus the pipeline parameters that apply to it.
#[derive(Args, Debug)]
struct MotionArgs {
    /// Motion recording (CSV, recording dump JSON or follow-API lines).
    #[arg(long)]
    input: PathBuf,
    /// Input layout; guessed from the extension when omitted.
    #[arg(long, value_enum)]
    format: Option<InputFormat>,
    /// Pipeline config (TOML); flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    window_length: Option<f64>,
    #[arg(long)]
    window_stride: Option<f64>,
    #[arg(long)]
    peak_delta: Option<f64>,
    #[arg(long)]
    band_low: Option<f64>,
    #[arg(long)]
    band_high: Option<f64>,
    #[arg(long)]
    min_samples: Option<usize>,
}

impl MotionArgs {
    fn motion_format(&self) -> MotionFormat {
        self.format
            .map(MotionFormat::from)
            .unwrap_or_else(|| MotionFormat::from_path(&self.input))
    }

    /// Per-format defaults, then the config file, then flags.
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let base = PipelineConfig {
            window_stride_s: default_stride(self.motion_format()),
            ..PipelineConfig::default()
        };
        let file = match &self.config {
            Some(path) => PipelineOverrides::from_toml_path(path)?,
            None => PipelineOverrides::default(),
        };
        let flags = PipelineOverrides {
            window_length_s: self.window_length,
            window_stride_s: self.window_stride,
            peak_delta: self.peak_delta,
            band_low_bpm: self.band_low,
            band_high_bpm: self.band_high,
            min_samples: self.min_samples,
        };
        let cfg = file.merge(flags).apply(base);
        cfg.validate()?;
        Ok(cfg)
    }

    fn load(&self) -> Result<(MotionSeries, PipelineConfig)> {
        let cfg = self.pipeline_config()?;
        let series = read_motion(&self.input, Some(self.motion_format()))?;
        log::info!(
            "{}: {} {:?} samples over {:.1}s",
            self.input.display(),
            series.len(),
            series.kind,
            series.duration_s()
        );
        Ok((series, cfg))
    }
}

/// The batch CSV tool and the follow-API uploader step by 5 s, the recording dump by 2 s.
fn default_stride(format: MotionFormat) -> f64 {
    match format {
        MotionFormat::RecordingJson => PipelineConfig::default().window_stride_s,
        MotionFormat::Csv | MotionFormat::FollowLines => CSV_WINDOW_STRIDE_S,
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Per-window heart rate and batch SDNN for a motion recording
    Estimate {
        #[command(flatten)]
        motion: MotionArgs,
        #[arg(long, value_enum, default_value = "csv")]
        output: OutputFormat,
        /// Write here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Leave out windows without an estimate.
        #[arg(long)]
        skip_zero: bool,
        /// Drop IQR outliers before computing SDNN.
        #[arg(long)]
        drop_outliers: bool,
    },
    /// Spectrum, peaks and BPM of a single window as JSON
    WindowSpectrum {
        #[command(flatten)]
        motion: MotionArgs,
        #[arg(long, default_value_t = 0)]
        index: usize,
        /// Also render the spectrum to a PNG.
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Hysteresis peak detection over a newline-delimited series
    Peaks {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 0.02)]
        delta: f64,
        /// Optional x-axis values (same length as the input).
        #[arg(long)]
        x: Option<PathBuf>,
    },
    /// SDNN of a list of heart rates or a predictions CSV
    Sdnn {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        drop_outliers: bool,
    },
    /// Render heart rate over time to a PNG via plotters
    HrPlot {
        #[command(flatten)]
        motion: MotionArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Generate a synthetic motion recording from a TOML spec
    Simulate {
        #[arg(long)]
        spec: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();
    match cli.command {
        Commands::Estimate {
            motion,
            output,
            out,
            skip_zero,
            drop_outliers,
        } => cmd_estimate(&motion, output, out.as_deref(), skip_zero, drop_outliers)?,
        Commands::WindowSpectrum {
            motion,
            index,
            plot,
        } => cmd_window_spectrum(&motion, index, plot.as_deref())?,
        Commands::Peaks { input, delta, x } => cmd_peaks(input.as_deref(), delta, x.as_deref())?,
        Commands::Sdnn {
            input,
            drop_outliers,
        } => cmd_sdnn(input.as_deref(), drop_outliers)?,
        Commands::HrPlot { motion, out } => cmd_hr_plot(&motion, &out)?,
        Commands::Simulate { spec, out } => cmd_simulate(&spec, &out)?,
    }
    Ok(())
}

fn read_input_text(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn open_output(out: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

fn cmd_estimate(
    motion: &MotionArgs,
    output: OutputFormat,
    out: Option<&Path>,
    skip_zero: bool,
    drop_outliers: bool,
) -> Result<()> {
    let (series, cfg) = motion.load()?;
    let mut result = run_heart_rate_pipeline(&series, &cfg)?;
    if drop_outliers {
        result = result.without_outliers();
    }
    log::info!(
        "{} windows, {} with an estimate",
        result.estimates.len(),
        result.confident().count()
    );
    let records = prediction_records(&result, skip_zero);
    let writer = open_output(out)?;
    match output {
        OutputFormat::Csv => write_predictions_csv(writer, &records)?,
        OutputFormat::Ndjson => write_predictions_ndjson(writer, &records)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct WindowReport {
    index: usize,
    window_count: usize,
    start: String,
    samples: usize,
    sample_rate_hz: f64,
    bpm: f64,
    selected: Option<Peak>,
    maxima: Vec<Peak>,
    /// `[frequency, magnitude]` for the non-negative half.
    spectrum: Vec<[f64; 2]>,
}

fn cmd_window_spectrum(motion: &MotionArgs, index: usize, plot: Option<&Path>) -> Result<()> {
    let (series, cfg) = motion.load()?;
    let velocity = series.to_velocity()?;
    let mut windows = chop(&velocity.samples, cfg.window_stride_s, cfg.window_length_s)?;
    let window_count = windows.window_count();
    let window = windows
        .nth(index)
        .ok_or_else(|| anyhow!("window {index} out of range ({window_count} windows)"))?;
    let analysis: WindowAnalysis = analyze_window(window.samples, &cfg)
        .with_context(|| format!("analysing window {index}"))?;
    if let Some(path) = plot {
        draw_plotters_figure(path, &figure_from_spectrum(&analysis, &cfg.band(), 2048))?;
    }
    let report = WindowReport {
        index,
        window_count,
        start: window
            .timestamp()
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default(),
        samples: window.len(),
        sample_rate_hz: analysis.spectrum.sample_rate_hz,
        bpm: analysis.bpm,
        selected: analysis.selected,
        maxima: analysis
            .peaks
            .maxima
            .iter()
            .copied()
            .filter(|p| p.position >= 0.0)
            .collect(),
        spectrum: analysis.spectrum.positive_half(),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_peaks(input: Option<&Path>, delta: f64, x: Option<&Path>) -> Result<()> {
    let values = text_io::parse_f64_series(&read_input_text(input)?)?;
    let positions = x.map(text_io::read_f64_series).transpose()?;
    let peaks = peakdet(&values, delta, positions.as_deref())?;
    println!("{}", serde_json::to_string(&peaks)?);
    Ok(())
}

#[derive(Serialize)]
struct SdnnReport {
    windows: usize,
    n: usize,
    mean_nn_s: Option<f64>,
    sdnn_s: Option<f64>,
    sdnn_ms: Option<f64>,
}

impl SdnnReport {
    fn new(windows: usize, summary: Option<NnSummary>) -> Self {
        Self {
            windows,
            n: summary.map_or(0, |s| s.n),
            mean_nn_s: summary.map(|s| s.mean_nn_s),
            sdnn_s: summary.map(|s| s.sdnn_s),
            sdnn_ms: summary.map(|s| s.sdnn_ms()),
        }
    }
}

fn cmd_sdnn(input: Option<&Path>, drop_outliers: bool) -> Result<()> {
    let text = read_input_text(input)?;
    let is_predictions = text
        .lines()
        .next()
        .is_some_and(|header| header.contains(PREDICTION_COLUMNS[1]));
    let bpm = if is_predictions {
        parse_predicted_bpm(text.as_bytes())?
    } else {
        text_io::parse_f64_series(&text)?
    };
    let summary = if drop_outliers {
        let confident: Vec<f64> = bpm.iter().copied().filter(|b| *b > 0.0).collect();
        nn_summary(&remove_outliers_iqr(&confident))
    } else {
        nn_summary(&bpm)
    };
    println!("{}", serde_json::to_string(&SdnnReport::new(bpm.len(), summary))?);
    Ok(())
}

fn cmd_hr_plot(motion: &MotionArgs, out: &Path) -> Result<()> {
    let (series, cfg) = motion.load()?;
    let result = run_heart_rate_pipeline(&series, &cfg)?;
    draw_plotters_figure(out, &figure_from_estimates(&result.estimates, 1024))
}

#[derive(Serialize)]
struct SimulationSummary {
    name: String,
    kind: vrhr_lib::MotionKind,
    samples: usize,
    duration_s: f64,
    out: String,
}

fn cmd_simulate(spec_path: &Path, out: &Path) -> Result<()> {
    let spec = vrhr_sim::read_spec(spec_path)?;
    let series = vrhr_sim::simulate(&spec)?;
    vrhr_sim::write_recording(out, &series)?;
    let summary = SimulationSummary {
        name: spec.name,
        kind: series.kind,
        samples: series.len(),
        duration_s: series.duration_s(),
        out: out.display().to_string(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn rgb(color: vrhr_lib::plot::Color) -> plotters::style::RGBColor {
    let (r, g, b) = color.rgb();
    plotters::style::RGBColor(r, g, b)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    use plotters::prelude::*;

    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let (x_min, x_max, y_min, y_max) = fig.bounds();
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let style = rgb(line.style.color).stroke_width(line.style.width.round() as u32);
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    style,
                ))?;
            }
            Series::Points(points) => {
                let style = rgb(points.color).filled();
                chart.draw_series(
                    points
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), points.radius, style)),
                )?;
            }
            Series::VLine { x, style, .. } => {
                let stroke = rgb(style.color).stroke_width(style.width.round().max(1.0) as u32);
                chart.draw_series(LineSeries::new([(*x, y_min), (*x, y_max)], stroke))?;
            }
        }
    }
    root.present()?;
    Ok(())
}
