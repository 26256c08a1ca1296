use clap::{Parser, ValueEnum};
use natal_core::natal::format_aspects;
use natal_core::{
    init_logging, BirthEvent, ChartConfig, ChartError, LogFormat, LoggingConfig, NatalChartEngine,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "natal_chart", about = "Compute and draw a natal chart", version)]
struct CliArgs {
    /// Birth date, DD.MM.YYYY
    #[arg(long)]
    date: String,

    /// Local birth time, HH:MM
    #[arg(long)]
    time: String,

    /// Birth place, resolved through the geocoder
    #[arg(long)]
    place: String,

    #[arg(long, env = "NATAL_CHART_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, short, default_value = "natal_chart.png", value_name = "PATH")]
    output: PathBuf,

    /// Aspect orb in degrees
    #[arg(long, env = "NATAL_CHART_ORB")]
    orb: Option<f64>,

    /// Image width and height in pixels
    #[arg(long, env = "NATAL_CHART_SIZE")]
    size: Option<u32>,

    /// Font for sign and body glyphs, replacing the bundled one
    #[arg(long, env = "NATAL_CHART_FONT", value_name = "FILE")]
    font: Option<PathBuf>,

    #[arg(long, env = "NATAL_CHART_LOG_FORMAT", value_enum, default_value = "pretty")]
    log_format: LogFormatArg,
}

impl CliArgs {
    fn chart_config(&self) -> Result<ChartConfig, ChartError> {
        let mut config = match &self.config {
            Some(path) => ChartConfig::load(path)?,
            None => ChartConfig::default(),
        };
        if let Some(orb) = self.orb {
            config.aspects.orb_degrees = orb;
        }
        if let Some(size) = self.size {
            config.render.size_px = size;
        }
        if let Some(font) = &self.font {
            config.render.font_path = Some(font.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(args: &CliArgs) -> Result<(), ChartError> {
    let event = BirthEvent::parse(&args.date, &args.time, &args.place)?;
    let config = args.chart_config()?;
    let engine = NatalChartEngine::from_config(&config)?;

    let chart = engine.compute(&event).await?;
    println!("{}", chart.report);
    if !chart.aspects.is_empty() {
        println!("Aspects:");
        print!("{}", format_aspects(&chart.aspects));
    }

    chart.image.write_to(&args.output)?;
    println!("Chart written to {}", args.output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if let Err(err) = init_logging(LoggingConfig {
        format: args.log_format.into(),
        ..LoggingConfig::default()
    }) {
        eprintln!("{}: {}", err.kind(), err);
        return ExitCode::FAILURE;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let ChartError::Render {
                report: Some(report),
                ..
            } = &err
            {
                println!("{report}");
            }
            eprintln!("{}: {}", err.kind(), err);
            ExitCode::FAILURE
        }
    }
}
