use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use moodcam::error::EventBusError;
use moodcam::{
    AcquisitionWorkflow, Command, EventBus, EventFilter, ImageBlob, MoodcamConfig, Severity,
    WorkflowEvent,
};

#[derive(Parser, Debug)]
#[command(name = "moodcam")]
#[command(about = "Capture or upload a face image and classify its expression")]
#[command(version)]
#[command(long_about = "Interactive client for a facial expression prediction service. \
Images come from a file or from the camera, are validated locally, previewed, and sent to \
the prediction endpoint on request. Commands are read line by line from stdin.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "moodcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file
    #[arg(long, value_name = "PATH", help = "Write logs to PATH, rotated daily")]
    log_file: Option<String>,

    /// Override the prediction endpoint
    #[arg(long, value_name = "URL", help = "Prediction endpoint URL")]
    endpoint: Option<String>,
}

const HELP: &str =
    "commands: upload <path> | camera | capture | cancel | analyze | reset | status | quit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting Moodcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match MoodcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(endpoint) = &args.endpoint {
        config.analysis.endpoint = endpoint.clone();
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let event_bus = if args.debug {
        EventBus::with_debug_logging(config.system.event_bus_capacity)
    } else {
        EventBus::new(config.system.event_bus_capacity)
    };
    spawn_console_printer(&event_bus);

    let mut workflow = AcquisitionWorkflow::from_config(&config, event_bus)
        .context("Failed to create acquisition workflow")?;

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !run_command(&mut workflow, line.trim()).await {
                    break;
                }
            }
            _ = workflow.next_completion() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    workflow.shutdown().await;
    info!("Moodcam exited");
    Ok(())
}

/// Apply one console command; false means quit
async fn run_command(workflow: &mut AcquisitionWorkflow, line: &str) -> bool {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

    let command = match verb {
        "" => return true,
        "quit" | "exit" => return false,
        "status" => {
            print_status(workflow);
            return true;
        }
        "upload" => {
            let path = rest.trim();
            if path.is_empty() {
                println!("usage: upload <path>");
                return true;
            }
            match ImageBlob::from_path(path).await {
                Ok(blob) => Command::SelectFile(blob),
                Err(e) => {
                    warn!("Cannot read {}: {}", path, e);
                    println!("Cannot read {}: {}", path, e);
                    return true;
                }
            }
        }
        "camera" => Command::StartCamera,
        "capture" => Command::Capture,
        "cancel" => Command::CancelCamera,
        "analyze" => Command::Analyze,
        "reset" => Command::Reset,
        _ => {
            println!("{}", HELP);
            return true;
        }
    };

    workflow.handle(command).await;
    true
}

fn print_status(workflow: &AcquisitionWorkflow) {
    println!("state: {}", workflow.phase());
    if let Some(stream) = workflow.camera_stream() {
        let (w, h) = stream.resolution();
        println!("camera: stream {} ({}x{})", stream.id(), w, h);
    }
    if let Some(image) = workflow.current_image() {
        println!(
            "image: {} ({}, {} bytes)",
            image.file_name(),
            image.media_type(),
            image.size()
        );
    }
    if let Some(preview) = workflow.preview() {
        println!("preview: {}", preview.url());
    }
    if let Some(result) = workflow.result() {
        println!(
            "result: {} {}%{}",
            result.expression(),
            result.confidence_percent(),
            if result.is_placeholder() { " (placeholder)" } else { "" }
        );
    }
    if let Some(e) = workflow.state().last_error() {
        println!("last error: {}", e);
    }
}

fn spawn_console_printer(event_bus: &EventBus) {
    let mut receiver = event_bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["notice", "prediction_ready", "state_changed"]),
        "console",
    );

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => print_event(&event),
                Err(EventBusError::Lagged { .. }) => continue,
                Err(_) => break,
            }
        }
    });
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::Notice { notice, .. } => {
            let marker = match notice.severity() {
                Severity::Info => "✓",
                Severity::Destructive => "✗",
            };
            println!("{} {}: {}", marker, notice.title(), notice.description());
        }
        WorkflowEvent::PredictionReady {
            result, degraded, ..
        } => {
            println!(
                "Result: {} {}%{}",
                result.expression(),
                result.confidence_percent(),
                if *degraded { " (placeholder)" } else { "" }
            );
        }
        WorkflowEvent::StateChanged { to, .. } => println!("-> {}", to),
        _ => {}
    }
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("moodcam={}", log_level)));

    // console output shares the terminal with the prompt, so logs go to stderr
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_writer(std::io::stderr).boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let prefix = path
                .file_name()
                .context("--log-file must name a file")?;

            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Moodcam Configuration File");
    println!("# Every option with its default value. Environment variables override");
    println!("# these, e.g. MOODCAM_ANALYSIS__ENDPOINT=http://host:8000/predict/");
    println!();
    println!("{}", toml::to_string_pretty(&MoodcamConfig::default())?);
    Ok(())
}
