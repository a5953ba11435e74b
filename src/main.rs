use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use voxswitch::app;
use voxswitch::cli::{Cli, Commands, ConfigAction};
use voxswitch::config::Config;
use voxswitch::pipeline::types::Direction;
use voxswitch::supervisor::StopSignal;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    if let Err(e) = run(cli).await {
        if std::io::stderr().is_terminal() {
            eprintln!("{} {:#}", "error:".red().bold(), e);
        } else {
            eprintln!("error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None | Some(Commands::Run) => {
            let config = load_config(cli.config.as_deref())?;
            app::run_service(config).await?;
        }
        Some(Commands::Ports) => {
            let config = load_config(cli.config.as_deref())?;
            print_ports(&config)?;
        }
        Some(Commands::Record { seconds, output, port }) => {
            let config = load_config(cli.config.as_deref())?;
            record(config, seconds, output, port).await?;
        }
        Some(Commands::Transcribe { file }) => {
            let config = load_config(cli.config.as_deref())?;
            let path = file.clone();
            let outcome = tokio::task::spawn_blocking(move || app::transcribe_with_config(&config, &path))
                .await?
                .with_context(|| format!("transcribing {}", file.display()))?;
            print_transcription(outcome.transcript.as_deref(), outcome.direction);
        }
        Some(Commands::Send { direction }) => {
            let config = load_config(cli.config.as_deref())?;
            let direction = Direction::from(direction);
            let topic = config.mqtt.command_topic();
            tokio::task::spawn_blocking(move || app::send_with_config(&config, direction))
                .await?
                .context("sending command")?;
            if !cli.quiet {
                println!("Sent '{}' to {}", direction, topic);
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "voxswitch", &mut std::io::stdout());
        }
    }
    Ok(())
}

/// Default level is info; `-v` raises to debug, `-vv` to trace, `-q` lowers to
/// warn. `RUST_LOG` wins when set.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(custom: Option<&Path>) -> Result<PathBuf> {
    custom
        .map(Path::to_path_buf)
        .or_else(Config::default_path)
        .context("could not determine configuration directory")
}

fn load_config(custom: Option<&Path>) -> Result<Config> {
    let path = config_path(custom)?;
    let config = Config::load_or_default(&path)
        .with_context(|| format!("loading {}", path.display()))?
        .with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn handle_config_command(action: ConfigAction, custom: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path(custom)?.display());
        }
    }
    Ok(())
}

fn print_ports(config: &Config) -> Result<()> {
    let ports = app::list_ports(config)?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    let color = std::io::stdout().is_terminal();
    for port in ports {
        match (port.matches, color) {
            (true, true) => println!("{} {}", "*".green().bold(), port.name.green()),
            (true, false) => println!("* {}", port.name),
            (false, true) => println!("  {}", port.name.dimmed()),
            (false, false) => println!("  {}", port.name),
        }
    }
    Ok(())
}

async fn record(config: Config, seconds: f32, output: PathBuf, port: Option<String>) -> Result<()> {
    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.request_stop();
        }
    });

    let target = output.clone();
    let recording = tokio::task::spawn_blocking(move || {
        app::record_to_wav(&config, seconds, &target, port.as_deref(), stop)
    })
    .await?
    .with_context(|| format!("recording to {}", output.display()))?;

    let note = if recording.interrupted { " (interrupted)" } else { "" };
    println!(
        "Recorded {} samples from {} to {}{}",
        recording.samples.len(),
        recording.endpoint,
        output.display(),
        note
    );
    Ok(())
}

fn print_transcription(transcript: Option<&str>, direction: Option<Direction>) {
    let color = std::io::stdout().is_terminal();
    match transcript {
        Some(text) if color => println!("{} {}", "Transcript:".bold(), text),
        Some(text) => println!("Transcript: {}", text),
        None => println!("Transcript: (no speech recognized)"),
    }
    match (direction, color) {
        (Some(direction), true) => println!("{} {}", "Command:".bold(), direction.payload().cyan()),
        (Some(direction), false) => println!("Command: {}", direction),
        (None, _) => println!("Command: none"),
    }
}
