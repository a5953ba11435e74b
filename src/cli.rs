//! Command-line interface for voxswitch
//!
//! Provides argument parsing using clap derive macros.

use crate::pipeline::types::Direction;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Voice-operated light switch for serial PDM microphones
#[derive(Parser, Debug)]
#[command(name = "voxswitch", version, about = "Voice-operated light switch for serial PDM microphones")]
pub struct Cli {
    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the capture service until interrupted
    Run,

    /// List serial ports and mark those matching the port filter
    Ports,

    /// Record raw audio from the microphone to a WAV file
    Record {
        /// Duration to record. Examples: 5, 2.5, 90s, 1m30s
        #[arg(long, short = 's', value_name = "DURATION", default_value = "5", value_parser = parse_seconds)]
        seconds: f32,

        /// Output WAV file
        #[arg(long, short = 'o', value_name = "FILE", default_value = "recording.wav")]
        output: PathBuf,

        /// Serial port to record from (default: first matching port)
        #[arg(long, short = 'p', value_name = "PORT")]
        port: Option<String>,
    },

    /// Transcribe a WAV file and show the command it would trigger
    Transcribe {
        /// 16-bit PCM WAV file
        file: PathBuf,
    },

    /// Publish a single command to the switch
    Send {
        /// Switch direction
        direction: SwitchArg,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Direction argument for `send`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchArg {
    On,
    Off,
}

impl From<SwitchArg> for Direction {
    fn from(arg: SwitchArg) -> Self {
        match arg {
            SwitchArg::On => Direction::On,
            SwitchArg::Off => Direction::Off,
        }
    }
}

/// Parse a recording duration into seconds.
///
/// Bare numbers are seconds (fractions allowed); anything else goes through
/// `humantime` (`90s`, `1m30s`).
fn parse_seconds(s: &str) -> Result<f32, String> {
    let s = s.trim();
    let secs = match s.parse::<f32>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(s)
            .map(|d| d.as_secs_f32())
            .map_err(|e| e.to_string())?,
    };
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(format!("duration must be positive, got '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["voxswitch"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["voxswitch", "-vv", "run"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Some(Commands::Run)));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["voxswitch", "ports", "--config", "/tmp/v.toml", "-q"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Ports)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/v.toml")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_record_defaults() {
        let cli = Cli::try_parse_from(["voxswitch", "record"]).unwrap();
        match cli.command {
            Some(Commands::Record { seconds, output, port }) => {
                assert_eq!(seconds, 5.0);
                assert_eq!(output, PathBuf::from("recording.wav"));
                assert!(port.is_none());
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_record_with_humantime_duration() {
        let cli = Cli::try_parse_from([
            "voxswitch", "record", "-s", "1m30s", "-o", "mic.wav", "--port", "/dev/ttyACM0",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Record { seconds, output, port }) => {
                assert_eq!(seconds, 90.0);
                assert_eq!(output, PathBuf::from("mic.wav"));
                assert_eq!(port.as_deref(), Some("/dev/ttyACM0"));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("2.5"), Ok(2.5));
        assert_eq!(parse_seconds(" 90s "), Ok(90.0));
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn test_parse_send_direction() {
        let cli = Cli::try_parse_from(["voxswitch", "send", "off"]).unwrap();
        match cli.command {
            Some(Commands::Send { direction }) => assert_eq!(Direction::from(direction), Direction::Off),
            other => panic!("expected send, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["voxswitch", "send", "dim"]).is_err());
    }

    #[test]
    fn test_parse_config_and_transcribe() {
        let cli = Cli::try_parse_from(["voxswitch", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config { action: ConfigAction::Show })
        ));

        let cli = Cli::try_parse_from(["voxswitch", "transcribe", "clip.wav"]).unwrap();
        match cli.command {
            Some(Commands::Transcribe { file }) => assert_eq!(file, PathBuf::from("clip.wav")),
            other => panic!("expected transcribe, got {other:?}"),
        }
    }
}
