use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::api::{ExportFormat, ScriptStatus};

#[derive(Parser)]
#[command(
    name = "scriptgen",
    about = "ScriptGen - Turn YouTube videos into formatted transcripts",
    version,
    long_about = "A CLI client for a hosted transcription service. Submit a public YouTube link, follow the transcription job until it finishes, then print, save or download the resulting script."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./scriptgen.yaml or the user config directory)
    #[arg(long, global = true, env = "SCRIPTGEN_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root URL of the transcription API
    #[arg(long, global = true, env = "SCRIPTGEN_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

impl Cli {
    /// Default tracing filter when `RUST_LOG` is not set.
    ///
    /// Quiet by default so log lines do not interleave with the progress bar.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "scriptgen=debug"
        } else {
            "scriptgen=warn"
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe a YouTube video and show the resulting script
    Generate {
        /// YouTube link (youtube.com/watch?v=..., youtube.com/embed/..., youtu.be/...)
        #[arg(value_name = "URL")]
        url: String,

        /// Save the script to this file instead of printing it
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also download the finished script in this format
        #[arg(long, value_enum, value_name = "FORMAT")]
        download: Option<ExportFormat>,

        /// Milliseconds between status checks (overrides the config file)
        #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,

        /// Stop waiting after this many seconds (overrides the config file)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        max_wait: Option<u64>,
    },

    /// Follow an existing transcription job until it finishes
    Watch {
        /// Task identifier returned when the job was started
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        /// Script identifier, if already known
        #[arg(long, value_name = "SCRIPT_ID")]
        script_id: Option<String>,

        /// Video link the job was started for, shown with the result
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Save the script to this file instead of printing it
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check the status of a transcription job once
    Status {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },

    /// List your scripts, newest first
    List {
        /// Page to show
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Scripts per page
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=100))]
        limit: u32,

        /// Only scripts whose title or link contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Only scripts in this state
        #[arg(long, value_enum)]
        status: Option<ScriptStatus>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a finished script
    Show {
        #[arg(value_name = "SCRIPT_ID")]
        script_id: String,

        /// Save the script to this file instead of printing it
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Download a script file (txt, json or excel)
    Download {
        #[arg(value_name = "SCRIPT_ID")]
        script_id: String,

        /// File format (defaults to the configured export format)
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,

        /// Target file or directory
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Re-queue a failed script and follow the new job
    Regenerate {
        #[arg(value_name = "SCRIPT_ID")]
        script_id: String,
    },

    /// Log in and remember the access token
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "SCRIPTGEN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored access token
    Logout,

    /// Show or locate the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Readable text with a metadata header
    Text,
    /// The full script record as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
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
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "scriptgen",
            "generate",
            "https://youtu.be/abc",
            "--format",
            "json",
            "--download",
            "excel",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate { url, format, download, .. } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(download, Some(ExportFormat::Excel));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_poll_overrides_must_be_positive() {
        for flag in ["--max-wait", "--interval-ms"] {
            let parsed = Cli::try_parse_from(["scriptgen", "generate", "https://youtu.be/abc", flag, "0"]);
            assert!(parsed.is_err(), "{} 0 should be rejected", flag);
        }

        let cli = Cli::try_parse_from(["scriptgen", "generate", "https://youtu.be/abc", "--max-wait", "90"])
            .unwrap();
        match cli.command {
            Commands::Generate { max_wait, .. } => assert_eq!(max_wait, Some(90)),
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::try_parse_from(["scriptgen", "list", "--page", "2", "--status", "failed", "-s", "rust"])
            .unwrap();
        match cli.command {
            Commands::List { page, limit, search, status, .. } => {
                assert_eq!(page, 2);
                assert_eq!(limit, 10);
                assert_eq!(search.as_deref(), Some("rust"));
                assert_eq!(status, Some(ScriptStatus::Failed));
            }
            _ => panic!("expected list"),
        }

        assert!(Cli::try_parse_from(["scriptgen", "list", "--limit", "500"]).is_err());
    }

    #[test]
    fn test_log_filter() {
        let cli = Cli::try_parse_from(["scriptgen", "logout"]).unwrap();
        assert_eq!(cli.log_filter(), "scriptgen=warn");

        let cli = Cli::try_parse_from(["scriptgen", "-v", "logout"]).unwrap();
        assert_eq!(cli.log_filter(), "scriptgen=debug");
    }
}
