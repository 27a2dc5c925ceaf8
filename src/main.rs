// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use narravid::app_config::{self, Config, ServiceProvider};
use narravid::app_controller::Controller;

/// CLI Wrapper for ServiceProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliServiceProvider {
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "localai")]
    LocalAI,
}

impl From<CliServiceProvider> for ServiceProvider {
    fn from(cli_provider: CliServiceProvider) -> Self {
        match cli_provider {
            CliServiceProvider::OpenAI => ServiceProvider::OpenAI,
            CliServiceProvider::LocalAI => ServiceProvider::LocalAI,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every command that loads the configuration
#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Speech and recognition provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliServiceProvider>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Parser, Debug)]
struct NarrateArgs {
    /// Document to narrate (.pdf, .txt or .md)
    #[arg(value_name = "DOCUMENT")]
    document: PathBuf,

    /// Video to put the narration on
    #[arg(value_name = "VIDEO")]
    video: PathBuf,

    /// Name of the output video (without extension)
    #[arg(short, long)]
    output_name: String,

    /// Directory the output video is written to
    #[arg(short = 'd', long, default_value = ".")]
    output_dir: PathBuf,

    /// Narration language code (e.g., 'en', 'es', 'fr')
    #[arg(short = 'L', long)]
    language: Option<String>,

    /// Force overwrite of an existing output file
    #[arg(short, long)]
    force_overwrite: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Narrate a document over a video with burned-in or soft captions
    Narrate(NarrateArgs),

    /// Check that the speech services and ffmpeg are reachable
    Check(ConfigArgs),

    /// Generate shell completions for narravid
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// narravid - narrated, captioned videos from documents
#[derive(Parser, Debug)]
#[command(name = "narravid")]
#[command(version)]
#[command(about = "Turn a document into a narrated, captioned video")]
#[command(long_about = "narravid extracts the text of a document, synthesizes a narration, derives
captions from the narration and muxes both onto a video.

EXAMPLES:
    narravid narrate slides.pdf intro.mp4 -o lesson1           # Burned captions, English
    narravid narrate notes.md clip.mkv -o demo -L fr -d out/    # French narration into out/
    narravid narrate doc.txt clip.mp4 -o demo -p localai -f     # Local server, overwrite
    narravid check                                              # Test services and ffmpeg
    narravid completions bash > narravid.bash                   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    openai  - OpenAI API (requires API key)
    localai - OpenAI-compatible local server (default: http://localhost:8080/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji and ANSI colour for log level
    fn decoration_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, colour) = Self::decoration_for_level(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                colour, now, emoji, record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize at trace so set_max_level alone decides what gets through
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "narravid", &mut std::io::stdout());
            Ok(())
        }
        Commands::Check(args) => {
            let config = load_config(&args, None)?;
            let controller = Controller::with_config(config)?;
            controller.check().await
        }
        Commands::Narrate(args) => run_narrate(args).await,
    }
}

async fn run_narrate(options: NarrateArgs) -> Result<()> {
    let config = load_config(&options.config, options.language.as_deref())?;
    let controller = Controller::with_config(config)?;

    controller
        .run(
            options.document,
            options.video,
            &options.output_name,
            options.output_dir,
            options.force_overwrite,
        )
        .await?;
    Ok(())
}

// Load or create the configuration, apply CLI overrides, validate, set the log level
fn load_config(options: &ConfigArgs, language: Option<&str>) -> Result<Config> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let config_path = Path::new(&options.config_path);
    let mut config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path.display());
        let config = Config::default();
        config
            .save(config_path)
            .context(format!("Failed to write default config to file: {}", config_path.display()))?;
        config
    };

    // Override config with CLI options if provided
    if let Some(provider) = &options.provider {
        let provider: ServiceProvider = provider.clone().into();
        config.speech.provider = provider;
        config.recognition.provider = provider;
    }
    if let Some(language) = language {
        config.language = language.to_string();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;

    // If log level was not set via command line, update it from config now
    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }
    info!("Narration language: {}", config.language_tag()?.name());

    Ok(config)
}
