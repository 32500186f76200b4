//! Command-line interface

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use stride_core::{ConfigError, PipelineConfig};

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Parsed command line
#[derive(Debug, Clone)]
pub struct Cli {
    /// Optional TOML config file
    pub config: Option<PathBuf>,
    /// Listen address
    pub bind: SocketAddr,
    /// Log filter overriding `RUST_LOG`
    pub log_level: Option<String>,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Keep artifacts in memory instead of `data_dir`
    pub memory_store: bool,
}

/// Clap command definition
#[must_use]
pub fn command() -> Command {
    Command::new("stride-server")
        .version(crate::VERSION)
        .about("STRIDE threat modeling from architecture diagrams")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML config file"),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .default_value(DEFAULT_BIND)
                .value_parser(value_parser!(SocketAddr))
                .help("Address to listen on"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Log filter, e.g. `info` or `stride_core=debug`"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("memory-store")
                .long("memory-store")
                .action(ArgAction::SetTrue)
                .help("Keep artifacts in memory only"),
        )
}

impl Cli {
    /// Parse the process arguments
    #[must_use]
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parse an explicit argument list
    ///
    /// # Errors
    /// Returns the clap error for unknown or malformed arguments.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        command().try_get_matches_from(args).map(|m| Self::from_matches(&m))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let bind = matches
            .get_one::<SocketAddr>("bind")
            .copied()
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));
        Self {
            config: matches.get_one::<PathBuf>("config").cloned(),
            bind,
            log_level: matches.get_one::<String>("log-level").cloned(),
            log_json: matches.get_flag("log-json"),
            memory_store: matches.get_flag("memory-store"),
        }
    }

    /// Load the file (or defaults), overlay the environment, validate
    ///
    /// # Errors
    /// Any [`ConfigError`] from loading or validation.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }
}
