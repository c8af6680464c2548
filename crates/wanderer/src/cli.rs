//! Command-line interface for the Wanderer service.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments overriding the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    pub static_data: Option<PathBuf>,
    pub feed_url: Option<String>,
    /// Disable the kill feed regardless of configuration
    pub no_kills: bool,
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

fn command() -> Command {
    Command::new("Wanderer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Collaborative wormhole mapper with live kill feed")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("wanderer.toml"),
        )
        .arg(
            Arg::new("static-data")
                .short('s')
                .long("static-data")
                .value_name("FILE")
                .help("JSON export of solar systems"),
        )
        .arg(
            Arg::new("feed-url")
                .short('f')
                .long("feed-url")
                .value_name("URL")
                .help("Kill feed websocket URL (enables the kill feed)"),
        )
        .arg(
            Arg::new("no-kills")
                .long("no-kills")
                .help("Disable the kill feed")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}

impl CliArgs {
    /// Parses the process arguments; exits with usage on error.
    pub fn parse() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("wanderer.toml")),
            static_data: matches.get_one::<String>("static-data").map(PathBuf::from),
            feed_url: matches.get_one::<String>("feed-url").cloned(),
            no_kills: matches.get_flag("no-kills"),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
