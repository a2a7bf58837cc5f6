use std::{borrow::Cow, fmt, io::IsTerminal, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "Turnstile", version, long_about = concat!("Turnstile v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, env = "TURNSTILE_CONFIG_PATH", default_value = "./turnstile.toml")]
    pub config: PathBuf,
    /// Set the logging level, this applies to all log events.
    #[arg(long = "log", env = "TURNSTILE_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "TURNSTILE_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
    /// Client keys to check, one admission each. Read from stdin, one per line, when omitted.
    pub keys: Vec<String>,
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        let config = if self.config.exists() {
            Config::load(&self.config)?
        } else {
            Config::default()
        };

        Ok(config)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colorized text, used as the default when stderr is a terminal
    Color,
    /// Plain text
    Text,
    /// JSON objects
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stderr().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogStyle::Color => "color",
            LogStyle::Text => "text",
            LogStyle::Json => "json",
        })
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogLevel {
    /// Disable logging
    Off,
    /// Only errors
    Error,
    /// Errors and warnings, including limiter backend failures
    #[default]
    Warn,
    /// Also limiter initialization
    Info,
    /// Also rejections and bucket sweeps
    Debug,
    /// Also every admission
    Trace,
}

impl LogLevel {
    fn filter_directives(self) -> Cow<'static, str> {
        match self {
            LogLevel::Off => Cow::Borrowed("off"),
            // Other crates stay at 'warn', workspace crates use the selected level.
            level => Cow::Owned(format!("warn,turnstile={level},config={level},rate_limit={level}")),
        }
    }

    pub fn env_filter(self) -> anyhow::Result<EnvFilter> {
        let directives = self.filter_directives();

        EnvFilter::from_str(&directives).map_err(|e| anyhow::anyhow!("invalid log filter '{directives}': {e:?}"))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["turnstile"]).unwrap();

        assert_eq!(args.config, PathBuf::from("./turnstile.toml"));
        assert_eq!(args.log_level, LogLevel::Warn);
        assert!(args.keys.is_empty());
    }

    #[test]
    fn keys_and_flags() {
        let args = Args::try_parse_from([
            "turnstile",
            "-c",
            "/etc/turnstile.toml",
            "--log",
            "debug",
            "--log-style",
            "json",
            "192.168.1.1",
            "::1",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/turnstile.toml"));
        assert_eq!(args.log_level, LogLevel::Debug);
        assert_eq!(args.log_style, LogStyle::Json);
        assert_eq!(args.keys, ["192.168.1.1", "::1"]);
    }

    #[test]
    fn defaults_render_as_their_flag_values() {
        assert_eq!(LogLevel::default().to_string(), "warn");
        assert_eq!(LogStyle::Json.to_string(), "json");
    }

    #[test]
    fn unknown_log_style_is_rejected() {
        assert!(Args::try_parse_from(["turnstile", "--log-style", "xml"]).is_err());
    }

    #[test]
    fn filter_directives_cover_workspace_crates() {
        assert_eq!(LogLevel::Off.filter_directives(), "off");
        assert_eq!(
            LogLevel::Debug.filter_directives(),
            "warn,turnstile=debug,config=debug,rate_limit=debug"
        );
        assert!(LogLevel::Trace.env_filter().is_ok());
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let args = Args::try_parse_from(["turnstile", "-c", "/nonexistent/turnstile.toml"]).unwrap();
        let config = args.config().unwrap();

        assert_eq!(config.rate_limit.kind, "");
    }
}
