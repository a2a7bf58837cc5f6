use std::fmt::Write;

use jiff::{Zoned, tz::TimeZone};
use log::{Level, Record};
use logforth::{
    append::Stderr,
    diagnostic::Diagnostic,
    layout::{JsonLayout, Layout},
};

use crate::args::{Args, LogStyle};

/// `<UTC timestamp> <level>  <message>`, the level optionally wrapped in ANSI colors.
#[derive(Debug, Clone)]
struct TextLayout {
    colored: bool,
}

fn ansi_color(level: Level) -> u8 {
    match level {
        Level::Error => 31,
        Level::Warn => 33,
        Level::Info => 32,
        Level::Debug => 34,
        Level::Trace => 35,
    }
}

impl Layout for TextLayout {
    fn format(&self, record: &Record<'_>, _diagnostics: &[Box<dyn Diagnostic>]) -> anyhow::Result<Vec<u8>> {
        let now = Zoned::now().with_time_zone(TimeZone::UTC);
        let level = record.level();

        let mut line = format!("{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"));

        if self.colored {
            write!(line, "\x1b[{}m{level:>5}\x1b[0m", ansi_color(level))?;
        } else {
            write!(line, "{level:>5}")?;
        }

        write!(line, "  {}", record.args())?;

        Ok(line.into_bytes())
    }
}

/// Logs go to stderr, stdout carries the admission decisions.
pub(super) fn init(args: &Args) -> anyhow::Result<()> {
    let filter = args.log_level.env_filter()?;

    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(filter);

            match args.log_style {
                LogStyle::Color => d.append(Stderr::default().with_layout(TextLayout { colored: true })),
                LogStyle::Text => d.append(Stderr::default().with_layout(TextLayout { colored: false })),
                LogStyle::Json => d.append(Stderr::default().with_layout(JsonLayout::default())),
            }
        })
        .apply();

    Ok(())
}
