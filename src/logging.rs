//! Console and rotating-file logging.
//!
//! Every record goes to stderr as-is and to a daily log file with the ANSI
//! color codes removed.

use crate::config::LoggingConfig;
use crate::error::{BotError, Result};
use colored::*;
use env_logger::WriteStyle;
use log::Level;
use std::io::{self, IsTerminal, Write};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Writes each buffer to the console and a color-free copy to a second sink.
pub struct TeeWriter<C: Write, F: Write> {
    console: C,
    file: F,
}

impl<C: Write, F: Write> TeeWriter<C, F> {
    pub fn new(console: C, file: F) -> Self {
        Self { console, file }
    }
}

impl<C: Write, F: Write> Write for TeeWriter<C, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        // the log file must never take the console down with it
        let _ = self.file.write_all(&strip_ansi(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.file.flush();
        self.console.flush()
    }
}

/// Remove `ESC [ ... <letter>` sequences.
pub fn strip_ansi(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == 0x1b && input.get(i + 1) == Some(&b'[') {
            i += 2;
            while i < input.len() && !input[i].is_ascii_alphabetic() {
                i += 1;
            }
            i += 1;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

fn level_label(level: Level) -> ColoredString {
    let label = format!("{:<8}", level);
    match level {
        Level::Error => label.red().bold(),
        Level::Warn => label.yellow(),
        Level::Info => label.green(),
        Level::Debug => label.blue(),
        Level::Trace => label.dimmed(),
    }
}

/// Logger writing `HH:MM:SS | LEVEL | message` lines to `sink`.
///
/// The style is fixed up front because a piped target would otherwise have
/// its color codes stripped before they reach the console.
fn builder<W: Write + Send + 'static>(sink: W, style: WriteStyle) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {} | {}",
                chrono::Local::now().format("%H:%M:%S").to_string().green(),
                level_label(record.level()),
                record.args()
            )
        })
        .write_style(style)
        .target(env_logger::Target::Pipe(Box::new(sink)));
    builder
}

/// Install the global logger. `RUST_LOG` overrides the default `info` filter.
pub fn init(config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.file_prefix.as_str())
        .filename_suffix("log")
        .max_log_files(config.max_files.max(1))
        .build(&config.directory)
        .map_err(|e| BotError::Config(format!("Cannot open log directory {}: {}", config.directory, e)))?;

    let style = if io::stderr().is_terminal() {
        WriteStyle::Always
    } else {
        WriteStyle::Never
    };

    builder(TeeWriter::new(io::stderr(), appender), style)
        .try_init()
        .map_err(|e| BotError::Other(format!("Logger already initialised: {}", e)))
}
