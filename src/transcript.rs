//! Logging setup and the run transcript.
//!
//! The transcript layer is installed at startup but writes nowhere until a
//! run opens `Transcript.log` in its output folder. Console lines printed
//! through [`echo`] land there too, without colour codes.

use crate::error::Result;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

lazy_static::lazy_static! {
    /// Transcript sink for the current run
    static ref TRANSCRIPT: Mutex<Option<File>> = Mutex::new(None);
}

/// Start (or switch) the transcript file
pub fn open(path: &Path) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    if let Ok(mut sink) = TRANSCRIPT.lock() {
        *sink = Some(file);
    }
    Ok(())
}

pub fn close() {
    if let Ok(mut sink) = TRANSCRIPT.lock() {
        if let Some(file) = sink.as_mut() {
            let _ = file.flush();
        }
        *sink = None;
    }
}

/// Serialises tests that open the process-wide transcript
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Append a console line to the transcript, if one is open
pub fn record(line: &str) {
    let plain = strip_ansi_escapes::strip_str(line);
    let mut writer = TranscriptWriter;
    if let Err(e) = writeln!(writer, "{}", plain) {
        tracing::debug!("Could not write transcript line: {}", e);
    }
}

/// Print to stdout and keep a plain copy in the transcript
pub fn echo(line: impl Display) {
    let line = line.to_string();
    println!("{}", line);
    record(&line);
}

#[derive(Clone, Copy, Default)]
pub struct TranscriptMakeWriter;

pub struct TranscriptWriter;

impl<'a> MakeWriter<'a> for TranscriptMakeWriter {
    type Writer = TranscriptWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TranscriptWriter
    }
}

impl Write for TranscriptWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sink = TRANSCRIPT.lock().map_err(|_| io::Error::from(io::ErrorKind::Other))?;
        if let Some(file) = sink.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut sink = TRANSCRIPT.lock().map_err(|_| io::Error::from(io::ErrorKind::Other))?;
        match sink.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Console output with `--verbose` or a configured `log_level`; `RUST_LOG` wins
/// over both. INFO+ always goes to the transcript.
pub fn init_logging(verbose: bool, configured_level: Option<&str>) {
    let configured_level = configured_level.map(str::trim).filter(|l| !l.is_empty());

    let console = if verbose || configured_level.is_some() {
        let fallback = match configured_level {
            Some(level) if !verbose => format!("offboard365={}", level),
            _ => "offboard365=debug".to_string(),
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter),
        )
    } else {
        None
    };

    let transcript = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(TranscriptMakeWriter)
        .with_filter(EnvFilter::new("offboard365=info"));

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(transcript)
        .try_init();
}
