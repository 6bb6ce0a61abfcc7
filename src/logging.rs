//! Application log setup: `env_logger` writing to a per-day file and stdout.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use log::{LevelFilter, SetLoggerError, info};
use thiserror::Error;

use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("could not prepare log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("a logger is already installed")]
    Install(#[from] SetLoggerError),
}

/// Appends to `<dir>/<YYYY-MM-DD>.log`, switching files on the first write
/// after the date changes, and copies every write to stdout.
pub struct DailyFileWriter {
    dir: PathBuf,
    date: NaiveDate,
    file: File,
}

impl DailyFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let date = Local::now().date_naive();
        let file = open_for(&dir, date)?;
        Ok(DailyFileWriter { dir, date, file })
    }

    /// File currently being written.
    pub fn current_path(&self) -> PathBuf {
        file_for(&self.dir, self.date)
    }

    fn rotate_if_needed(&mut self) -> io::Result<()> {
        let today = Local::now().date_naive();
        if today != self.date {
            self.file = open_for(&self.dir, today)?;
            self.date = today;
        }
        Ok(())
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rotate_if_needed()?;
        self.file.write_all(buf)?;
        io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stdout().flush()
    }
}

fn file_for(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.log", date.format("%Y-%m-%d")))
}

fn open_for(dir: &Path, date: NaiveDate) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_for(dir, date))
}

/// Default level for an environment. `RUST_LOG` still takes precedence.
pub fn default_level(settings: &Settings) -> LevelFilter {
    if settings.is_production() {
        LevelFilter::Info
    } else {
        LevelFilter::Debug
    }
}

/// Install the global logger. Call once, before anything logs.
pub fn init(settings: &Settings) -> Result<(), LoggingError> {
    let writer =
        DailyFileWriter::new(&settings.log_dir).map_err(|source| LoggingError::Directory {
            path: settings.log_dir.clone(),
            source,
        })?;
    let path = writer.current_path();

    env_logger::Builder::new()
        .filter_level(default_level(settings))
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .format_timestamp_secs()
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .try_init()?;

    info!(
        "Logger initialized: environment={}, file={}",
        settings.environment,
        path.display()
    );
    Ok(())
}
