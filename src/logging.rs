use chrono::{DateTime, NaiveDate, Utc};
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
};

use crate::config::{LoggingConfig, Rotation};
use crate::error::LabError;

pub fn parse_level(level: &str) -> Result<LevelFilter, LabError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::Trace),
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        "off" => Ok(LevelFilter::Off),
        _ => Err(LabError::Config(format!(
            "Invalid log level '{}', expected trace, debug, info, warn, error or off",
            level
        ))),
    }
}

/// Append-only log file that moves itself aside when the UTC date changes.
///
/// The active file is always `path`; finished days are renamed to
/// `path.YYYY-MM-DD` (with a numeric suffix if that name is taken).
#[derive(Debug)]
pub struct RotatingFileWriter {
    path: PathBuf,
    rotation: Rotation,
    file: File,
    opened_on: NaiveDate,
}

impl RotatingFileWriter {
    pub fn open(path: impl Into<PathBuf>, rotation: Rotation) -> io::Result<Self> {
        Self::open_at(path.into(), rotation, Utc::now().date_naive())
    }

    fn open_at(path: PathBuf, rotation: Rotation, today: NaiveDate) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // An existing file belongs to the day it was last written
        let opened_on = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Utc>::from(t).date_naive())
            .unwrap_or(today);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            rotation,
            file,
            opened_on,
        })
    }

    fn rotated_path(&self) -> PathBuf {
        let base = {
            let mut name = self
                .path
                .file_name()
                .map(OsString::from)
                .unwrap_or_default();
            name.push(format!(".{}", self.opened_on.format("%Y-%m-%d")));
            self.path.with_file_name(name)
        };

        let mut candidate = base.clone();
        let mut n = 1;
        while candidate.exists() {
            let mut name = base.file_name().map(OsString::from).unwrap_or_default();
            name.push(format!(".{n}"));
            candidate = base.with_file_name(name);
            n += 1;
        }
        candidate
    }

    fn rotate_if_needed(&mut self, today: NaiveDate) -> io::Result<()> {
        if self.rotation != Rotation::Daily || today == self.opened_on {
            return Ok(());
        }

        self.file.flush()?;
        let target = self.rotated_path();
        fs::rename(&self.path, &target)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.opened_on = today;
        Ok(())
    }

    fn write_at(&mut self, buf: &[u8], today: NaiveDate) -> io::Result<usize> {
        self.rotate_if_needed(today)?;
        self.file.write(buf)
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(buf, Utc::now().date_naive())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Sends every log record to the log file and, optionally, stdout
struct TeeWriter {
    file: RotatingFileWriter,
    console: Option<io::Stdout>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if let Some(console) = self.console.as_mut() {
            // A closed stdout must not take the log file down with it
            let _ = console.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if let Some(console) = self.console.as_mut() {
            let _ = console.flush();
        }
        Ok(())
    }
}

/// Install the process-wide logger.
///
/// Call once at startup. `level_override` (e.g. from the command line) takes
/// precedence over the configured level; `RUST_LOG` refines per-module levels.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<(), LabError> {
    let level = parse_level(level_override.unwrap_or(&config.level))?;
    let file = RotatingFileWriter::open(&config.log_file, config.rotation)
        .map_err(|source| LabError::storage(&config.log_file, source))?;

    let writer = TeeWriter {
        file,
        console: config.console.then(io::stdout),
    };

    Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .target(Target::Pipe(Box::new(writer)))
        .try_init()
        .map_err(|e| LabError::Config(format!("Logger already initialized: {}", e)))?;

    log::debug!(
        "Logging to {} (rotation: {:?}, level: {})",
        config.log_file,
        config.rotation,
        level
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("warn").unwrap(), LevelFilter::Warn);
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn test_daily_rotation_moves_previous_day_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("psu.log");
        let mut writer =
            RotatingFileWriter::open_at(path.clone(), Rotation::Daily, day(1)).unwrap();
        writer.opened_on = day(1);

        writer.write_at(b"first day\n", day(1)).unwrap();
        writer.write_at(b"second day\n", day(2)).unwrap();
        writer.flush().unwrap();

        let rotated = dir.path().join("psu.log.2026-03-01");
        assert_eq!(fs::read_to_string(&rotated).unwrap(), "first day\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "second day\n");
    }

    #[test]
    fn test_rotation_does_not_clobber_existing_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("psu.log");
        fs::write(dir.path().join("psu.log.2026-03-01"), "older\n").unwrap();

        let mut writer =
            RotatingFileWriter::open_at(path.clone(), Rotation::Daily, day(1)).unwrap();
        writer.opened_on = day(1);
        writer.write_at(b"again\n", day(1)).unwrap();
        writer.write_at(b"next\n", day(2)).unwrap();

        let second = dir.path().join("psu.log.2026-03-01.1");
        assert_eq!(
            fs::read_to_string(dir.path().join("psu.log.2026-03-01")).unwrap(),
            "older\n"
        );
        assert_eq!(fs::read_to_string(second).unwrap(), "again\n");
    }

    #[test]
    fn test_never_rotation_keeps_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scope.log");
        let mut writer =
            RotatingFileWriter::open_at(path.clone(), Rotation::Never, day(1)).unwrap();

        writer.write_at(b"a\n", day(1)).unwrap();
        writer.write_at(b"b\n", day(5)).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
