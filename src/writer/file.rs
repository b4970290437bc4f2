//! Rotating file writer.
//!
//! The consumer task must stay responsive, so file output is implemented as:
//! - a bounded queue (non-blocking `try_send`)
//! - a dedicated thread with buffered writes and periodic flush

use super::LogWriter;
use crate::config::TargetDefinition;
use crate::constants::{
    DEFAULT_FILE_FLUSH_INTERVAL_MS, DEFAULT_FILE_MAX_BYTES, DEFAULT_FILE_MAX_FILES,
    FILE_CHANNEL_CAPACITY,
};
use crate::entry::ErrorInfo;
use crate::error::{PipelineError, Result};
use crate::level::{NativeLevel, Severity};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

/// File level set, stored as a byte and printed as a three-letter tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum FileLevel {
    Verbose = 0,
    Debug = 1,
    Information = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
    Off = 6,
}

impl FileLevel {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Verbose => "VRB",
            Self::Debug => "DBG",
            Self::Information => "INF",
            Self::Warning => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Off => "OFF",
        }
    }
}

impl NativeLevel for FileLevel {
    fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Trace => Self::Verbose,
            Severity::Debug => Self::Debug,
            Severity::Info => Self::Information,
            Severity::Warn => Self::Warning,
            Severity::Error => Self::Error,
            Severity::Critical => Self::Fatal,
            Severity::Off => Self::Off,
        }
    }

    fn to_severity(self) -> Severity {
        match self {
            Self::Verbose => Severity::Trace,
            Self::Debug => Severity::Debug,
            Self::Information => Severity::Info,
            Self::Warning => Severity::Warn,
            Self::Error => Severity::Error,
            Self::Fatal => Severity::Critical,
            Self::Off => Severity::Off,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileWriterConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_files: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
}

impl FileWriterConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_FILE_MAX_BYTES,
            max_files: DEFAULT_FILE_MAX_FILES,
            flush_interval: Duration::from_millis(DEFAULT_FILE_FLUSH_INTERVAL_MS),
            channel_capacity: FILE_CHANNEL_CAPACITY,
        }
    }

    /// Properties: `path` (required), `max_bytes`, `max_files`, `flush_interval_ms`
    pub fn from_target(name: &str, target: &TargetDefinition) -> Result<Self> {
        let path = target
            .property("path")
            .ok_or_else(|| PipelineError::ConfigValidation {
                field: format!("targets.{}.properties.path", name),
                reason: "file targets need a path".to_string(),
            })?;
        Ok(Self {
            path: PathBuf::from(path),
            max_bytes: target.parsed_property("max_bytes", DEFAULT_FILE_MAX_BYTES)?,
            max_files: target.parsed_property("max_files", DEFAULT_FILE_MAX_FILES)?,
            flush_interval: Duration::from_millis(
                target.parsed_property("flush_interval_ms", DEFAULT_FILE_FLUSH_INTERVAL_MS)?,
            ),
            channel_capacity: FILE_CHANNEL_CAPACITY,
        })
    }
}

enum Command {
    Line(String),
    Flush(SyncSender<()>),
}

/// Handle to a running file writer thread; the thread exits when this drops
#[derive(Debug)]
pub struct FileWriter {
    target: String,
    path: PathBuf,
    min_level: FileLevel,
    tx: SyncSender<Command>,
}

impl FileWriter {
    pub fn spawn(target: &str, min_level: Severity, cfg: FileWriterConfig) -> Result<Self> {
        let init_err = |source: io::Error| PipelineError::WriterInit {
            target: target.to_string(),
            source,
        };

        if let Some(parent) = cfg.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(init_err)?;
            }
        }

        let (file, size) = open_append(&cfg.path).map_err(init_err)?;
        let (tx, rx) = sync_channel::<Command>(cfg.channel_capacity.max(1));
        let path = cfg.path.clone();

        thread::Builder::new()
            .name(format!("interlog-file-{}", target))
            .spawn(move || run_writer(rx, cfg, file, size))
            .map_err(init_err)?;

        Ok(Self {
            target: target.to_string(),
            path,
            min_level: FileLevel::from_severity(min_level),
            tx,
        })
    }

    pub fn from_target(name: &str, target: &TargetDefinition) -> Result<Self> {
        Self::spawn(name, target.min_level, FileWriterConfig::from_target(name, target)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rejected(&self, reason: &str) -> PipelineError {
        PipelineError::WriterRejected {
            target: self.target.clone(),
            reason: reason.to_string(),
        }
    }
}

impl LogWriter for FileWriter {
    fn is_enabled_for(&self, severity: Severity) -> bool {
        let level = FileLevel::from_severity(severity);
        self.min_level != FileLevel::Off && level != FileLevel::Off && level >= self.min_level
    }

    fn write(&self, severity: Severity, message: &str, _error: Option<&ErrorInfo>) -> Result<()> {
        let line = format_line(FileLevel::from_severity(severity), message);
        match self.tx.try_send(Command::Line(line)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(self.rejected("file queue full")),
            Err(TrySendError::Disconnected(_)) => Err(self.rejected("writer thread stopped")),
        }
    }

    /// Blocks (briefly) until the writer thread has flushed everything queued so far
    fn flush(&self) {
        let (ack_tx, ack_rx) = sync_channel(1);
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(Duration::from_secs(1));
        }
    }
}

fn format_line(level: FileLevel, message: &str) -> String {
    format!(
        "{} [{}] {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        level.tag(),
        message
    )
}

fn run_writer(rx: Receiver<Command>, cfg: FileWriterConfig, file: File, start_size: u64) {
    let max_bytes = cfg.max_bytes.max(1024);
    let max_files = cfg.max_files.max(1);
    let flush_interval = if cfg.flush_interval.is_zero() {
        Duration::from_millis(DEFAULT_FILE_FLUSH_INTERVAL_MS)
    } else {
        cfg.flush_interval
    };

    let mut writer = BufWriter::new(file);
    let mut size = start_size;
    let mut dirty = false;
    let mut last_flush = Instant::now();

    loop {
        match rx.recv_timeout(flush_interval) {
            Ok(Command::Line(line)) => {
                if write_line(&mut writer, &line).is_ok() {
                    size = size.saturating_add(line.len() as u64 + 1);
                    dirty = true;
                }

                if size >= max_bytes {
                    let _ = writer.flush();
                    drop(writer);
                    let _ = rotate_files(&cfg.path, max_files);
                    match open_truncate(&cfg.path) {
                        Ok(f) => {
                            writer = BufWriter::new(f);
                            size = 0;
                            dirty = false;
                            last_flush = Instant::now();
                        }
                        // Cannot reopen: stop; later writes report the thread as stopped
                        Err(_) => break,
                    }
                }
            }
            Ok(Command::Flush(ack)) => {
                let _ = writer.flush();
                dirty = false;
                last_flush = Instant::now();
                let _ = ack.send(());
            }
            Err(RecvTimeoutError::Timeout) => {
                if dirty && last_flush.elapsed() >= flush_interval {
                    let _ = writer.flush();
                    dirty = false;
                    last_flush = Instant::now();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = writer.flush();
                break;
            }
        }
    }
}

fn write_line(writer: &mut BufWriter<File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

fn open_truncate(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// `app.log` -> `app.log.1` -> ... -> `app.log.N`, dropping the oldest
fn rotate_files(path: &Path, max_files: usize) -> io::Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let stem = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "interlog.log".to_string());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let oldest = dir.join(format!("{}.{}", stem, max_files));
    let _ = fs::remove_file(&oldest);

    for i in (1..max_files).rev() {
        let src = dir.join(format!("{}.{}", stem, i));
        let dst = dir.join(format!("{}.{}", stem, i + 1));
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    let first = dir.join(format!("{}.1", stem));
    if path.exists() {
        let _ = fs::rename(path, first);
    }

    Ok(())
}
