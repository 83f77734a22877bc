//! Dev-mode logging configuration.
//!
//! Writes structured JSONL logs to a central file that can be tailed
//! by external tools. Multi-process safe via append-only semantics.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Central log file location, `~/.quill/logs/dev.jsonl`.
/// Falls back to the system temp directory when there is no home directory.
fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".quill"))
        .unwrap_or_else(|| std::env::temp_dir().join("quill"))
        .join("logs")
        .join("dev.jsonl")
}

/// File writer that appends to the central log file.
/// Flushes per write so concurrent processes interleave whole lines.
#[derive(Clone)]
pub struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// MakeWriter implementation for tracing-subscriber
#[derive(Clone)]
pub struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn env_filter_or(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the dev subscriber with central JSONL file output.
///
/// If the log file cannot be opened the process keeps running with the
/// stderr layer only.
pub fn init_dev_subscriber(config: &LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let json_layer = match CentralLogWriter::new(&log_path) {
        Ok(writer) => Some(
            JsonLayer::new(config.service_name.clone(), WriterFactory { writer })
                .with_filter(env_filter_or(&config.default_level)),
        ),
        Err(e) => {
            eprintln!("failed to open log file {}: {}", log_path.display(), e);
            None
        }
    };
    let file_enabled = json_layer.is_some();

    let stderr_layer = if config.also_stderr || !file_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_filter(env_filter_or(&config.default_level)),
        )
    } else {
        None
    };

    if tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    if file_enabled {
        tracing::debug!(
            log_path = %log_path.display(),
            "observability initialized"
        );
    }
}
