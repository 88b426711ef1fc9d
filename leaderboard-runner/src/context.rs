//! Per-dataset pipeline context
//!
//! Every dataset pipeline gets its own context carrying:
//! - A pipeline ID tagging every log line it emits
//! - The dataset's log file (`log_leaderboard_<dataset>.txt`)
//! - A bounded in-memory buffer of recent log entries
//!
//! The context is created by the dispatcher and handed by reference to the
//! submitter, tracker and aggregator. There is no global logger: two
//! pipelines never share a log destination.

use leaderboard_core::domain::dataset::sanitize_dataset_name;
use leaderboard_core::domain::log::{LogEntry, LogLevel};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Entries kept in memory per pipeline; older ones are dropped
const LOG_BUFFER_CAPACITY: usize = 1024;

/// Logging context of one dataset pipeline
pub struct PipelineContext {
    pipeline_id: Uuid,
    dataset_type: String,
    log_buffer: Mutex<VecDeque<LogEntry>>,
    log_file: Option<Mutex<LineWriter<File>>>,
    log_path: Option<PathBuf>,
}

impl PipelineContext {
    /// Creates a context writing to `<log_dir>/log_leaderboard_<dataset>.txt`
    ///
    /// An existing file for the same dataset is truncated.
    pub fn new(dataset_type: &str, log_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(log_file_name(dataset_type));
        let file = File::create(&path)?;

        let mut context = Self::in_memory(dataset_type);
        context.log_file = Some(Mutex::new(LineWriter::new(file)));
        context.log_path = Some(path);
        Ok(context)
    }

    /// Creates a context without a log file
    pub fn in_memory(dataset_type: &str) -> Self {
        Self {
            pipeline_id: Uuid::new_v4(),
            dataset_type: dataset_type.to_string(),
            log_buffer: Mutex::new(VecDeque::new()),
            log_file: None,
            log_path: None,
        }
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    pub fn dataset_type(&self) -> &str {
        &self.dataset_type
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Records a log entry in the buffer and the log file, and mirrors it to tracing
    pub fn add_log(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Debug => debug!(dataset = %self.dataset_type, pipeline_id = %self.pipeline_id, "{}", entry.message),
            LogLevel::Info => info!(dataset = %self.dataset_type, pipeline_id = %self.pipeline_id, "{}", entry.message),
            LogLevel::Warning => warn!(dataset = %self.dataset_type, pipeline_id = %self.pipeline_id, "{}", entry.message),
            LogLevel::Error => error!(dataset = %self.dataset_type, pipeline_id = %self.pipeline_id, "{}", entry.message),
        }

        if let Some(file) = &self.log_file {
            let mut file = file.lock().unwrap();
            if let Err(e) = writeln!(file, "{}", entry) {
                warn!(dataset = %self.dataset_type, "Failed to write pipeline log: {}", e);
            }
        }

        let mut buffer = self.log_buffer.lock().unwrap();
        if buffer.len() == LOG_BUFFER_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }

    fn log(&self, level: LogLevel, message: String) {
        self.add_log(LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            message,
        });
    }

    /// Logs a debug message
    pub fn log_debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into());
    }

    /// Logs an info message
    pub fn log_info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into());
    }

    /// Logs a warning message
    pub fn log_warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message.into());
    }

    /// Logs an error message
    pub fn log_error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into());
    }

    /// Snapshot of the buffered entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.log_buffer.lock().unwrap().iter().cloned().collect()
    }
}

/// Log file name for a dataset; `/` is not allowed in file names
pub fn log_file_name(dataset_type: &str) -> String {
    format!("log_leaderboard_{}.txt", sanitize_dataset_name(dataset_type))
}
