use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Buffered lines are written out once this many have accumulated.
const FLUSH_THRESHOLD: usize = 512;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerOptions {
    pub stream_to_stdout: bool,
    pub verbose: bool,
}

pub struct SessionLogger {
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_path: PathBuf,
    log_dir: PathBuf,
    retention_count: usize,
    app_name: String,
    options: LoggerOptions,
}

impl SessionLogger {
    pub fn new(log_dir: PathBuf, app_name: &str, retention_count: usize, options: LoggerOptions) -> Result<Self> {
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("{}_{}.log", app_name, timestamp);
        let log_path = log_dir.join(&log_filename);

        let logger = Self {
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_path,
            log_dir,
            retention_count,
            app_name: app_name.to_string(),
            options,
        };

        logger.clean_old_logs()?;
        logger.log(format!("=== {} Session Started ===", app_name));

        Ok(logger)
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let log_line = format!("[{}] {}", timestamp, message.as_ref());

        if self.options.stream_to_stdout {
            println!("{}", log_line);
            let _ = self.write_line_to_file(&log_line);
            return;
        }

        let should_flush = match self.log_buffer.lock() {
            Ok(mut buffer) => {
                buffer.push(log_line);
                buffer.len() >= FLUSH_THRESHOLD
            }
            Err(_) => false,
        };
        if should_flush {
            let _ = self.flush_to_disk();
        }
    }

    fn write_line_to_file(&self, line: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(format!("ERROR: {}", message.as_ref()));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(format!("WARN: {}", message.as_ref()));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(message);
    }

    /// Dropped unless the session runs with `--verbose`.
    pub fn debug(&self, message: impl AsRef<str>) {
        if self.options.verbose {
            self.log(format!("DEBUG: {}", message.as_ref()));
        }
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn buffered_lines(&self) -> usize {
        self.log_buffer.lock().map(|buffer| buffer.len()).unwrap_or(0)
    }

    fn clean_old_logs(&self) -> Result<()> {
        let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        let prefix = format!("{}_", self.app_name);

        if let Ok(entries) = fs::read_dir(&self.log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("log") {
                    continue;
                }
                let matches_prefix = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| name.starts_with(&prefix))
                    .unwrap_or(false);
                if !matches_prefix {
                    continue;
                }
                if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                    log_files.push((path, modified));
                }
            }
        }

        // Newest first; the session's own file does not exist yet, so keep one slot for it.
        log_files.sort_by(|a, b| b.1.cmp(&a.1));
        let keep = self.retention_count.saturating_sub(1);
        for (path, _) in log_files.iter().skip(keep) {
            let _ = fs::remove_file(path);
        }

        Ok(())
    }

    pub fn flush_to_disk(&self) -> Result<()> {
        let lines = match self.log_buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => return Ok(()),
        };
        if lines.is_empty() {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open log file {}", self.log_path.display()))?;

        for line in &lines {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;

        Ok(())
    }

    pub fn finalize(&self) -> Result<()> {
        self.log(format!("=== {} Session Ended ===", self.app_name));
        self.flush_to_disk()?;
        Ok(())
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

static LOGGER: once_cell::sync::OnceCell<SessionLogger> = once_cell::sync::OnceCell::new();

pub fn init_logger(log_dir: PathBuf, app_name: &str, retention_count: usize, options: LoggerOptions) -> Result<()> {
    let logger = SessionLogger::new(log_dir, app_name, retention_count, options)?;
    LOGGER.set(logger).map_err(|_| anyhow::anyhow!("Logger already initialized"))?;
    Ok(())
}

pub fn log(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.log(message);
    }
}

pub fn log_error(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.error(message);
    }
}

pub fn log_warn(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.warn(message);
    }
}

pub fn log_info(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.info(message);
    }
}

pub fn log_debug(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.debug(message);
    }
}

pub fn finalize_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.finalize()?;
    }
    Ok(())
}

pub fn get_log_path() -> Option<PathBuf> {
    LOGGER.get().map(|logger| logger.log_path.clone())
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::log_info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::log_warn(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::log_error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logger::log_debug(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_log(logger: &SessionLogger) -> String {
        fs::read_to_string(logger.log_path()).unwrap_or_default()
    }

    #[test]
    fn test_buffered_lines_reach_disk_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SessionLogger::new(dir.path().to_path_buf(), "huelens", 10, LoggerOptions::default()).unwrap();
        logger.warn("hue file missing");

        assert!(read_log(&logger).is_empty());
        logger.flush_to_disk().unwrap();

        let contents = read_log(&logger);
        assert!(contents.contains("Session Started"));
        assert!(contents.contains("WARN: hue file missing"));
        assert_eq!(logger.buffered_lines(), 0);
    }

    #[test]
    fn test_buffer_flushes_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SessionLogger::new(dir.path().to_path_buf(), "huelens", 10, LoggerOptions::default()).unwrap();
        for i in 0..FLUSH_THRESHOLD {
            logger.info(format!("line {}", i));
        }
        assert!(logger.buffered_lines() < FLUSH_THRESHOLD);
        assert!(read_log(&logger).contains("line 0"));
    }

    #[test]
    fn test_debug_requires_verbose() {
        let dir = tempfile::tempdir().unwrap();
        let quiet = SessionLogger::new(dir.path().join("quiet"), "huelens", 10, LoggerOptions::default()).unwrap();
        quiet.debug("tick detail");
        quiet.flush_to_disk().unwrap();
        assert!(!read_log(&quiet).contains("DEBUG"));

        let options = LoggerOptions { verbose: true, ..LoggerOptions::default() };
        let verbose = SessionLogger::new(dir.path().join("verbose"), "huelens", 10, options).unwrap();
        verbose.debug("tick detail");
        verbose.flush_to_disk().unwrap();
        assert!(read_log(&verbose).contains("DEBUG: tick detail"));
    }

    #[test]
    fn test_old_logs_pruned_to_retention() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("huelens_2020010{}_000000.log", i)), "old").unwrap();
        }
        fs::write(dir.path().join("other_20200101_000000.log"), "keep").unwrap();

        let _logger = SessionLogger::new(dir.path().to_path_buf(), "huelens", 3, LoggerOptions::default()).unwrap();

        let remaining = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("huelens_"))
            .count();
        assert_eq!(remaining, 2);
        assert!(dir.path().join("other_20200101_000000.log").exists());
    }
}
