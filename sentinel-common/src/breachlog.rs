//! Append-only breach audit files.
//!
//! Each drained batch leaves a trail in `red.log` or `non_red.log` with a
//! `[YYYY-MM-DD HH:MM:SS]` prefix per line. These files exist alongside the
//! structured tracing output so operators can grep a channel's history
//! without a log pipeline.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use parking_lot::Mutex;

/// One append-only audit file, opened per write and serialized by a lock.
#[derive(Debug)]
pub struct BreachLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl BreachLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line. Creates the file (and parent directory)
    /// on first use.
    pub fn append(&self, message: &str) -> io::Result<()> {
        let _guard = self.lock.lock();

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{timestamp}] {message}")
    }
}
