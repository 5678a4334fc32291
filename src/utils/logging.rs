//! Plain-text transcript log written alongside a chat session.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct LoggingState {
    file_path: Option<PathBuf>,
    is_active: bool,
}

impl LoggingState {
    /// A log given on the command line is active immediately.
    pub fn new(log_file: Option<PathBuf>) -> io::Result<Self> {
        if let Some(path) = &log_file {
            Self::test_file_access(path)?;
        }
        Ok(Self {
            is_active: log_file.is_some(),
            file_path: log_file,
        })
    }

    pub fn set_log_file(&mut self, path: PathBuf) -> io::Result<String> {
        Self::test_file_access(&path)?;
        let message = format!("Logging enabled to: {}", path.display());
        self.file_path = Some(path);
        self.is_active = true;
        Ok(message)
    }

    pub fn toggle_logging(&mut self) -> Result<String, String> {
        let Some(path) = self.file_path.as_ref().map(|path| path.display().to_string()) else {
            return Err(
                "No log file specified. Use /log <filename> to enable logging first.".to_string(),
            );
        };
        self.is_active = !self.is_active;
        if self.is_active {
            Ok(format!("Logging resumed to: {path}"))
        } else {
            Ok(format!("Logging paused (file: {path})"))
        }
    }

    pub fn log_user(&self, content: &str) -> io::Result<()> {
        self.log_message(&format!("You: {content}"))
    }

    pub fn log_assistant(&self, content: &str) -> io::Result<()> {
        if content.is_empty() {
            return Ok(());
        }
        self.log_message(content)
    }

    pub fn log_message(&self, content: &str) -> io::Result<()> {
        let Some(path) = self.file_path.as_deref().filter(|_| self.is_active) else {
            return Ok(());
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", Self::file_label(path)),
            (Some(path), false) => format!("paused ({})", Self::file_label(path)),
        }
    }

    fn file_label(path: &Path) -> String {
        path.file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    fn test_file_access(path: &Path) -> io::Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .flush()
    }
}
