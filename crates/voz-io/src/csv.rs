//! Append-only CSV performance log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Result;

/// Column header written once when the file is created.
pub const CSV_HEADER: &str = "Timestamp,Stage_ID,Stage_Name,Execution_Time,Memory_Usage,CPU_Usage";

/// Appender for the per-stage performance log.
///
/// One row per completed stage. Appends are best-effort at the caller's
/// discretion — the monitor logs failures instead of propagating them so a
/// full disk never takes the pipeline down.
pub struct CsvLog {
    path: PathBuf,
    header_written: bool,
}

impl CsvLog {
    /// Creates an appender for `path`. Nothing is written until the first
    /// row.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let header_written = path.exists();
        Self {
            path,
            header_written,
        }
    }

    /// The log's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one stage row, writing the header first on a fresh file.
    pub fn append(
        &mut self,
        timestamp_secs: f64,
        stage_id: u32,
        stage_name: &str,
        exec_time_secs: f64,
        memory_bytes: u64,
        cpu_ratio: f64,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if !self.header_written {
            writeln!(file, "{CSV_HEADER}")?;
            self.header_written = true;
        }
        writeln!(
            file,
            "{timestamp_secs:.6},{stage_id},{stage_name},{exec_time_secs:.6},{memory_bytes},{cpu_ratio:.4}"
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn header_then_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perf.csv");
        let mut log = CsvLog::new(&path);
        log.append(1.0, 3, "F0Extraction", 0.0123, 4096, 0.5).unwrap();
        log.append(2.0, 7, "Synthesis", 0.0456, 8192, 0.9).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("1.000000,3,F0Extraction,0.012300,4096,"));
        assert!(lines[2].contains(",7,Synthesis,"));
    }

    #[test]
    fn append_to_existing_file_skips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perf.csv");
        {
            let mut log = CsvLog::new(&path);
            log.append(1.0, 0, "Initialization", 0.001, 0, 0.0).unwrap();
        }
        {
            let mut log = CsvLog::new(&path);
            log.append(2.0, 10, "Total", 0.1, 0, 0.0).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Timestamp").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }
}
