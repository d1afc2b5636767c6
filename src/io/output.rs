//! Per-iteration JSON log.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use serde_json::{json, Value};

use crate::error::Result;

/// Writes the `{"Output": [...]}` document, extended by one record per
/// iteration. The whole document is rewritten on every append so the file is
/// valid JSON at any point of a run.
pub struct LogWriter {
    path: PathBuf,
    records: Vec<Value>,
}

impl LogWriter {
    /// Create (or truncate) the log file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut writer = Self { path, records: Vec::new() };
        writer.flush()?;
        Ok(writer)
    }

    pub fn append(&mut self, record: Value) -> Result<()> {
        self.records.push(record);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        let mut file = File::create(&self.path)?;
        serde_json::to_writer(&file, &json!({ "Output": self.records }))?;
        writeln!(file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_valid_json_after_every_append() {
        let path = std::env::temp_dir().join("lattice_vmc_logwriter_test.log");
        let mut writer = LogWriter::create(&path).unwrap();

        for i in 0..3 {
            writer.append(json!({ "Iteration": i })).unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            let doc: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(doc["Output"].as_array().unwrap().len(), i + 1);
            assert_eq!(doc["Output"][i]["Iteration"], i);
        }
        std::fs::remove_file(&path).ok();
    }
}
