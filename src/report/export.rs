// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Report export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::AccidentReport;
use crate::error::Result;

/// Writes reports as pretty-printed JSON, one file per report
pub struct ReportExporter {
    path: PathBuf,
}

impl ReportExporter {
    pub fn new(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.path
    }

    /// Write `<id>.json`, replacing an existing file with the same id
    pub fn export(&self, report: &AccidentReport) -> Result<PathBuf> {
        let filename = self.path.join(format!("{}.json", report.id));
        let mut writer = BufWriter::new(File::create(&filename)?);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writeln!(writer)?;
        writer.flush()?;

        info!("Exported report {} to {:?}", report.id, filename);
        Ok(filename)
    }

    pub fn load(path: &Path) -> Result<AccidentReport> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Exported report files, oldest first
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().map_or(false, |e| e == "json")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| n.starts_with("ACC-"))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}
