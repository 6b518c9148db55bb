use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::normalizer::CleanedDataset;

pub const ARTIFACT_EXTENSION: &str = "csv";

/// Where dated artifacts live: `<dir>/<source_name>_<YYYY-MM-DD>.csv`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    source_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, source_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            source_name: source_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, date: NaiveDate) -> String {
        format!(
            "{}_{}.{}",
            self.source_name,
            date.format("%Y-%m-%d"),
            ARTIFACT_EXTENSION
        )
    }

    pub fn artifact_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(self.file_name(date))
    }

    /// Writes `dataset` as the artifact for `date`, replacing any earlier
    /// artifact of the same day. Readers see either the old file or the
    /// complete new one.
    pub fn write(&self, dataset: &CleanedDataset, date: NaiveDate) -> Result<PathBuf> {
        self.replace(date, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(dataset.columns())?;
            for row in dataset.rows() {
                writer.write_record(row.values.iter().map(|v| v.to_string()))?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    /// Fills a temporary file next to the artifact and renames it into place
    /// once `fill` succeeds. On error the temporary file is removed.
    fn replace<F>(&self, date: NaiveDate, fill: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.artifact_path(date);
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temporary file in {}", self.dir.display()))?;

        fill(tmp.as_file_mut())?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync {}", tmp.path().display()))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        log::info!("Data saved to {}", path.display());
        Ok(path)
    }

    /// Artifacts of this source, sorted by name (and therefore by date).
    pub fn list(&self) -> Result<Vec<ArtifactInfo>> {
        let prefix = format!("{}_", self.source_name);
        let suffix = format!(".{}", ARTIFACT_EXTENSION);

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.dir.display())),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(&suffix) {
                artifacts.push(ArtifactInfo {
                    name,
                    size: entry.metadata()?.len(),
                });
            }
        }
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }

    pub fn latest(&self) -> Result<Option<ArtifactInfo>> {
        Ok(self.list()?.pop())
    }
}
