// src/store.rs
//! Stage Store: the latest snapshot per pipeline stage plus the latest run record.
//! Writes go to a temp file in the same directory and are renamed into place,
//! so a reader sees either the old snapshot or the new one.

use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::pipeline::PipelineRun;

pub type Result<T> = std::result::Result<T, StoreError>;

const RUN_FILE: &str = "last_run.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Raw,
    Normalized,
    Filtered,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Raw, Stage::Normalized, Stage::Filtered];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Normalized => "normalized",
            Stage::Filtered => "filtered",
        }
    }

    fn file_name(&self) -> String {
        format!("{}_events.json", self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Stage::Raw),
            "normalized" => Ok(Stage::Normalized),
            "filtered" => Ok(Stage::Filtered),
            other => Err(StoreError::UnknownStage(other.to_string())),
        }
    }
}

/// Per-stage record counts (the `/stats` payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageCounts {
    pub raw: usize,
    pub normalized: usize,
    pub filtered: usize,
}

#[derive(Debug)]
pub struct StageStore {
    dir: PathBuf,
}

impl StageStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: Stage) -> PathBuf {
        self.dir.join(stage.file_name())
    }

    /// Replaces the stage snapshot with `records`.
    pub fn save<T: Serialize>(&self, stage: Stage, records: &[T]) -> Result<()> {
        self.write_atomic(&self.path_for(stage), records)?;
        tracing::debug!(target: "store", %stage, records = records.len(), "stage saved");
        Ok(())
    }

    /// A stage that was never written loads as empty.
    pub fn load<T: DeserializeOwned>(&self, stage: Stage) -> Result<Vec<T>> {
        Ok(self.read_json(&self.path_for(stage))?.unwrap_or_default())
    }

    pub fn count(&self, stage: Stage) -> Result<usize> {
        Ok(self.load::<serde_json::Value>(stage)?.len())
    }

    pub fn counts(&self) -> Result<StageCounts> {
        Ok(StageCounts {
            raw: self.count(Stage::Raw)?,
            normalized: self.count(Stage::Normalized)?,
            filtered: self.count(Stage::Filtered)?,
        })
    }

    pub fn save_run(&self, run: &PipelineRun) -> Result<()> {
        self.write_atomic(&self.dir.join(RUN_FILE), run)
    }

    pub fn load_run(&self) -> Result<Option<PipelineRun>> {
        self.read_json(&self.dir.join(RUN_FILE))
    }

    /// Removes every stage snapshot and the run record.
    pub fn clear(&self) -> Result<()> {
        let paths = Stage::ALL
            .iter()
            .map(|s| self.path_for(*s))
            .chain(std::iter::once(self.dir.join(RUN_FILE)));
        for p in paths {
            match fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn write_atomic<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut w, value)?;
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
