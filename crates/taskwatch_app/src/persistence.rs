use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskwatch_core::TaskId;
use taskwatch_logging::{track_debug, track_warn};
use tempfile::NamedTempFile;

const STATE_FILENAME: &str = ".taskwatch_state.ron";

/// The most recently tracked task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTask {
    pub task_id: TaskId,
    pub base_url: String,
    pub started_utc: DateTime<Utc>,
}

impl LastTask {
    pub fn new(task_id: TaskId, base_url: impl Into<String>) -> Self {
        Self {
            task_id,
            base_url: base_url.into(),
            started_utc: Utc::now(),
        }
    }
}

pub struct LastTaskStore {
    dir: PathBuf,
}

impl LastTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILENAME)
    }

    /// `Ok(None)` when nothing was saved yet. A damaged file is reported and ignored.
    pub fn load(&self) -> Result<Option<LastTask>> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };

        match ron::from_str(&content) {
            Ok(task) => Ok(Some(task)),
            Err(err) => {
                track_warn!("Ignoring unreadable state file {:?}: {}", path, err);
                Ok(None)
            }
        }
    }

    /// Write through a temp file in the same directory, then rename over the target.
    pub fn save(&self, task: &LastTask) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating state directory {}", self.dir.display()))?;

        let content = ron::ser::to_string_pretty(task, ron::ser::PrettyConfig::new())
            .context("serializing last task")?;

        let target = self.path();
        let mut tmp = NamedTempFile::new_in(&self.dir).context("creating temp state file")?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target)
            .map_err(|err| err.error)
            .with_context(|| format!("replacing {}", target.display()))?;

        track_debug!("Saved last task {} to {:?}", task.task_id, target);
        Ok(target)
    }
}
