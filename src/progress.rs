use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use crate::{
    document::DocumentId,
    notify::{ChangeCause, PositionChange, PositionObserver},
    position::Position,
};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to read progress file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse progress file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub document_id: DocumentId,
    pub position: Position,
    pub updated_at: String,
}

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Observer that keeps the latest position on disk.
///
/// Timed changes (autoscroll, speech) are written at most once per
/// `min_interval`; the newest skipped one is written on drop.
pub struct ProgressFile {
    path: PathBuf,
    min_interval: Duration,
    last_write: Option<Instant>,
    pending: Option<PositionChange>,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_interval: DEFAULT_MIN_INTERVAL,
            last_write: None,
            pending: None,
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored position for `document_id`, if the file belongs to it.
    pub fn load(&self, document_id: &DocumentId) -> Result<Option<Position>, ProgressError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)
            .map_err(|err| ProgressError::Io(self.path.clone(), err))?;
        let record: ProgressRecord = serde_json::from_str(&data)
            .map_err(|err| ProgressError::Parse(self.path.clone(), err))?;
        Ok((&record.document_id == document_id).then_some(record.position))
    }

    pub fn save(&self, change: &PositionChange) -> Result<(), ProgressError> {
        let record = ProgressRecord {
            document_id: change.document_id.clone(),
            position: change.position,
            updated_at: change.timestamp.format(&Rfc3339)?,
        };
        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|err| ProgressError::Io(parent.into(), err))?;
        }
        let serialised = serde_json::to_string_pretty(&record)
            .map_err(|err| ProgressError::Parse(self.path.clone(), err))?;
        fs::write(&self.path, serialised).map_err(|err| ProgressError::Io(self.path.clone(), err))
    }

    /// Writes the change held back by throttling, if any.
    pub fn flush(&mut self) {
        if let Some(change) = self.pending.take() {
            self.write(&change);
        }
    }

    fn write(&mut self, change: &PositionChange) {
        self.last_write = Some(Instant::now());
        if let Err(err) = self.save(change) {
            warn!("Failed to persist reading progress: {err}");
        }
    }
}

impl PositionObserver for ProgressFile {
    fn position_changed(&mut self, change: &PositionChange) {
        let timed = matches!(change.cause, ChangeCause::Autoscroll | ChangeCause::Speech);
        let due = self
            .last_write
            .map_or(true, |at| at.elapsed() >= self.min_interval);
        if timed && !due {
            self.pending = Some(change.clone());
            return;
        }
        self.pending = None;
        self.write(change);
    }
}

impl Drop for ProgressFile {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use time::OffsetDateTime;

    use super::*;

    fn change(id: &str, position: Position) -> PositionChange {
        caused(id, position, ChangeCause::Navigation)
    }

    fn caused(id: &str, position: Position, cause: ChangeCause) -> PositionChange {
        PositionChange {
            document_id: DocumentId::new(id),
            position,
            timestamp: OffsetDateTime::UNIX_EPOCH,
            cause,
        }
    }

    fn stored(path: &Path) -> Option<Position> {
        ProgressFile::new(path)
            .load(&DocumentId::new("book"))
            .unwrap()
    }

    #[test]
    fn timed_changes_are_coalesced_until_drop() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        let mut progress =
            ProgressFile::new(&path).with_min_interval(Duration::from_secs(3600));

        for word in 0..50 {
            let position = Position::new(0, 0, word);
            progress.position_changed(&caused("book", position, ChangeCause::Autoscroll));
        }
        assert_eq!(stored(&path), Some(Position::new(0, 0, 0)));

        drop(progress);
        assert_eq!(stored(&path), Some(Position::new(0, 0, 49)));
    }

    #[test]
    fn manual_changes_are_written_immediately() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        let mut progress =
            ProgressFile::new(&path).with_min_interval(Duration::from_secs(3600));

        progress.position_changed(&caused("book", Position::new(0, 0, 1), ChangeCause::Speech));
        progress.position_changed(&caused("book", Position::new(0, 1, 0), ChangeCause::Speech));
        progress.position_changed(&caused("book", Position::new(3, 0, 0), ChangeCause::Jump));
        assert_eq!(stored(&path), Some(Position::new(3, 0, 0)));

        drop(progress);
        assert_eq!(stored(&path), Some(Position::new(3, 0, 0)));
    }

    #[test]
    fn stores_and_restores_position() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut progress = ProgressFile::new(temp.path().join("nested/progress.json"));
        progress.position_changed(&change("book", Position::new(4, 1, 7)));

        let restored = progress.load(&DocumentId::new("book")).unwrap();
        assert_eq!(restored, Some(Position::new(4, 1, 7)));
        let raw = fs::read_to_string(progress.path()).unwrap();
        assert!(raw.contains("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn ignores_progress_of_another_document() {
        let temp = assert_fs::TempDir::new().unwrap();
        let progress = ProgressFile::new(temp.path().join("progress.json"));
        progress.save(&change("other", Position::new(1, 0, 0))).unwrap();
        assert_eq!(progress.load(&DocumentId::new("book")).unwrap(), None);
    }

    #[test]
    fn missing_file_means_no_progress() {
        let temp = assert_fs::TempDir::new().unwrap();
        let progress = ProgressFile::new(temp.path().join("absent.json"));
        assert_eq!(progress.load(&DocumentId::new("book")).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("progress.json");
        file.write_str("{not json").unwrap();
        let progress = ProgressFile::new(file.path());
        assert!(matches!(
            progress.load(&DocumentId::new("book")),
            Err(ProgressError::Parse(..))
        ));
    }
}
