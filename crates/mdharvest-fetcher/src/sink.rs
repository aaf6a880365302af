//! Persistence seam for harvested records.
//!
//! The harvest loop hands validated objsets to a [`RecordSink`]; the
//! shipping implementation writes each objset as one JSON file in a
//! save directory, numbered in arrival order.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use mdharvest_core::Record;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "sink I/O error: {e}"),
            SinkError::Serialize(e) => write!(f, "sink serialization error: {e}"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            SinkError::Serialize(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Serialize(e)
    }
}

/// Accepts one objset at a time. Failure is reported back to the
/// harvest loop, which logs and continues.
pub trait RecordSink {
    fn save_objset(&mut self, objset: &[Record]) -> Result<(), SinkError>;
}

/// Writes each objset as `objset-NNNN.json` under a save directory.
pub struct ObjsetDirSink {
    dir: PathBuf,
    next_index: u32,
}

impl ObjsetDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, next_index: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Objsets written so far.
    pub fn count(&self) -> u32 {
        self.next_index
    }
}

impl RecordSink for ObjsetDirSink {
    fn save_objset(&mut self, objset: &[Record]) -> Result<(), SinkError> {
        let path = self.dir.join(format!("objset-{:04}.json", self.next_index));
        let body = serde_json::to_string_pretty(objset)?;
        fs::write(&path, body)?;
        self.next_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(title: &str) -> Record {
        let mut rec = Record::new();
        rec.insert("title".to_string(), json!(title));
        rec
    }

    #[test]
    fn writes_numbered_objset_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ObjsetDirSink::new(dir.path().join("save")).unwrap();
        sink.save_objset(&[record("one"), record("two")]).unwrap();
        sink.save_objset(&[record("three")]).unwrap();
        assert_eq!(sink.count(), 2);

        let body = fs::read_to_string(sink.dir().join("objset-0000.json")).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["title"], "one");

        let body = fs::read_to_string(sink.dir().join("objset-0001.json")).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed[0]["title"], "three");
    }

    #[test]
    fn creates_save_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        let sink = ObjsetDirSink::new(&nested).unwrap();
        assert!(sink.dir().is_dir());
    }
}
