//! File-based conversation store. One pretty-printed JSON file per save.
//!
//! Storage location: `{save_dir}/{name}.json`, where `save_dir` defaults to
//! `./conversations`. Files are human-inspectable and overwritten on every
//! save of the same name.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use taconite_core::error::StoreError;
use taconite_core::export::{ConversationStore, SavedConversation, SavedEntry};
use tracing::{debug, warn};

use crate::normalize_name;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `name`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = normalize_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    fn read(path: &Path) -> Result<SavedConversation, StoreError> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content).map_err(|e| {
            StoreError::Serialization(format!("Failed to parse {}: {e}", path.display()))
        })
    }
}

/// Serialize with a four-space indent.
fn to_pretty_json(conversation: &SavedConversation) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    conversation
        .serialize(&mut ser)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

impl ConversationStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn save(&self, name: &str, conversation: &SavedConversation) -> Result<(), StoreError> {
        let path = self.path_for(name)?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Io(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let content = to_pretty_json(conversation)?;
        fs::write(&path, content)
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {e}", path.display())))?;

        debug!(
            path = %path.display(),
            messages = conversation.messages.len(),
            "Conversation saved"
        );
        Ok(())
    }

    fn load(&self, name: &str) -> Result<SavedConversation, StoreError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(StoreError::NotFound(normalize_name(name)?.to_string()));
        }
        Self::read(&path)
    }

    fn list(&self) -> Result<Vec<SavedEntry>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            // Nothing saved yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to list {}: {e}",
                    self.dir.display()
                )));
            }
        };

        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let meta = match Self::read(&path) {
                Ok(saved) => Some(saved.meta),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable saved conversation");
                    None
                }
            };

            entries.push(SavedEntry {
                name: name.to_string(),
                meta,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
