//! Local message history persisted to disk.
//!
//! History is a JSON array of messages, loaded once at startup and rewritten
//! after each append. Persistence failures are logged and never interrupt
//! message flow; history is a convenience, not a delivery guarantee.

use crate::transport::Message;
use crate::utils::Result;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only store of chat messages backed by a JSON file
pub struct MessageHistory {
    path: PathBuf,
    messages: Mutex<Vec<Message>>,
}

impl MessageHistory {
    /// Open the history at `path`, loading any existing entries.
    ///
    /// A missing file is an empty history; a corrupt file is logged and
    /// treated as empty rather than blocking startup.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let messages = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<Message>>(&bytes) {
                Ok(messages) => {
                    log::debug!("loaded {} messages from {}", messages.len(), path.display());
                    messages
                }
                Err(e) => {
                    log::warn!("history file {} is corrupt, starting empty: {e}", path.display());
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::warn!("could not read {}: {e}", path.display());
                Vec::new()
            }
        };

        Self {
            path,
            messages: Mutex::new(messages),
        }
    }

    /// Record a message and persist the updated history
    pub fn append(&self, message: &Message) {
        let snapshot = {
            let mut messages = self.messages.lock().expect("history lock poisoned");
            messages.push(message.clone());
            messages.clone()
        };
        if let Err(e) = self.persist(&snapshot) {
            log::warn!("could not save history to {}: {e}", self.path.display());
        }
    }

    /// The most recent `limit` messages in chronological order; 0 means all
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let messages = self.messages.lock().expect("history lock poisoned");
        if limit == 0 || limit >= messages.len() {
            messages.clone()
        } else {
            messages[messages.len() - limit..].to_vec()
        }
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        self.messages.lock().expect("history lock poisoned").len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all stored messages and truncate the file
    pub fn clear(&self) -> Result<()> {
        self.messages.lock().expect("history lock poisoned").clear();
        self.persist(&[])
    }

    fn persist(&self, messages: &[Message]) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(messages)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}
