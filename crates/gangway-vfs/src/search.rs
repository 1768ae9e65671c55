//! The `_Search` directory
//!
//! A synthetic top-level directory whose children are set wholesale by the
//! search subsystem. Search results are flat asset lists; replacing the map
//! closes every previously held asset directory so their connections do not
//! leak across queries.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::entry::{DirEntry, EntryRef, MODE_DIR};
use crate::node::FsEntry;

/// Folder name the search directory is mounted under.
pub const SEARCH_FOLDER_NAME: &str = "_Search";

pub struct SearchResultDir {
    folder_name: String,
    modified: DateTime<Utc>,
    children: RwLock<HashMap<String, FsEntry>>,
}

impl Default for SearchResultDir {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchResultDir {
    pub fn new() -> Self {
        Self {
            folder_name: SEARCH_FOLDER_NAME.to_string(),
            modified: Utc::now(),
            children: RwLock::new(HashMap::new()),
        }
    }

    pub fn child(&self, name: &str) -> Option<FsEntry> {
        self.children.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<EntryRef> {
        self.children.read().values().map(FsEntry::entry).collect()
    }

    /// Replace the result set. Asset directories from the previous set are
    /// closed; nodes never appear here.
    pub async fn set_children(&self, children: HashMap<String, FsEntry>) {
        let previous = std::mem::replace(&mut *self.children.write(), children);
        for (_, entry) in previous {
            if let FsEntry::Asset(asset) = entry {
                asset.close().await;
            }
        }
    }

    pub async fn close(&self) {
        let previous = std::mem::take(&mut *self.children.write());
        for (_, entry) in previous {
            if let FsEntry::Asset(asset) = entry {
                asset.close().await;
            }
        }
    }
}

impl DirEntry for SearchResultDir {
    fn name(&self) -> &str {
        &self.folder_name
    }

    fn mode(&self) -> u32 {
        0o444 | MODE_DIR
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_dir(&self) -> bool {
        true
    }
}
