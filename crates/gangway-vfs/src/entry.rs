//! Directory-entry surface shared by virtual and remote entries
//!
//! Everything the SFTP server front-end asks of a listing (name, size, mode,
//! modification time) is answered through [`DirEntry`], whether the entry is
//! a synthetic directory, a placeholder, or a real file on a remote asset.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Directory bit in a unix mode word.
pub const MODE_DIR: u32 = 0o040000;
/// Symlink bit in a unix mode word.
pub const MODE_SYMLINK: u32 = 0o120000;

/// Stat shell reported for synthetic entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnixStat {
    pub uid: u32,
    pub gid: u32,
}

/// Metadata capabilities of one directory entry.
pub trait DirEntry: Send + Sync {
    fn name(&self) -> &str;
    fn size(&self) -> u64 {
        0
    }
    /// Unix mode word, file-type bits included.
    fn mode(&self) -> u32;
    fn modified(&self) -> DateTime<Utc>;
    fn is_dir(&self) -> bool;
    /// Ownership shell; synthetic entries report root:root.
    fn sys(&self) -> UnixStat {
        UnixStat::default()
    }
}

/// Shared handle to any listable entry.
pub type EntryRef = Arc<dyn DirEntry>;

/// Order a listing by name ascending, the order SFTP clients expect.
pub fn sort_by_name(entries: &mut [EntryRef]) {
    entries.sort_by(|a, b| a.name().cmp(b.name()));
}

/// Stat-shape value for entries that exist only in the virtual tree: the
/// credential folders under an asset and placeholder leaves.
#[derive(Debug, Clone)]
pub struct FakeFileInfo {
    name: String,
    size: u64,
    modified: DateTime<Utc>,
    is_dir: bool,
    symlink: Option<String>,
}

impl FakeFileInfo {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            modified: Utc::now(),
            is_dir: false,
            symlink: None,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            is_dir: true,
            ..Self::file(name)
        }
    }

    pub fn symlink(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            symlink: Some(name.clone()),
            ..Self::file(name)
        }
    }
}

impl DirEntry for FakeFileInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mode(&self) -> u32 {
        // The symlink shape wins over the directory shape.
        if self.symlink.is_some() {
            return 0o777 | MODE_SYMLINK;
        }
        if self.is_dir {
            return 0o755 | MODE_DIR;
        }
        0o644
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// Metadata of a real entry on a remote asset, as returned by the SFTP
/// backend.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl FileStat {
    pub fn regular(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mode: 0o644,
            modified: Utc::now(),
            is_dir: false,
            is_symlink: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            mode: 0o755 | MODE_DIR,
            modified: Utc::now(),
            is_dir: true,
            is_symlink: false,
        }
    }
}

impl DirEntry for FileStat {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mode(&self) -> u32 {
        self.mode
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}
