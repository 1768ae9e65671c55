//! Session root of the virtual filesystem
//!
//! One `UserVfs` per SFTP session. It owns the user's top-level tree and the
//! `_Search` directory, walks incoming absolute paths down to the asset they
//! address, and forwards the remainder. Operations that never leave the
//! virtual levels are answered locally: listings list, stat describes, and
//! anything destructive is refused.

use std::collections::HashMap;
use std::sync::Arc;

use gangway_core::Node;

use crate::asset::AssetDir;
use crate::context::VfsContext;
use crate::entry::{sort_by_name, DirEntry, EntryRef};
use crate::error::{Error, Result};
use crate::node::{unique_name, FsEntry, NodeDir};
use crate::resolver;
use crate::search::{SearchResultDir, SEARCH_FOLDER_NAME};
use crate::ssh::RemoteFile;

/// Where a virtual path lands.
enum Target {
    Root,
    Search,
    Node(Arc<NodeDir>),
    /// The asset plus the path remainder below it.
    Asset(Arc<AssetDir>, String),
}

pub struct UserVfs {
    ctx: Arc<VfsContext>,
    root: Arc<NodeDir>,
    search: Arc<SearchResultDir>,
}

impl UserVfs {
    pub fn new(ctx: Arc<VfsContext>) -> Self {
        let root = Arc::new(NodeDir::new(Node {
            id: String::new(),
            key: String::new(),
            value: "/".to_string(),
        }));
        Self {
            ctx,
            root,
            search: Arc::new(SearchResultDir::new()),
        }
    }

    pub fn context(&self) -> &Arc<VfsContext> {
        &self.ctx
    }

    async fn resolve(&self, path: &str) -> Result<Target> {
        let segments = resolver::split_path(path);
        if segments.is_empty() {
            return Ok(Target::Root);
        }

        let (mut entry, mut index) = if segments[0] == SEARCH_FOLDER_NAME {
            if segments.len() == 1 {
                return Ok(Target::Search);
            }
            let child = self
                .search
                .child(segments[1])
                .ok_or_else(|| not_found(path))?;
            (child, 2)
        } else {
            let children = self.root.children(&self.ctx).await;
            let child = children
                .get(segments[0])
                .cloned()
                .ok_or_else(|| not_found(path))?;
            (child, 1)
        };

        loop {
            entry = match entry {
                FsEntry::Asset(asset) => {
                    return Ok(Target::Asset(asset, segments[index..].join("/")));
                }
                FsEntry::Node(node) => {
                    if index == segments.len() {
                        return Ok(Target::Node(node));
                    }
                    let next = node
                        .children(&self.ctx)
                        .await
                        .get(segments[index])
                        .cloned()
                        .ok_or_else(|| not_found(path))?;
                    index += 1;
                    next
                }
            };
        }
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<EntryRef>> {
        let mut entries = match self.resolve(path).await? {
            Target::Root => {
                let mut entries = self.root.list(&self.ctx).await;
                entries.push(self.search.clone());
                entries
            }
            Target::Search => self.search.list(),
            Target::Node(node) => node.list(&self.ctx).await,
            Target::Asset(asset, rest) => asset.read_dir(&rest).await?,
        };
        sort_by_name(&mut entries);
        Ok(entries)
    }

    pub async fn stat(&self, path: &str) -> Result<EntryRef> {
        match self.resolve(path).await? {
            Target::Root => Ok(self.root.clone()),
            Target::Search => Ok(self.search.clone()),
            Target::Node(node) => Ok(node),
            Target::Asset(asset, rest) => asset.stat(&rest).await,
        }
    }

    pub async fn read_link(&self, path: &str) -> Result<String> {
        match self.resolve(path).await? {
            Target::Asset(asset, rest) => asset.read_link(&rest).await,
            _ => Err(Error::NotSupported("readlink on a virtual directory".into())),
        }
    }

    pub async fn create(&self, path: &str) -> Result<RemoteFile> {
        match self.resolve(path).await? {
            Target::Asset(asset, rest) => asset.create(&rest).await,
            _ => Err(virtual_write(path)),
        }
    }

    pub async fn open(&self, path: &str) -> Result<RemoteFile> {
        match self.resolve(path).await? {
            Target::Asset(asset, rest) => asset.open(&rest).await,
            _ => Err(Error::PermissionDenied(format!(
                "{:?} is a virtual directory",
                path
            ))),
        }
    }

    pub async fn mkdir_all(&self, path: &str) -> Result<()> {
        match self.resolve(path).await? {
            Target::Asset(asset, rest) => asset.mkdir_all(&rest).await,
            _ => Err(virtual_write(path)),
        }
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        match self.resolve(path).await? {
            Target::Asset(asset, rest) => asset.remove(&rest).await,
            _ => Err(virtual_write(path)),
        }
    }

    pub async fn remove_directory(&self, path: &str) -> Result<()> {
        match self.resolve(path).await? {
            Target::Asset(asset, rest) => asset.remove_directory(&rest).await,
            _ => Err(virtual_write(path)),
        }
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        match (self.resolve(old_path).await?, self.resolve(new_path).await?) {
            (Target::Asset(old_asset, old_rest), Target::Asset(new_asset, new_rest)) => {
                if !Arc::ptr_eq(&old_asset, &new_asset) {
                    return Err(Error::NoSuchFile("rename crosses assets".into()));
                }
                old_asset.rename(&old_rest, &new_rest).await
            }
            _ => Err(virtual_write(old_path)),
        }
    }

    pub async fn symlink(&self, old_path: &str, new_path: &str) -> Result<()> {
        match (self.resolve(old_path).await?, self.resolve(new_path).await?) {
            (Target::Asset(old_asset, old_rest), Target::Asset(new_asset, new_rest)) => {
                if !Arc::ptr_eq(&old_asset, &new_asset) {
                    return Err(Error::NotSupported("symlink crosses assets".into()));
                }
                old_asset.symlink(&old_rest, &new_rest).await
            }
            _ => Err(virtual_write(old_path)),
        }
    }

    /// Run a search query and replace the `_Search` children with the
    /// matching SSH assets.
    pub async fn search(&self, query: &str) -> Result<()> {
        let assets = self
            .ctx
            .directory
            .search_assets(&self.ctx.user.id, query)
            .await?;

        let mut children: HashMap<String, FsEntry> = HashMap::new();
        for asset in assets {
            if !asset.is_active || !asset.supports_protocol("ssh") {
                continue;
            }
            let mut dir = AssetDir::new(self.ctx.clone(), asset);
            let name = unique_name(&children, dir.name().to_string());
            dir.set_folder_name(name.clone());
            children.insert(name, FsEntry::Asset(Arc::new(dir)));
        }
        self.search.set_children(children).await;
        Ok(())
    }

    /// Close every connection held anywhere in the tree. Idempotent.
    pub async fn close(&self) {
        self.root.close().await;
        self.search.close().await;
    }
}

fn not_found(path: &str) -> Error {
    Error::NoSuchFile(path.to_string())
}

fn virtual_write(path: &str) -> Error {
    Error::PermissionDenied(format!("{:?} is outside any asset", path))
}
