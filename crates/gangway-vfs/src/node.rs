//! Organizational-node directories
//!
//! A `NodeDir` mirrors one node of the management plane's tree. Children are
//! fetched exactly once, on first visit: sub-nodes recurse, assets become
//! [`AssetDir`]s when they speak SSH, disabled items are skipped. Folder
//! names are made unique within the directory by replacing `/` with `_` and
//! suffixing `_` until free.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

use gangway_core::{Node, TreeItem};

use crate::asset::AssetDir;
use crate::context::VfsContext;
use crate::entry::{DirEntry, EntryRef, MODE_DIR};

/// A child of a node directory: either another node or an asset leaf.
#[derive(Clone)]
pub enum FsEntry {
    Node(Arc<NodeDir>),
    Asset(Arc<AssetDir>),
}

impl FsEntry {
    pub fn entry(&self) -> EntryRef {
        match self {
            FsEntry::Node(node) => node.clone(),
            FsEntry::Asset(asset) => asset.clone(),
        }
    }

    pub async fn close(&self) {
        match self {
            FsEntry::Node(node) => Box::pin(node.close()).await,
            FsEntry::Asset(asset) => asset.close().await,
        }
    }
}

pub struct NodeDir {
    node: Node,
    folder_name: String,
    modified: DateTime<Utc>,
    children: OnceCell<HashMap<String, FsEntry>>,
}

impl NodeDir {
    pub fn new(node: Node) -> Self {
        let folder_name = node.value.replace('/', "_");
        Self {
            node,
            folder_name,
            modified: Utc::now(),
            children: OnceCell::new(),
        }
    }

    /// Rename on insertion when the parent already holds the name.
    pub fn set_folder_name(&mut self, name: String) {
        self.folder_name = name;
    }

    /// Children of this node, fetched on first access. Concurrent callers
    /// block on the one in-flight load; a directory-service failure leaves
    /// the node empty for the rest of the session.
    pub async fn children(&self, ctx: &Arc<VfsContext>) -> &HashMap<String, FsEntry> {
        self.children
            .get_or_init(|| async {
                match ctx
                    .directory
                    .get_node_tree(&ctx.user.id, &self.node.key)
                    .await
                {
                    Ok(items) => build_children(ctx, items),
                    Err(err) => {
                        warn!(
                            event = "node_load_failed",
                            node = %self.node.value,
                            key = %self.node.key,
                            error = %err,
                            "node degrades to empty"
                        );
                        HashMap::new()
                    }
                }
            })
            .await
    }

    pub async fn list(&self, ctx: &Arc<VfsContext>) -> Vec<EntryRef> {
        self.children(ctx)
            .await
            .values()
            .map(FsEntry::entry)
            .collect()
    }

    pub async fn close(&self) {
        if let Some(children) = self.children.get() {
            for child in children.values() {
                child.close().await;
            }
        }
    }
}

impl DirEntry for NodeDir {
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

/// Build a child map from tree items, skipping disabled entries and assets
/// without SSH, deduplicating folder names as they land.
pub(crate) fn build_children(
    ctx: &Arc<VfsContext>,
    items: Vec<TreeItem>,
) -> HashMap<String, FsEntry> {
    let mut children: HashMap<String, FsEntry> = HashMap::new();

    for item in items {
        if item.chk_disabled {
            continue;
        }
        if item.is_node() {
            let node = match item.as_node() {
                Ok(node) => node,
                Err(err) => {
                    warn!(event = "tree_item_skipped", error = %err, "undecodable node meta");
                    continue;
                }
            };
            let mut dir = NodeDir::new(node);
            let name = unique_name(&children, dir.name().to_string());
            dir.set_folder_name(name.clone());
            children.insert(name, FsEntry::Node(Arc::new(dir)));
        } else if item.is_asset() {
            let asset = match item.as_asset() {
                Ok(asset) => asset,
                Err(err) => {
                    warn!(event = "tree_item_skipped", error = %err, "undecodable asset meta");
                    continue;
                }
            };
            if !asset.supports_protocol("ssh") {
                continue;
            }
            let mut dir = AssetDir::new(ctx.clone(), asset);
            let name = unique_name(&children, dir.name().to_string());
            dir.set_folder_name(name.clone());
            children.insert(name, FsEntry::Asset(Arc::new(dir)));
        }
    }

    children
}

/// Suffix `_` until the name is free in `taken`.
pub(crate) fn unique_name(taken: &HashMap<String, FsEntry>, base: String) -> String {
    let mut name = base;
    while taken.contains_key(&name) {
        name.push('_');
    }
    name
}
