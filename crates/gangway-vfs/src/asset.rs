//! Per-asset directory
//!
//! NIST 800-53: AC-3 (Access Enforcement), AU-2 (Audit Events)
//! Implementation: every file operation on an asset resolves a credential,
//! checks its action set, rewrites the path into the credential's sandbox
//! and forwards to a cached or freshly brokered SFTP connection. Mutating
//! operations emit exactly one audit record, success or failure.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;

use gangway_core::{Action, Asset, Credential, Domain, FtpLog, Operate};

use crate::connection::SftpConnection;
use crate::context::VfsContext;
use crate::entry::{sort_by_name, DirEntry, EntryRef, FakeFileInfo, MODE_DIR};
use crate::error::{Error, Result};
use crate::resolver;
use crate::ssh::{RemoteFile, SftpHandle};

/// Credentials and connection metadata, loaded at most once per session.
///
/// A directory-service failure mid-load keeps whatever was fetched so far,
/// possibly nothing, and is not retried; the asset then answers
/// `NoCredential` for everything.
struct CredentialState {
    /// Folder name → credential. Folder names are unique within the asset.
    users: parking_lot::RwLock<HashMap<String, Credential>>,
    /// Refreshed asset detail (the tree fetch omits gateway metadata).
    asset: Asset,
    domain: Option<Domain>,
}

pub struct AssetDir {
    ctx: Arc<VfsContext>,
    asset: Asset,
    folder_name: String,
    modified: DateTime<Utc>,
    state: OnceCell<CredentialState>,
    /// Credential id → live connection. The lock is held across
    /// lookup-or-create, so fresh setup is serialized per asset.
    connections: Mutex<HashMap<String, Arc<SftpConnection>>>,
}

impl AssetDir {
    pub fn new(ctx: Arc<VfsContext>, asset: Asset) -> Self {
        let folder_name = asset.hostname.replace('/', "_");
        Self {
            ctx,
            asset,
            folder_name,
            modified: Utc::now(),
            state: OnceCell::new(),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset.id
    }

    /// Rename on insertion when the parent already holds the name.
    pub fn set_folder_name(&mut self, name: String) {
        self.folder_name = name;
    }

    async fn state(&self) -> &CredentialState {
        self.state.get_or_init(|| self.load_state()).await
    }

    async fn load_state(&self) -> CredentialState {
        let mut users = HashMap::new();
        let mut asset = self.asset.clone();
        let mut domain = None;

        'load: {
            let fetched = match self
                .ctx
                .directory
                .get_system_users(&self.ctx.user.id, &self.asset.id)
                .await
            {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!(
                        event = "credential_load_failed",
                        hostname = %self.asset.hostname,
                        error = %err,
                        "asset degrades to an empty credential map"
                    );
                    break 'load;
                }
            };

            for credential in fetched {
                if !credential.protocol.eq_ignore_ascii_case("ssh") {
                    continue;
                }
                let mut folder = credential.name.replace('/', "_");
                while users.contains_key(&folder) {
                    folder.push('_');
                }
                users.insert(folder, credential);
            }

            // The tree fetch strips gateway metadata; re-fetch the detail.
            match self.ctx.directory.get_asset(&self.asset.id).await {
                Ok(detail) if detail.id == self.asset.id => asset = detail,
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        event = "asset_detail_failed",
                        hostname = %self.asset.hostname,
                        error = %err,
                        "keeping tree-level asset record"
                    );
                    break 'load;
                }
            }

            if let Some(domain_id) = asset.domain.clone().filter(|d| !d.is_empty()) {
                match self.ctx.directory.get_domain_gateways(&domain_id).await {
                    Ok(fetched) => domain = Some(fetched),
                    Err(err) => warn!(
                        event = "domain_load_failed",
                        hostname = %asset.hostname,
                        domain = %domain_id,
                        error = %err,
                        "asset will be dialed without gateways"
                    ),
                }
            }
        }

        CredentialState {
            users: parking_lot::RwLock::new(users),
            asset,
            domain,
        }
    }

    /// The single credential's folder name, when the credential layer is
    /// collapsed.
    fn unique_folder(state: &CredentialState) -> Option<String> {
        let users = state.users.read();
        if users.len() == 1 {
            users.keys().next().cloned()
        } else {
            None
        }
    }

    /// Split `path` into the operating credential folder and the sandbox
    /// remainder. With multiple credentials visible, an empty remainder is a
    /// destructive operation on the credential layer itself and is refused.
    fn resolve_path<'p>(
        &self,
        state: &CredentialState,
        path: &'p str,
    ) -> Result<(String, Vec<&'p str>)> {
        let mut segments = resolver::split_path(path);
        match Self::unique_folder(state) {
            Some(folder) => Ok((folder, segments)),
            None => {
                if segments.is_empty() {
                    return Err(Error::PermissionDenied(
                        "operation addresses the credential layer".into(),
                    ));
                }
                let folder = segments.remove(0).to_string();
                Ok((folder, segments))
            }
        }
    }

    fn credential_named(&self, state: &CredentialState, folder: &str) -> Result<Credential> {
        state.users.read().get(folder).cloned().ok_or_else(|| {
            Error::NoCredential(format!(
                "no credential folder {:?} under {}",
                folder, self.folder_name
            ))
        })
    }

    fn require(credential: &Credential, action: Action) -> Result<()> {
        if credential.allows(action) {
            return Ok(());
        }
        Err(Error::PermissionDenied(format!(
            "credential {} lacks {:?}",
            credential.name, action
        )))
    }

    /// Cached connection for the credential, or a freshly brokered one.
    ///
    /// Holding the map lock across the broker call keeps concurrent fresh
    /// setups for the same credential down to one. Credential mutations the
    /// broker makes (secret refresh, adopted username) are written back so
    /// they persist for the session.
    async fn connection(
        &self,
        state: &CredentialState,
        folder: &str,
        credential: &Credential,
    ) -> Result<Arc<SftpConnection>> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(&credential.id) {
            return Ok(conn.clone());
        }

        let mut fresh = credential.clone();
        match self
            .ctx
            .broker
            .connect(&self.ctx.user, &state.asset, &mut fresh, state.domain.as_ref())
            .await
        {
            Ok(conn) => {
                let conn = Arc::new(conn);
                connections.insert(fresh.id.clone(), conn.clone());
                state.users.write().insert(folder.to_string(), fresh);
                Ok(conn)
            }
            Err(err) => {
                warn!(
                    event = "sftp_connect_failed",
                    hostname = %state.asset.hostname,
                    credential = %credential.name,
                    error = %err,
                    "broker produced no connection"
                );
                Err(Error::ConnectionLost(err.to_string()))
            }
        }
    }

    async fn sftp_and_real_path(
        &self,
        state: &CredentialState,
        folder: &str,
        credential: &Credential,
        segments: &[&str],
    ) -> Result<(Arc<SftpConnection>, String)> {
        let conn = self.connection(state, folder, credential).await?;
        let real = resolver::sandbox_path(&credential.sftp_root, conn.home_dir(), &segments.join("/"));
        Ok((conn, real))
    }

    fn audit(
        &self,
        state: &CredentialState,
        credential: &Credential,
        operate: Operate,
        path: &str,
        is_success: bool,
    ) {
        self.ctx.audit.send(FtpLog {
            user: self.ctx.user.display(),
            hostname: state.asset.hostname.clone(),
            org_id: state.asset.org_id.clone(),
            system_user: credential.name.clone(),
            remote_addr: self.ctx.remote_addr.clone(),
            operate,
            path: path.to_string(),
            date_start: Utc::now(),
            is_success,
        });
    }

    pub async fn create(&self, path: &str) -> Result<RemoteFile> {
        let state = self.state().await;
        let (folder, rest) = self.resolve_path(state, path)?;
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Upload)?;

        let (conn, real) = self.sftp_and_real_path(state, &folder, &credential, &rest).await?;
        let result = conn.sftp().create(&real).await;
        self.audit(state, &credential, Operate::Upload, &real, result.is_ok());
        result
    }

    pub async fn open(&self, path: &str) -> Result<RemoteFile> {
        let state = self.state().await;
        let (folder, rest) = self.resolve_path(state, path)?;
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Download)?;

        let (conn, real) = self.sftp_and_real_path(state, &folder, &credential, &rest).await?;
        let result = conn.sftp().open(&real).await;
        self.audit(state, &credential, Operate::Download, &real, result.is_ok());
        result
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<EntryRef>> {
        let state = self.state().await;
        let mut segments = resolver::split_path(path);
        let folder = match Self::unique_folder(state) {
            Some(folder) => folder,
            None => {
                if segments.is_empty() {
                    // Listing the credential layer never touches the network.
                    let users = state.users.read();
                    let mut entries: Vec<EntryRef> = users
                        .keys()
                        .map(|name| Arc::new(FakeFileInfo::dir(name.clone())) as EntryRef)
                        .collect();
                    sort_by_name(&mut entries);
                    return Ok(entries);
                }
                segments.remove(0).to_string()
            }
        };
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Connect)?;

        let (conn, real) = self
            .sftp_and_real_path(state, &folder, &credential, &segments)
            .await?;
        let mut listing = conn.sftp().read_dir(&real).await?;
        if !self.ctx.config.show_hidden {
            listing.retain(|entry| !entry.name.starts_with('.'));
        }
        Ok(listing
            .into_iter()
            .map(|stat| Arc::new(stat) as EntryRef)
            .collect())
    }

    pub async fn read_link(&self, path: &str) -> Result<String> {
        let state = self.state().await;
        let mut segments = resolver::split_path(path);
        if segments.is_empty() {
            return Err(Error::NotSupported("readlink on the asset root".into()));
        }
        let folder = match Self::unique_folder(state) {
            Some(folder) => folder,
            None => segments.remove(0).to_string(),
        };
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Connect)?;

        let (conn, real) = self
            .sftp_and_real_path(state, &folder, &credential, &segments)
            .await?;
        conn.sftp().read_link(&real).await
    }

    pub async fn stat(self: &Arc<Self>, path: &str) -> Result<EntryRef> {
        let state = self.state().await;
        let mut segments = resolver::split_path(path);
        if segments.is_empty() {
            return Ok(self.clone() as EntryRef);
        }
        let folder = match Self::unique_folder(state) {
            Some(folder) => folder,
            None => segments.remove(0).to_string(),
        };
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Connect)?;

        let (conn, real) = self
            .sftp_and_real_path(state, &folder, &credential, &segments)
            .await?;
        let stat = conn.sftp().stat(&real).await?;
        Ok(Arc::new(stat) as EntryRef)
    }

    pub async fn mkdir_all(&self, path: &str) -> Result<()> {
        let state = self.state().await;
        let (folder, rest) = self.resolve_path(state, path)?;
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Upload)?;

        let (conn, real) = self.sftp_and_real_path(state, &folder, &credential, &rest).await?;
        let result = conn.sftp().mkdir_all(&real).await;
        self.audit(state, &credential, Operate::Mkdir, &real, result.is_ok());
        result
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        let state = self.state().await;
        let (folder, rest) = self.resolve_path(state, path)?;
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Upload)?;

        let (conn, real) = self.sftp_and_real_path(state, &folder, &credential, &rest).await?;
        let result = conn.sftp().remove(&real).await;
        self.audit(state, &credential, Operate::Delete, &real, result.is_ok());
        result
    }

    /// Recursive removal: files first, subtrees bottom-up, the root last.
    /// The first remote failure aborts the walk.
    pub async fn remove_directory(&self, path: &str) -> Result<()> {
        let state = self.state().await;
        let (folder, rest) = self.resolve_path(state, path)?;
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Upload)?;

        let (conn, real) = self.sftp_and_real_path(state, &folder, &credential, &rest).await?;
        let result = remove_dir_all(conn.sftp(), &real).await;
        self.audit(state, &credential, Operate::RemoveDir, &real, result.is_ok());
        result
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let state = self.state().await;
        let mut old_segments = resolver::split_path(old_path);
        let mut new_segments = resolver::split_path(new_path);

        let folder = match Self::unique_folder(state) {
            Some(folder) => folder,
            None => {
                if old_segments.first() != new_segments.first() {
                    return Err(Error::NoSuchFile("rename crosses credential folders".into()));
                }
                if old_segments.is_empty() {
                    return Err(Error::NoCredential("rename on the credential layer".into()));
                }
                new_segments.remove(0);
                old_segments.remove(0).to_string()
            }
        };
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Upload)?;

        let (old_conn, old_real) = self
            .sftp_and_real_path(state, &folder, &credential, &old_segments)
            .await?;
        let (new_conn, new_real) = self
            .sftp_and_real_path(state, &folder, &credential, &new_segments)
            .await?;
        if !Arc::ptr_eq(&old_conn, &new_conn) {
            return Err(Error::NotSupported("rename across connections".into()));
        }

        let result = old_conn.sftp().rename(&old_real, &new_real).await;
        let trail = format!("{}=>{}", old_real, new_real);
        self.audit(state, &credential, Operate::Rename, &trail, result.is_ok());
        result
    }

    pub async fn symlink(&self, old_path: &str, new_path: &str) -> Result<()> {
        let state = self.state().await;
        let mut old_segments = resolver::split_path(old_path);
        let mut new_segments = resolver::split_path(new_path);

        let folder = match Self::unique_folder(state) {
            Some(folder) => folder,
            None => {
                if old_segments.first() != new_segments.first() || old_segments.is_empty() {
                    return Err(Error::NoCredential("symlink crosses credential folders".into()));
                }
                new_segments.remove(0);
                old_segments.remove(0).to_string()
            }
        };
        let credential = self.credential_named(state, &folder)?;
        Self::require(&credential, Action::Upload)?;

        let (old_conn, old_real) = self
            .sftp_and_real_path(state, &folder, &credential, &old_segments)
            .await?;
        let (new_conn, new_real) = self
            .sftp_and_real_path(state, &folder, &credential, &new_segments)
            .await?;
        if !Arc::ptr_eq(&old_conn, &new_conn) {
            return Err(Error::NotSupported("symlink across connections".into()));
        }

        let result = old_conn.sftp().symlink(&old_real, &new_real).await;
        let trail = format!("{}=>{}", old_real, new_real);
        self.audit(state, &credential, Operate::Symlink, &trail, result.is_ok());
        result
    }

    /// Close every live connection. Idempotent; connections already closed
    /// by their own teardown are skipped by their close guard.
    pub async fn close(&self) {
        let mut connections = self.connections.lock().await;
        for (_, conn) in connections.drain() {
            conn.close().await;
        }
    }
}

async fn remove_dir_all(sftp: &Arc<dyn SftpHandle>, path: &str) -> Result<()> {
    let entries = sftp.read_dir(path).await?;
    for entry in entries {
        let child = format!("{}/{}", path.trim_end_matches('/'), entry.name);
        if entry.is_dir {
            Box::pin(remove_dir_all(sftp, &child)).await?;
        } else {
            sftp.remove(&child).await?;
        }
    }
    sftp.remove_dir(path).await
}

impl DirEntry for AssetDir {
    fn name(&self) -> &str {
        &self.folder_name
    }

    /// `0644` marks a collapsed credential layer, `0444` a visible one.
    fn mode(&self) -> u32 {
        let multiple = self
            .state
            .get()
            .map(|state| state.users.read().len() > 1)
            .unwrap_or(false);
        if multiple {
            0o444 | MODE_DIR
        } else {
            0o644 | MODE_DIR
        }
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_dir(&self) -> bool {
        true
    }
}
