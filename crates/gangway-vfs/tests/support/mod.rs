//! Shared fixtures: an in-memory directory service and SSH backend.

// Each test binary compiles this module separately and uses a different
// slice of it.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use gangway_core::{
    Action, Asset, Credential, CredentialAuth, Domain, Protocol, TreeItem, TreeMeta, User,
};
use gangway_vfs::{
    audit_channel, AuditSender, Config, DirectoryService, Error, FileStat, RemoteFile, Result,
    SftpHandle, SshBackend, SshClientOptions, SshSessionHandle, SshTransport, UserVfs, VfsContext,
};

pub fn user() -> User {
    User {
        id: "u1".into(),
        name: "Ada".into(),
        username: "ada".into(),
    }
}

pub fn asset(id: &str, hostname: &str) -> Asset {
    Asset {
        id: id.into(),
        hostname: hostname.into(),
        ip: "10.0.0.5".into(),
        org_id: "o1".into(),
        domain: None,
        protocols: vec![Protocol {
            name: "ssh".into(),
            port: 22,
        }],
        is_active: true,
    }
}

pub fn credential(id: &str, name: &str, actions: &[Action], sftp_root: &str) -> Credential {
    Credential {
        id: id.into(),
        name: name.into(),
        username: name.into(),
        protocol: "ssh".into(),
        sftp_root: sftp_root.into(),
        actions: actions.to_vec(),
        password: Some("pw".into()),
        private_key: None,
    }
}

pub fn node_item(id: &str, key: &str, value: &str) -> TreeItem {
    TreeItem {
        chk_disabled: false,
        meta: TreeMeta {
            kind: "node".into(),
            data: serde_json::json!({ "id": id, "key": key, "value": value }),
        },
    }
}

pub fn asset_item(asset: &Asset) -> TreeItem {
    TreeItem {
        chk_disabled: false,
        meta: TreeMeta {
            kind: "asset".into(),
            data: serde_json::to_value(asset).unwrap(),
        },
    }
}

pub fn disabled_item(asset: &Asset) -> TreeItem {
    TreeItem {
        chk_disabled: true,
        meta: TreeMeta {
            kind: "asset".into(),
            data: serde_json::to_value(asset).unwrap(),
        },
    }
}

/// Scriptable in-memory directory service with per-method call counters.
#[derive(Default)]
pub struct MockDirectory {
    pub tree: Mutex<HashMap<String, Vec<TreeItem>>>,
    pub credentials: Mutex<HashMap<String, Vec<Credential>>>,
    pub assets: Mutex<HashMap<String, Asset>>,
    pub domains: Mutex<HashMap<String, Domain>>,
    pub auth: Mutex<HashMap<String, CredentialAuth>>,
    pub search_results: Mutex<Vec<Asset>>,
    pub tree_calls: AtomicUsize,
    pub credential_calls: AtomicUsize,
    pub auth_calls: AtomicUsize,
    pub fail_credentials: AtomicBool,
    pub fail_tree: AtomicBool,
}

impl MockDirectory {
    pub fn with_tree(self, key: &str, items: Vec<TreeItem>) -> Self {
        self.tree.lock().insert(key.to_string(), items);
        self
    }

    pub fn with_credentials(self, asset_id: &str, creds: Vec<Credential>) -> Self {
        self.credentials.lock().insert(asset_id.to_string(), creds);
        self
    }

    pub fn with_asset(self, asset: Asset) -> Self {
        self.assets.lock().insert(asset.id.clone(), asset);
        self
    }

    pub fn with_domain(self, domain: Domain) -> Self {
        self.domains.lock().insert(domain.id.clone(), domain);
        self
    }
}

#[async_trait]
impl DirectoryService for MockDirectory {
    async fn get_node_tree(&self, _user_id: &str, node_key: &str) -> Result<Vec<TreeItem>> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tree.load(Ordering::SeqCst) {
            return Err(Error::Directory("injected tree failure".into()));
        }
        Ok(self.tree.lock().get(node_key).cloned().unwrap_or_default())
    }

    async fn get_system_users(&self, _user_id: &str, asset_id: &str) -> Result<Vec<Credential>> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(Error::Directory("injected credential failure".into()));
        }
        Ok(self
            .credentials
            .lock()
            .get(asset_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Asset> {
        self.assets
            .lock()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| Error::Directory(format!("unknown asset {}", asset_id)))
    }

    async fn get_domain_gateways(&self, domain_id: &str) -> Result<Domain> {
        self.domains
            .lock()
            .get(domain_id)
            .cloned()
            .ok_or_else(|| Error::Directory(format!("unknown domain {}", domain_id)))
    }

    async fn get_system_user_auth(
        &self,
        credential_id: &str,
        _asset_id: &str,
        _user_id: &str,
        _username: &str,
    ) -> Result<CredentialAuth> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.auth
            .lock()
            .get(credential_id)
            .cloned()
            .ok_or_else(|| Error::Directory(format!("no auth for {}", credential_id)))
    }

    async fn search_assets(&self, _user_id: &str, _query: &str) -> Result<Vec<Asset>> {
        Ok(self.search_results.lock().clone())
    }
}

/// In-memory remote filesystem behind the mock SSH backend. Listings are
/// scripted per absolute path; every forwarded operation is appended to
/// `ops`, and ops named in `fail_ops` return not-found.
#[derive(Default)]
pub struct MockFs {
    pub home: String,
    pub dirs: Mutex<HashMap<String, Vec<FileStat>>>,
    pub ops: Mutex<Vec<String>>,
    pub fail_ops: Mutex<HashSet<String>>,
}

impl MockFs {
    pub fn new(home: &str) -> Arc<Self> {
        Arc::new(Self {
            home: home.into(),
            ..Self::default()
        })
    }

    pub fn with_dir(self: &Arc<Self>, path: &str, entries: Vec<FileStat>) -> Arc<Self> {
        self.dirs.lock().insert(path.to_string(), entries);
        self.clone()
    }

    pub fn fail(self: &Arc<Self>, op: &str) {
        self.fail_ops.lock().insert(op.to_string());
    }

    pub fn recorded(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    fn record(&self, op: String) -> Result<()> {
        let failing = self.fail_ops.lock().contains(&op);
        self.ops.lock().push(op.clone());
        if failing {
            return Err(Error::NoSuchFile(op));
        }
        Ok(())
    }
}

/// Mock SSH backend: one dial record per `open_client`, sessions served from
/// the shared [`MockFs`].
#[derive(Default)]
pub struct MockBackend {
    pub fs: Mutex<HashMap<String, Arc<MockFs>>>,
    pub default_fs: Mutex<Option<Arc<MockFs>>>,
    pub dials: Mutex<Vec<SshClientOptions>>,
    pub fail_connect: AtomicBool,
}

impl MockBackend {
    pub fn serving(fs: Arc<MockFs>) -> Arc<Self> {
        let backend = Self::default();
        *backend.default_fs.lock() = Some(fs);
        Arc::new(backend)
    }

    /// Serve a dedicated filesystem for one username.
    pub fn serving_user(self: &Arc<Self>, username: &str, fs: Arc<MockFs>) -> Arc<Self> {
        self.fs.lock().insert(username.to_string(), fs);
        self.clone()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().len()
    }
}

#[async_trait]
impl SshBackend for MockBackend {
    async fn open_client(&self, options: &SshClientOptions) -> Result<Box<dyn SshTransport>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Ssh("injected dial failure".into()));
        }
        self.dials.lock().push(options.clone());
        let fs = self
            .fs
            .lock()
            .get(&options.username)
            .cloned()
            .or_else(|| self.default_fs.lock().clone())
            .ok_or_else(|| Error::Ssh("no filesystem scripted".into()))?;
        Ok(Box::new(MockTransport { fs }))
    }
}

pub struct MockTransport {
    fs: Arc<MockFs>,
}

#[async_trait]
impl SshTransport for MockTransport {
    async fn open_session(&self) -> Result<Box<dyn SshSessionHandle>> {
        Ok(Box::new(MockSession {
            fs: self.fs.clone(),
        }))
    }

    async fn close(&self) {}
}

pub struct MockSession {
    fs: Arc<MockFs>,
}

#[async_trait]
impl SshSessionHandle for MockSession {
    async fn start_sftp(self: Box<Self>) -> Result<Arc<dyn SftpHandle>> {
        let (closed_tx, _) = watch::channel(false);
        Ok(Arc::new(MockSftp {
            fs: self.fs,
            closed_tx,
        }))
    }
}

pub struct MockSftp {
    fs: Arc<MockFs>,
    closed_tx: watch::Sender<bool>,
}

#[async_trait]
impl SftpHandle for MockSftp {
    async fn home_dir(&self) -> Result<String> {
        Ok(self.fs.home.clone())
    }

    async fn create(&self, path: &str) -> Result<RemoteFile> {
        self.fs.record(format!("create {}", path))?;
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn open(&self, path: &str) -> Result<RemoteFile> {
        self.fs.record(format!("open {}", path))?;
        Ok(Box::new(Cursor::new(b"remote contents".to_vec())))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileStat>> {
        self.fs.record(format!("read_dir {}", path))?;
        self.fs
            .dirs
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NoSuchFile(path.to_string()))
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.fs.record(format!("read_link {}", path))?;
        Ok(format!("{}.target", path))
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        self.fs.record(format!("stat {}", path))?;
        let name = path.rsplit('/').next().unwrap_or(path);
        Ok(FileStat::regular(name, 1))
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        self.fs.record(format!("mkdir_all {}", path))
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.fs.record(format!("rename {} {}", old_path, new_path))
    }

    async fn symlink(&self, target: &str, link_path: &str) -> Result<()> {
        self.fs.record(format!("symlink {} {}", target, link_path))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.fs.record(format!("remove {}", path))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.fs.record(format!("remove_dir {}", path))
    }

    async fn wait(&self) {
        let mut rx = self.closed_tx.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

/// A wired-up session: root, collector, mocks.
pub struct Fixture {
    pub vfs: Arc<UserVfs>,
    pub directory: Arc<MockDirectory>,
    pub backend: Arc<MockBackend>,
    pub pool: Arc<gangway_vfs::ClientPool>,
    pub audit_rx: tokio::sync::mpsc::UnboundedReceiver<gangway_core::FtpLog>,
}

impl Fixture {
    pub fn drain_audit(&mut self) -> Vec<gangway_core::FtpLog> {
        let mut records = Vec::new();
        while let Ok(record) = self.audit_rx.try_recv() {
            records.push(record);
        }
        records
    }
}

pub fn fixture(
    directory: Arc<MockDirectory>,
    backend: Arc<MockBackend>,
    config: Config,
) -> Fixture {
    let (audit, audit_rx) = audit_channel();
    let pool = Arc::new(gangway_vfs::ClientPool::new());
    fixture_with(directory, backend, config, pool, audit, audit_rx)
}

pub fn fixture_with(
    directory: Arc<MockDirectory>,
    backend: Arc<MockBackend>,
    config: Config,
    pool: Arc<gangway_vfs::ClientPool>,
    audit: AuditSender,
    audit_rx: tokio::sync::mpsc::UnboundedReceiver<gangway_core::FtpLog>,
) -> Fixture {
    let ctx = VfsContext::new(
        user(),
        "198.51.100.7:52611",
        config,
        directory.clone(),
        backend.clone(),
        pool.clone(),
        audit,
    );
    Fixture {
        vfs: Arc::new(UserVfs::new(ctx)),
        directory,
        backend,
        pool,
        audit_rx,
    }
}
