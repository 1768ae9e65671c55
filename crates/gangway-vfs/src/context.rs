//! Per-session wiring shared across the virtual tree
//!
//! Directory nodes need the user, the audit channel and the broker to build
//! and operate their children. The context is threaded explicitly instead of
//! back-pointers from child to parent, so the tree stays acyclic.

use std::sync::Arc;

use gangway_core::User;

use crate::audit::AuditSender;
use crate::broker::ConnectionBroker;
use crate::config::Config;
use crate::directory::DirectoryService;
use crate::pool::ClientPool;
use crate::ssh::SshBackend;

pub struct VfsContext {
    pub user: User,
    /// Peer address of the SFTP session, recorded in audit logs.
    pub remote_addr: String,
    pub config: Config,
    pub directory: Arc<dyn DirectoryService>,
    pub broker: Arc<ConnectionBroker>,
    pub audit: AuditSender,
}

impl VfsContext {
    pub fn new(
        user: User,
        remote_addr: impl Into<String>,
        config: Config,
        directory: Arc<dyn DirectoryService>,
        backend: Arc<dyn SshBackend>,
        pool: Arc<ClientPool>,
        audit: AuditSender,
    ) -> Arc<Self> {
        let broker = Arc::new(ConnectionBroker::new(
            backend,
            directory.clone(),
            pool,
            config.reuse_connection,
            config.ssh_timeout(),
        ));
        Arc::new(Self {
            user,
            remote_addr: remote_addr.into(),
            config,
            directory,
            broker,
            audit,
        })
    }
}
