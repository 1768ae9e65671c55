//! A live SFTP connection to one asset under one credential

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ssh::SftpHandle;

/// SFTP channel bound to one SSH session, plus the remote home directory
/// captured when the channel came up. Home anchors the `~`-style sandbox
/// roots for every path rewrite on this connection.
pub struct SftpConnection {
    handle: Arc<dyn SftpHandle>,
    home_dir: String,
    closed: AtomicBool,
}

impl SftpConnection {
    pub fn new(handle: Arc<dyn SftpHandle>, home_dir: impl Into<String>) -> Self {
        Self {
            handle,
            home_dir: home_dir.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn sftp(&self) -> &Arc<dyn SftpHandle> {
        &self.handle
    }

    pub fn home_dir(&self) -> &str {
        &self.home_dir
    }

    /// Close the channel. Safe to call more than once; only the first call
    /// reaches the transport.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.handle.close().await;
        }
    }
}
