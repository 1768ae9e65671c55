//! Audit trail for file operations
//!
//! NIST 800-53: AU-2 (Audit Events), AU-3 (Content of Audit Records), AU-12 (Audit Generation)
//! Implementation: one record per mutating or transferring operation, sent
//! non-blocking to an external collector and mirrored into structured logs.

use gangway_core::FtpLog;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Send-only handle onto the audit collector channel.
///
/// The channel is owned upstream; the core never blocks on it. A record that
/// cannot be delivered is logged and dropped rather than stalling the file
/// operation that produced it.
#[derive(Clone)]
pub struct AuditSender {
    tx: mpsc::UnboundedSender<FtpLog>,
}

impl AuditSender {
    pub fn new(tx: mpsc::UnboundedSender<FtpLog>) -> Self {
        Self { tx }
    }

    /// Emit one audit record.
    pub fn send(&self, record: FtpLog) {
        if record.is_success {
            info!(
                event = "ftp_log",
                user = %record.user,
                hostname = %record.hostname,
                system_user = %record.system_user,
                operate = %record.operate,
                path = %record.path,
                "file operation completed"
            );
        } else {
            warn!(
                event = "ftp_log_failed",
                user = %record.user,
                hostname = %record.hostname,
                system_user = %record.system_user,
                operate = %record.operate,
                path = %record.path,
                "file operation failed"
            );
        }

        if let Err(err) = self.tx.send(record) {
            warn!(event = "ftp_log_dropped", error = %err, "audit collector is gone");
        }
    }
}

/// Build a fresh audit channel pair for one session.
pub fn audit_channel() -> (AuditSender, mpsc::UnboundedReceiver<FtpLog>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AuditSender::new(tx), rx)
}
