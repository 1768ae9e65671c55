//! russh-backed SSH transport
//!
//! NIST 800-53: SC-8 (Transmission Confidentiality), IA-2 (Identification and Authentication)
//! Implementation: dials assets directly or through an ordered chain of
//! gateway hops (`direct-tcpip` tunnels), authenticates with password or
//! private key, and starts the SFTP subsystem on acquired sessions.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use russh::client::{self, Handle, Msg};
use russh::keys::ssh_key;
use russh::keys::PrivateKeyWithHashAlg;
use russh::{Channel, Disconnect};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileType, OpenFlags, StatusCode};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::entry::{FileStat, MODE_DIR, MODE_SYMLINK};
use crate::error::{Error, Result};
use crate::ssh::{
    parse_private_key, RemoteFile, SftpHandle, SshBackend, SshClientOptions, SshSessionHandle,
    SshTransport,
};

/// Production [`SshBackend`] on top of russh.
#[derive(Default)]
pub struct RusshBackend;

impl RusshBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SshBackend for RusshBackend {
    async fn open_client(&self, options: &SshClientOptions) -> Result<Box<dyn SshTransport>> {
        let hops = dial_chain(options).await?;
        Ok(Box::new(RusshTransport { hops }))
    }
}

/// Host keys are attested by the management plane that handed out the
/// asset record; there is no user present to answer a TOFU prompt.
struct TrustingHandler;

impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Dial every hop in order: gateways first, the target last. Each hop after
/// the first rides a `direct-tcpip` channel opened on its predecessor.
async fn dial_chain(options: &SshClientOptions) -> Result<Vec<Handle<TrustingHandler>>> {
    let config = Arc::new(client::Config::default());
    let mut hops: Vec<Handle<TrustingHandler>> = Vec::new();

    let chain: Vec<&SshClientOptions> = options
        .proxies
        .iter()
        .chain(std::iter::once(options))
        .collect();

    for hop in chain {
        let mut handle = match hops.last() {
            None => timeout(
                hop.timeout,
                client::connect(config.clone(), (hop.host.as_str(), hop.port), TrustingHandler),
            )
            .await
            .map_err(|_| dial_timeout(hop))??,
            Some(previous) => {
                let channel = previous
                    .channel_open_direct_tcpip(hop.host.clone(), hop.port as u32, "127.0.0.1", 0)
                    .await?;
                timeout(
                    hop.timeout,
                    client::connect_stream(config.clone(), channel.into_stream(), TrustingHandler),
                )
                .await
                .map_err(|_| dial_timeout(hop))??
            }
        };

        if let Err(err) = authenticate(&mut handle, hop).await {
            for established in hops.iter().rev() {
                let _ = established
                    .disconnect(Disconnect::ByApplication, "auth failed upstream", "en")
                    .await;
            }
            return Err(err);
        }
        debug!(event = "ssh_hop_up", host = %hop.host, port = hop.port, "hop established");
        hops.push(handle);
    }

    Ok(hops)
}

fn dial_timeout(hop: &SshClientOptions) -> Error {
    Error::Ssh(format!(
        "connect to {}:{} timed out after {}s",
        hop.host,
        hop.port,
        hop.timeout.as_secs()
    ))
}

async fn authenticate(handle: &mut Handle<TrustingHandler>, hop: &SshClientOptions) -> Result<()> {
    let signer = hop.signer.clone().or_else(|| {
        hop.private_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .and_then(|pem| parse_private_key(pem, hop.passphrase.as_deref()))
    });

    if let Some(key) = signer {
        let auth = handle
            .authenticate_publickey(&hop.username, PrivateKeyWithHashAlg::new(Arc::new(key), None))
            .await?;
        if auth.success() {
            return Ok(());
        }
        debug!(
            event = "ssh_pubkey_rejected",
            username = %hop.username,
            host = %hop.host,
            "public key rejected, falling back to password"
        );
    }

    if let Some(password) = hop.password.as_deref().filter(|p| !p.is_empty()) {
        let auth = handle.authenticate_password(&hop.username, password).await?;
        if auth.success() {
            return Ok(());
        }
    }

    Err(Error::Ssh(format!(
        "authentication failed for {}@{}:{}",
        hop.username, hop.host, hop.port
    )))
}

struct RusshTransport {
    /// Every hop of the chain; dropping an intermediate handle would tear the
    /// tunnel down underneath the target, so all of them live here.
    hops: Vec<Handle<TrustingHandler>>,
}

#[async_trait]
impl SshTransport for RusshTransport {
    async fn open_session(&self) -> Result<Box<dyn SshSessionHandle>> {
        let target = self
            .hops
            .last()
            .ok_or_else(|| Error::Ssh("transport has no established hop".into()))?;
        let channel = target.channel_open_session().await?;
        Ok(Box::new(RusshSession { channel }))
    }

    async fn close(&self) {
        for handle in self.hops.iter().rev() {
            if let Err(err) = handle
                .disconnect(Disconnect::ByApplication, "session finished", "en")
                .await
            {
                debug!(event = "ssh_disconnect_failed", error = %err, "hop already gone");
            }
        }
    }
}

struct RusshSession {
    channel: Channel<Msg>,
}

#[async_trait]
impl SshSessionHandle for RusshSession {
    async fn start_sftp(self: Box<Self>) -> Result<Arc<dyn SftpHandle>> {
        self.channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(self.channel.into_stream()).await?;
        let (closed_tx, _) = watch::channel(false);
        Ok(Arc::new(RusshSftp { sftp, closed_tx }))
    }
}

struct RusshSftp {
    sftp: SftpSession,
    closed_tx: watch::Sender<bool>,
}

#[async_trait]
impl SftpHandle for RusshSftp {
    async fn home_dir(&self) -> Result<String> {
        Ok(self.sftp.canonicalize(".").await?)
    }

    async fn create(&self, path: &str) -> Result<RemoteFile> {
        let file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;
        Ok(Box::new(file))
    }

    async fn open(&self, path: &str) -> Result<RemoteFile> {
        let file = self.sftp.open_with_flags(path, OpenFlags::READ).await?;
        Ok(Box::new(file))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileStat>> {
        let entries = self.sftp.read_dir(path).await?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let name = entry.file_name();
                let attrs = entry.metadata();
                file_stat(name, &attrs)
            })
            .collect())
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        Ok(self.sftp.read_link(path).await?)
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let attrs = self.sftp.metadata(path).await?;
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Ok(file_stat(name, &attrs))
    }

    /// SFTP `MKDIR` creates one level at a time; walk the components and
    /// tolerate the ones that already exist as directories.
    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            match self.sftp.create_dir(&current).await {
                Ok(()) => {}
                Err(err) => {
                    if let Ok(attrs) = self.sftp.metadata(&current).await {
                        if attrs.file_type() == FileType::Dir {
                            continue;
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        Ok(self.sftp.rename(old_path, new_path).await?)
    }

    async fn symlink(&self, target: &str, link_path: &str) -> Result<()> {
        // SSH_FXP_SYMLINK takes (linkpath, targetpath).
        Ok(self.sftp.symlink(link_path, target).await?)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        Ok(self.sftp.remove_file(path).await?)
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        Ok(self.sftp.remove_dir(path).await?)
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
        if let Err(err) = self.sftp.close().await {
            warn!(event = "sftp_close_failed", error = %err, "channel close returned an error");
        }
        let _ = self.closed_tx.send(true);
    }
}

fn file_stat(name: String, attrs: &russh_sftp::protocol::FileAttributes) -> FileStat {
    let file_type = attrs.file_type();
    let is_dir = file_type == FileType::Dir;
    let is_symlink = file_type == FileType::Symlink;
    let permissions = attrs.permissions.map(|p| p & 0o7777).unwrap_or(0o644);
    let mode = if is_dir {
        permissions | MODE_DIR
    } else if is_symlink {
        permissions | MODE_SYMLINK
    } else {
        permissions
    };

    FileStat {
        name,
        size: attrs.size.unwrap_or(0),
        mode,
        modified: attrs
            .mtime
            .and_then(|t| Utc.timestamp_opt(t as i64, 0).single())
            .unwrap_or_else(Utc::now),
        is_dir,
        is_symlink,
    }
}

/// Classify a remote failure as not-found, for callers that probe.
pub fn is_not_found(err: &Error) -> bool {
    matches!(
        err,
        Error::Sftp(russh_sftp::client::error::Error::Status(status))
            if status.status_code == StatusCode::NoSuchFile
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::protocol::FileAttributes;

    #[test]
    fn file_stat_maps_type_bits() {
        let mut attrs = FileAttributes::default();
        attrs.size = Some(42);
        attrs.permissions = Some(0o40755);
        let stat = file_stat("d".into(), &attrs);
        assert!(stat.is_dir);
        assert_eq!(stat.mode, 0o755 | MODE_DIR);
        assert_eq!(stat.size, 42);
    }

    #[test]
    fn not_found_classification() {
        let err = Error::Sftp(russh_sftp::client::error::Error::Status(
            russh_sftp::protocol::Status {
                id: 1,
                status_code: StatusCode::NoSuchFile,
                error_message: String::new(),
                language_tag: String::new(),
            },
        ));
        assert!(is_not_found(&err));
        assert!(!is_not_found(&Error::Ssh("x".into())));
    }

    #[test]
    fn chain_orders_gateways_before_target() {
        let mut options = SshClientOptions::new("10.0.0.5", 22);
        options.proxies.push(SshClientOptions::new("gw-1", 2222));
        options.proxies.push(SshClientOptions::new("gw-2", 2222));

        let chain: Vec<&str> = options
            .proxies
            .iter()
            .chain(std::iter::once(&options))
            .map(|o| o.host.as_str())
            .collect();
        assert_eq!(chain, ["gw-1", "gw-2", "10.0.0.5"]);
    }
}
