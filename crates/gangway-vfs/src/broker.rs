//! Connection broker
//!
//! Produces one [`SftpConnection`] per `(asset, credential)` on demand:
//! refreshes missing secrets from the directory service, prefers a pooled
//! SSH client when reuse is on, and otherwise dials fresh, through the
//! asset's gateway chain when it has one. Session reference counts stay
//! balanced on every path; each connection that reaches SFTP setup carries a
//! waiter task that releases its session when the channel terminates.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use gangway_core::{Asset, Credential, Domain, User};

use crate::connection::SftpConnection;
use crate::directory::DirectoryService;
use crate::error::Result;
use crate::pool::{reuse_key, reuse_prefix, ClientPool};
use crate::ssh::{parse_private_key, SftpHandle, SshBackend, SshClient, SshClientOptions};

pub struct ConnectionBroker {
    backend: Arc<dyn SshBackend>,
    directory: Arc<dyn DirectoryService>,
    pool: Arc<ClientPool>,
    reuse: bool,
    timeout: Duration,
}

impl ConnectionBroker {
    pub fn new(
        backend: Arc<dyn SshBackend>,
        directory: Arc<dyn DirectoryService>,
        pool: Arc<ClientPool>,
        reuse: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            directory,
            pool,
            reuse,
            timeout,
        }
    }

    /// Produce a connection for `credential` on `asset`.
    ///
    /// May mutate `credential`: refreshed secret material and, on a
    /// username-less reuse hit, the adopted username persist in whatever map
    /// the caller keeps the credential in.
    pub async fn connect(
        &self,
        user: &User,
        asset: &Asset,
        credential: &mut Credential,
        domain: Option<&Domain>,
    ) -> Result<SftpConnection> {
        if !credential.has_secret() {
            let auth = self
                .directory
                .get_system_user_auth(&credential.id, &asset.id, &user.id, &user.username)
                .await?;
            credential.username = auth.username;
            credential.password = auth.password;
            credential.private_key = auth.private_key;
        }

        if self.reuse {
            if let Some(conn) = self.from_pool(user, asset, credential).await {
                return Ok(conn);
            }
        }

        self.fresh_connect(user, asset, credential, domain).await
    }

    /// Reuse path. Any failure here logs and yields `None`; the caller falls
    /// through to a fresh connect.
    async fn from_pool(
        &self,
        user: &User,
        asset: &Asset,
        credential: &mut Credential,
    ) -> Option<SftpConnection> {
        let client = if credential.username.is_empty() {
            // No username pinned yet: any cached client for this
            // (user, asset, credential) will do, and the credential adopts
            // its username.
            let found = self
                .pool
                .search(&reuse_prefix(&user.id, &asset.id, &credential.id))?;
            credential.username = found.username().to_string();
            found
        } else {
            self.pool.get(&reuse_key(
                &user.id,
                &asset.id,
                &credential.id,
                &credential.username,
            ))?
        };

        info!(
            event = "ssh_reuse_hit",
            user = %user.name,
            credential = %credential.name,
            hostname = %asset.hostname,
            "reusing cached ssh client"
        );

        let session = match client.acquire_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(event = "ssh_reuse_session_failed", error = %err, "cached client refused a session");
                return None;
            }
        };

        let sftp = match session.start_sftp().await {
            Ok(sftp) => sftp,
            Err(err) => {
                client.release_session();
                warn!(event = "ssh_reuse_sftp_failed", error = %err, "sftp subsystem failed on cached client");
                return None;
            }
        };
        arm_release(&sftp, &client);

        let home = match sftp.home_dir().await {
            Ok(home) => home,
            Err(err) => {
                warn!(event = "ssh_reuse_home_failed", error = %err, "home lookup failed on cached client");
                // The armed waiter releases the session once the close lands.
                sftp.close().await;
                return None;
            }
        };

        debug!(
            event = "ssh_reuse_ready",
            refs = client.ref_count(),
            hostname = %asset.hostname,
            "reused connection ready"
        );
        Some(SftpConnection::new(sftp, home))
    }

    async fn fresh_connect(
        &self,
        user: &User,
        asset: &Asset,
        credential: &Credential,
        domain: Option<&Domain>,
    ) -> Result<SftpConnection> {
        let key = reuse_key(&user.id, &asset.id, &credential.id, &credential.username);
        let options = build_options(asset, credential, domain, self.timeout);

        let transport = self.backend.open_client(&options).await?;
        let client = Arc::new(SshClient::new(transport, credential.username.clone()));

        let session = match client.acquire_session().await {
            Ok(session) => session,
            Err(err) => {
                client.close().await;
                return Err(err);
            }
        };
        self.pool.add(key, client.clone());

        let sftp = match session.start_sftp().await {
            Ok(sftp) => sftp,
            Err(err) => {
                client.release_session();
                return Err(err);
            }
        };
        arm_release(&sftp, &client);

        let home = match sftp.home_dir().await {
            Ok(home) => home,
            Err(err) => {
                sftp.close().await;
                return Err(err);
            }
        };

        info!(
            event = "ssh_connected",
            user = %user.name,
            credential = %credential.name,
            hostname = %asset.hostname,
            gateways = domain.map(|d| d.gateways.len()).unwrap_or(0),
            "new sftp connection established"
        );
        Ok(SftpConnection::new(sftp, home))
    }
}

/// Dial options for the target, with one proxy hop per gateway in listed
/// order. On gateway hops the stored password doubles as the key passphrase.
fn build_options(
    asset: &Asset,
    credential: &Credential,
    domain: Option<&Domain>,
    timeout: Duration,
) -> SshClientOptions {
    let mut options = SshClientOptions::new(
        asset.ip.clone(),
        asset.protocol_port(&credential.protocol),
    );
    options.username = credential.username.clone();
    options.password = credential.password.clone();
    options.timeout = timeout;

    if let Some(pem) = credential.private_key.as_deref().filter(|k| !k.is_empty()) {
        options.signer = parse_private_key(pem, credential.password.as_deref());
    }

    if let Some(domain) = domain {
        for gateway in &domain.gateways {
            let mut hop = SshClientOptions::new(gateway.ip.clone(), gateway.port);
            hop.username = gateway.username.clone();
            hop.password = gateway.password.clone();
            hop.private_key = gateway.private_key.clone();
            hop.passphrase = gateway.password.clone();
            hop.timeout = timeout;
            options.proxies.push(hop);
        }
    }

    options
}

/// Release the client's session once the SFTP channel terminates.
fn arm_release(sftp: &Arc<dyn SftpHandle>, client: &Arc<SshClient>) {
    let sftp = sftp.clone();
    let client = client.clone();
    tokio::spawn(async move {
        sftp.wait().await;
        client.release_session();
        debug!(
            event = "ssh_session_released",
            refs = client.ref_count(),
            "sftp channel ended, session returned"
        );
    });
}
