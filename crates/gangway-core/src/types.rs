use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GangwayError, Result};

/// The authenticated platform user a session belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Display name, shown in audit records.
    pub name: String,
    pub username: String,
}

impl User {
    /// `"name(username)"`, the form audit collectors expect.
    pub fn display(&self) -> String {
        format!("{}({})", self.name, self.username)
    }
}

/// A protocol an asset listens on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub port: u16,
}

/// A remote host reachable through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub hostname: String,
    pub ip: String,
    #[serde(default)]
    pub org_id: String,
    /// Gateway domain the asset sits behind, if any.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Asset {
    pub fn supports_protocol(&self, name: &str) -> bool {
        self.protocols.iter().any(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Port for the named protocol, falling back to the SSH default.
    pub fn protocol_port(&self, name: &str) -> u16 {
        self.protocols
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.port)
            .unwrap_or(22)
    }
}

/// Permission granted on a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Connect,
    Upload,
    Download,
    All,
}

/// A login identity on an asset ("system user"), with its permission set and
/// the sandbox root its virtual subtree maps to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub username: String,
    pub protocol: String,
    /// Sandbox root on the asset. `""`, `"~"` and `"home"` mean the login
    /// account's home directory.
    #[serde(default)]
    pub sftp_root: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

impl Credential {
    /// Whether `action` is permitted, directly or through [`Action::All`].
    pub fn allows(&self, action: Action) -> bool {
        self.actions.iter().any(|a| *a == action || *a == Action::All)
    }

    /// True when the credential already carries a usable secret.
    pub fn has_secret(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
            || self.private_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Secret material fetched on demand for a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// An SSH jump host used to tunnel connections into a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    #[serde(default)]
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// A network domain and the ordered gateway chain that fronts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
}

/// An organizational grouping in the management plane's tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Hierarchical key, e.g. `"1:3:7"`.
    pub key: String,
    /// Human label; becomes the folder name.
    pub value: String,
}

/// One child returned by a node-tree fetch. The payload is discriminated by
/// `meta.type` and decoded on demand.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeItem {
    #[serde(default)]
    pub chk_disabled: bool,
    pub meta: TreeMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeMeta {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl TreeItem {
    pub fn is_node(&self) -> bool {
        self.meta.kind == "node"
    }

    pub fn is_asset(&self) -> bool {
        self.meta.kind == "asset"
    }

    pub fn as_node(&self) -> Result<Node> {
        if !self.is_node() {
            return Err(GangwayError::Meta(format!(
                "expected node meta, got {:?}",
                self.meta.kind
            )));
        }
        Ok(serde_json::from_value(self.meta.data.clone())?)
    }

    pub fn as_asset(&self) -> Result<Asset> {
        if !self.is_asset() {
            return Err(GangwayError::Meta(format!(
                "expected asset meta, got {:?}",
                self.meta.kind
            )));
        }
        Ok(serde_json::from_value(self.meta.data.clone())?)
    }
}

/// File operation category recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operate {
    Upload,
    Download,
    Mkdir,
    Rename,
    Symlink,
    Delete,
    RemoveDir,
}

impl std::fmt::Display for Operate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operate::Upload => "upload",
            Operate::Download => "download",
            Operate::Mkdir => "mkdir",
            Operate::Rename => "rename",
            Operate::Symlink => "symlink",
            Operate::Delete => "delete",
            Operate::RemoveDir => "remove_dir",
        };
        write!(f, "{}", s)
    }
}

/// One audit record per file operation, shipped to an external collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpLog {
    /// `"name(username)"` of the platform user.
    pub user: String,
    pub hostname: String,
    pub org_id: String,
    /// Credential name the operation ran under.
    pub system_user: String,
    pub remote_addr: String,
    pub operate: Operate,
    /// Real (rewritten) path; `"<old>=><new>"` for rename and symlink.
    pub path: String,
    pub date_start: DateTime<Utc>,
    pub is_success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tree_item_decodes_by_discriminator() {
        let item: TreeItem = serde_json::from_value(json!({
            "chk_disabled": false,
            "meta": {
                "type": "asset",
                "data": {
                    "id": "a1",
                    "hostname": "web-1",
                    "ip": "10.0.0.5",
                    "org_id": "o1",
                    "protocols": [{"name": "ssh", "port": 2222}]
                }
            }
        }))
        .unwrap();

        let asset = item.as_asset().unwrap();
        assert_eq!(asset.protocol_port("ssh"), 2222);
        assert!(asset.supports_protocol("SSH"));
        assert!(item.as_node().is_err());
    }

    #[test]
    fn credential_action_checks() {
        let mut cred: Credential = serde_json::from_value(json!({
            "id": "c1",
            "name": "web",
            "protocol": "ssh",
            "actions": ["connect", "download"]
        }))
        .unwrap();

        assert!(cred.allows(Action::Connect));
        assert!(cred.allows(Action::Download));
        assert!(!cred.allows(Action::Upload));
        assert!(!cred.has_secret());

        cred.actions = vec![Action::All];
        assert!(cred.allows(Action::Upload));

        cred.password = Some("s3cret".into());
        assert!(cred.has_secret());
    }
}
