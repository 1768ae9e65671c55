//! # Gangway Core
//!
//! Shared data model for the Gangway virtual SFTP gateway: the entities the
//! management plane describes (users, organizational nodes, assets,
//! credentials, gateway domains) and the audit records the filesystem core
//! emits for every file operation.

pub mod error;
pub mod types;

pub use error::{GangwayError, Result};
pub use types::{
    Action, Asset, Credential, CredentialAuth, Domain, FtpLog, Gateway, Node, Operate, Protocol,
    TreeItem, TreeMeta, User,
};
