//! # Gangway VFS
//!
//! Virtual SFTP filesystem that projects a user's authorized fleet of SSH
//! assets into a single hierarchical namespace.
//!
//! One interactive SFTP session sees a synthetic root of organizational
//! nodes; leaves are assets; beneath each asset sit per-credential subtrees
//! that transparently open real SSH/SFTP connections on first touch,
//! optionally tunneled through a chain of jump gateways.
//!
//! ## Features
//!
//! - Lazy tree materialization from the directory service, with name
//!   collision resolution
//! - Per-(asset, credential) connection caching, with optional reuse of one
//!   SSH client across sessions via a reference-counted pool
//! - Per-operation authorization against credential action sets
//! - Sandbox path rewriting onto each credential's `sftp_root`
//! - One audit record per mutating or transferring operation

pub mod asset;
pub mod audit;
pub mod broker;
pub mod config;
pub mod connection;
pub mod context;
pub mod directory;
pub mod entry;
pub mod error;
pub mod node;
pub mod pool;
pub mod resolver;
pub mod root;
pub mod russh_backend;
pub mod search;
pub mod ssh;

pub use asset::AssetDir;
pub use audit::{audit_channel, AuditSender};
pub use broker::ConnectionBroker;
pub use config::{init_logging, Config, LogFormat, LoggingConfig};
pub use connection::SftpConnection;
pub use context::VfsContext;
pub use directory::DirectoryService;
pub use entry::{sort_by_name, DirEntry, EntryRef, FakeFileInfo, FileStat, UnixStat};
pub use error::{Error, Result};
pub use node::{FsEntry, NodeDir};
pub use pool::{reuse_key, reuse_prefix, ClientPool};
pub use root::UserVfs;
pub use russh_backend::RusshBackend;
pub use search::{SearchResultDir, SEARCH_FOLDER_NAME};
pub use ssh::{
    parse_private_key, RemoteFile, SftpHandle, SshBackend, SshClient, SshClientOptions,
    SshSessionHandle, SshTransport,
};
