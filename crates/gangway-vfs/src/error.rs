//! Error types for the virtual filesystem
//!
//! NIST 800-53: SI-11 (Error Handling), AC-3 (Access Enforcement)
//! Implementation: every failure an operation can surface maps onto one SFTP
//! status code, so the server front-end never has to interpret error text.

use russh_sftp::protocol::StatusCode;
use thiserror::Error;

/// Result type alias for filesystem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the virtual filesystem core.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH-level failure (dialing, authentication, channel setup)
    ///
    /// NIST 800-53: SC-8 (Transmission Confidentiality), IA-2
    #[error("SSH error: {0}")]
    Ssh(String),

    /// Failure forwarded from a remote SFTP call
    #[error("remote SFTP error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// The path's credential folder does not exist under the asset
    #[error("no matching credential: {0}")]
    NoCredential(String),

    /// Missing action on the credential, or a destructive operation on a
    /// virtual level
    ///
    /// NIST 800-53: AC-3 (Access Enforcement)
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The broker could not produce a connection for the operation
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Cross-credential rename, or a path that names nothing
    #[error("no such file: {0}")]
    NoSuchFile(String),

    /// Operation the virtual layer cannot express (cross-connection
    /// rename/symlink, readlink on a virtual root)
    #[error("operation unsupported: {0}")]
    NotSupported(String),

    /// Directory-service fetch failed; the affected node degrades to empty
    #[error("directory service error: {0}")]
    Directory(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map onto the SFTP STATUS code the server front-end should answer with.
    pub fn to_status_code(&self) -> u32 {
        match self {
            Error::PermissionDenied(_) => StatusCode::PermissionDenied as u32,
            Error::NoCredential(_) | Error::NoSuchFile(_) => StatusCode::NoSuchFile as u32,
            Error::ConnectionLost(_) | Error::Ssh(_) => StatusCode::ConnectionLost as u32,
            Error::NotSupported(_) => StatusCode::OpUnsupported as u32,
            Error::Sftp(russh_sftp::client::error::Error::Status(status)) => {
                status.status_code as u32
            }
            _ => StatusCode::Failure as u32,
        }
    }

    /// True for failures worth retrying on a fresh connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Ssh(_) | Error::ConnectionLost(_) | Error::Io(_))
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

impl From<gangway_core::GangwayError> for Error {
    fn from(err: gangway_core::GangwayError) -> Self {
        Error::Directory(err.to_string())
    }
}
