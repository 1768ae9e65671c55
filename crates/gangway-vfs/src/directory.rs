//! Management-plane surface the filesystem consumes
//!
//! The directory service answers who may reach what: the organizational
//! tree, the credentials a user holds on an asset, asset detail, gateway
//! chains, and on-demand secret material. The HTTP transport behind it is
//! not this crate's concern.

use async_trait::async_trait;
use gangway_core::{Asset, Credential, CredentialAuth, Domain, TreeItem};

use crate::error::Result;

/// Read-side of the management plane.
///
/// Every method is a remote fetch; failures surface as
/// [`Error::Directory`](crate::Error::Directory) and the caller decides
/// whether to degrade or propagate.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Children of `node_key` visible to `user_id`. An empty key addresses
    /// the root of the user's tree.
    async fn get_node_tree(&self, user_id: &str, node_key: &str) -> Result<Vec<TreeItem>>;

    /// Credentials `user_id` holds on `asset_id`.
    async fn get_system_users(&self, user_id: &str, asset_id: &str) -> Result<Vec<Credential>>;

    /// Full asset detail, including gateway-domain membership.
    async fn get_asset(&self, asset_id: &str) -> Result<Asset>;

    /// Ordered gateway chain of a domain.
    async fn get_domain_gateways(&self, domain_id: &str) -> Result<Domain>;

    /// Secret material for a credential that carries none inline.
    async fn get_system_user_auth(
        &self,
        credential_id: &str,
        asset_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<CredentialAuth>;

    /// Assets matching a free-text query, for the `_Search` directory.
    async fn search_assets(&self, user_id: &str, query: &str) -> Result<Vec<Asset>>;
}
