//! The backend contract every ACP system implements

use crate::error::AcpResult;
use crate::identity::Identity;
use crate::types::{AcpSystemType, Policy, PolicyMarshalType, RegistrationResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Capability set shared by the local and ledger backends.
///
/// Lifecycle methods take `&mut self`, so a client can never be closed while a
/// data operation borrowed from it is still in flight.
#[async_trait]
pub trait AcpSystemClient: Send + Sync {
    /// The required-permission set this backend validates against.
    ///
    /// `None` means the backend never declared one and is treated as an invalid
    /// ACP system by the bridge.
    fn system_type(&self) -> Option<AcpSystemType>;

    /// Short backend name used in wrapped error messages
    fn backend_name(&self) -> &'static str;

    /// Configure the storage location; an empty path selects in-memory mode.
    fn init(&mut self, path: &str);

    async fn start(&mut self) -> AcpResult<()>;

    /// Release resources. Safe to call after a failed or partial `start`.
    async fn close(&mut self) -> AcpResult<()>;

    /// Irreversibly purge all local state and leave the client closed.
    async fn reset_state(&mut self) -> AcpResult<()>;

    /// Create a policy owned by `creator`, returning its id.
    async fn add_policy(
        &self,
        creator: &Identity,
        policy: &str,
        marshal_type: PolicyMarshalType,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<String>;

    /// Fetch a policy by id; `Ok(None)` when it does not exist.
    async fn policy(&self, policy_id: &str) -> AcpResult<Option<Policy>>;

    async fn register_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<RegistrationResult>;

    /// Archive an object so it grants nothing until its owner registers it
    /// again. Returns false if it was already archived.
    async fn archive_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool>;

    /// Owner of an object; `Ok(None)` means the object is not registered.
    async fn object_owner(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>>;

    /// Evaluate `permission` for `actor_id`. An empty actor id is anonymous and
    /// only matches wildcard relationships.
    async fn verify_access_request(
        &self,
        permission: &str,
        actor_id: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<bool>;

    /// Returns true if the relationship already existed.
    #[allow(clippy::too_many_arguments)]
    async fn add_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool>;

    /// Returns true if a relationship was found and removed.
    #[allow(clippy::too_many_arguments)]
    async fn delete_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool>;
}
