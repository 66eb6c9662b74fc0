//! Embedded ACP backend
//!
//! Each ACP kind keeps its own sled database under the configured path. An
//! empty path keeps everything in a temporary database that disappears on
//! close.

pub mod engine;
pub mod expr;
pub mod policy_parser;
pub mod store;

pub use engine::{PolicyEngine, StoredPolicy};
pub use store::AcpStore;

use crate::client::AcpSystemClient;
use crate::error::{AcpError, AcpResult};
use crate::identity::Identity;
use crate::logging::AcpLogger;
use crate::types::{AcpSystemType, Policy, PolicyMarshalType, RegistrationResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Name used for the local backend in wrapped errors
pub const LOCAL_BACKEND_NAME: &str = "Local";

/// Which store namespace a local ACP instance uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcpKind {
    Document,
    Node,
    Admin,
}

impl AcpKind {
    pub fn store_name(&self) -> &'static str {
        match self {
            AcpKind::Document => "local_acp",
            AcpKind::Node => "node_acp",
            AcpKind::Admin => "admin_acp",
        }
    }

    /// Node and admin stores both gate node operations
    pub fn system_type(&self) -> AcpSystemType {
        match self {
            AcpKind::Document => AcpSystemType::LocalDocument,
            AcpKind::Node | AcpKind::Admin => AcpSystemType::LocalNode,
        }
    }
}

/// ACP client backed by an embedded sled store
pub struct LocalAcp {
    kind: AcpKind,
    path: String,
    engine: Option<PolicyEngine>,
    logger: AcpLogger,
}

impl LocalAcp {
    pub fn new(kind: AcpKind, logger: AcpLogger) -> Self {
        Self {
            kind,
            path: String::new(),
            engine: None,
            logger,
        }
    }

    pub fn kind(&self) -> AcpKind {
        self.kind
    }

    /// Directory of the persistent store, `None` in in-memory mode
    pub fn store_path(&self) -> Option<PathBuf> {
        if self.path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.path).join(self.kind.store_name()))
        }
    }

    fn engine(&self) -> AcpResult<&PolicyEngine> {
        self.engine.as_ref().ok_or(AcpError::AcpNotStarted)
    }
}

#[async_trait]
impl AcpSystemClient for LocalAcp {
    fn system_type(&self) -> Option<AcpSystemType> {
        Some(self.kind.system_type())
    }

    fn backend_name(&self) -> &'static str {
        LOCAL_BACKEND_NAME
    }

    fn init(&mut self, path: &str) {
        self.path = path.to_string();
    }

    async fn start(&mut self) -> AcpResult<()> {
        let store = match self.store_path() {
            Some(path) => AcpStore::open(&path),
            None => AcpStore::open_temporary(),
        }
        .map_err(|e| AcpError::InitializationOfAcpFailed {
            backend: LOCAL_BACKEND_NAME,
            location: self.path.clone(),
            source: Box::new(e),
        })?;

        if store.was_recovered() {
            self.logger.in_scope(|| {
                tracing::info!(store = self.kind.store_name(), path = %self.path, "recovered local acp store")
            });
        }
        self.engine = Some(PolicyEngine::new(store, self.logger.clone()));
        Ok(())
    }

    async fn close(&mut self) -> AcpResult<()> {
        if let Some(engine) = self.engine.take() {
            engine.store().flush()?;
        }
        Ok(())
    }

    async fn reset_state(&mut self) -> AcpResult<()> {
        // The database must be dropped before its directory can be removed.
        self.engine = None;

        if let Some(path) = self.store_path() {
            std::fs::remove_dir_all(&path).map_err(AcpError::AcpResetState)?;
            self.logger
                .in_scope(|| tracing::info!(path = %path.display(), "purged local acp store"));
        }
        Ok(())
    }

    async fn add_policy(
        &self,
        creator: &Identity,
        policy: &str,
        marshal_type: PolicyMarshalType,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<String> {
        let stored = self
            .engine()?
            .create_policy(creator.did(), policy, marshal_type, creation_time, None)?;
        Ok(stored.id)
    }

    async fn policy(&self, policy_id: &str) -> AcpResult<Option<Policy>> {
        Ok(self
            .engine()?
            .policy(policy_id)?
            .map(|stored| stored.definition.to_policy(&stored.id)))
    }

    async fn register_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<RegistrationResult> {
        self.engine()?
            .register_object(identity.did(), policy_id, resource_name, object_id, creation_time)
    }

    async fn archive_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        self.engine()?
            .archive_object(identity.did(), policy_id, resource_name, object_id, creation_time)
    }

    async fn object_owner(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>> {
        self.engine()?.object_owner(policy_id, resource_name, object_id)
    }

    async fn verify_access_request(
        &self,
        permission: &str,
        actor_id: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<bool> {
        self.engine()?
            .verify(permission, actor_id, policy_id, resource_name, object_id)
    }

    async fn add_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        self.engine()?.set_relationship(
            requester.did(),
            policy_id,
            resource_name,
            object_id,
            relation,
            target_actor,
            creation_time,
        )
    }

    async fn delete_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        self.engine()?.delete_relationship(
            requester.did(),
            policy_id,
            resource_name,
            object_id,
            relation,
            target_actor,
            creation_time,
        )
    }
}
