use crate::bridge::{AcpBridge, BridgeState, RelationshipArgs, RelationshipChange};
use crate::client::AcpSystemClient;
use crate::error::{AcpError, AcpResult};
use crate::identity::Identity;
use crate::ledger::{LedgerAcp, LedgerAcpOptions, TxSigner};
use crate::local::{AcpKind, LocalAcp};
use crate::logging::AcpLogger;
use crate::types::{
    AcpSystemType, DocumentResourcePermission, RegistrationResult, IMPLY_DOCUMENT_READ_PERM,
};
use chrono::Utc;
use std::sync::Arc;

/// Document access control
pub struct DocumentAcp {
    bridge: AcpBridge,
}

/// Document ACP over the embedded store
pub fn new_local_document_acp(logger: AcpLogger) -> DocumentAcp {
    DocumentAcp::new(Box::new(LocalAcp::new(AcpKind::Document, logger.clone())), false, logger)
}

/// Document ACP over the ledger, reached over HTTP
pub fn new_ledger_document_acp(
    grpc_address: &str,
    comet_address: &str,
    signer: Arc<dyn TxSigner>,
    options: LedgerAcpOptions,
    logger: AcpLogger,
) -> AcpResult<DocumentAcp> {
    let client = LedgerAcp::with_http(grpc_address, comet_address, signer, options, logger.clone())?;
    Ok(DocumentAcp::new(Box::new(client), true, logger))
}

impl DocumentAcp {
    /// Wrap any backend. `supports_p2p` is a fixed property of the backend.
    pub fn new(client: Box<dyn AcpSystemClient>, supports_p2p: bool, logger: AcpLogger) -> Self {
        Self {
            bridge: AcpBridge::new(client, supports_p2p, logger),
        }
    }

    pub fn init(&mut self, path: &str) {
        self.bridge.init(path)
    }

    pub async fn start(&mut self) -> AcpResult<()> {
        self.bridge.start().await
    }

    pub async fn close(&mut self) -> AcpResult<()> {
        self.bridge.close().await
    }

    pub async fn reset_state(&mut self) -> AcpResult<()> {
        self.bridge.reset_state().await
    }

    pub fn state(&self) -> BridgeState {
        self.bridge.state()
    }

    pub fn supports_p2p(&self) -> bool {
        self.bridge.supports_p2p()
    }

    /// Upload a policy authored in YAML or JSON, returning its id
    pub async fn add_policy(&self, creator: &Identity, policy: &str) -> AcpResult<String> {
        self.bridge.add_policy(creator, policy).await
    }

    /// Check that a policy resource exposes `read`, `update` and `delete`, each
    /// granted to `owner`
    pub async fn validate_resource_interface(
        &self,
        policy_id: &str,
        resource_name: &str,
    ) -> AcpResult<()> {
        self.bridge
            .validate_resource_interface(policy_id, resource_name, AcpSystemType::is_document)
            .await
    }

    pub async fn register_doc_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        doc_id: &str,
    ) -> AcpResult<RegistrationResult> {
        let client = self.bridge.client()?;
        let result = client
            .register_object(identity, policy_id, resource_name, doc_id, Utc::now())
            .await
            .map_err(|e| AcpError::FailedToRegisterDocWithAcp {
                backend: client.backend_name(),
                policy_id: policy_id.to_string(),
                actor: identity.did().to_string(),
                resource: resource_name.to_string(),
                doc_id: doc_id.to_string(),
                source: Box::new(e),
            })?;

        self.bridge.logger().in_scope(|| {
            tracing::debug!(
                policy_id = %policy_id,
                resource = %resource_name,
                doc_id = %doc_id,
                actor_id = %identity.did(),
                result = ?result,
                "Document registered"
            )
        });
        Ok(result)
    }

    /// Archive a document so it grants nothing until its owner registers it again
    pub async fn archive_doc_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        let client = self.bridge.client()?;
        client
            .archive_object(identity, policy_id, resource_name, doc_id, Utc::now())
            .await
            .map_err(|e| AcpError::FailedToArchiveDocWithAcp {
                backend: client.backend_name(),
                policy_id: policy_id.to_string(),
                actor: identity.did().to_string(),
                resource: resource_name.to_string(),
                doc_id: doc_id.to_string(),
                source: Box::new(e),
            })
    }

    pub async fn is_doc_registered(
        &self,
        policy_id: &str,
        resource_name: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        let client = self.bridge.client()?;
        let owner = client
            .object_owner(policy_id, resource_name, doc_id)
            .await
            .map_err(|e| AcpError::FailedToCheckIfDocIsRegisteredWithAcp {
                backend: client.backend_name(),
                policy_id: policy_id.to_string(),
                resource: resource_name.to_string(),
                doc_id: doc_id.to_string(),
                source: Box::new(e),
            })?;
        Ok(owner.is_some())
    }

    /// Whether `actor_id` holds `permission` on a document.
    ///
    /// A read check passes if any permission implying read is granted; the
    /// first one granted is logged.
    pub async fn check_doc_access(
        &self,
        permission: DocumentResourcePermission,
        actor_id: &str,
        policy_id: &str,
        resource_name: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        let client = self.bridge.client()?;

        let candidates: &[DocumentResourcePermission] =
            if permission == DocumentResourcePermission::Read {
                &IMPLY_DOCUMENT_READ_PERM
            } else {
                std::slice::from_ref(&permission)
            };

        for candidate in candidates {
            let granted = client
                .verify_access_request(candidate.as_str(), actor_id, policy_id, resource_name, doc_id)
                .await
                .map_err(|e| AcpError::FailedToVerifyDocAccessWithAcp {
                    backend: client.backend_name(),
                    permission: candidate.as_str().to_string(),
                    policy_id: policy_id.to_string(),
                    actor_id: actor_id.to_string(),
                    resource: resource_name.to_string(),
                    doc_id: doc_id.to_string(),
                    source: Box::new(e),
                })?;

            if granted {
                self.bridge.logger().in_scope(|| {
                    tracing::info!(
                        requested = %permission,
                        permission = %candidate,
                        policy_id = %policy_id,
                        resource = %resource_name,
                        actor_id = %actor_id,
                        doc_id = %doc_id,
                        "Document accessible"
                    )
                });
                return Ok(true);
            }
        }

        self.bridge.logger().in_scope(|| {
            tracing::info!(
                permission = %permission,
                policy_id = %policy_id,
                resource = %resource_name,
                actor_id = %actor_id,
                doc_id = %doc_id,
                "Document inaccessible"
            )
        });
        Ok(false)
    }

    /// Grant `relation` on a document to `target_actor` (`"*"` for everyone).
    /// Returns true if the relationship already existed.
    pub async fn add_doc_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        doc_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
    ) -> AcpResult<bool> {
        RelationshipArgs {
            policy_id,
            resource_name,
            object_id: doc_id,
            relation,
            requester,
            target_actor,
        }
        .check(RelationshipChange::Add)?;

        let client = self.bridge.client()?;
        let existed = client
            .add_actor_relationship(
                policy_id,
                resource_name,
                doc_id,
                relation,
                requester,
                target_actor,
                Utc::now(),
            )
            .await
            .map_err(|e| AcpError::FailedToAddDocActorRelationshipWithAcp {
                backend: client.backend_name(),
                policy_id: policy_id.to_string(),
                resource: resource_name.to_string(),
                doc_id: doc_id.to_string(),
                relation: relation.to_string(),
                request_actor: requester.did().to_string(),
                target_actor: target_actor.to_string(),
                source: Box::new(e),
            })?;

        self.bridge.logger().in_scope(|| {
            tracing::info!(
                policy_id = %policy_id,
                resource = %resource_name,
                doc_id = %doc_id,
                relation = %relation,
                request_actor = %requester.did(),
                target_actor = %target_actor,
                existed,
                "Document and actor relationship set"
            )
        });
        Ok(existed)
    }

    /// Revoke `relation` on a document from `target_actor`. Returns true if a
    /// relationship was found and removed.
    pub async fn delete_doc_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        doc_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
    ) -> AcpResult<bool> {
        RelationshipArgs {
            policy_id,
            resource_name,
            object_id: doc_id,
            relation,
            requester,
            target_actor,
        }
        .check(RelationshipChange::Delete)?;

        let client = self.bridge.client()?;
        let record_found = client
            .delete_actor_relationship(
                policy_id,
                resource_name,
                doc_id,
                relation,
                requester,
                target_actor,
                Utc::now(),
            )
            .await
            .map_err(|e| AcpError::FailedToDeleteDocActorRelationshipWithAcp {
                backend: client.backend_name(),
                policy_id: policy_id.to_string(),
                resource: resource_name.to_string(),
                doc_id: doc_id.to_string(),
                relation: relation.to_string(),
                request_actor: requester.did().to_string(),
                target_actor: target_actor.to_string(),
                source: Box::new(e),
            })?;

        self.bridge.logger().in_scope(|| {
            tracing::info!(
                policy_id = %policy_id,
                resource = %resource_name,
                doc_id = %doc_id,
                relation = %relation,
                request_actor = %requester.did(),
                target_actor = %target_actor,
                record_found,
                "Document and actor relationship deleted"
            )
        });
        Ok(record_found)
    }
}
