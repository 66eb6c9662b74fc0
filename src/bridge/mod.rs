//! Bridges: the only ACP surface the database talks to
//!
//! A bridge wraps one backend client and layers on lifecycle tracking, policy
//! format detection, argument checks and logging. [`DocumentAcp`] gates
//! documents, [`NodeAcp`] gates node administration; both share [`AcpBridge`].

pub mod document;
pub mod node;

pub use document::{new_ledger_document_acp, new_local_document_acp, DocumentAcp};
pub use node::{new_local_admin_acp, new_local_node_acp, NodeAcp};

use crate::client::AcpSystemClient;
use crate::error::{AcpError, AcpResult};
use crate::identity::Identity;
use crate::logging::AcpLogger;
use crate::types::{AcpSystemType, PolicyMarshalType};
use crate::validation;
use chrono::Utc;

/// Lifecycle of a bridge instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initialized,
    Started,
    Closed,
}

/// Which direction a relationship request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelationshipChange {
    Add,
    Delete,
}

/// Arguments of a relationship request, checked before any backend call
pub(crate) struct RelationshipArgs<'a> {
    pub policy_id: &'a str,
    pub resource_name: &'a str,
    pub object_id: &'a str,
    pub relation: &'a str,
    pub requester: &'a Identity,
    pub target_actor: &'a str,
}

impl RelationshipArgs<'_> {
    /// Reject the request if any argument is empty or the requester is the
    /// zero identity. One error carries every argument.
    pub fn check(&self, change: RelationshipChange) -> AcpResult<()> {
        let missing = self.policy_id.is_empty()
            || self.resource_name.is_empty()
            || self.object_id.is_empty()
            || self.relation.is_empty()
            || self.target_actor.is_empty()
            || self.requester.is_zero();
        if !missing {
            return Ok(());
        }

        let policy_id = self.policy_id.to_string();
        let resource_name = self.resource_name.to_string();
        let doc_id = self.object_id.to_string();
        let relation = self.relation.to_string();
        let request_actor = self.requester.did().to_string();
        let target_actor = self.target_actor.to_string();

        Err(match change {
            RelationshipChange::Add => AcpError::MissingRequiredArgToAddDocActorRelationship {
                policy_id,
                resource_name,
                doc_id,
                relation,
                request_actor,
                target_actor,
            },
            RelationshipChange::Delete => AcpError::MissingRequiredArgToDeleteDocActorRelationship {
                policy_id,
                resource_name,
                doc_id,
                relation,
                request_actor,
                target_actor,
            },
        })
    }
}

/// Lifecycle and backend access shared by both bridge kinds
pub struct AcpBridge {
    client: Box<dyn AcpSystemClient>,
    supports_p2p: bool,
    state: BridgeState,
    logger: AcpLogger,
}

impl AcpBridge {
    pub fn new(client: Box<dyn AcpSystemClient>, supports_p2p: bool, logger: AcpLogger) -> Self {
        Self {
            client,
            supports_p2p,
            state: BridgeState::Uninitialized,
            logger,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn supports_p2p(&self) -> bool {
        self.supports_p2p
    }

    pub fn logger(&self) -> &AcpLogger {
        &self.logger
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.backend_name()
    }

    /// Configure the storage path. Ignored while started.
    pub fn init(&mut self, path: &str) {
        if self.state == BridgeState::Started {
            self.logger.in_scope(|| {
                tracing::warn!(path = %path, "ignoring init of an acp that is already started")
            });
            return;
        }
        self.client.init(path);
        self.state = BridgeState::Initialized;
    }

    pub async fn start(&mut self) -> AcpResult<()> {
        match self.state {
            BridgeState::Uninitialized => Err(AcpError::AcpNotInitialized),
            BridgeState::Started => Ok(()),
            BridgeState::Initialized | BridgeState::Closed => {
                self.client.start().await?;
                self.state = BridgeState::Started;
                Ok(())
            }
        }
    }

    pub async fn close(&mut self) -> AcpResult<()> {
        let result = self.client.close().await;
        if self.state != BridgeState::Uninitialized {
            self.state = BridgeState::Closed;
        }
        result
    }

    /// Purge the backend's state. Only legal while started; the bridge is
    /// closed afterwards and must be started again before further use.
    pub async fn reset_state(&mut self) -> AcpResult<()> {
        if self.state != BridgeState::Started {
            return Err(AcpError::AcpNotStarted);
        }
        let result = self.client.reset_state().await;
        self.state = BridgeState::Closed;
        result
    }

    /// The backend, provided the bridge is started
    pub fn client(&self) -> AcpResult<&dyn AcpSystemClient> {
        if self.state != BridgeState::Started {
            return Err(AcpError::AcpNotStarted);
        }
        Ok(self.client.as_ref())
    }

    /// The backend's system type, if it is one `accepts` allows
    fn system_type(&self, accepts: fn(&AcpSystemType) -> bool) -> AcpResult<AcpSystemType> {
        match self.client.system_type() {
            Some(system_type) if accepts(&system_type) => Ok(system_type),
            _ => Err(AcpError::InvalidAcpSystem),
        }
    }

    pub async fn add_policy(&self, creator: &Identity, policy: &str) -> AcpResult<String> {
        if creator.is_anonymous() {
            return Err(AcpError::PolicyCreatorMustNotBeEmpty);
        }
        if policy.trim().is_empty() {
            return Err(AcpError::PolicyDataMustNotBeEmpty);
        }

        let client = self.client()?;
        let marshal_type = PolicyMarshalType::detect(policy);
        let policy_id = client
            .add_policy(creator, policy, marshal_type, Utc::now())
            .await
            .map_err(|e| AcpError::FailedToAddPolicyWithAcp {
                backend: client.backend_name(),
                creator: creator.did().to_string(),
                source: Box::new(e),
            })?;

        self.logger.in_scope(|| {
            tracing::info!(
                policy_id = %policy_id,
                creator = %creator.did(),
                marshal_type = ?marshal_type,
                "Created Policy"
            )
        });
        Ok(policy_id)
    }

    pub async fn validate_resource_interface(
        &self,
        policy_id: &str,
        resource_name: &str,
        accepts: fn(&AcpSystemType) -> bool,
    ) -> AcpResult<()> {
        let client = self.client()?;
        let system_type = self.system_type(accepts)?;
        validation::validate_resource_interface(policy_id, resource_name, system_type, client).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::CountingClient;
    use super::*;

    fn bridge() -> AcpBridge {
        let (client, _) = CountingClient::new(Some(AcpSystemType::LocalDocument));
        AcpBridge::new(Box::new(client), false, AcpLogger::disabled())
    }

    #[tokio::test]
    async fn state_machine_transitions() {
        let mut bridge = bridge();
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
        assert!(matches!(bridge.start().await, Err(AcpError::AcpNotInitialized)));
        assert!(matches!(bridge.client(), Err(AcpError::AcpNotStarted)));

        bridge.init("");
        assert_eq!(bridge.state(), BridgeState::Initialized);
        assert!(matches!(bridge.reset_state().await, Err(AcpError::AcpNotStarted)));

        bridge.start().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Started);
        assert!(bridge.client().is_ok());

        bridge.reset_state().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Closed);
        assert!(matches!(bridge.client(), Err(AcpError::AcpNotStarted)));

        bridge.start().await.unwrap();
        bridge.close().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Closed);

        bridge.init("");
        bridge.start().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Started);
    }

    #[tokio::test]
    async fn add_policy_rejects_empty_arguments_before_backend() {
        let (client, counter) = CountingClient::new(Some(AcpSystemType::LocalDocument));
        let mut bridge = AcpBridge::new(Box::new(client), false, AcpLogger::disabled());
        bridge.init("");
        bridge.start().await.unwrap();

        assert!(matches!(
            bridge.add_policy(&Identity::default(), "resources: {}").await,
            Err(AcpError::PolicyCreatorMustNotBeEmpty)
        ));
        assert!(matches!(
            bridge.add_policy(&Identity::generate(), "  ").await,
            Err(AcpError::PolicyDataMustNotBeEmpty)
        ));
        assert_eq!(counter.data_calls(), 0);
    }

    #[tokio::test]
    async fn missing_system_type_is_an_invalid_acp_system() {
        let (client, _) = CountingClient::new(None);
        let mut bridge = AcpBridge::new(Box::new(client), false, AcpLogger::disabled());
        bridge.init("");
        bridge.start().await.unwrap();

        let result = bridge
            .validate_resource_interface("p", "users", AcpSystemType::is_document)
            .await;
        assert!(matches!(result, Err(AcpError::InvalidAcpSystem)));
    }
}
