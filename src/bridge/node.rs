use crate::bridge::{AcpBridge, BridgeState, RelationshipArgs, RelationshipChange};
use crate::client::AcpSystemClient;
use crate::error::{AcpError, AcpResult};
use crate::identity::Identity;
use crate::local::{AcpKind, LocalAcp};
use crate::logging::AcpLogger;
use crate::types::{
    AcpSystemType, NodeResourcePermission, PolicyDescription, RegistrationResult,
    NODE_ACP_OBJECT_ID, NODE_ACP_POLICY, NODE_ACP_POLICY_RESOURCE_NAME,
};
use chrono::Utc;

/// Node access control: gates administrative operations on the node itself
pub struct NodeAcp {
    bridge: AcpBridge,
}

/// Node ACP over the embedded `node_acp` store
pub fn new_local_node_acp(logger: AcpLogger) -> NodeAcp {
    NodeAcp::new(Box::new(LocalAcp::new(AcpKind::Node, logger.clone())), logger)
}

/// Node ACP over the embedded `admin_acp` store
pub fn new_local_admin_acp(logger: AcpLogger) -> NodeAcp {
    NodeAcp::new(Box::new(LocalAcp::new(AcpKind::Admin, logger.clone())), logger)
}

impl NodeAcp {
    pub fn new(client: Box<dyn AcpSystemClient>, logger: AcpLogger) -> Self {
        Self {
            bridge: AcpBridge::new(client, false, logger),
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

    pub async fn add_policy(&self, creator: &Identity, policy: &str) -> AcpResult<String> {
        self.bridge.add_policy(creator, policy).await
    }

    /// Check that a policy resource exposes every node permission, each
    /// granted to `owner`
    pub async fn validate_resource_interface(
        &self,
        policy_id: &str,
        resource_name: &str,
    ) -> AcpResult<()> {
        self.bridge
            .validate_resource_interface(policy_id, resource_name, AcpSystemType::is_node)
            .await
    }

    pub async fn register_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<RegistrationResult> {
        let client = self.bridge.client()?;
        client
            .register_object(identity, policy_id, resource_name, object_id, Utc::now())
            .await
            .map_err(|e| AcpError::FailedToRegisterNodeObjectWithAcp {
                policy_id: policy_id.to_string(),
                actor: identity.did().to_string(),
                resource: resource_name.to_string(),
                object_id: object_id.to_string(),
                source: Box::new(e),
            })
    }

    pub async fn is_object_registered(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<bool> {
        let client = self.bridge.client()?;
        let owner = client
            .object_owner(policy_id, resource_name, object_id)
            .await
            .map_err(|e| AcpError::FailedToCheckIfNodeObjectIsRegisteredWithAcp {
                policy_id: policy_id.to_string(),
                resource: resource_name.to_string(),
                object_id: object_id.to_string(),
                source: Box::new(e),
            })?;
        Ok(owner.is_some())
    }

    pub async fn check_access(
        &self,
        permission: NodeResourcePermission,
        actor_id: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<bool> {
        let client = self.bridge.client()?;
        let granted = client
            .verify_access_request(permission.as_str(), actor_id, policy_id, resource_name, object_id)
            .await
            .map_err(|e| AcpError::FailedToVerifyNodeAccessWithAcp {
                permission: permission.as_str().to_string(),
                policy_id: policy_id.to_string(),
                actor_id: actor_id.to_string(),
                resource: resource_name.to_string(),
                object_id: object_id.to_string(),
                source: Box::new(e),
            })?;

        self.bridge.logger().in_scope(|| {
            tracing::debug!(
                permission = %permission,
                actor_id = %actor_id,
                granted,
                "Checked node access"
            )
        });
        Ok(granted)
    }

    /// Returns true if the relationship already existed
    pub async fn add_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
    ) -> AcpResult<bool> {
        self.mutate_relationship(
            RelationshipChange::Add,
            RelationshipArgs {
                policy_id,
                resource_name,
                object_id,
                relation,
                requester,
                target_actor,
            },
        )
        .await
    }

    /// Returns true if a relationship was found and removed
    pub async fn delete_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
    ) -> AcpResult<bool> {
        self.mutate_relationship(
            RelationshipChange::Delete,
            RelationshipArgs {
                policy_id,
                resource_name,
                object_id,
                relation,
                requester,
                target_actor,
            },
        )
        .await
    }

    async fn mutate_relationship(
        &self,
        change: RelationshipChange,
        args: RelationshipArgs<'_>,
    ) -> AcpResult<bool> {
        args.check(change)?;

        let client = self.bridge.client()?;
        let now = Utc::now();
        let result = match change {
            RelationshipChange::Add => {
                client
                    .add_actor_relationship(
                        args.policy_id,
                        args.resource_name,
                        args.object_id,
                        args.relation,
                        args.requester,
                        args.target_actor,
                        now,
                    )
                    .await
            }
            RelationshipChange::Delete => {
                client
                    .delete_actor_relationship(
                        args.policy_id,
                        args.resource_name,
                        args.object_id,
                        args.relation,
                        args.requester,
                        args.target_actor,
                        now,
                    )
                    .await
            }
        };

        let operation = match change {
            RelationshipChange::Add => "add",
            RelationshipChange::Delete => "delete",
        };
        let changed = result.map_err(|e| AcpError::FailedToMutateNodeActorRelationshipWithAcp {
            operation,
            policy_id: args.policy_id.to_string(),
            relation: args.relation.to_string(),
            request_actor: args.requester.did().to_string(),
            target_actor: args.target_actor.to_string(),
            source: Box::new(e),
        })?;

        self.bridge.logger().in_scope(|| {
            tracing::info!(
                operation,
                relation = %args.relation,
                request_actor = %args.requester.did(),
                target_actor = %args.target_actor,
                result = changed,
                "Node and actor relationship changed"
            )
        });
        Ok(changed)
    }

    /// Upload the built-in node policy, validate it and register the node
    /// object owned by `identity`.
    ///
    /// If anything fails after the upload, the node ACP is reset and started
    /// again so no half-configured policy is left behind.
    pub async fn setup_with_builtin_policy(
        &mut self,
        identity: &Identity,
    ) -> AcpResult<PolicyDescription> {
        if identity.is_anonymous() {
            return Err(AcpError::PolicyCreatorMustNotBeEmpty);
        }

        let policy_id = self.add_policy(identity, NODE_ACP_POLICY).await?;

        let registered = async {
            self.validate_resource_interface(&policy_id, NODE_ACP_POLICY_RESOURCE_NAME)
                .await?;
            self.register_object(
                identity,
                &policy_id,
                NODE_ACP_POLICY_RESOURCE_NAME,
                NODE_ACP_OBJECT_ID,
            )
            .await
        }
        .await;

        match registered {
            Ok(_) => {
                self.bridge.logger().in_scope(|| {
                    tracing::info!(policy_id = %policy_id, owner = %identity.did(), "Node acp configured")
                });
                Ok(PolicyDescription::new(policy_id, NODE_ACP_POLICY_RESOURCE_NAME))
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }

    async fn rollback(&mut self) {
        let restored = match self.bridge.reset_state().await {
            Ok(()) => self.bridge.start().await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            self.bridge.logger().in_scope(|| {
                tracing::error!(error = %e, "failed to roll back node acp setup")
            });
        }
    }
}
