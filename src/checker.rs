//! Access checks as seen from the database layer
//!
//! Collections optionally carry a policy binding. Documents in an unbound
//! collection, and unregistered documents in a bound one, are public.

use crate::bridge::{DocumentAcp, NodeAcp};
use crate::error::{AcpError, AcpResult};
use crate::identity::{actor_id_of, Identity};
use crate::types::{AcpPermission, NodeResourcePermission, PolicyDescription, NODE_ACP_OBJECT_ID};
use serde::{Deserialize, Serialize};

/// The parts of a collection definition access checks care about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescription {
    pub name: String,
    pub policy: Option<PolicyDescription>,
}

impl CollectionDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: PolicyDescription) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Whether `identity` may exercise `permission` on document `doc_id`.
///
/// An absent identity is checked as the empty actor, which only wildcard
/// relationships grant.
pub async fn check_access(
    identity: Option<&Identity>,
    document_acp: Option<&DocumentAcp>,
    collection: &CollectionDescription,
    permission: AcpPermission,
    doc_id: &str,
) -> AcpResult<bool> {
    let policy = match &collection.policy {
        Some(policy) => policy,
        None => return Ok(true),
    };
    let acp = document_acp.ok_or(AcpError::AcpOperationButAcpNotAvailable)?;

    if !acp
        .is_doc_registered(&policy.id, &policy.resource_name, doc_id)
        .await?
    {
        return Ok(true);
    }

    let actor_id = actor_id_of(identity);

    let document_permission = match permission {
        AcpPermission::Document(p) => p,
        AcpPermission::Node(_) => {
            return Err(AcpError::InvalidResourcePermissionType {
                expected: "DocumentResourcePermission".to_string(),
                actual: permission.domain().to_string(),
            })
        }
    };

    acp.check_doc_access(
        document_permission,
        &actor_id,
        &policy.id,
        &policy.resource_name,
        doc_id,
    )
    .await
}

/// Register a freshly created document, provided its collection has a policy
/// and the writer is a concrete identity. Anonymous writes stay public.
pub async fn register_doc_on_collection_with_document_acp(
    identity: Option<&Identity>,
    document_acp: Option<&DocumentAcp>,
    collection: &CollectionDescription,
    doc_id: &str,
) -> AcpResult<()> {
    let (policy, identity) = match (&collection.policy, identity) {
        (Some(policy), Some(identity)) if !identity.is_anonymous() => (policy, identity),
        _ => return Ok(()),
    };
    let acp = document_acp.ok_or(AcpError::AcpOperationButAcpNotAvailable)?;

    acp.register_doc_object(identity, &policy.id, &policy.resource_name, doc_id)
        .await?;
    Ok(())
}

/// Node access control status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NacStatus {
    NotConfigured,
    Enabled,
    /// Configured once and switched off; relationships are kept.
    Disabled,
}

/// Node access control state handed to operation checks
pub struct NacInfo<'a> {
    pub status: NacStatus,
    pub policy: Option<PolicyDescription>,
    pub node_acp: Option<&'a NodeAcp>,
}

impl<'a> NacInfo<'a> {
    pub fn not_configured(node_acp: &'a NodeAcp) -> Self {
        Self {
            status: NacStatus::NotConfigured,
            policy: None,
            node_acp: Some(node_acp),
        }
    }

    pub fn enabled(node_acp: &'a NodeAcp, policy: PolicyDescription) -> Self {
        Self {
            status: NacStatus::Enabled,
            policy: Some(policy),
            node_acp: Some(node_acp),
        }
    }
}

/// Gate a node operation behind `permission`.
///
/// Unrestricted while node access control is off, except turning document
/// access control back on, which is always checked.
pub async fn check_node_operation_access(
    identity: Option<&Identity>,
    nac_info: &NacInfo<'_>,
    permission: NodeResourcePermission,
) -> AcpResult<()> {
    if nac_info.status != NacStatus::Enabled && permission != NodeResourcePermission::DacEnable {
        return Ok(());
    }

    let node_acp = nac_info
        .node_acp
        .ok_or(AcpError::AcpOperationButAcpNotAvailable)?;
    let policy = nac_info
        .policy
        .as_ref()
        .filter(|p| !p.id.is_empty() && !p.resource_name.is_empty())
        .ok_or(AcpError::NacIsEnabledButIsMissingPolicyInfo)?;

    if !node_acp
        .is_object_registered(&policy.id, &policy.resource_name, NODE_ACP_OBJECT_ID)
        .await?
    {
        return Err(AcpError::NacNodeObjectToGateIsNotRegistered);
    }

    let actor_id = actor_id_of(identity);
    let granted = node_acp
        .check_access(
            permission,
            &actor_id,
            &policy.id,
            &policy.resource_name,
            NODE_ACP_OBJECT_ID,
        )
        .await?;

    if granted {
        Ok(())
    } else {
        Err(AcpError::NotAuthorizedToPerformOperation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::test_support::CountingClient;
    use crate::logging::AcpLogger;
    use crate::types::{AcpSystemType, DocumentResourcePermission};

    async fn started_document_acp(client: CountingClient) -> DocumentAcp {
        let mut acp = DocumentAcp::new(Box::new(client), false, AcpLogger::disabled());
        acp.init("");
        acp.start().await.unwrap();
        acp
    }

    fn bound_collection() -> CollectionDescription {
        CollectionDescription::new("Users").with_policy(PolicyDescription::new("p", "users"))
    }

    #[tokio::test]
    async fn unbound_collection_is_unrestricted() {
        let allowed = check_access(
            None,
            None,
            &CollectionDescription::new("Users"),
            DocumentResourcePermission::Update.into(),
            "doc",
        )
        .await
        .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn bound_collection_without_acp_fails() {
        let result = check_access(
            None,
            None,
            &bound_collection(),
            DocumentResourcePermission::Read.into(),
            "doc",
        )
        .await;
        assert!(matches!(result, Err(AcpError::AcpOperationButAcpNotAvailable)));
    }

    #[tokio::test]
    async fn unregistered_document_is_public() {
        let (mut client, counter) = CountingClient::new(Some(AcpSystemType::LocalDocument));
        client.owner = None;
        let acp = started_document_acp(client).await;

        let allowed = check_access(
            None,
            Some(&acp),
            &bound_collection(),
            DocumentResourcePermission::Delete.into(),
            "doc",
        )
        .await
        .unwrap();
        assert!(allowed);
        // only the registration lookup
        assert_eq!(counter.data_calls(), 1);
    }

    #[tokio::test]
    async fn node_permission_on_a_document_is_rejected() {
        let (client, _) = CountingClient::new(Some(AcpSystemType::LocalDocument));
        let acp = started_document_acp(client).await;

        let result = check_access(
            None,
            Some(&acp),
            &bound_collection(),
            NodeResourcePermission::DacStatus.into(),
            "doc",
        )
        .await;
        assert!(matches!(result, Err(AcpError::InvalidResourcePermissionType { .. })));
    }

    #[tokio::test]
    async fn anonymous_writes_are_not_registered() {
        let (client, counter) = CountingClient::new(Some(AcpSystemType::LocalDocument));
        let acp = started_document_acp(client).await;

        register_doc_on_collection_with_document_acp(None, Some(&acp), &bound_collection(), "doc")
            .await
            .unwrap();
        register_doc_on_collection_with_document_acp(
            Some(&Identity::default()),
            Some(&acp),
            &bound_collection(),
            "doc",
        )
        .await
        .unwrap();
        assert_eq!(counter.data_calls(), 0);

        register_doc_on_collection_with_document_acp(
            Some(&Identity::generate()),
            Some(&acp),
            &bound_collection(),
            "doc",
        )
        .await
        .unwrap();
        assert_eq!(counter.data_calls(), 1);
    }

    #[tokio::test]
    async fn disabled_nac_only_gates_reenabling() {
        let (client, counter) = CountingClient::new(Some(AcpSystemType::LocalNode));
        let mut node_acp = NodeAcp::new(Box::new(client), AcpLogger::disabled());
        node_acp.init("");
        node_acp.start().await.unwrap();

        let info = NacInfo {
            status: NacStatus::Disabled,
            policy: None,
            node_acp: Some(&node_acp),
        };
        check_node_operation_access(None, &info, NodeResourcePermission::DacPurge)
            .await
            .unwrap();
        assert_eq!(counter.data_calls(), 0);

        let result =
            check_node_operation_access(None, &info, NodeResourcePermission::DacEnable).await;
        assert!(matches!(result, Err(AcpError::NacIsEnabledButIsMissingPolicyInfo)));
    }

    #[tokio::test]
    async fn enabled_nac_denies_ungranted_actor() {
        let (client, _) = CountingClient::new(Some(AcpSystemType::LocalNode));
        let mut node_acp = NodeAcp::new(Box::new(client), AcpLogger::disabled());
        node_acp.init("");
        node_acp.start().await.unwrap();

        let info = NacInfo::enabled(&node_acp, PolicyDescription::new("p", "node"));
        let result =
            check_node_operation_access(None, &info, NodeResourcePermission::AacStatus).await;
        assert!(matches!(result, Err(AcpError::NotAuthorizedToPerformOperation)));
    }
}
