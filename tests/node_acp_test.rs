use defra_acp::types::{NODE_ACP_OBJECT_ID, NODE_ACP_POLICY_RESOURCE_NAME};
use defra_acp::{
    check_node_operation_access, new_local_admin_acp, new_local_node_acp, AcpError, AcpLogger,
    BridgeState, Identity, NacInfo, NacStatus, NodeAcp, NodeResourcePermission,
    RegistrationResult,
};
use tempfile::TempDir;

async fn started_node_acp() -> NodeAcp {
    let mut acp = new_local_node_acp(AcpLogger::disabled());
    acp.init("");
    acp.start().await.unwrap();
    acp
}

#[tokio::test]
async fn test_builtin_policy_setup_registers_node_object() {
    let mut acp = started_node_acp().await;
    let admin = Identity::generate();

    let policy = acp.setup_with_builtin_policy(&admin).await.unwrap();
    assert_eq!(policy.resource_name, NODE_ACP_POLICY_RESOURCE_NAME);
    assert!(acp
        .is_object_registered(&policy.id, &policy.resource_name, NODE_ACP_OBJECT_ID)
        .await
        .unwrap());

    for permission in NodeResourcePermission::ALL {
        assert!(acp
            .check_access(
                permission,
                admin.did(),
                &policy.id,
                &policy.resource_name,
                NODE_ACP_OBJECT_ID
            )
            .await
            .unwrap());
    }

    // registering again is a no-op for the same owner
    let result = acp
        .register_object(&admin, &policy.id, &policy.resource_name, NODE_ACP_OBJECT_ID)
        .await
        .unwrap();
    assert_eq!(result, RegistrationResult::NoOp);
}

#[tokio::test]
async fn test_auditor_can_only_read_status() {
    let mut acp = started_node_acp().await;
    let owner = Identity::generate();
    let auditor = Identity::generate();
    let policy = acp.setup_with_builtin_policy(&owner).await.unwrap();

    let info = NacInfo::enabled(&acp, policy.clone());
    let result =
        check_node_operation_access(Some(&auditor), &info, NodeResourcePermission::DacStatus).await;
    assert!(matches!(result, Err(AcpError::NotAuthorizedToPerformOperation)));

    let existed = acp
        .add_actor_relationship(
            &policy.id,
            &policy.resource_name,
            NODE_ACP_OBJECT_ID,
            "auditor",
            &owner,
            auditor.did(),
        )
        .await
        .unwrap();
    assert!(!existed);

    let info = NacInfo::enabled(&acp, policy.clone());
    check_node_operation_access(Some(&auditor), &info, NodeResourcePermission::DacStatus)
        .await
        .unwrap();
    check_node_operation_access(Some(&auditor), &info, NodeResourcePermission::AacStatus)
        .await
        .unwrap();
    let result =
        check_node_operation_access(Some(&auditor), &info, NodeResourcePermission::DacPurge).await;
    assert!(matches!(result, Err(AcpError::NotAuthorizedToPerformOperation)));

    // anonymous requests are denied too
    let result = check_node_operation_access(None, &info, NodeResourcePermission::DacStatus).await;
    assert!(matches!(result, Err(AcpError::NotAuthorizedToPerformOperation)));

    let found = acp
        .delete_actor_relationship(
            &policy.id,
            &policy.resource_name,
            NODE_ACP_OBJECT_ID,
            "auditor",
            &owner,
            auditor.did(),
        )
        .await
        .unwrap();
    assert!(found);
}

#[tokio::test]
async fn test_admins_manage_auditors() {
    let mut acp = started_node_acp().await;
    let owner = Identity::generate();
    let admin = Identity::generate();
    let auditor = Identity::generate();
    let policy = acp.setup_with_builtin_policy(&owner).await.unwrap();

    acp.add_actor_relationship(
        &policy.id,
        &policy.resource_name,
        NODE_ACP_OBJECT_ID,
        "admin",
        &owner,
        admin.did(),
    )
    .await
    .unwrap();
    acp.add_actor_relationship(
        &policy.id,
        &policy.resource_name,
        NODE_ACP_OBJECT_ID,
        "auditor",
        &admin,
        auditor.did(),
    )
    .await
    .unwrap();

    // admins do not manage other admins
    let error = acp
        .add_actor_relationship(
            &policy.id,
            &policy.resource_name,
            NODE_ACP_OBJECT_ID,
            "admin",
            &admin,
            auditor.did(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        AcpError::FailedToMutateNodeActorRelationshipWithAcp { operation: "add", .. }
    ));
    assert!(matches!(error.root_cause(), AcpError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_nac_off_is_unrestricted_except_reenabling() {
    let acp = started_node_acp().await;
    let info = NacInfo::not_configured(&acp);

    check_node_operation_access(None, &info, NodeResourcePermission::AacPolicyAdd)
        .await
        .unwrap();
    let result = check_node_operation_access(None, &info, NodeResourcePermission::DacEnable).await;
    assert!(matches!(result, Err(AcpError::NacIsEnabledButIsMissingPolicyInfo)));
}

#[tokio::test]
async fn test_unregistered_node_object_fails_closed() {
    let acp = started_node_acp().await;
    let creator = Identity::generate();
    let policy_id = acp
        .add_policy(&creator, defra_acp::types::NODE_ACP_POLICY)
        .await
        .unwrap();

    let info = NacInfo {
        status: NacStatus::Enabled,
        policy: Some(defra_acp::PolicyDescription::new(
            policy_id,
            NODE_ACP_POLICY_RESOURCE_NAME,
        )),
        node_acp: Some(&acp),
    };
    let result =
        check_node_operation_access(Some(&creator), &info, NodeResourcePermission::DacStatus).await;
    assert!(matches!(result, Err(AcpError::NacNodeObjectToGateIsNotRegistered)));
}

#[tokio::test]
async fn test_admin_store_is_separate_from_node_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_str().unwrap();
    let owner = Identity::generate();

    let mut node = new_local_node_acp(AcpLogger::disabled());
    node.init(path);
    node.start().await.unwrap();
    let policy = node.setup_with_builtin_policy(&owner).await.unwrap();

    let mut admin = new_local_admin_acp(AcpLogger::disabled());
    admin.init(path);
    admin.start().await.unwrap();
    let result = admin
        .validate_resource_interface(&policy.id, &policy.resource_name)
        .await;
    assert!(matches!(result, Err(AcpError::PolicyDoesNotExistWithAcp { .. })));

    assert!(dir.path().join("node_acp").exists());
    assert!(dir.path().join("admin_acp").exists());

    node.close().await.unwrap();
    admin.close().await.unwrap();
    assert_eq!(node.state(), BridgeState::Closed);
}
