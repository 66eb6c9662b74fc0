mod common;

use common::*;
use defra_acp::{
    new_local_document_acp, AcpError, AcpLogger, DocumentResourcePermission, Identity,
    RegistrationResult, WILDCARD_ACTOR,
};

#[tokio::test]
async fn test_reader_relationship_grants_read_only() {
    let acp = started_local_document_acp().await;
    let i1 = Identity::generate();
    let i2 = Identity::generate();

    let policy_id = acp.add_policy(&i1, USERS_POLICY_YAML).await.unwrap();
    acp.validate_resource_interface(&policy_id, USERS_RESOURCE)
        .await
        .unwrap();

    let result = acp
        .register_doc_object(&i1, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();
    assert_eq!(result, RegistrationResult::Registered);

    let read = DocumentResourcePermission::Read;
    assert!(acp
        .check_doc_access(read, i1.did(), &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
    assert!(!acp
        .check_doc_access(read, i2.did(), &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());

    let existed = acp
        .add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &i1, i2.did())
        .await
        .unwrap();
    assert!(!existed);

    assert!(acp
        .check_doc_access(read, i2.did(), &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
    assert!(!acp
        .check_doc_access(
            DocumentResourcePermission::Update,
            i2.did(),
            &policy_id,
            USERS_RESOURCE,
            "d1"
        )
        .await
        .unwrap());

    // adding again reports the existing record
    assert!(acp
        .add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &i1, i2.did())
        .await
        .unwrap());

    assert!(acp
        .delete_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &i1, i2.did())
        .await
        .unwrap());
    assert!(!acp
        .check_doc_access(read, i2.did(), &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_same_policy_gets_same_id_after_reinit() {
    let creator = Identity::generate();
    let mut acp = new_local_document_acp(AcpLogger::disabled());

    acp.init("");
    acp.start().await.unwrap();
    let first = acp.add_policy(&creator, USERS_POLICY_YAML).await.unwrap();
    acp.close().await.unwrap();

    acp.init("");
    acp.start().await.unwrap();
    let second = acp.add_policy(&creator, USERS_POLICY_YAML).await.unwrap();
    acp.close().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_json_and_yaml_policies_get_the_same_id() {
    let creator = Identity::generate();

    let yaml_acp = started_local_document_acp().await;
    let json_acp = started_local_document_acp().await;

    let from_yaml = yaml_acp.add_policy(&creator, USERS_POLICY_YAML).await.unwrap();
    let from_json = json_acp.add_policy(&creator, USERS_POLICY_JSON).await.unwrap();
    assert_eq!(from_yaml, from_json);
}

#[tokio::test]
async fn test_required_permissions_must_start_with_owner() {
    let acp = started_local_document_acp().await;
    let creator = Identity::generate();

    let policy_id = acp
        .add_policy(&creator, &policy_with_expr("admin"))
        .await
        .unwrap();
    let result = acp
        .validate_resource_interface(&policy_id, USERS_RESOURCE)
        .await;
    assert!(matches!(
        result,
        Err(AcpError::ExprOfRequiredPermissionMustStartWithRelation { .. })
    ));

    let policy_id = acp
        .add_policy(&creator, &policy_with_expr("ownerX"))
        .await
        .unwrap();
    let result = acp
        .validate_resource_interface(&policy_id, USERS_RESOURCE)
        .await;
    assert!(matches!(
        result,
        Err(AcpError::ExprOfRequiredPermissionHasInvalidChar { character: 'X', .. })
    ));

    let policy_id = acp
        .add_policy(&creator, &policy_with_expr("owner + reader"))
        .await
        .unwrap();
    acp.validate_resource_interface(&policy_id, USERS_RESOURCE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deeply_nested_expression_is_rejected() {
    let acp = started_local_document_acp().await;
    let creator = Identity::generate();

    let nested = format!("{}owner{}", "(".repeat(10_000), ")".repeat(10_000));
    let policy = USERS_POLICY_JSON.replace("\"owner + reader\"", &format!("\"{}\"", nested));
    assert!(policy.contains(&nested));

    let error = acp.add_policy(&creator, &policy).await.unwrap_err();
    assert!(matches!(error, AcpError::FailedToAddPolicyWithAcp { .. }));
    assert!(matches!(error.root_cause(), AcpError::InvalidPolicy(_)));

    let chain = vec!["owner"; 10_000].join(" + ");
    let policy = USERS_POLICY_JSON.replace("\"owner + reader\"", &format!("\"{}\"", chain));
    let error = acp.add_policy(&creator, &policy).await.unwrap_err();
    assert!(matches!(error.root_cause(), AcpError::InvalidPolicy(_)));

    // the store is still usable afterwards
    acp.add_policy(&creator, USERS_POLICY_JSON).await.unwrap();
}

#[tokio::test]
async fn test_validation_reports_missing_policy_and_resource() {
    let acp = started_local_document_acp().await;
    let creator = Identity::generate();

    let result = acp.validate_resource_interface("nope", USERS_RESOURCE).await;
    assert!(matches!(result, Err(AcpError::PolicyDoesNotExistWithAcp { .. })));

    let policy_id = acp.add_policy(&creator, USERS_POLICY_YAML).await.unwrap();
    let result = acp.validate_resource_interface(&policy_id, "books").await;
    assert!(matches!(
        result,
        Err(AcpError::ResourceDoesNotExistOnTargetPolicy { .. })
    ));
}

#[tokio::test]
async fn test_wildcard_reader_grants_everyone_including_anonymous() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let policy_id = acp.add_policy(&owner, USERS_POLICY_YAML).await.unwrap();
    acp.register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();

    let read = DocumentResourcePermission::Read;
    assert!(!acp
        .check_doc_access(read, "", &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());

    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &owner, WILDCARD_ACTOR)
        .await
        .unwrap();

    let stranger = Identity::generate();
    assert!(acp
        .check_doc_access(read, "", &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
    assert!(acp
        .check_doc_access(read, stranger.did(), &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_update_or_delete_implies_read() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let writer = Identity::generate();
    let deleter = Identity::generate();
    let nobody = Identity::generate();

    let policy_id = acp.add_policy(&owner, DELEGATION_POLICY_YAML).await.unwrap();
    acp.validate_resource_interface(&policy_id, USERS_RESOURCE)
        .await
        .unwrap();
    acp.register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();
    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "writer", &owner, writer.did())
        .await
        .unwrap();
    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "deleter", &owner, deleter.did())
        .await
        .unwrap();

    let read = DocumentResourcePermission::Read;
    for actor in [&writer, &deleter] {
        assert!(acp
            .check_doc_access(read, actor.did(), &policy_id, USERS_RESOURCE, "d1")
            .await
            .unwrap());
    }
    assert!(!acp
        .check_doc_access(read, nobody.did(), &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_managers_can_grant_only_managed_relations() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let admin = Identity::generate();
    let reader = Identity::generate();

    let policy_id = acp.add_policy(&owner, DELEGATION_POLICY_YAML).await.unwrap();
    acp.register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();

    // not yet an admin
    let result = acp
        .add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &admin, reader.did())
        .await;
    assert!(matches!(
        result.unwrap_err().root_cause(),
        AcpError::Unauthorized { .. }
    ));

    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "admin", &owner, admin.did())
        .await
        .unwrap();
    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &admin, reader.did())
        .await
        .unwrap();
    assert!(acp
        .check_doc_access(
            DocumentResourcePermission::Read,
            reader.did(),
            &policy_id,
            USERS_RESOURCE,
            "d1"
        )
        .await
        .unwrap());

    // admins do not manage deleters
    let result = acp
        .add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "deleter", &admin, reader.did())
        .await;
    assert!(matches!(
        result.unwrap_err().root_cause(),
        AcpError::Unauthorized { .. }
    ));

    let result = acp
        .add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "owner", &owner, admin.did())
        .await;
    assert!(matches!(
        result.unwrap_err().root_cause(),
        AcpError::CannotMutateOwnerRelationship
    ));
}

#[tokio::test]
async fn test_archive_and_unarchive() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let reader = Identity::generate();
    let other = Identity::generate();

    let policy_id = acp.add_policy(&owner, USERS_POLICY_YAML).await.unwrap();
    acp.register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();
    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &owner, reader.did())
        .await
        .unwrap();

    // someone else cannot claim or archive the document
    let result = acp
        .register_doc_object(&other, &policy_id, USERS_RESOURCE, "d1")
        .await;
    assert!(matches!(
        result.unwrap_err().root_cause(),
        AcpError::ObjectAlreadyRegistered { .. }
    ));
    assert!(acp
        .archive_doc_object(&other, &policy_id, USERS_RESOURCE, "d1")
        .await
        .is_err());

    assert!(acp
        .archive_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());

    // archived documents stay registered but grant nothing
    assert!(acp
        .is_doc_registered(&policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap());
    assert!(!acp
        .check_doc_access(
            DocumentResourcePermission::Read,
            owner.did(),
            &policy_id,
            USERS_RESOURCE,
            "d1"
        )
        .await
        .unwrap());

    let result = acp
        .register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();
    assert_eq!(result, RegistrationResult::Unarchived);
    assert!(acp
        .check_doc_access(
            DocumentResourcePermission::Read,
            owner.did(),
            &policy_id,
            USERS_RESOURCE,
            "d1"
        )
        .await
        .unwrap());

    // relationships were dropped on archive
    assert!(!acp
        .check_doc_access(
            DocumentResourcePermission::Read,
            reader.did(),
            &policy_id,
            USERS_RESOURCE,
            "d1"
        )
        .await
        .unwrap());

    let result = acp
        .register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();
    assert_eq!(result, RegistrationResult::NoOp);
}

#[tokio::test]
async fn test_invalid_target_actor_is_rejected() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let policy_id = acp.add_policy(&owner, USERS_POLICY_YAML).await.unwrap();
    acp.register_doc_object(&owner, &policy_id, USERS_RESOURCE, "d1")
        .await
        .unwrap();

    let result = acp
        .add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "reader", &owner, "bob")
        .await;
    assert!(matches!(
        result.unwrap_err().root_cause(),
        AcpError::InvalidActorId { .. }
    ));
}
