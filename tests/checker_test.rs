mod common;

use common::*;
use defra_acp::{
    check_access, register_doc_on_collection_with_document_acp, CollectionDescription,
    DocumentResourcePermission, Identity, PolicyDescription,
};

#[tokio::test]
async fn test_unregistered_documents_are_public() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let policy_id = acp.add_policy(&owner, USERS_POLICY_YAML).await.unwrap();
    let collection = CollectionDescription::new("Users")
        .with_policy(PolicyDescription::new(policy_id, USERS_RESOURCE));

    let stranger = Identity::generate();
    for identity in [None, Some(&owner), Some(&stranger)] {
        for permission in DocumentResourcePermission::ALL {
            assert!(check_access(identity, Some(&acp), &collection, permission.into(), "never")
                .await
                .unwrap());
        }
    }
}

#[tokio::test]
async fn test_registered_documents_are_gated() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let stranger = Identity::generate();
    let policy_id = acp.add_policy(&owner, USERS_POLICY_YAML).await.unwrap();
    let collection = CollectionDescription::new("Users")
        .with_policy(PolicyDescription::new(policy_id, USERS_RESOURCE));

    // anonymous writes are not registered
    register_doc_on_collection_with_document_acp(None, Some(&acp), &collection, "d1")
        .await
        .unwrap();
    assert!(check_access(
        Some(&stranger),
        Some(&acp),
        &collection,
        DocumentResourcePermission::Delete.into(),
        "d1"
    )
    .await
    .unwrap());

    register_doc_on_collection_with_document_acp(Some(&owner), Some(&acp), &collection, "d2")
        .await
        .unwrap();

    let read = DocumentResourcePermission::Read.into();
    assert!(check_access(Some(&owner), Some(&acp), &collection, read, "d2")
        .await
        .unwrap());
    assert!(!check_access(Some(&stranger), Some(&acp), &collection, read, "d2")
        .await
        .unwrap());
    assert!(!check_access(None, Some(&acp), &collection, read, "d2")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delete_grant_implies_read_through_checker() {
    let acp = started_local_document_acp().await;
    let owner = Identity::generate();
    let deleter = Identity::generate();
    let policy_id = acp.add_policy(&owner, DELEGATION_POLICY_YAML).await.unwrap();
    let collection = CollectionDescription::new("Users")
        .with_policy(PolicyDescription::new(policy_id.clone(), USERS_RESOURCE));

    register_doc_on_collection_with_document_acp(Some(&owner), Some(&acp), &collection, "d1")
        .await
        .unwrap();
    acp.add_doc_actor_relationship(&policy_id, USERS_RESOURCE, "d1", "deleter", &owner, deleter.did())
        .await
        .unwrap();

    assert!(check_access(
        Some(&deleter),
        Some(&acp),
        &collection,
        DocumentResourcePermission::Read.into(),
        "d1"
    )
    .await
    .unwrap());
    assert!(!check_access(
        Some(&deleter),
        Some(&acp),
        &collection,
        DocumentResourcePermission::Update.into(),
        "d1"
    )
    .await
    .unwrap());
}
