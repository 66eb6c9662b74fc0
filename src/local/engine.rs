//! Relationship engine over an [`AcpStore`]
//!
//! Holds the authorization semantics shared by the embedded backend and the
//! in-process mock ledger: object registration and archiving, relationship
//! tuples with owner/manager authorization, and permission evaluation.

use crate::error::{AcpError, AcpResult};
use crate::identity::{is_valid_did, WILDCARD_ACTOR};
use crate::local::expr::Expr;
use crate::local::policy_parser::{parse_policy, PolicyDefinition, ResourceDefinition, OWNER_RELATION};
use crate::local::store::{key, key_prefix, AcpStore};
use crate::logging::AcpLogger;
use crate::types::{PolicyMarshalType, RegistrationResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sled::transaction::{abort, ConflictableTransactionError, ConflictableTransactionResult};
use sled::Transactional;

/// A policy as persisted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    pub id: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub definition: PolicyDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub owner: String,
    pub archived: bool,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Which direction a relationship mutation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Set,
    Delete,
}

fn encode<T: Serialize>(item: &T) -> ConflictableTransactionResult<Vec<u8>, AcpError> {
    serde_json::to_vec(item).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ConflictableTransactionResult<T, AcpError> {
    serde_json::from_slice(bytes).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn check_requester(actor: &str) -> AcpResult<()> {
    if is_valid_did(actor) {
        Ok(())
    } else {
        Err(AcpError::InvalidActorId {
            actor_id: actor.to_string(),
        })
    }
}

fn check_target(actor: &str) -> AcpResult<()> {
    if actor == WILDCARD_ACTOR {
        Ok(())
    } else {
        check_requester(actor)
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    store: AcpStore,
    logger: AcpLogger,
}

impl PolicyEngine {
    pub fn new(store: AcpStore, logger: AcpLogger) -> Self {
        Self { store, logger }
    }

    pub fn store(&self) -> &AcpStore {
        &self.store
    }

    pub fn logger(&self) -> &AcpLogger {
        &self.logger
    }

    /// Parse, validate and persist a policy.
    ///
    /// The id hashes the creator, the store's policy sequence and the canonical
    /// policy, plus `nonce` when given. Without a nonce a fresh store assigns
    /// the same ids to the same submissions.
    pub fn create_policy(
        &self,
        creator: &str,
        text: &str,
        marshal_type: PolicyMarshalType,
        creation_time: DateTime<Utc>,
        nonce: Option<&str>,
    ) -> AcpResult<StoredPolicy> {
        if creator.is_empty() {
            return Err(AcpError::PolicyCreatorMustNotBeEmpty);
        }
        let definition = parse_policy(text, marshal_type)?;
        let sequence = self.store.next_policy_sequence()?;

        let mut hasher = Sha256::new();
        hasher.update(creator.as_bytes());
        hasher.update([0u8]);
        hasher.update(sequence.to_be_bytes());
        hasher.update([0u8]);
        hasher.update(definition.canonical_json()?);
        if let Some(nonce) = nonce {
            hasher.update([0u8]);
            hasher.update(nonce.as_bytes());
        }
        let id = hex::encode(hasher.finalize());

        let stored = StoredPolicy {
            id: id.clone(),
            creator: creator.to_string(),
            created_at: creation_time,
            definition,
        };
        self.store
            .store_in_tree(&self.store.policies_tree, &id, &stored)?;
        self.store.flush()?;

        self.logger.in_scope(|| {
            tracing::debug!(policy_id = %id, creator = %creator, sequence, "stored policy")
        });
        Ok(stored)
    }

    pub fn policy(&self, policy_id: &str) -> AcpResult<Option<StoredPolicy>> {
        self.store.get_from_tree(&self.store.policies_tree, policy_id)
    }

    fn resource(&self, policy_id: &str, resource_name: &str) -> AcpResult<ResourceDefinition> {
        let policy = self
            .policy(policy_id)?
            .ok_or_else(|| AcpError::PolicyNotFound {
                policy_id: policy_id.to_string(),
            })?;

        policy
            .definition
            .resources
            .get(resource_name)
            .cloned()
            .ok_or_else(|| AcpError::ResourceNotFound {
                policy_id: policy_id.to_string(),
                resource: resource_name.to_string(),
            })
    }

    pub fn register_object(
        &self,
        actor: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<RegistrationResult> {
        check_requester(actor)?;
        self.resource(policy_id, resource_name)?;

        let object_key = key(&[policy_id, resource_name, object_id]);
        let result = self.store.objects_tree.transaction(
            |objects| -> ConflictableTransactionResult<RegistrationResult, AcpError> {
                let existing = match objects.get(object_key.as_bytes())? {
                    Some(bytes) => decode::<ObjectRecord>(&bytes)?,
                    None => {
                        let record = ObjectRecord {
                            owner: actor.to_string(),
                            archived: false,
                            registered_at: creation_time,
                            updated_at: creation_time,
                        };
                        objects.insert(object_key.as_bytes(), encode(&record)?)?;
                        return Ok(RegistrationResult::Registered);
                    }
                };

                if existing.owner != actor {
                    return abort(AcpError::ObjectAlreadyRegistered {
                        resource: resource_name.to_string(),
                        object_id: object_id.to_string(),
                    });
                }
                if !existing.archived {
                    return Ok(RegistrationResult::NoOp);
                }

                let record = ObjectRecord {
                    archived: false,
                    updated_at: creation_time,
                    ..existing
                };
                objects.insert(object_key.as_bytes(), encode(&record)?)?;
                Ok(RegistrationResult::Unarchived)
            },
        )?;

        self.store.flush()?;
        Ok(result)
    }

    /// Archive an object. Only the owner may do so; all non-owner
    /// relationships of the object are dropped.
    pub fn archive_object(
        &self,
        actor: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        check_requester(actor)?;
        self.resource(policy_id, resource_name)?;

        let object_key = key(&[policy_id, resource_name, object_id]);
        let prefix = key_prefix(&[policy_id, resource_name, object_id]);
        let relationship_keys = self
            .store
            .keys_with_prefix(&self.store.relationships_tree, &prefix)?;

        let store = &self.store;
        let archived = (&store.objects_tree, &store.relationships_tree).transaction(
            |(objects, relationships)| -> ConflictableTransactionResult<bool, AcpError> {
                let existing = match objects.get(object_key.as_bytes())? {
                    Some(bytes) => decode::<ObjectRecord>(&bytes)?,
                    None => {
                        return abort(AcpError::ObjectNotRegistered {
                            resource: resource_name.to_string(),
                            object_id: object_id.to_string(),
                        })
                    }
                };
                if existing.owner != actor {
                    return abort(AcpError::Unauthorized {
                        actor: actor.to_string(),
                        action: format!("archive object {}", object_id),
                    });
                }
                if existing.archived {
                    return Ok(false);
                }

                let record = ObjectRecord {
                    archived: true,
                    updated_at: creation_time,
                    ..existing
                };
                objects.insert(object_key.as_bytes(), encode(&record)?)?;
                for relationship_key in &relationship_keys {
                    relationships.remove(relationship_key.as_bytes())?;
                }
                Ok(true)
            },
        )?;

        if archived {
            self.purge_archived_relationships(&object_key, &prefix)?;
        }

        self.store.flush()?;
        Ok(archived)
    }

    /// Drop relationships written between the key scan and the archive
    /// commit. Does nothing once the object is live again.
    fn purge_archived_relationships(&self, object_key: &str, prefix: &str) -> AcpResult<()> {
        let leftover = self
            .store
            .keys_with_prefix(&self.store.relationships_tree, prefix)?;
        if leftover.is_empty() {
            return Ok(());
        }

        let store = &self.store;
        (&store.objects_tree, &store.relationships_tree).transaction(
            |(objects, relationships)| -> ConflictableTransactionResult<(), AcpError> {
                let still_archived = match objects.get(object_key.as_bytes())? {
                    Some(bytes) => decode::<ObjectRecord>(&bytes)?.archived,
                    None => false,
                };
                if still_archived {
                    for relationship_key in &leftover {
                        relationships.remove(relationship_key.as_bytes())?;
                    }
                }
                Ok(())
            },
        )?;
        Ok(())
    }

    fn object(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<Option<ObjectRecord>> {
        self.store.get_from_tree(
            &self.store.objects_tree,
            &key(&[policy_id, resource_name, object_id]),
        )
    }

    /// Owner of a registered object, archived or not
    pub fn object_owner(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>> {
        self.resource(policy_id, resource_name)?;
        Ok(self
            .object(policy_id, resource_name, object_id)?
            .map(|record| record.owner))
    }

    pub fn verify(
        &self,
        permission: &str,
        actor: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<bool> {
        let resource = self.resource(policy_id, resource_name)?;
        if !resource.permissions.contains_key(permission) && !resource.is_relation(permission) {
            return Err(AcpError::PermissionNotFound {
                resource: resource_name.to_string(),
                permission: permission.to_string(),
            });
        }

        let object = match self.object(policy_id, resource_name, object_id)? {
            Some(object) if !object.archived => object,
            _ => return Ok(false),
        };

        let scope = Scope {
            policy_id,
            resource_name,
            object_id,
            resource: &resource,
            object: &object,
            actor,
        };
        self.check(&scope, permission, 0)
    }

    fn check(&self, scope: &Scope<'_>, name: &str, depth: usize) -> AcpResult<bool> {
        if depth > scope.resource.permissions.len() {
            return Err(AcpError::invalid_policy(format!(
                "permission '{}' recursion too deep",
                name
            )));
        }

        if scope.resource.is_relation(name) {
            return self.holds_relation(scope, name);
        }

        let permission = scope.resource.permissions.get(name).ok_or_else(|| {
            AcpError::PermissionNotFound {
                resource: scope.resource_name.to_string(),
                permission: name.to_string(),
            }
        })?;
        let expr = Expr::parse(&permission.expr)?;
        expr.evaluate(&mut |term: &str| self.check(scope, term, depth + 1))
    }

    fn holds_relation(&self, scope: &Scope<'_>, relation: &str) -> AcpResult<bool> {
        if relation == OWNER_RELATION {
            return Ok(!scope.actor.is_empty() && scope.object.owner == scope.actor);
        }

        let tree = &self.store.relationships_tree;
        if !scope.actor.is_empty() {
            let direct = key(&[
                scope.policy_id,
                scope.resource_name,
                scope.object_id,
                relation,
                scope.actor,
            ]);
            if tree.contains_key(direct.as_bytes())? {
                return Ok(true);
            }
        }

        let wildcard = key(&[
            scope.policy_id,
            scope.resource_name,
            scope.object_id,
            relation,
            WILDCARD_ACTOR,
        ]);
        Ok(tree.contains_key(wildcard.as_bytes())?)
    }

    /// Add a relationship tuple. Returns true if it already existed.
    #[allow(clippy::too_many_arguments)]
    pub fn set_relationship(
        &self,
        requester: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        target: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        self.mutate_relationship(
            Mutation::Set,
            requester,
            policy_id,
            resource_name,
            object_id,
            relation,
            target,
            creation_time,
        )
    }

    /// Remove a relationship tuple. Returns true if it was found.
    #[allow(clippy::too_many_arguments)]
    pub fn delete_relationship(
        &self,
        requester: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        target: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        self.mutate_relationship(
            Mutation::Delete,
            requester,
            policy_id,
            resource_name,
            object_id,
            relation,
            target,
            creation_time,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn mutate_relationship(
        &self,
        mutation: Mutation,
        requester: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        target: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        check_requester(requester)?;
        check_target(target)?;

        let resource = self.resource(policy_id, resource_name)?;
        if !resource.is_relation(relation) {
            return Err(AcpError::RelationNotFound {
                resource: resource_name.to_string(),
                relation: relation.to_string(),
            });
        }
        if relation == OWNER_RELATION {
            return Err(AcpError::CannotMutateOwnerRelationship);
        }

        let object_key = key(&[policy_id, resource_name, object_id]);
        let relationship_key = key(&[policy_id, resource_name, object_id, relation, target]);
        let managers: Vec<String> = resource
            .managers_of(relation)
            .map(|m| key(&[policy_id, resource_name, object_id, m, requester]))
            .collect();

        let store = &self.store;
        let result = (&store.objects_tree, &store.relationships_tree).transaction(
            |(objects, relationships)| -> ConflictableTransactionResult<bool, AcpError> {
                let object = match objects.get(object_key.as_bytes())? {
                    Some(bytes) => decode::<ObjectRecord>(&bytes)?,
                    None => {
                        return abort(AcpError::ObjectNotRegistered {
                            resource: resource_name.to_string(),
                            object_id: object_id.to_string(),
                        })
                    }
                };
                if object.archived {
                    return abort(AcpError::ObjectArchived {
                        resource: resource_name.to_string(),
                        object_id: object_id.to_string(),
                    });
                }

                let mut authorized = object.owner == requester;
                for manager_key in &managers {
                    if authorized {
                        break;
                    }
                    authorized = relationships.get(manager_key.as_bytes())?.is_some();
                }
                if !authorized {
                    return abort(AcpError::Unauthorized {
                        actor: requester.to_string(),
                        action: format!("manage relation {} on {}", relation, object_id),
                    });
                }

                let existing = relationships.get(relationship_key.as_bytes())?;
                match mutation {
                    Mutation::Set => {
                        if existing.is_some() {
                            return Ok(true);
                        }
                        let record = RelationshipRecord {
                            created_by: requester.to_string(),
                            created_at: creation_time,
                        };
                        relationships.insert(relationship_key.as_bytes(), encode(&record)?)?;
                        Ok(false)
                    }
                    Mutation::Delete => {
                        if existing.is_none() {
                            return Ok(false);
                        }
                        relationships.remove(relationship_key.as_bytes())?;
                        Ok(true)
                    }
                }
            },
        )?;

        store.flush()?;
        Ok(result)
    }
}

struct Scope<'a> {
    policy_id: &'a str,
    resource_name: &'a str,
    object_id: &'a str,
    resource: &'a ResourceDefinition,
    object: &'a ObjectRecord,
    actor: &'a str,
}
