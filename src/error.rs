use std::io;
use thiserror::Error;

/// Result type alias for every ACP operation.
pub type AcpResult<T> = Result<T, AcpError>;

/// Broad category of an [`AcpError`].
///
/// Callers use the kind to decide how to react to a failure without matching on
/// every concrete variant: argument and policy-structure errors are terminal and
/// never retried, not-found errors may be resolved by creating the missing policy,
/// backend errors carry the wrapped backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty or missing required arguments, checked before any I/O.
    Argument,
    /// The policy does not satisfy the structure the database requires.
    PolicyStructure,
    /// A policy, resource, relation or object does not exist.
    NotFound,
    /// Store, RPC or consensus failure.
    Backend,
    /// The caller lacks something required before a request can even be sent.
    AuthorizationPrecondition,
    /// The request was evaluated and refused.
    Denied,
    /// The ACP instance is not in a state that allows the operation.
    Lifecycle,
}

/// Unified error type for the ACP engine.
///
/// Wrapping variants keep the backend failure as their source and carry the
/// identifiers needed to log or re-raise the error without re-deriving them.
#[derive(Error, Debug)]
pub enum AcpError {
    // ========== ARGUMENT ERRORS ==========
    #[error("missing policy arguments, must have both id and resource")]
    NoPolicyArgs,

    #[error("policyID must not be empty")]
    PolicyIdMustNotBeEmpty,

    #[error("resource name must not be empty")]
    ResourceNameMustNotBeEmpty,

    #[error("policy creator can not be empty")]
    PolicyCreatorMustNotBeEmpty,

    #[error("policy data can not be empty")]
    PolicyDataMustNotBeEmpty,

    #[error(
        "missing a required argument needed to add doc actor relationship. PolicyID: {policy_id}, ResourceName: {resource_name}, DocID: {doc_id}, Relation: {relation}, RequestActor: {request_actor}, TargetActor: {target_actor}"
    )]
    MissingRequiredArgToAddDocActorRelationship {
        policy_id: String,
        resource_name: String,
        doc_id: String,
        relation: String,
        request_actor: String,
        target_actor: String,
    },

    #[error(
        "missing a required argument needed to delete doc actor relationship. PolicyID: {policy_id}, ResourceName: {resource_name}, DocID: {doc_id}, Relation: {relation}, RequestActor: {request_actor}, TargetActor: {target_actor}"
    )]
    MissingRequiredArgToDeleteDocActorRelationship {
        policy_id: String,
        resource_name: String,
        doc_id: String,
        relation: String,
        request_actor: String,
        target_actor: String,
    },

    #[error("actor must be a valid did. ActorID: {actor_id}")]
    InvalidActorId { actor_id: String },

    #[error("invalid resource permission type. Expected: {expected}, Actual: {actual}")]
    InvalidResourcePermissionType { expected: String, actual: String },

    // ========== POLICY STRUCTURE ERRORS ==========
    #[error("invalid acp system")]
    InvalidAcpSystem,

    #[error("resource does not exist on the specified policy. PolicyID: {policy_id}, ResourceName: {resource_name}")]
    ResourceDoesNotExistOnTargetPolicy {
        policy_id: String,
        resource_name: String,
    },

    #[error(
        "resource is missing required permission on policy. PolicyID: {policy_id}, ResourceName: {resource_name}, Permission: {permission}"
    )]
    ResourceIsMissingRequiredPermission {
        policy_id: String,
        resource_name: String,
        permission: String,
    },

    #[error(
        "expr of required permission must start with required relation. Permission: {permission}, Relation: {relation}"
    )]
    ExprOfRequiredPermissionMustStartWithRelation { permission: String, relation: String },

    #[error(
        "expr of required permission has invalid character after relation. Permission: {permission}, Relation: {relation}, Character: {character}"
    )]
    ExprOfRequiredPermissionHasInvalidChar {
        permission: String,
        relation: String,
        character: char,
    },

    #[error("failed to parse policy: {0}")]
    PolicyParse(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    // ========== NOT FOUND ERRORS ==========
    #[error("policyID specified does not exist with acp. PolicyID: {policy_id}")]
    PolicyDoesNotExistWithAcp { policy_id: String },

    #[error("policy not found. PolicyID: {policy_id}")]
    PolicyNotFound { policy_id: String },

    #[error("resource not found in policy. PolicyID: {policy_id}, Resource: {resource}")]
    ResourceNotFound { policy_id: String, resource: String },

    #[error("relation not found in resource. Resource: {resource}, Relation: {relation}")]
    RelationNotFound { resource: String, relation: String },

    #[error("permission not found in resource. Resource: {resource}, Permission: {permission}")]
    PermissionNotFound { resource: String, permission: String },

    #[error("object not registered. Resource: {resource}, ObjectID: {object_id}")]
    ObjectNotRegistered { resource: String, object_id: String },

    #[error("ledger resource not found: {0}")]
    LedgerNotFound(String),

    // ========== WRAPPED BACKEND ERRORS ==========
    #[error("failed to validate policy with acp. PolicyID: {policy_id}")]
    PolicyValidationFailedWithAcp {
        policy_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error("initialization of acp failed. Type: {backend}, Path: {location}")]
    InitializationOfAcpFailed {
        backend: &'static str,
        location: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error("failed to add policy with acp. Type: {backend}, Creator: {creator}")]
    FailedToAddPolicyWithAcp {
        backend: &'static str,
        creator: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to register document with acp. Type: {backend}, PolicyID: {policy_id}, Actor: {actor}, Resource: {resource}, DocID: {doc_id}"
    )]
    FailedToRegisterDocWithAcp {
        backend: &'static str,
        policy_id: String,
        actor: String,
        resource: String,
        doc_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to archive document with acp. Type: {backend}, PolicyID: {policy_id}, Actor: {actor}, Resource: {resource}, DocID: {doc_id}"
    )]
    FailedToArchiveDocWithAcp {
        backend: &'static str,
        policy_id: String,
        actor: String,
        resource: String,
        doc_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to check if doc is registered with acp. Type: {backend}, PolicyID: {policy_id}, Resource: {resource}, DocID: {doc_id}"
    )]
    FailedToCheckIfDocIsRegisteredWithAcp {
        backend: &'static str,
        policy_id: String,
        resource: String,
        doc_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to verify doc access with acp. Type: {backend}, Permission: {permission}, PolicyID: {policy_id}, ActorID: {actor_id}, Resource: {resource}, DocID: {doc_id}"
    )]
    FailedToVerifyDocAccessWithAcp {
        backend: &'static str,
        permission: String,
        policy_id: String,
        actor_id: String,
        resource: String,
        doc_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to add document actor relationship with acp. Type: {backend}, PolicyID: {policy_id}, ResourceName: {resource}, DocID: {doc_id}, Relation: {relation}, RequestActor: {request_actor}, TargetActor: {target_actor}"
    )]
    FailedToAddDocActorRelationshipWithAcp {
        backend: &'static str,
        policy_id: String,
        resource: String,
        doc_id: String,
        relation: String,
        request_actor: String,
        target_actor: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to delete document actor relationship with acp. Type: {backend}, PolicyID: {policy_id}, ResourceName: {resource}, DocID: {doc_id}, Relation: {relation}, RequestActor: {request_actor}, TargetActor: {target_actor}"
    )]
    FailedToDeleteDocActorRelationshipWithAcp {
        backend: &'static str,
        policy_id: String,
        resource: String,
        doc_id: String,
        relation: String,
        request_actor: String,
        target_actor: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to register node object with acp. PolicyID: {policy_id}, Actor: {actor}, Resource: {resource}, ObjectID: {object_id}"
    )]
    FailedToRegisterNodeObjectWithAcp {
        policy_id: String,
        actor: String,
        resource: String,
        object_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to check if node object is registered with acp. PolicyID: {policy_id}, Resource: {resource}, ObjectID: {object_id}"
    )]
    FailedToCheckIfNodeObjectIsRegisteredWithAcp {
        policy_id: String,
        resource: String,
        object_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to verify node access with acp. Permission: {permission}, PolicyID: {policy_id}, ActorID: {actor_id}, Resource: {resource}, ObjectID: {object_id}"
    )]
    FailedToVerifyNodeAccessWithAcp {
        permission: String,
        policy_id: String,
        actor_id: String,
        resource: String,
        object_id: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error(
        "failed to {operation} node actor relationship with acp. PolicyID: {policy_id}, Relation: {relation}, RequestActor: {request_actor}, TargetActor: {target_actor}"
    )]
    FailedToMutateNodeActorRelationshipWithAcp {
        operation: &'static str,
        policy_id: String,
        relation: String,
        request_actor: String,
        target_actor: String,
        #[source]
        source: Box<AcpError>,
    },

    #[error("failed to reset acp state")]
    AcpResetState(#[source] io::Error),

    // ========== RAW BACKEND ERRORS ==========
    #[error("acp store error: {0}")]
    Store(String),

    #[error("acp store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger rejected transaction. Code: {code}, Log: {log}")]
    LedgerRejected { code: u32, log: String },

    #[error("timed out waiting for transaction inclusion. TxHash: {tx_hash}")]
    TxAwaitTimeout { tx_hash: String },

    #[error("ledger rpc error: {0}")]
    Ledger(String),

    #[error("{0} unimplemented")]
    Unimplemented(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("logging setup error: {0}")]
    Logging(String),

    #[error("identity error: {0}")]
    Identity(String),

    // ========== AUTHORIZATION PRECONDITION ERRORS ==========
    #[error("identity must carry a bearer token to {operation}")]
    MissingBearerToken { operation: &'static str },

    #[error("invalid bearer token: {0}")]
    InvalidBearerToken(String),

    #[error("operation requires ACP, but ACP not available")]
    AcpOperationButAcpNotAvailable,

    // ========== DENIED ==========
    #[error("UNAUTHORIZED: actor {actor} can not {action}")]
    Unauthorized { actor: String, action: String },

    #[error("cannot set or delete an owner relationship")]
    CannotMutateOwnerRelationship,

    #[error("object already registered. Resource: {resource}, ObjectID: {object_id}")]
    ObjectAlreadyRegistered { resource: String, object_id: String },

    #[error("object is archived. Resource: {resource}, ObjectID: {object_id}")]
    ObjectArchived { resource: String, object_id: String },

    #[error("not authorized to perform operation")]
    NotAuthorizedToPerformOperation,

    // ========== LIFECYCLE ERRORS ==========
    #[error("acp has not been initialized")]
    AcpNotInitialized,

    #[error("acp has not been started")]
    AcpNotStarted,

    #[error("node acp is not configured")]
    NacIsNotConfigured,

    #[error("node acp is enabled, but is missing policy information")]
    NacIsEnabledButIsMissingPolicyInfo,

    #[error("node acp object to gate is not registered")]
    NacNodeObjectToGateIsNotRegistered,
}

impl AcpError {
    /// Create a store error with context
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a policy parse error with context
    pub fn policy_parse<S: Into<String>>(msg: S) -> Self {
        Self::PolicyParse(msg.into())
    }

    /// Create an invalid policy error with context
    pub fn invalid_policy<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPolicy(msg.into())
    }

    /// Create a ledger rpc error with context
    pub fn ledger<S: Into<String>>(msg: S) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create a configuration error with context
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an identity error with context
    pub fn identity<S: Into<String>>(msg: S) -> Self {
        Self::Identity(msg.into())
    }

    /// The broad category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcpError::NoPolicyArgs
            | AcpError::PolicyIdMustNotBeEmpty
            | AcpError::ResourceNameMustNotBeEmpty
            | AcpError::PolicyCreatorMustNotBeEmpty
            | AcpError::PolicyDataMustNotBeEmpty
            | AcpError::MissingRequiredArgToAddDocActorRelationship { .. }
            | AcpError::MissingRequiredArgToDeleteDocActorRelationship { .. }
            | AcpError::InvalidActorId { .. }
            | AcpError::InvalidResourcePermissionType { .. }
            | AcpError::Config(_)
            | AcpError::Toml(_) => ErrorKind::Argument,

            AcpError::InvalidAcpSystem
            | AcpError::ResourceDoesNotExistOnTargetPolicy { .. }
            | AcpError::ResourceIsMissingRequiredPermission { .. }
            | AcpError::ExprOfRequiredPermissionMustStartWithRelation { .. }
            | AcpError::ExprOfRequiredPermissionHasInvalidChar { .. }
            | AcpError::PolicyParse(_)
            | AcpError::InvalidPolicy(_) => ErrorKind::PolicyStructure,

            AcpError::PolicyDoesNotExistWithAcp { .. }
            | AcpError::PolicyNotFound { .. }
            | AcpError::ResourceNotFound { .. }
            | AcpError::RelationNotFound { .. }
            | AcpError::PermissionNotFound { .. }
            | AcpError::ObjectNotRegistered { .. }
            | AcpError::LedgerNotFound(_) => ErrorKind::NotFound,

            AcpError::MissingBearerToken { .. }
            | AcpError::InvalidBearerToken(_)
            | AcpError::AcpOperationButAcpNotAvailable
            | AcpError::Identity(_) => ErrorKind::AuthorizationPrecondition,

            AcpError::Unauthorized { .. }
            | AcpError::CannotMutateOwnerRelationship
            | AcpError::ObjectAlreadyRegistered { .. }
            | AcpError::ObjectArchived { .. }
            | AcpError::NotAuthorizedToPerformOperation => ErrorKind::Denied,

            AcpError::AcpNotInitialized
            | AcpError::AcpNotStarted
            | AcpError::NacIsNotConfigured
            | AcpError::NacIsEnabledButIsMissingPolicyInfo
            | AcpError::NacNodeObjectToGateIsNotRegistered => ErrorKind::Lifecycle,

            AcpError::PolicyValidationFailedWithAcp { .. }
            | AcpError::InitializationOfAcpFailed { .. }
            | AcpError::FailedToAddPolicyWithAcp { .. }
            | AcpError::FailedToRegisterDocWithAcp { .. }
            | AcpError::FailedToArchiveDocWithAcp { .. }
            | AcpError::FailedToCheckIfDocIsRegisteredWithAcp { .. }
            | AcpError::FailedToVerifyDocAccessWithAcp { .. }
            | AcpError::FailedToAddDocActorRelationshipWithAcp { .. }
            | AcpError::FailedToDeleteDocActorRelationshipWithAcp { .. }
            | AcpError::FailedToRegisterNodeObjectWithAcp { .. }
            | AcpError::FailedToCheckIfNodeObjectIsRegisteredWithAcp { .. }
            | AcpError::FailedToVerifyNodeAccessWithAcp { .. }
            | AcpError::FailedToMutateNodeActorRelationshipWithAcp { .. }
            | AcpError::AcpResetState(_)
            | AcpError::Store(_)
            | AcpError::Sled(_)
            | AcpError::Serialization(_)
            | AcpError::Io(_)
            | AcpError::Http(_)
            | AcpError::LedgerRejected { .. }
            | AcpError::TxAwaitTimeout { .. }
            | AcpError::Ledger(_)
            | AcpError::Unimplemented(_)
            | AcpError::Logging(_) => ErrorKind::Backend,
        }
    }

    /// Walks the chain of wrapped errors and returns the innermost ACP error.
    pub fn root_cause(&self) -> &AcpError {
        let mut current = self;
        loop {
            let next = match current {
                AcpError::PolicyValidationFailedWithAcp { source, .. }
                | AcpError::InitializationOfAcpFailed { source, .. }
                | AcpError::FailedToAddPolicyWithAcp { source, .. }
                | AcpError::FailedToRegisterDocWithAcp { source, .. }
                | AcpError::FailedToArchiveDocWithAcp { source, .. }
                | AcpError::FailedToCheckIfDocIsRegisteredWithAcp { source, .. }
                | AcpError::FailedToVerifyDocAccessWithAcp { source, .. }
                | AcpError::FailedToAddDocActorRelationshipWithAcp { source, .. }
                | AcpError::FailedToDeleteDocActorRelationshipWithAcp { source, .. }
                | AcpError::FailedToRegisterNodeObjectWithAcp { source, .. }
                | AcpError::FailedToCheckIfNodeObjectIsRegisteredWithAcp { source, .. }
                | AcpError::FailedToVerifyNodeAccessWithAcp { source, .. }
                | AcpError::FailedToMutateNodeActorRelationshipWithAcp { source, .. } => {
                    source.as_ref()
                }
                _ => return current,
            };
            current = next;
        }
    }
}

impl From<serde_yaml::Error> for AcpError {
    fn from(error: serde_yaml::Error) -> Self {
        AcpError::PolicyParse(error.to_string())
    }
}

impl<E> From<sled::transaction::TransactionError<E>> for AcpError
where
    E: Into<AcpError>,
{
    fn from(error: sled::transaction::TransactionError<E>) -> Self {
        match error {
            sled::transaction::TransactionError::Abort(e) => e.into(),
            sled::transaction::TransactionError::Storage(e) => AcpError::Sled(e),
        }
    }
}
