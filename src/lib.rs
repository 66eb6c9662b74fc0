//! Relationship-based access control for a peer-to-peer document database
//!
//! Policies declare resources, relations and permission expressions. Objects
//! (documents, or the node itself) are registered under a policy resource and
//! access is decided by the relationships actors hold on them. Two backends
//! implement the same [`client::AcpSystemClient`] contract: an embedded sled
//! store ([`local`]) and a ledger reached over RPC ([`ledger`]). The database
//! only talks to the bridges in [`bridge`] and the helpers in [`checker`].

pub mod bridge;
pub mod checker;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod local;
pub mod logging;
pub mod types;
pub mod validation;

pub use bridge::{
    new_ledger_document_acp, new_local_admin_acp, new_local_document_acp, new_local_node_acp,
    BridgeState, DocumentAcp, NodeAcp,
};
pub use checker::{
    check_access, check_node_operation_access, register_doc_on_collection_with_document_acp,
    CollectionDescription, NacInfo, NacStatus,
};
pub use client::AcpSystemClient;
pub use config::{AcpConfig, AcpSystems, DocumentBackend, LedgerConfig};
pub use error::{AcpError, AcpResult, ErrorKind};
pub use identity::{Identity, WILDCARD_ACTOR};
pub use ledger::{LedgerAcp, LedgerAcpOptions};
pub use local::{AcpKind, LocalAcp};
pub use logging::{AcpLogger, LogConfig, LogFormat};
pub use types::{
    AcpPermission, AcpSystemType, DocumentResourcePermission, NodeResourcePermission, Policy,
    PolicyDescription, PolicyMarshalType, RegistrationResult,
};
pub use validation::validate_resource_interface;
