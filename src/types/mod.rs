//! Value types shared across the ACP engine

pub mod node_policy;
pub mod permission;
pub mod policy;
pub mod system;

pub use node_policy::{NODE_ACP_OBJECT_ID, NODE_ACP_POLICY, NODE_ACP_POLICY_RESOURCE_NAME};
pub use permission::{
    AcpPermission, DocumentResourcePermission, NodeResourcePermission, IMPLY_DOCUMENT_READ_PERM,
};
pub use policy::{Permission, Policy, PolicyDescription, Resource};
pub use system::{AcpSystemType, PolicyMarshalType, RegistrationResult};
