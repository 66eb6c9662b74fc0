//! Permissions the database itself requires on ACP resources

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permissions every document resource must expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentResourcePermission {
    Read,
    Update,
    Delete,
}

impl DocumentResourcePermission {
    pub const ALL: [DocumentResourcePermission; 3] = [
        DocumentResourcePermission::Read,
        DocumentResourcePermission::Update,
        DocumentResourcePermission::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentResourcePermission::Read => "read",
            DocumentResourcePermission::Update => "update",
            DocumentResourcePermission::Delete => "delete",
        }
    }
}

/// Permissions that each grant read access to a document, in the order they
/// are consulted.
pub const IMPLY_DOCUMENT_READ_PERM: [DocumentResourcePermission; 3] = [
    DocumentResourcePermission::Read,
    DocumentResourcePermission::Update,
    DocumentResourcePermission::Delete,
];

/// Node-level administrative permissions, for document (`dac`) and admin (`aac`)
/// access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeResourcePermission {
    DacEnable,
    DacDisable,
    DacPurge,
    DacStatus,
    DacRelationAdd,
    DacRelationDelete,
    DacPolicyAdd,
    AacEnable,
    AacDisable,
    AacPurge,
    AacStatus,
    AacRelationAdd,
    AacRelationDelete,
    AacPolicyAdd,
}

impl NodeResourcePermission {
    pub const ALL: [NodeResourcePermission; 14] = [
        NodeResourcePermission::DacEnable,
        NodeResourcePermission::DacDisable,
        NodeResourcePermission::DacPurge,
        NodeResourcePermission::DacStatus,
        NodeResourcePermission::DacRelationAdd,
        NodeResourcePermission::DacRelationDelete,
        NodeResourcePermission::DacPolicyAdd,
        NodeResourcePermission::AacEnable,
        NodeResourcePermission::AacDisable,
        NodeResourcePermission::AacPurge,
        NodeResourcePermission::AacStatus,
        NodeResourcePermission::AacRelationAdd,
        NodeResourcePermission::AacRelationDelete,
        NodeResourcePermission::AacPolicyAdd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeResourcePermission::DacEnable => "dac_enable",
            NodeResourcePermission::DacDisable => "dac_disable",
            NodeResourcePermission::DacPurge => "dac_purge",
            NodeResourcePermission::DacStatus => "dac_status",
            NodeResourcePermission::DacRelationAdd => "dac_relation_add",
            NodeResourcePermission::DacRelationDelete => "dac_relation_delete",
            NodeResourcePermission::DacPolicyAdd => "dac_policy_add",
            NodeResourcePermission::AacEnable => "aac_enable",
            NodeResourcePermission::AacDisable => "aac_disable",
            NodeResourcePermission::AacPurge => "aac_purge",
            NodeResourcePermission::AacStatus => "aac_status",
            NodeResourcePermission::AacRelationAdd => "aac_relation_add",
            NodeResourcePermission::AacRelationDelete => "aac_relation_delete",
            NodeResourcePermission::AacPolicyAdd => "aac_policy_add",
        }
    }
}

/// A permission of either resource domain, as passed through generic call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcpPermission {
    Document(DocumentResourcePermission),
    Node(NodeResourcePermission),
}

impl AcpPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcpPermission::Document(p) => p.as_str(),
            AcpPermission::Node(p) => p.as_str(),
        }
    }

    /// Domain name used in type mismatch errors
    pub fn domain(&self) -> &'static str {
        match self {
            AcpPermission::Document(_) => "DocumentResourcePermission",
            AcpPermission::Node(_) => "NodeResourcePermission",
        }
    }
}

impl From<DocumentResourcePermission> for AcpPermission {
    fn from(permission: DocumentResourcePermission) -> Self {
        AcpPermission::Document(permission)
    }
}

impl From<NodeResourcePermission> for AcpPermission {
    fn from(permission: NodeResourcePermission) -> Self {
        AcpPermission::Node(permission)
    }
}

impl fmt::Display for DocumentResourcePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for NodeResourcePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AcpPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
