use crate::types::permission::{DocumentResourcePermission, NodeResourcePermission};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which required-permission set a backend's policies are validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcpSystemType {
    LocalDocument,
    LedgerDocument,
    LocalNode,
}

impl AcpSystemType {
    /// Permission names a resource must expose for this system, in check order
    pub fn required_permissions(&self) -> Vec<&'static str> {
        match self {
            AcpSystemType::LocalDocument | AcpSystemType::LedgerDocument => {
                DocumentResourcePermission::ALL.iter().map(|p| p.as_str()).collect()
            }
            AcpSystemType::LocalNode => {
                NodeResourcePermission::ALL.iter().map(|p| p.as_str()).collect()
            }
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, AcpSystemType::LocalDocument | AcpSystemType::LedgerDocument)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, AcpSystemType::LocalNode)
    }
}

impl fmt::Display for AcpSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcpSystemType::LocalDocument => "LocalDocumentACP",
            AcpSystemType::LedgerDocument => "LedgerDocumentACP",
            AcpSystemType::LocalNode => "LocalNodeACP",
        };
        f.write_str(name)
    }
}

/// Textual format of a submitted policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyMarshalType {
    Yaml,
    Json,
}

impl PolicyMarshalType {
    /// Pick JSON when `text` is strict JSON, YAML otherwise.
    ///
    /// Text that is neither falls through to YAML and fails later in the
    /// backend's parser.
    pub fn detect(text: &str) -> Self {
        if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
            PolicyMarshalType::Json
        } else {
            PolicyMarshalType::Yaml
        }
    }
}

/// Outcome of registering an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationResult {
    /// Nothing changed, the object is already active for this owner
    NoOp,
    Registered,
    /// A previously archived object was reactivated by its owner
    Unarchived,
}
