//! Canonical policy model shared by every backend
//!
//! Backends keep their own storage or wire shapes; both map into these types
//! before anything above the client layer looks at a policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A policy as read back from a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub resources: HashMap<String, Resource>,
}

/// One protected resource type inside a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub permissions: HashMap<String, Permission>,
}

/// A named permission and its relation expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub expression: String,
}

impl Policy {
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }
}

impl Resource {
    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions.get(name)
    }
}

/// The `(policy id, resource name)` pair a collection or node is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescription {
    pub id: String,
    pub resource_name: String,
}

impl PolicyDescription {
    pub fn new(id: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_name: resource_name.into(),
        }
    }
}
