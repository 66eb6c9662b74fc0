//! Policy DSL parsing and validation
//!
//! YAML and JSON documents with the same structure produce the same
//! [`PolicyDefinition`], whose JSON serialization is canonical (sorted maps)
//! and feeds policy id derivation.

use crate::error::{AcpError, AcpResult};
use crate::local::expr::Expr;
use crate::types::{Permission, Policy, PolicyMarshalType, Resource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Relation implicitly present on every resource, held by an object's registrant
pub const OWNER_RELATION: &str = "owner";

const DEFAULT_ACTOR_NAME: &str = "actor";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

// ---- authored document shape ----

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    actor: Option<ActorDocument>,
    #[serde(default)]
    resources: BTreeMap<String, Option<ResourceDocument>>,
}

#[derive(Debug, Deserialize)]
struct ActorDocument {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceDocument {
    #[serde(default)]
    permissions: BTreeMap<String, Option<PermissionDocument>>,
    #[serde(default)]
    relations: BTreeMap<String, Option<RelationDocument>>,
}

#[derive(Debug, Default, Deserialize)]
struct PermissionDocument {
    #[serde(default)]
    expr: Option<String>,
    #[serde(default)]
    doc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RelationDocument {
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    manages: Vec<String>,
    #[serde(default)]
    doc: Option<String>,
}

// ---- canonical shape ----

/// Validated, canonical form of an authored policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub name: String,
    pub description: String,
    pub actor_name: String,
    pub resources: BTreeMap<String, ResourceDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub name: String,
    pub permissions: BTreeMap<String, PermissionDefinition>,
    pub relations: BTreeMap<String, RelationDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub expr: String,
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub types: Vec<String>,
    pub manages: Vec<String>,
    pub doc: String,
}

impl ResourceDefinition {
    pub fn is_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Relations whose holders may add or remove `relation` tuples
    pub fn managers_of<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.relations
            .iter()
            .filter(move |(_, def)| def.manages.iter().any(|m| m == relation))
            .map(|(name, _)| name.as_str())
    }
}

impl PolicyDefinition {
    /// Canonical JSON bytes used for id derivation
    pub fn canonical_json(&self) -> AcpResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Project onto the backend-agnostic policy model
    pub fn to_policy(&self, id: &str) -> Policy {
        let resources = self
            .resources
            .iter()
            .map(|(name, resource)| {
                let permissions: HashMap<String, Permission> = resource
                    .permissions
                    .iter()
                    .map(|(perm_name, perm)| {
                        (
                            perm_name.clone(),
                            Permission {
                                name: perm_name.clone(),
                                expression: perm.expr.clone(),
                            },
                        )
                    })
                    .collect();
                (
                    name.clone(),
                    Resource {
                        name: name.clone(),
                        permissions,
                    },
                )
            })
            .collect();

        Policy {
            id: id.to_string(),
            resources,
        }
    }
}

/// Parse and validate a policy in the given format.
pub fn parse_policy(text: &str, marshal_type: PolicyMarshalType) -> AcpResult<PolicyDefinition> {
    let document: PolicyDocument = match marshal_type {
        PolicyMarshalType::Json => {
            serde_json::from_str(text).map_err(|e| AcpError::policy_parse(e.to_string()))?
        }
        PolicyMarshalType::Yaml => serde_yaml::from_str(text)?,
    };

    let definition = canonicalize(document)?;
    validate(&definition)?;
    Ok(definition)
}

fn canonicalize(document: PolicyDocument) -> AcpResult<PolicyDefinition> {
    let actor_name = document
        .actor
        .and_then(|a| a.name)
        .unwrap_or_else(|| DEFAULT_ACTOR_NAME.to_string());

    let mut resources = BTreeMap::new();
    for (name, resource) in document.resources {
        let resource = resource.unwrap_or_default();

        let permissions = resource
            .permissions
            .into_iter()
            .map(|(perm_name, perm)| {
                let perm = perm.unwrap_or_default();
                (
                    perm_name,
                    PermissionDefinition {
                        expr: perm.expr.unwrap_or_default().trim().to_string(),
                        doc: perm.doc.unwrap_or_default(),
                    },
                )
            })
            .collect();

        let mut relations: BTreeMap<String, RelationDefinition> = resource
            .relations
            .into_iter()
            .map(|(rel_name, rel)| {
                let rel = rel.unwrap_or_default();
                let mut types = rel.types;
                if types.is_empty() {
                    types.push(actor_name.clone());
                }
                types.sort();
                types.dedup();
                let mut manages = rel.manages;
                manages.sort();
                manages.dedup();
                (
                    rel_name,
                    RelationDefinition {
                        types,
                        manages,
                        doc: rel.doc.unwrap_or_default(),
                    },
                )
            })
            .collect();

        relations
            .entry(OWNER_RELATION.to_string())
            .or_insert_with(|| RelationDefinition {
                types: vec![actor_name.clone()],
                manages: Vec::new(),
                doc: String::new(),
            });

        resources.insert(
            name.clone(),
            ResourceDefinition {
                name,
                permissions,
                relations,
            },
        );
    }

    Ok(PolicyDefinition {
        name: document.name.unwrap_or_default(),
        description: document.description.unwrap_or_default(),
        actor_name,
        resources,
    })
}

fn check_identifier(kind: &str, name: &str) -> AcpResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(AcpError::invalid_policy(format!("invalid {} name '{}'", kind, name)))
    }
}

fn validate(policy: &PolicyDefinition) -> AcpResult<()> {
    check_identifier("actor", &policy.actor_name)?;
    if policy.resources.is_empty() {
        return Err(AcpError::invalid_policy("policy must define at least one resource"));
    }

    for (resource_name, resource) in &policy.resources {
        check_identifier("resource", resource_name)?;

        for (relation_name, relation) in &resource.relations {
            check_identifier("relation", relation_name)?;
            if resource.permissions.contains_key(relation_name) {
                return Err(AcpError::invalid_policy(format!(
                    "resource '{}' uses '{}' as both a relation and a permission",
                    resource_name, relation_name
                )));
            }
            for subject_type in &relation.types {
                check_identifier("relation type", subject_type)?;
            }
            for managed in &relation.manages {
                if !resource.relations.contains_key(managed) {
                    return Err(AcpError::invalid_policy(format!(
                        "relation '{}' on resource '{}' manages unknown relation '{}'",
                        relation_name, resource_name, managed
                    )));
                }
            }
        }

        let mut parsed = HashMap::new();
        for (permission_name, permission) in &resource.permissions {
            check_identifier("permission", permission_name)?;
            let expr = Expr::parse(&permission.expr)?;
            for term in expr.terms() {
                if !resource.relations.contains_key(term)
                    && !resource.permissions.contains_key(term)
                {
                    return Err(AcpError::invalid_policy(format!(
                        "permission '{}' on resource '{}' references unknown name '{}'",
                        permission_name, resource_name, term
                    )));
                }
            }
            parsed.insert(permission_name.as_str(), expr);
        }

        check_permission_cycles(resource_name, &parsed)?;
    }

    Ok(())
}

fn check_permission_cycles(resource_name: &str, parsed: &HashMap<&str, Expr>) -> AcpResult<()> {
    fn visit<'a>(
        name: &'a str,
        parsed: &'a HashMap<&str, Expr>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> bool {
        if done.contains(name) {
            return true;
        }
        if !visiting.insert(name) {
            return false;
        }
        if let Some(expr) = parsed.get(name) {
            for term in expr.terms() {
                if parsed.contains_key(term) && !visit(term, parsed, visiting, done) {
                    return false;
                }
            }
        }
        visiting.remove(name);
        done.insert(name);
        true
    }

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    for name in parsed.keys() {
        if !visit(name, parsed, &mut visiting, &mut done) {
            return Err(AcpError::invalid_policy(format!(
                "permission '{}' on resource '{}' is part of a reference cycle",
                name, resource_name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_YAML: &str = r#"
name: test
description: a policy
actor:
  name: actor
resources:
  users:
    permissions:
      read:
        expr: owner + reader
      update:
        expr: owner
      delete:
        expr: owner
    relations:
      owner:
        types:
          - actor
      reader:
        types:
          - actor
"#;

    const USERS_JSON: &str = r#"{
  "name": "test",
  "description": "a policy",
  "actor": {"name": "actor"},
  "resources": {
    "users": {
      "permissions": {
        "read": {"expr": "owner + reader"},
        "update": {"expr": "owner"},
        "delete": {"expr": "owner"}
      },
      "relations": {
        "owner": {"types": ["actor"]},
        "reader": {"types": ["actor"]}
      }
    }
  }
}"#;

    #[test]
    fn yaml_and_json_produce_the_same_definition() {
        let from_yaml = parse_policy(USERS_YAML, PolicyMarshalType::Yaml).unwrap();
        let from_json = parse_policy(USERS_JSON, PolicyMarshalType::Json).unwrap();
        assert_eq!(from_yaml, from_json);
        assert_eq!(from_yaml.canonical_json().unwrap(), from_json.canonical_json().unwrap());
    }

    #[test]
    fn owner_relation_is_implied() {
        let text = "resources:\n  users:\n    permissions:\n      read:\n        expr: owner\n";
        let definition = parse_policy(text, PolicyMarshalType::Yaml).unwrap();
        assert!(definition.resources["users"].is_relation(OWNER_RELATION));

        let policy = definition.to_policy("abc");
        assert_eq!(policy.resources["users"].permissions["read"].expression, "owner");
    }

    #[test]
    fn rejects_unknown_expression_terms() {
        let text = "resources:\n  users:\n    permissions:\n      read:\n        expr: owner + ghost\n";
        let err = parse_policy(text, PolicyMarshalType::Yaml).unwrap_err();
        assert!(matches!(err, AcpError::InvalidPolicy(_)));
    }

    #[test]
    fn rejects_permission_cycles() {
        let text = r#"
resources:
  users:
    permissions:
      a:
        expr: owner + b
      b:
        expr: a
"#;
        let err = parse_policy(text, PolicyMarshalType::Yaml).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn rejects_unknown_managed_relation() {
        let text = r#"
resources:
  users:
    relations:
      admin:
        manages:
          - ghost
"#;
        assert!(parse_policy(text, PolicyMarshalType::Yaml).is_err());
    }

    #[test]
    fn rejects_name_used_as_relation_and_permission() {
        let text = r#"
resources:
  users:
    permissions:
      reader:
        expr: owner
    relations:
      reader: {}
"#;
        assert!(parse_policy(text, PolicyMarshalType::Yaml).is_err());
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = parse_policy("resources: [unclosed", PolicyMarshalType::Yaml).unwrap_err();
        assert!(matches!(err, AcpError::PolicyParse(_)));
        let err = parse_policy("{\"resources\": ", PolicyMarshalType::Json).unwrap_err();
        assert!(matches!(err, AcpError::PolicyParse(_)));
    }
}
