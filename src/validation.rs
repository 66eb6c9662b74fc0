//! Structural checks that a policy exposes what the database needs
//!
//! A policy bound to a collection (or to the node) must expose every permission
//! required by the ACP system it lives in, and each of those permissions must be
//! granted to the `owner` relation. The registrant of an object always holds
//! `owner`, so this guarantees the registrant can exercise every required
//! permission regardless of what else the author put in the expression.

use crate::client::AcpSystemClient;
use crate::error::{AcpError, AcpResult};
use crate::types::AcpSystemType;

/// Relation that every required permission expression must start with
pub const REQUIRED_REGISTERER_RELATION: &str = "owner";

/// Only operator allowed directly after the required relation
const UNION_OPERATOR: char = '+';

/// Validate that `resource_name` on policy `policy_id` satisfies the
/// permission interface of `system_type`.
///
/// Reads the policy through `client` and never mutates anything.
pub async fn validate_resource_interface(
    policy_id: &str,
    resource_name: &str,
    system_type: AcpSystemType,
    client: &dyn AcpSystemClient,
) -> AcpResult<()> {
    if policy_id.is_empty() && resource_name.is_empty() {
        return Err(AcpError::NoPolicyArgs);
    }
    if policy_id.is_empty() {
        return Err(AcpError::PolicyIdMustNotBeEmpty);
    }
    if resource_name.is_empty() {
        return Err(AcpError::ResourceNameMustNotBeEmpty);
    }

    let policy = client
        .policy(policy_id)
        .await
        .map_err(|e| AcpError::PolicyValidationFailedWithAcp {
            policy_id: policy_id.to_string(),
            source: Box::new(e),
        })?
        .ok_or_else(|| AcpError::PolicyDoesNotExistWithAcp {
            policy_id: policy_id.to_string(),
        })?;

    let resource =
        policy
            .resource(resource_name)
            .ok_or_else(|| AcpError::ResourceDoesNotExistOnTargetPolicy {
                policy_id: policy_id.to_string(),
                resource_name: resource_name.to_string(),
            })?;

    for required in system_type.required_permissions() {
        let permission = resource.permission(required).ok_or_else(|| {
            AcpError::ResourceIsMissingRequiredPermission {
                policy_id: policy_id.to_string(),
                resource_name: resource_name.to_string(),
                permission: required.to_string(),
            }
        })?;

        validate_expression_of_required_permission(&permission.expression, required)?;
    }

    Ok(())
}

/// Check that `expression` starts with the `owner` relation and that the only
/// thing following it, if anything, is a union.
pub fn validate_expression_of_required_permission(
    expression: &str,
    permission: &str,
) -> AcpResult<()> {
    let trimmed = expression.trim();

    let rest = trimmed
        .strip_prefix(REQUIRED_REGISTERER_RELATION)
        .ok_or_else(|| AcpError::ExprOfRequiredPermissionMustStartWithRelation {
            permission: permission.to_string(),
            relation: REQUIRED_REGISTERER_RELATION.to_string(),
        })?;

    match rest.chars().find(|c| !c.is_whitespace()) {
        None | Some(UNION_OPERATOR) => Ok(()),
        Some(character) => Err(AcpError::ExprOfRequiredPermissionHasInvalidChar {
            permission: permission.to_string(),
            relation: REQUIRED_REGISTERER_RELATION.to_string(),
            character,
        }),
    }
}
