//! Built-in policy gating node-level administrative operations

/// Resource name of the node object inside [`NODE_ACP_POLICY`]
pub const NODE_ACP_POLICY_RESOURCE_NAME: &str = "node";

/// Object id of the single gated node object
pub const NODE_ACP_OBJECT_ID: &str = "node";

/// Policy registered when node access control is first enabled.
///
/// The node owner and admins may perform every operation; auditors may only
/// query status. Admins manage the auditor relation.
pub const NODE_ACP_POLICY: &str = r#"
name: node access control policy
description: gates administrative operations on a node

actor:
  name: actor

resources:
  node:
    permissions:
      dac_enable:
        expr: owner + admin
      dac_disable:
        expr: owner + admin
      dac_purge:
        expr: owner + admin
      dac_status:
        expr: owner + admin + auditor
      dac_relation_add:
        expr: owner + admin
      dac_relation_delete:
        expr: owner + admin
      dac_policy_add:
        expr: owner + admin
      aac_enable:
        expr: owner + admin
      aac_disable:
        expr: owner + admin
      aac_purge:
        expr: owner + admin
      aac_status:
        expr: owner + admin + auditor
      aac_relation_add:
        expr: owner + admin
      aac_relation_delete:
        expr: owner + admin
      aac_policy_add:
        expr: owner + admin

    relations:
      owner:
        types:
          - actor
      admin:
        manages:
          - auditor
        types:
          - actor
      auditor:
        types:
          - actor
"#;
