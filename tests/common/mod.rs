//! Shared fixtures for the ACP integration tests
//!
//! Provides the policies used across test files and helpers that hand out
//! started document ACPs over each backend.

#![allow(dead_code)]

use defra_acp::ledger::{Ed25519TxSigner, LedgerAcp, LedgerAcpOptions, MockLedger};
use defra_acp::{new_local_document_acp, AcpLogger, DocumentAcp, Identity};
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::Duration;

pub const USERS_RESOURCE: &str = "users";

/// `read` is granted to owners and readers, everything else to owners only
pub const USERS_POLICY_YAML: &str = r#"
name: test
description: a test policy

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

pub const USERS_POLICY_JSON: &str = r#"{
  "name": "test",
  "description": "a test policy",
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

/// Readers and writers are managed by admins; writers can update, and both
/// writers and deleters imply read.
pub const DELEGATION_POLICY_YAML: &str = r#"
name: delegation
resources:
  users:
    permissions:
      read:
        expr: owner + reader
      update:
        expr: owner + writer
      delete:
        expr: owner + deleter
    relations:
      admin:
        manages:
          - reader
          - writer
      reader:
      writer:
      deleter:
"#;

/// A policy whose required permissions use `expr` for every document permission
pub fn policy_with_expr(expr: &str) -> String {
    format!(
        r#"
resources:
  users:
    permissions:
      read:
        expr: {expr}
      update:
        expr: owner
      delete:
        expr: owner
    relations:
      admin:
      reader:
      ownerX:
"#
    )
}

/// A started in-memory local document ACP
pub async fn started_local_document_acp() -> DocumentAcp {
    let mut acp = new_local_document_acp(AcpLogger::disabled());
    acp.init("");
    acp.start().await.expect("local acp starts");
    acp
}

/// A document ACP over an in-process ledger
pub struct LedgerFixture {
    pub acp: DocumentAcp,
    pub ledger: Arc<MockLedger>,
    /// Account bearer tokens must authorize
    pub signer_account: String,
    pub audience: String,
}

impl LedgerFixture {
    pub async fn start() -> Self {
        let options = LedgerAcpOptions {
            poll_interval: Duration::from_millis(1),
            await_timeout: Duration::from_secs(5),
            ..LedgerAcpOptions::default()
        };
        let ledger = Arc::new(
            MockLedger::new(&options.chain_id, &options.bearer_audience)
                .expect("mock ledger")
                .with_logger(AcpLogger::disabled()),
        );
        let signer = Arc::new(Ed25519TxSigner::new(SigningKey::from_bytes(&[9u8; 32])));
        let audience = options.bearer_audience.clone();

        let client = LedgerAcp::new(ledger.clone(), signer, options, AcpLogger::disabled());
        let signer_account = client.signer_account();

        let mut acp = DocumentAcp::new(Box::new(client), true, AcpLogger::disabled());
        acp.init("");
        acp.start().await.expect("ledger acp starts");

        Self {
            acp,
            ledger,
            signer_account,
            audience,
        }
    }

    /// A fresh identity carrying a bearer token for this ledger's signer
    pub fn identity(&self) -> Identity {
        let mut identity = Identity::generate();
        identity
            .update_bearer_token(&self.audience, &self.signer_account, chrono::Duration::minutes(10))
            .expect("bearer token issued");
        identity
    }
}
