//! Ledger transactions and the wire shapes they carry

use crate::error::{AcpError, AcpResult};
use crate::types::{Permission, Policy, PolicyMarshalType, RegistrationResult, Resource};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Gas limit attached to every ACP transaction
pub const DEFAULT_GAS_LIMIT: u64 = 400_000;

const ACCOUNT_PREFIX: &str = "source";
const ACCOUNT_HASH_LENGTH: usize = 20;

/// Ledger account address of an Ed25519 public key
pub fn account_address(public_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(public_key.as_bytes());
    format!("{}{}", ACCOUNT_PREFIX, hex::encode(&digest[..ACCOUNT_HASH_LENGTH]))
}

/// Signs transactions on behalf of one ledger account
pub trait TxSigner: Send + Sync {
    fn account_address(&self) -> String;
    fn public_key(&self) -> VerifyingKey;
    fn sign(&self, message: &[u8]) -> Signature;
}

/// [`TxSigner`] holding an Ed25519 key in memory
pub struct Ed25519TxSigner {
    key: SigningKey,
    address: String,
}

impl Ed25519TxSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = account_address(&key.verifying_key());
        Self { key, address }
    }

    /// Load a signer from a hex encoded 32-byte secret key
    pub fn from_hex(secret: &str) -> AcpResult<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| AcpError::identity(format!("invalid signer key: {}", e)))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AcpError::identity("signer key must be 32 bytes"))?;
        Ok(Self::new(SigningKey::from_bytes(&secret)))
    }
}

impl TxSigner for Ed25519TxSigner {
    fn account_address(&self) -> String {
        self.address.clone()
    }

    fn public_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

/// Command executed against an existing policy with a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PolicyCmd {
    RegisterObject {
        resource: String,
        object_id: String,
    },
    ArchiveObject {
        resource: String,
        object_id: String,
    },
    SetRelationship {
        resource: String,
        object_id: String,
        relation: String,
        subject: String,
    },
    DeleteRelationship {
        resource: String,
        object_id: String,
        relation: String,
        subject: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMsg {
    CreatePolicy {
        creator: String,
        policy: String,
        marshal_type: PolicyMarshalType,
        creation_time: DateTime<Utc>,
    },
    BearerPolicyCmd {
        creator: String,
        bearer_token: String,
        policy_id: String,
        cmd: PolicyCmd,
        creation_time: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub chain_id: String,
    pub account: String,
    pub sequence: u64,
    pub gas_limit: u64,
    pub msg: LedgerMsg,
}

impl TxBody {
    pub fn sign_bytes(&self) -> AcpResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub body: TxBody,
    /// Hex encoded signer public key
    pub public_key: String,
    /// Hex encoded Ed25519 signature over the body
    pub signature: String,
}

impl SignedTx {
    pub fn to_bytes(&self) -> AcpResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Uppercase hex SHA-256 of the encoded transaction
    pub fn hash(&self) -> AcpResult<String> {
        Ok(hex::encode_upper(Sha256::digest(self.to_bytes()?)))
    }

    /// Check the signature and that the public key belongs to the body's account
    pub fn verify(&self) -> AcpResult<()> {
        let key_bytes: [u8; 32] = hex::decode(&self.public_key)
            .map_err(|e| AcpError::ledger(format!("invalid tx public key: {}", e)))?
            .as_slice()
            .try_into()
            .map_err(|_| AcpError::ledger("tx public key must be 32 bytes"))?;
        let public_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| AcpError::ledger(format!("invalid tx public key: {}", e)))?;

        if account_address(&public_key) != self.body.account {
            return Err(AcpError::ledger("tx public key does not match signer account"));
        }

        let signature_bytes = hex::decode(&self.signature)
            .map_err(|e| AcpError::ledger(format!("invalid tx signature: {}", e)))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| AcpError::ledger(format!("invalid tx signature: {}", e)))?;

        public_key
            .verify(&self.body.sign_bytes()?, &signature)
            .map_err(|_| AcpError::ledger("tx signature verification failed"))
    }
}

/// Builds signed transactions with a local sequence counter
pub struct TxBuilder {
    chain_id: String,
    gas_limit: u64,
    signer: Arc<dyn TxSigner>,
    sequence: AtomicU64,
}

impl TxBuilder {
    pub fn new(chain_id: impl Into<String>, gas_limit: u64, signer: Arc<dyn TxSigner>) -> Self {
        Self {
            chain_id: chain_id.into(),
            gas_limit,
            signer,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn account(&self) -> String {
        self.signer.account_address()
    }

    pub fn build(&self, msg: LedgerMsg) -> AcpResult<SignedTx> {
        let body = TxBody {
            chain_id: self.chain_id.clone(),
            account: self.signer.account_address(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            gas_limit: self.gas_limit,
            msg,
        };
        let signature = self.signer.sign(&body.sign_bytes()?);

        Ok(SignedTx {
            body,
            public_key: hex::encode(self.signer.public_key().as_bytes()),
            signature: hex::encode(signature.to_bytes()),
        })
    }
}

/// Decoded result of a delivered transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MsgResult {
    CreatePolicy { policy: LedgerPolicy },
    RegisterObject { result: RegistrationResult },
    ArchiveObject { archived: bool },
    SetRelationship { record_existed: bool },
    DeleteRelationship { record_found: bool },
}

/// Inclusion result of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub log: String,
    pub result: Option<MsgResult>,
}

/// Policy as returned by the ledger's query service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator: String,
    pub creation_time: DateTime<Utc>,
    pub resources: Vec<LedgerResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerResource {
    pub name: String,
    pub permissions: Vec<LedgerPermission>,
    pub relations: Vec<LedgerRelation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPermission {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRelation {
    pub name: String,
    #[serde(default)]
    pub manages: Vec<String>,
    #[serde(default)]
    pub doc: String,
}

impl LedgerPolicy {
    /// Map onto the backend-agnostic policy model
    pub fn to_policy(&self) -> Policy {
        let resources = self
            .resources
            .iter()
            .map(|resource| {
                let permissions: HashMap<String, Permission> = resource
                    .permissions
                    .iter()
                    .map(|p| {
                        (
                            p.name.clone(),
                            Permission {
                                name: p.name.clone(),
                                expression: p.expression.clone(),
                            },
                        )
                    })
                    .collect();
                (
                    resource.name.clone(),
                    Resource {
                        name: resource.name.clone(),
                        permissions,
                    },
                )
            })
            .collect();

        Policy {
            id: self.id.clone(),
            resources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> TxBuilder {
        let signer = Ed25519TxSigner::new(SigningKey::from_bytes(&[9u8; 32]));
        TxBuilder::new("sourcehub-test", DEFAULT_GAS_LIMIT, Arc::new(signer))
    }

    fn msg() -> LedgerMsg {
        LedgerMsg::CreatePolicy {
            creator: "source1".to_string(),
            policy: "resources: {}".to_string(),
            marshal_type: PolicyMarshalType::Yaml,
            creation_time: Utc::now(),
        }
    }

    #[test]
    fn built_transactions_verify_and_advance_sequence() {
        let builder = builder();
        let first = builder.build(msg()).unwrap();
        let second = builder.build(msg()).unwrap();

        first.verify().unwrap();
        assert_eq!(first.body.sequence, 0);
        assert_eq!(second.body.sequence, 1);
        assert_eq!(first.body.gas_limit, 400_000);
        assert!(first.body.account.starts_with("source"));
        assert_ne!(first.hash().unwrap(), second.hash().unwrap());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let mut tx = builder().build(msg()).unwrap();
        tx.body.chain_id = "other-chain".to_string();
        assert!(tx.verify().is_err());
    }

    #[test]
    fn signer_loads_from_hex() {
        let signer = Ed25519TxSigner::from_hex(&hex::encode([9u8; 32])).unwrap();
        assert_eq!(
            signer.account_address(),
            account_address(&SigningKey::from_bytes(&[9u8; 32]).verifying_key())
        );
        assert!(Ed25519TxSigner::from_hex("abcd").is_err());
    }
}
